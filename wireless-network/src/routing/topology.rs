use crate::network::{Network, NodeId};
use crate::radio;
use event_runtime::SimTime;
use std::collections::{BTreeMap, VecDeque};

/// Shortest-hop paths from `source` to every node it can currently reach
///
/// Only nodes that are alive and run a routing agent take part. Each path starts at `source` and
/// ends at the destination. Ties are broken towards lower node ids, so results are deterministic.
pub(crate) fn shortest_paths(
    network: &Network,
    now: SimTime,
    source: NodeId,
) -> BTreeMap<NodeId, Vec<NodeId>> {
    let positions: Vec<_> = network
        .nodes()
        .map(|n| (n.is_alive(now) && n.routing.is_some()).then(|| n.position(now)))
        .collect();

    let mut parents: BTreeMap<NodeId, NodeId> = BTreeMap::new();
    let mut paths = BTreeMap::new();
    if positions.get(source.0 as usize).is_none_or(|p| p.is_none()) {
        return paths;
    }

    let mut queue = VecDeque::from([source]);
    parents.insert(source, source);
    while let Some(current) = queue.pop_front() {
        let Some(Some(current_position)) = positions.get(current.0 as usize) else {
            continue;
        };

        for (index, position) in positions.iter().enumerate() {
            let neighbor = NodeId(index as u32);
            let Some(position) = position else {
                continue;
            };

            if parents.contains_key(&neighbor)
                || !radio::can_hear(&network.spec.radio, current_position.distance(position))
            {
                continue;
            }

            parents.insert(neighbor, current);
            queue.push_back(neighbor);
        }
    }

    for &destination in parents.keys() {
        let mut path = vec![destination];
        let mut current = destination;
        while current != source {
            current = parents[&current];
            path.push(current);
        }

        path.reverse();
        paths.insert(destination, path);
    }

    paths
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mobility::PositionAllocator;
    use crate::routing::RoutingProtocolKind;
    use fastrand::Rng;

    fn line(count: u32, spacing: f64) -> Network {
        let mut network = Network::new(Default::default(), Rng::with_seed(0));
        let nodes = network.create_nodes(count);
        let mut allocator = PositionAllocator::grid(0.0, 0.0, spacing, spacing, count);
        network.install_mobility(&nodes, &mut allocator, None);
        network.install_wifi_devices(&nodes);
        network.install_internet_stack(&nodes, RoutingProtocolKind::Olsr);
        network
    }

    #[test]
    fn test_paths_along_a_line() {
        let network = line(4, 50.0);
        let paths = shortest_paths(&network, SimTime::ZERO, NodeId(0));

        assert_eq!(paths[&NodeId(0)], vec![NodeId(0)]);
        assert_eq!(paths[&NodeId(1)], vec![NodeId(0), NodeId(1)]);
        assert_eq!(
            paths[&NodeId(3)],
            vec![NodeId(0), NodeId(1), NodeId(2), NodeId(3)]
        );
    }

    #[test]
    fn test_unreachable_nodes_have_no_path() {
        let network = line(3, 100.0);
        let paths = shortest_paths(&network, SimTime::ZERO, NodeId(0));

        assert_eq!(paths.len(), 1);
        assert!(!paths.contains_key(&NodeId(1)));
    }

    #[test]
    fn test_nodes_without_agent_do_not_relay() {
        let mut network = line(3, 50.0);
        network.node_mut(NodeId(1)).unwrap().routing = None;
        let paths = shortest_paths(&network, SimTime::ZERO, NodeId(0));

        assert!(!paths.contains_key(&NodeId(2)));
    }
}

//! Node placement and movement

use crate::Sim;
use crate::network::NodeId;
use event_runtime::SimTime;
use fastrand::Rng;
use std::f64::consts::PI;
use std::time::Duration;

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Vector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Vector) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Rectangle {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Rectangle {
    pub fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Self {
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
        }
    }

    pub fn contains(&self, position: &Vector) -> bool {
        (self.x_min..=self.x_max).contains(&position.x)
            && (self.y_min..=self.y_max).contains(&position.y)
    }
}

/// Hands out initial positions to nodes, in installation order
pub enum PositionAllocator {
    /// Row-first grid placement
    Grid {
        min_x: f64,
        min_y: f64,
        delta_x: f64,
        delta_y: f64,
        grid_width: u32,
        next: u32,
    },
    /// Uniformly random placement inside a rectangle
    RandomRectangle { bounds: Rectangle, rng: Rng },
}

impl PositionAllocator {
    pub fn grid(min_x: f64, min_y: f64, delta_x: f64, delta_y: f64, grid_width: u32) -> Self {
        Self::Grid {
            min_x,
            min_y,
            delta_x,
            delta_y,
            grid_width: grid_width.max(1),
            next: 0,
        }
    }

    pub fn random_rectangle(bounds: Rectangle, rng: Rng) -> Self {
        Self::RandomRectangle { bounds, rng }
    }

    pub fn next_position(&mut self) -> Vector {
        match self {
            PositionAllocator::Grid {
                min_x,
                min_y,
                delta_x,
                delta_y,
                grid_width,
                next,
            } => {
                let n = *next;
                *next += 1;
                Vector::new(
                    *min_x + *delta_x * (n % *grid_width) as f64,
                    *min_y + *delta_y * (n / *grid_width) as f64,
                    0.0,
                )
            }
            PositionAllocator::RandomRectangle { bounds, rng } => Vector::new(
                bounds.x_min + rng.f64() * (bounds.x_max - bounds.x_min),
                bounds.y_min + rng.f64() * (bounds.y_max - bounds.y_min),
                0.0,
            ),
        }
    }
}

/// Parameters of a two-dimensional random walk
#[derive(Copy, Clone, Debug)]
pub struct RandomWalkSpec {
    pub bounds: Rectangle,
    pub speed_mps: f64,
    pub direction_change_interval: Duration,
}

/// Moves at constant speed, picking a new uniformly random direction at a fixed interval and
/// reflecting off the borders of its bounds
#[derive(Debug)]
pub struct RandomWalk {
    spec: RandomWalkSpec,
    origin: Vector,
    velocity: (f64, f64),
    since: SimTime,
    rng: Rng,
}

impl RandomWalk {
    fn new(spec: RandomWalkSpec, origin: Vector, rng: Rng) -> Self {
        let mut walk = Self {
            spec,
            origin,
            velocity: (0.0, 0.0),
            since: SimTime::ZERO,
            rng,
        };
        walk.change_direction(SimTime::ZERO);
        walk
    }

    fn position(&self, now: SimTime) -> Vector {
        let elapsed = now.saturating_duration_since(self.since).as_secs_f64();
        let bounds = &self.spec.bounds;
        Vector::new(
            reflect(
                self.origin.x + self.velocity.0 * elapsed,
                bounds.x_min,
                bounds.x_max,
            ),
            reflect(
                self.origin.y + self.velocity.1 * elapsed,
                bounds.y_min,
                bounds.y_max,
            ),
            self.origin.z,
        )
    }

    fn change_direction(&mut self, now: SimTime) {
        self.origin = self.position(now);
        self.since = now;

        let angle = self.rng.f64() * 2.0 * PI;
        self.velocity = (
            self.spec.speed_mps * angle.cos(),
            self.spec.speed_mps * angle.sin(),
        );
    }
}

/// Folds a coordinate back into `[lo, hi]`, as if it had bounced off both borders
fn reflect(value: f64, lo: f64, hi: f64) -> f64 {
    let width = hi - lo;
    if width <= 0.0 {
        return lo;
    }

    let folded = (value - lo).rem_euclid(2.0 * width);
    if folded > width {
        lo + 2.0 * width - folded
    } else {
        lo + folded
    }
}

#[derive(Debug)]
pub enum MobilityModel {
    ConstantPosition(Vector),
    RandomWalk(RandomWalk),
}

impl MobilityModel {
    pub fn constant(position: Vector) -> Self {
        Self::ConstantPosition(position)
    }

    pub fn random_walk(spec: RandomWalkSpec, initial_position: Vector, rng: Rng) -> Self {
        Self::RandomWalk(RandomWalk::new(spec, initial_position, rng))
    }

    pub fn position(&self, now: SimTime) -> Vector {
        match self {
            MobilityModel::ConstantPosition(position) => *position,
            MobilityModel::RandomWalk(walk) => walk.position(now),
        }
    }

    pub(crate) fn direction_change_interval(&self) -> Option<Duration> {
        match self {
            MobilityModel::ConstantPosition(_) => None,
            MobilityModel::RandomWalk(walk) => Some(walk.spec.direction_change_interval),
        }
    }
}

/// Periodically picks a new direction for a walking node
pub(crate) fn schedule_direction_change(sim: &mut Sim, node: NodeId, interval: Duration) {
    sim.schedule(interval, move |sim| {
        let now = sim.now();
        if let Some(MobilityModel::RandomWalk(walk)) = sim.world_mut().mobility_mut(node) {
            walk.change_direction(now);
        }

        schedule_direction_change(sim, node, interval);
    });
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_grid_allocator_is_row_first() {
        let mut allocator = PositionAllocator::grid(0.0, 0.0, 20.0, 20.0, 5);
        let positions: Vec<_> = (0..7).map(|_| allocator.next_position()).collect();

        assert_eq!(positions[0], Vector::new(0.0, 0.0, 0.0));
        assert_eq!(positions[4], Vector::new(80.0, 0.0, 0.0));
        assert_eq!(positions[5], Vector::new(0.0, 20.0, 0.0));
        assert_eq!(positions[6], Vector::new(20.0, 20.0, 0.0));
    }

    #[test]
    fn test_random_rectangle_stays_inside() {
        let bounds = Rectangle::new(0.0, 100.0, 0.0, 100.0);
        let mut allocator = PositionAllocator::random_rectangle(bounds, Rng::with_seed(7));
        for _ in 0..1000 {
            assert!(bounds.contains(&allocator.next_position()));
        }
    }

    #[test]
    fn test_reflect() {
        assert_eq!(reflect(50.0, 0.0, 100.0), 50.0);
        assert_eq!(reflect(110.0, 0.0, 100.0), 90.0);
        assert_eq!(reflect(-10.0, 0.0, 100.0), 10.0);
        assert_eq!(reflect(210.0, 0.0, 100.0), 10.0);
        assert_eq!(reflect(5.0, 3.0, 3.0), 3.0);
    }

    #[test]
    fn test_random_walk_moves_at_constant_speed_within_bounds() {
        let spec = RandomWalkSpec {
            bounds: Rectangle::new(0.0, 100.0, 0.0, 100.0),
            speed_mps: 1.0,
            direction_change_interval: Duration::from_secs(2),
        };
        let mut walk = RandomWalk::new(spec, Vector::new(50.0, 50.0, 0.0), Rng::with_seed(42));

        let start = walk.position(SimTime::ZERO);
        let after = walk.position(SimTime::from_secs(2));
        assert!((start.distance(&after) - 2.0).abs() < 1e-9);

        for secs in (2..500).step_by(2) {
            let now = SimTime::from_secs(secs);
            walk.change_direction(now);
            assert!(spec.bounds.contains(&walk.position(now + Duration::from_secs(1))));
        }
    }

    #[test]
    fn test_constant_position_never_moves() {
        let model = MobilityModel::constant(Vector::new(1.0, 2.0, 0.0));
        assert_eq!(model.position(SimTime::from_secs(100)), Vector::new(1.0, 2.0, 0.0));
        assert_eq!(model.direction_change_interval(), None);
    }
}

use crate::rt::Rt;
use crate::time::SimTime;
use std::cmp::Ordering;

pub(crate) type Callback<W> = Box<dyn FnOnce(&mut Rt<W>)>;

pub(crate) struct PendingEvent<W> {
    pub(crate) id: u64,
    pub(crate) at: SimTime,
    pub(crate) callback: Callback<W>,
}

impl<W> Eq for PendingEvent<W> {}

impl<W> PartialEq<Self> for PendingEvent<W> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<W> PartialOrd<Self> for PendingEvent<W> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<W> Ord for PendingEvent<W> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Note: the order is reversed, so the "max" event is the earliest one (ties are broken by
        // scheduling order)
        other.at.cmp(&self.at).then(other.id.cmp(&self.id))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn event(id: u64, at_secs: u64) -> PendingEvent<()> {
        PendingEvent {
            id,
            at: SimTime::from_secs(at_secs),
            callback: Box::new(|_| {}),
        }
    }

    #[test]
    fn test_pending_event_ord_descending() {
        assert!(event(0, 1) > event(1, 5));
        assert!(event(0, 1) > event(1, 1));
        assert!(event(7, 1) < event(3, 1));
    }
}

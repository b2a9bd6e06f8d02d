use crate::event::PendingEvent;
use crate::time::SimTime;
use std::collections::BinaryHeap;
use std::fmt::{Debug, Formatter};
use std::time::Duration;

/// Identifies a scheduled event
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct EventId(pub u64);

/// The discrete-event runtime
///
/// Owns the simulated world `W` and the queue of pending callbacks. Each callback receives a
/// mutable reference to the runtime, so it can inspect and mutate the world as well as schedule
/// further callbacks (e.g. to implement periodic behavior by rescheduling itself).
pub struct Rt<W> {
    world: W,
    now: SimTime,
    next_event_id: u64,
    pending_events: BinaryHeap<PendingEvent<W>>,
    stop_requested: bool,
    executed_events: u64,
}

impl<W> Debug for Rt<W> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Rt (now = {}s, {} pending events)",
            self.now,
            self.pending_events.len()
        )
    }
}

impl<W> Rt<W> {
    pub fn new(world: W) -> Self {
        Self {
            world,
            now: SimTime::ZERO,
            next_event_id: 0,
            pending_events: BinaryHeap::new(),
            stop_requested: false,
            executed_events: 0,
        }
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    pub fn pending_events(&self) -> usize {
        self.pending_events.len()
    }

    pub fn executed_events(&self) -> u64 {
        self.executed_events
    }

    /// Schedules `callback` to run `delay` after the current simulated time
    pub fn schedule(
        &mut self,
        delay: Duration,
        callback: impl FnOnce(&mut Rt<W>) + 'static,
    ) -> EventId {
        let at = self.now + delay;
        self.schedule_at(at, callback)
    }

    /// Schedules `callback` to run at `at`
    ///
    /// Deadlines in the past are moved to the current simulated time, since the clock never goes
    /// backwards.
    pub fn schedule_at(
        &mut self,
        at: SimTime,
        callback: impl FnOnce(&mut Rt<W>) + 'static,
    ) -> EventId {
        let at = at.max(self.now);
        let id = self.next_event_id;
        self.next_event_id += 1;

        self.pending_events.push(PendingEvent {
            id,
            at,
            callback: Box::new(callback),
        });

        EventId(id)
    }

    pub fn schedule_now(&mut self, callback: impl FnOnce(&mut Rt<W>) + 'static) -> EventId {
        self.schedule(Duration::ZERO, callback)
    }

    /// Stops the simulation `delay` after the current simulated time
    ///
    /// Events scheduled for the same instant before the stop request still run, the rest are
    /// discarded.
    pub fn stop(&mut self, delay: Duration) -> EventId {
        self.schedule(delay, |rt| rt.stop_requested = true)
    }

    /// Runs events in order until the stop event fires or there is nothing left to do
    pub fn run(&mut self) {
        while !self.stop_requested {
            let Some(event) = self.pending_events.pop() else {
                tracing::debug!("event queue drained at {}s", self.now);
                break;
            };

            debug_assert!(event.at >= self.now, "the clock must never go backwards");
            self.now = event.at;
            self.executed_events += 1;
            (event.callback)(self);
        }
    }

    /// Tears down the runtime, discarding pending events and returning the world
    pub fn destroy(self) -> W {
        self.world
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_events_run_in_time_order() {
        let mut rt = Rt::new(Vec::new());
        rt.schedule(Duration::from_secs(3), |rt| rt.world_mut().push(3));
        rt.schedule(Duration::from_secs(1), |rt| rt.world_mut().push(1));
        rt.schedule(Duration::from_secs(2), |rt| rt.world_mut().push(2));
        rt.run();

        assert_eq!(rt.world(), &vec![1, 2, 3]);
        assert_eq!(rt.now(), SimTime::from_secs(3));
    }

    #[test]
    fn test_same_time_events_run_fifo() {
        let mut rt = Rt::new(Vec::new());
        for i in 0..10 {
            rt.schedule(Duration::from_secs(1), move |rt| rt.world_mut().push(i));
        }
        rt.run();

        assert_eq!(rt.world(), &(0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_stop_discards_later_events() {
        let mut rt = Rt::new(Vec::new());
        rt.schedule(Duration::from_secs(1), |rt| rt.world_mut().push(1));
        rt.schedule(Duration::from_secs(5), |rt| rt.world_mut().push(5));
        rt.stop(Duration::from_secs(5));
        rt.schedule(Duration::from_secs(5), |rt| rt.world_mut().push(6));
        rt.schedule(Duration::from_secs(9), |rt| rt.world_mut().push(9));
        rt.run();

        // The event at t=5 scheduled before the stop still runs
        assert_eq!(rt.world(), &vec![1, 5]);
        assert_eq!(rt.pending_events(), 2);
        assert_eq!(rt.now(), SimTime::from_secs(5));
    }

    #[test]
    fn test_self_rescheduling_callback() {
        fn tick(rt: &mut Rt<Vec<SimTime>>) {
            let now = rt.now();
            rt.world_mut().push(now);
            rt.schedule(Duration::from_secs(1), tick);
        }

        let mut rt = Rt::new(Vec::new());
        rt.schedule(Duration::from_secs(1), tick);
        rt.stop(Duration::from_secs(4));
        rt.run();

        let ticks: Vec<_> = rt.world().iter().map(|t| t.as_secs_f64()).collect();
        assert_eq!(ticks, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_schedule_in_the_past_is_clamped() {
        let mut rt = Rt::new(Vec::new());
        rt.schedule(Duration::from_secs(2), |rt| {
            rt.schedule_at(SimTime::from_secs(1), |rt| {
                let now = rt.now();
                rt.world_mut().push(now);
            });
        });
        rt.run();

        assert_eq!(rt.world(), &vec![SimTime::from_secs(2)]);
    }

    #[test]
    fn test_run_returns_when_queue_drains() {
        let mut rt = Rt::new(0u32);
        rt.schedule_now(|rt| *rt.world_mut() += 1);
        rt.run();

        assert_eq!(*rt.world(), 1);
        assert_eq!(rt.executed_events(), 1);
        assert_eq!(rt.destroy(), 1);
    }
}

//! Single-threaded discrete-event kernel
//!
//! Work is expressed as callbacks enqueued at explicit simulated times. The clock only moves
//! forward, and callbacks scheduled for the same instant run in the order they were scheduled.

mod event;
pub mod rt;
pub mod time;

pub use rt::{EventId, Rt};
pub use time::SimTime;

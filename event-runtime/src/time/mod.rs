pub use crate::time::sim_time::SimTime;

mod sim_time;

use std::fmt::{Display, Formatter};
use std::ops::{Add, Sub};
use std::time::Duration;

/// A point in simulated time, measured from the start of the simulation
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[repr(transparent)]
pub struct SimTime(pub(crate) Duration);

impl SimTime {
    pub const ZERO: SimTime = SimTime(Duration::ZERO);

    pub fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    /// Negative and NaN inputs are clamped to the start of the simulation, values too large to
    /// represent to the end of time
    pub fn from_secs_f64(secs: f64) -> Self {
        if secs.is_nan() || secs <= 0.0 {
            return Self::ZERO;
        }

        Self(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0.as_secs_f64()
    }

    pub fn since_start(&self) -> Duration {
        self.0
    }

    pub fn saturating_duration_since(&self, earlier: SimTime) -> Duration {
        self.0.saturating_sub(earlier.0)
    }

    pub fn saturating_sub(&self, duration: Duration) -> SimTime {
        SimTime(self.0.saturating_sub(duration))
    }
}

impl Add<Duration> for SimTime {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl Sub for SimTime {
    type Output = Duration;

    fn sub(self, other: Self) -> Self::Output {
        self.0 - other.0
    }
}

impl Display for SimTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_secs_f64())
    }
}

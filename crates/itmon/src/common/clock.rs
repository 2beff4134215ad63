//! Time source used to timestamp fault cycles.

use std::time::{Duration, Instant};

/// Monotonic time source.
///
/// The escalation rule only compares deltas, so implementations may start at any
/// origin. Tests substitute a manually advanced clock.
pub trait Clock: Send {
    /// Returns the time elapsed since this clock's origin.
    fn now(&self) -> Duration;
}

/// Clock backed by [`Instant`], with its origin at construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Creates a clock whose origin is the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

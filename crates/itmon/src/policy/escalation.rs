//! Repeated-fault escalation.
//!
//! A fault cycle arriving within [`ESCALATION_WINDOW`] of the previous one (inclusive)
//! counts as a repeat; a longer gap resets the count. When the repeat count reaches
//! `threshold + 1` the rule fires once, forcing the escalation action regardless of
//! per-class policy. Further repeats in the same burst do not fire again.
//!
//! [`ESCALATION_WINDOW`]: crate::common::constants::ESCALATION_WINDOW

use std::time::Duration;

/// Repeat counter for fault cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Escalation {
    threshold: u32,
    window: Duration,
    last: Option<Duration>,
    count: u32,
}

impl Escalation {
    /// Creates a counter that fires after `threshold + 1` repeats inside `window`.
    pub const fn new(threshold: u32, window: Duration) -> Self {
        Self {
            threshold,
            window,
            last: None,
            count: 0,
        }
    }

    /// Records a fault cycle at `now`; returns `true` on the threshold crossing.
    pub fn record(&mut self, now: Duration) -> bool {
        match self.last {
            Some(prev) if now.saturating_sub(prev) <= self.window => {
                self.count = self.count.saturating_add(1);
            }
            _ => self.count = 0,
        }
        self.last = Some(now);
        self.count == self.threshold.saturating_add(1)
    }

    /// Consecutive repeats in the current burst.
    pub const fn count(&self) -> u32 {
        self.count
    }

    /// Configured threshold.
    pub const fn threshold(&self) -> u32 {
        self.threshold
    }
}

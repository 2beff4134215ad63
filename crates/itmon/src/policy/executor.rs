//! Recovery-action executor seam.
//!
//! The engine decides; the platform acts. Whatever resets, dumps, or halts the
//! system lives behind [`ActionExecutor`].

use tracing::{info, warn};

use crate::policy::Action;

/// Platform hook that carries out the final decision of a fault cycle.
pub trait ActionExecutor: Send {
    /// Executes `action`. Called once per cycle that found at least one fault.
    fn execute(&mut self, action: Action);
}

/// Executor that only logs the decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogExecutor;

impl ActionExecutor for LogExecutor {
    fn execute(&mut self, action: Action) {
        match action {
            Action::Default => info!(%action, "itmon: no recovery action required"),
            _ => warn!(%action, "itmon: recovery action requested"),
        }
    }
}

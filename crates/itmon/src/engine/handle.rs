//! Shared handle over a [`TriageEngine`].
//!
//! Interrupt handlers, power-domain callbacks, and operator calls all serialize on
//! one lock. The lock is held for a whole fault cycle, notifier callouts included,
//! so a notifier must never call back into the handle it was registered on.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::common::ItmonError;
use crate::config::ItmonConfig;
use crate::engine::{CyclePhase, NodeStatus, ScanOutcome, ScanTarget, TriageEngine};
use crate::mmio::Mmio;
use crate::notifier::{NotifierFn, NotifierId};
use crate::policy::NodePolicy;
use crate::stats::ItmonStats;

/// Thread-safe owner of a triage engine.
#[derive(Debug)]
pub struct Itmon {
    engine: Mutex<TriageEngine>,
}

impl Itmon {
    /// Wraps an engine.
    pub fn new(engine: TriageEngine) -> Self {
        Self {
            engine: Mutex::new(engine),
        }
    }

    /// Builds an engine from configuration and wraps it.
    ///
    /// # Errors
    ///
    /// Propagates topology validation errors.
    pub fn from_config(config: &ItmonConfig, mmio: Box<dyn Mmio>) -> Result<Self, ItmonError> {
        TriageEngine::from_config(config, mmio).map(Self::new)
    }

    fn lock(&self) -> MutexGuard<'_, TriageEngine> {
        // Poisoning is ignored: every cycle starts from reset transient state.
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` with exclusive access to the engine.
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut TriageEngine) -> R) -> R {
        let mut engine = self.lock();
        f(&mut engine)
    }

    /// Runs one fault cycle. See [`TriageEngine::scan_and_report`].
    pub fn scan_and_report(&self, target: ScanTarget, clear: bool) -> ScanOutcome {
        self.lock().scan_and_report(target, clear)
    }

    /// Programs every node. See [`TriageEngine::arm`].
    pub fn arm(&self) -> usize {
        self.lock().arm()
    }

    /// Registers a notifier callback.
    pub fn register_notifier(&self, callback: NotifierFn) -> NotifierId {
        self.lock().register_notifier(callback)
    }

    /// Removes a notifier callback.
    pub fn unregister_notifier(&self, id: NotifierId) -> bool {
        self.lock().unregister_notifier(id)
    }

    /// Records a power-domain transition.
    pub fn on_power_domain_change(&self, domain: &str, on: bool) -> usize {
        self.lock().on_power_domain_change(domain, on)
    }

    /// Enables or disables one node.
    ///
    /// # Errors
    ///
    /// Returns [`ItmonError::NodeNotFound`] for an unknown name.
    pub fn enable_by_name(&self, name: &str, enabled: bool) -> Result<(), ItmonError> {
        self.lock().enable_by_name(name, enabled)
    }

    /// Replaces a node's policy from its packed form.
    ///
    /// # Errors
    ///
    /// Fails for an unknown name or undefined policy bits.
    pub fn set_node_policy_by_name(
        &self,
        name: &str,
        bits: u64,
        apply_now: bool,
    ) -> Result<NodePolicy, ItmonError> {
        self.lock().set_node_policy_by_name(name, bits, apply_now)
    }

    /// Enables or disables every node.
    pub fn enable_all(&self, enabled: bool) {
        self.lock().enable_all(enabled);
    }

    /// Enable state of every node.
    pub fn enable_all_status(&self) -> Vec<NodeStatus> {
        self.lock().enable_all_status()
    }

    /// Enables or disables a slave node's timeout monitor.
    ///
    /// # Errors
    ///
    /// Fails for an unknown name or a node that is not a slave.
    pub fn set_timeout(&self, name: &str, enabled: bool) -> Result<(), ItmonError> {
        self.lock().set_timeout(name, enabled)
    }

    /// Sets a slave node's timeout interval.
    ///
    /// # Errors
    ///
    /// Fails for an unknown name or a node that is not a slave.
    pub fn set_timeout_val(&self, name: &str, val: u32) -> Result<(), ItmonError> {
        self.lock().set_timeout_val(name, val)
    }

    /// Enables or disables a slave node's ring-buffer freeze.
    ///
    /// # Errors
    ///
    /// Fails for an unknown name or a node that is not a slave.
    pub fn set_timeout_freeze(&self, name: &str, enabled: bool) -> Result<(), ItmonError> {
        self.lock().set_timeout_freeze(name, enabled)
    }

    /// Timeout state of every slave node.
    pub fn timeout_status(&self) -> Vec<NodeStatus> {
        self.lock().timeout_status()
    }

    /// Snapshot of the accumulated statistics.
    pub fn stats(&self) -> ItmonStats {
        self.lock().stats().clone()
    }

    /// Current cycle stage.
    pub fn phase(&self) -> CyclePhase {
        self.lock().phase()
    }
}

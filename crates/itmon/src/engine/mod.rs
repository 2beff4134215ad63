//! The triage engine.
//!
//! One fault cycle runs the whole pipeline under a single owner:
//! 1. **Scan:** Walk the selected groups' status vectors and probe flagged nodes.
//! 2. **Collect:** Snapshot each fault's registers into a direction-keyed record list.
//! 3. **Resolve:** Fold qualifying records into transactions with port, master, and destination.
//! 4. **Policy:** Reflect node policies and notifier verdicts into the per-class table.
//! 5. **Report:** Emit the structured report and hand the final action to the executor.
//!
//! Record and transaction storage is sized from the topology at construction and
//! reused every cycle; a full pool drops further captures with a warning instead of
//! growing.

use std::fmt;

use tracing::{debug, error, info};

use crate::common::constants::{
    ESCALATION_WINDOW, RECORDS_PER_NODE, TMOUT_BUF_READ_ENTRIES, TMOUT_BUF_WRITE_ENTRIES,
};
use crate::common::{Clock, Direction, ItmonError, MonotonicClock};
use crate::config::{ItmonConfig, PolicyConfig};
use crate::mmio::Mmio;
use crate::notifier::{NotifierChain, NotifierFn, NotifierId};
use crate::policy::{Action, ActionExecutor, ErrorClass, Escalation, LogExecutor, PolicyTable};
use crate::stats::ItmonStats;
use crate::topology::{GroupId, NodeKind, Topology};

/// Trace capture.
pub mod collector;

/// Hardware enables and the operator control surface.
pub mod control;

/// Report pass over resolved transactions.
mod dispatch;

/// Thread-safe engine handle.
pub mod handle;

/// Policy reflection paths.
mod reflect;

/// Transaction resolution.
pub mod resolver;

/// Status-vector and node scanning.
pub mod scanner;

pub use collector::{FaultSource, PrtChkSnapshot, TraceRecord};
pub use control::NodeStatus;
pub use handle::Itmon;
pub use resolver::{InfoId, TraceInfo};
pub use scanner::TimeoutEntry;

/// Stage of the current fault cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CyclePhase {
    /// No cycle in progress.
    #[default]
    Idle,
    /// Reading status vectors.
    Scanning,
    /// Capturing trace records.
    Collecting,
    /// Building transactions.
    Resolving,
    /// Reflecting policy and notifying.
    Policy,
    /// Emitting the report and deciding.
    Reporting,
}

/// Groups a cycle scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanTarget {
    /// Every group, in configuration order.
    #[default]
    All,
    /// One group (its interrupt line fired).
    Group(GroupId),
}

/// Result of one fault cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanOutcome {
    /// Faults found.
    pub fault_count: usize,
    /// Resolved transactions, in report order.
    pub transactions: Vec<TraceInfo>,
    /// Valid timeout ring-buffer entries.
    pub timeouts: Vec<TimeoutEntry>,
    /// Action handed to the executor; `None` when no fault was found.
    pub action: Option<Action>,
    /// Class that decided the action.
    pub class: Option<ErrorClass>,
    /// The repeated-fault rule forced the action.
    pub escalated: bool,
    /// Report text.
    pub report: String,
}

/// Fault collection and triage state for one interconnect.
pub struct TriageEngine {
    topology: Topology,
    mmio: Box<dyn Mmio>,
    clock: Box<dyn Clock>,
    executor: Box<dyn ActionExecutor>,
    notifiers: NotifierChain,
    policy: PolicyTable,
    escalation: Escalation,
    escalation_action: Action,
    records: [Vec<TraceRecord>; 2],
    infos: Vec<TraceInfo>,
    timeouts: Vec<TimeoutEntry>,
    record_capacity: usize,
    info_capacity: usize,
    phase: CyclePhase,
    stats: ItmonStats,
    report: String,
}

impl fmt::Debug for TriageEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriageEngine")
            .field("groups", &self.topology.groups().len())
            .field("nodes", &self.topology.node_count())
            .field("notifiers", &self.notifiers)
            .field("phase", &self.phase)
            .field("record_capacity", &self.record_capacity)
            .finish_non_exhaustive()
    }
}

impl TriageEngine {
    /// Creates an engine over `topology` with a logging executor and a monotonic clock.
    ///
    /// # Arguments
    ///
    /// * `topology` - The interconnect description; node policies are taken from it.
    /// * `policy` - Per-class actions and the escalation rule.
    /// * `mmio` - Register access for every node base in the topology.
    pub fn new(topology: Topology, policy: &PolicyConfig, mmio: Box<dyn Mmio>) -> Self {
        let record_capacity = topology.node_count() * RECORDS_PER_NODE;
        let slaves = topology
            .nodes()
            .iter()
            .filter(|node| node.kind == NodeKind::Slave)
            .count();
        let timeout_capacity =
            slaves * (TMOUT_BUF_READ_ENTRIES + TMOUT_BUF_WRITE_ENTRIES) as usize;
        Self {
            record_capacity,
            info_capacity: record_capacity * 2,
            records: [
                Vec::with_capacity(record_capacity),
                Vec::with_capacity(record_capacity),
            ],
            infos: Vec::with_capacity(record_capacity * 2),
            timeouts: Vec::with_capacity(timeout_capacity),
            topology,
            mmio,
            clock: Box::new(MonotonicClock::new()),
            executor: Box::new(LogExecutor),
            notifiers: NotifierChain::new(),
            policy: PolicyTable::new(policy.class_defaults()),
            escalation: Escalation::new(policy.err_threshold, ESCALATION_WINDOW),
            escalation_action: policy.escalation,
            phase: CyclePhase::Idle,
            stats: ItmonStats::default(),
            report: String::new(),
        }
    }

    /// Builds the topology from `config` and creates an engine over it.
    ///
    /// # Errors
    ///
    /// Propagates topology validation errors.
    pub fn from_config(config: &ItmonConfig, mmio: Box<dyn Mmio>) -> Result<Self, ItmonError> {
        let topology = config.build_topology()?;
        Ok(Self::new(topology, &config.policy, mmio))
    }

    /// Replaces the escalation time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the recovery-action executor.
    #[must_use]
    pub fn with_executor(mut self, executor: Box<dyn ActionExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Runs one fault cycle over `target`.
    ///
    /// With `clear` set, every fault source found is cleared (write-1-to-clear)
    /// after capture. The executor is only called when at least one fault was found.
    pub fn scan_and_report(&mut self, target: ScanTarget, clear: bool) -> ScanOutcome {
        self.begin_cycle();

        self.phase = CyclePhase::Scanning;
        let gids: Vec<GroupId> = match target {
            ScanTarget::All => (0..self.topology.groups().len()).map(GroupId).collect(),
            ScanTarget::Group(gid) if gid.0 < self.topology.groups().len() => vec![gid],
            ScanTarget::Group(gid) => {
                debug!(group = gid.0, "itmon: scan target out of range");
                Vec::new()
            }
        };
        let fault_count: usize = gids.into_iter().map(|gid| self.scan_group(gid, clear)).sum();

        self.stats.scans += 1;
        if fault_count == 0 {
            self.end_cycle();
            return ScanOutcome::default();
        }
        self.stats.faults += fault_count as u64;
        self.stats.faulty_scans += 1;

        self.phase = CyclePhase::Resolving;
        let _ = self.analyze();

        self.phase = CyclePhase::Policy;
        self.report_transactions();

        self.phase = CyclePhase::Reporting;
        self.report_unlinked();
        if self.infos.is_empty() && !self.policy.any_error() {
            self.policy.mark(ErrorClass::Fatal);
        }
        for class in ErrorClass::ALL {
            if self.policy.slot(class).error {
                self.stats.class_counts[class.index()] += 1;
            }
        }

        let escalated = self.escalation.record(self.clock.now());
        let dominant = self.policy.dominant();
        let action = if escalated {
            self.stats.escalations += 1;
            info!(
                count = self.escalation.count(),
                action = %self.escalation_action,
                "itmon: repeated faults crossed the escalation threshold"
            );
            self.escalation_action
        } else {
            dominant.map_or(Action::Default, |(_, action)| action)
        };

        if !self.report.is_empty() {
            error!("itmon fault report\n{}", self.report);
        }
        info!(faults = fault_count, %action, "itmon: cycle decided");
        self.stats.last_action = Some(action);
        self.executor.execute(action);

        let outcome = ScanOutcome {
            fault_count,
            transactions: self.infos.clone(),
            timeouts: self.timeouts.clone(),
            action: Some(action),
            class: dominant.map(|(class, _)| class),
            escalated,
            report: self.report.clone(),
        };
        self.end_cycle();
        outcome
    }

    fn begin_cycle(&mut self) {
        self.policy.reset();
        self.records.iter_mut().for_each(Vec::clear);
        self.infos.clear();
        self.timeouts.clear();
        self.report.clear();
    }

    fn end_cycle(&mut self) {
        self.records.iter_mut().for_each(Vec::clear);
        self.phase = CyclePhase::Idle;
    }

    /// Registers a notifier callback.
    pub fn register_notifier(&mut self, callback: NotifierFn) -> NotifierId {
        self.notifiers.register(callback)
    }

    /// Removes a notifier callback; returns `false` if it was not registered.
    pub fn unregister_notifier(&mut self, id: NotifierId) -> bool {
        self.notifiers.unregister(id)
    }

    /// Records currently held for `dir`; empty outside a cycle.
    pub fn records(&self, dir: Direction) -> &[TraceRecord] {
        &self.records[dir.index()]
    }

    /// Transactions currently held; empty outside a cycle.
    pub fn infos(&self) -> &[TraceInfo] {
        &self.infos
    }

    /// Policy table as left by the last cycle.
    pub fn policy(&self) -> &PolicyTable {
        &self.policy
    }

    /// The interconnect description.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Accumulated statistics.
    pub fn stats(&self) -> &ItmonStats {
        &self.stats
    }

    /// Current cycle stage.
    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    /// Record pool size per direction.
    pub fn record_capacity(&self) -> usize {
        self.record_capacity
    }
}

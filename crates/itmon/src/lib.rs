//! Interconnect traffic monitor (ITMON) fault collection and triage.
//!
//! This crate turns raw interconnect monitor registers into a recovery decision:
//! 1. **Topology:** Node groups, nodes, and the routing, master, and midpoint tables.
//! 2. **Scanning:** Status-vector walks over error-report, protocol-checker, and timeout sources.
//! 3. **Resolution:** Trace records folded into transactions with port, master, and destination.
//! 4. **Policy:** Per-class actions, per-node overrides, notifier verdicts, and escalation.
//! 5. **Reporting:** Structured fault reports, statistics, and the hand-off to an executor.

/// Common types and constants (register layout, fields, error codes, clock).
pub mod common;
/// Engine configuration (defaults, topology description, policy).
pub mod config;
/// The triage engine and its shared handle.
pub mod engine;
/// Register access trait and in-memory register file.
pub mod mmio;
/// Notifier chain for resolved transactions.
pub mod notifier;
/// Recovery policy (actions, classes, node policy, escalation, executor).
pub mod policy;
/// Fault report formatting.
pub mod report;
/// Triage statistics.
pub mod stats;
/// Interconnect description.
pub mod topology;

/// Root configuration type; deserialize from JSON.
pub use crate::config::ItmonConfig;
/// Thread-safe engine handle; construct with `Itmon::from_config`.
pub use crate::engine::Itmon;
/// Fault collection and triage state; construct with `TriageEngine::new`.
pub use crate::engine::{ScanOutcome, ScanTarget, TriageEngine};
/// Register access trait.
pub use crate::mmio::Mmio;
/// Recovery action and executor seam.
pub use crate::policy::{Action, ActionExecutor};

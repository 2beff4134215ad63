//! Recovery policy: error classes, actions, and the per-cycle policy table.
//!
//! This module decides what the system does about a fault batch. It provides:
//! 1. **Actions:** The recovery actions handed to the platform executor, ordered by severity.
//! 2. **Classes:** The five global error classes every fault folds into.
//! 3. **Policy table:** Per-class default action plus the override recorded this cycle.
//! 4. **Node policy:** Packed per-node overrides (see [`node`]).
//! 5. **Escalation:** The repeated-fault rule (see [`escalation`]).

use std::fmt;

use serde::Deserialize;

use crate::common::ErrorCode;
use crate::common::constants::PRIO_MAX;

/// Repeated-fault escalation rule.
pub mod escalation;

/// Recovery-action executor seam.
pub mod executor;

/// Per-node policy overrides.
pub mod node;

pub use escalation::Escalation;
pub use executor::{ActionExecutor, LogExecutor};
pub use node::NodePolicy;

/// Recovery action, in increasing severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Log only.
    #[default]
    Default,
    /// Kernel panic.
    Panic,
    /// Watchdog reset.
    Watchdog,
    /// Store DRAM contents for offline debug, then reset.
    #[serde(alias = "s2d")]
    StoreToDram,
    /// Dump cache arrays.
    ArrayDump,
    /// Scan-chain dump.
    ScanDump,
    /// Stop all cores.
    Halt,
}

impl Action {
    /// All actions by index.
    pub const ALL: [Self; 7] = [
        Self::Default,
        Self::Panic,
        Self::Watchdog,
        Self::StoreToDram,
        Self::ArrayDump,
        Self::ScanDump,
        Self::Halt,
    ];

    /// The most severe action.
    pub const MOST_SEVERE: Self = Self::Halt;

    /// Decodes an action index.
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Index of this action.
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Short name used in reports.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Panic => "panic",
            Self::Watchdog => "watchdog",
            Self::StoreToDram => "s2d",
            Self::ArrayDump => "arraydump",
            Self::ScanDump => "scandump",
            Self::Halt => "halt",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Global error class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Response timeout.
    Timeout,
    /// Protocol-checker violation.
    ProtocolChecker,
    /// Decode error.
    DecodeError,
    /// Slave error.
    SlaveError,
    /// Anything else, including faults that could not be resolved.
    Fatal,
}

impl ErrorClass {
    /// All classes in table order; [`PolicyTable::dominant`] breaks ties in this order.
    pub const ALL: [Self; 5] = [
        Self::Timeout,
        Self::ProtocolChecker,
        Self::DecodeError,
        Self::SlaveError,
        Self::Fatal,
    ];

    /// Slot index.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Slot name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Timeout => "err_tmout",
            Self::ProtocolChecker => "err_prtchk",
            Self::DecodeError => "err_decerr",
            Self::SlaveError => "err_slverr",
            Self::Fatal => "err_fatal",
        }
    }
}

impl From<ErrorCode> for ErrorClass {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::SlaveError => Self::SlaveError,
            ErrorCode::DecodeError => Self::DecodeError,
            ErrorCode::Timeout => Self::Timeout,
            ErrorCode::ProtocolChecker => Self::ProtocolChecker,
            ErrorCode::UnsupportedTransaction
            | ErrorCode::PowerDownAccess
            | ErrorCode::Unknown(_) => Self::Fatal,
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Policy state of one error class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicySlot {
    /// Slot name.
    pub name: &'static str,
    /// Configured action.
    pub default: Action,
    /// Action currently in force this cycle.
    pub action: Action,
    /// Priority of the override that set `action`; 0 when none.
    pub prio: u8,
    /// A node override set `action` this cycle.
    pub overridden: bool,
    /// An error of this class was observed this cycle.
    pub error: bool,
    /// A notifier pinned `action`; node overrides are ignored for the rest of the cycle.
    pub pinned: bool,
}

impl PolicySlot {
    fn new(class: ErrorClass, default: Action) -> Self {
        Self {
            name: class.name(),
            default,
            action: default,
            prio: 0,
            overridden: false,
            error: false,
            pinned: false,
        }
    }

    fn reset(&mut self) {
        self.action = self.default;
        self.prio = 0;
        self.overridden = false;
        self.error = false;
        self.pinned = false;
    }
}

/// Five-slot policy table, one slot per [`ErrorClass`].
///
/// Within a cycle a slot's priority never decreases: an offer below the recorded
/// priority is ignored, an offer at the same priority never lowers the action, and a
/// notifier pin locks the slot at [`PRIO_MAX`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    slots: [PolicySlot; 5],
}

impl PolicyTable {
    /// Builds a table from per-class defaults in [`ErrorClass::ALL`] order.
    pub fn new(defaults: [Action; 5]) -> Self {
        Self {
            slots: std::array::from_fn(|i| PolicySlot::new(ErrorClass::ALL[i], defaults[i])),
        }
    }

    /// Restores every slot to its default; called at the start of each cycle.
    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(PolicySlot::reset);
    }

    /// Slot of `class`.
    pub fn slot(&self, class: ErrorClass) -> &PolicySlot {
        &self.slots[class.index()]
    }

    /// All slots in class order.
    pub fn slots(&self) -> &[PolicySlot; 5] {
        &self.slots
    }

    /// Changes the configured action of `class`.
    pub fn set_default(&mut self, class: ErrorClass, action: Action) {
        let slot = &mut self.slots[class.index()];
        slot.default = action;
        if !slot.overridden && !slot.pinned {
            slot.action = action;
        }
    }

    /// Records that an error of `class` was observed this cycle.
    pub fn mark(&mut self, class: ErrorClass) {
        self.slots[class.index()].error = true;
    }

    /// Returns `true` if any class observed an error this cycle.
    pub fn any_error(&self) -> bool {
        self.slots.iter().any(|s| s.error)
    }

    /// Offers a node override; applied if `prio` is not below the recorded priority.
    ///
    /// A higher priority replaces the action. At equal priority the more severe of
    /// the two actions stays in force.
    ///
    /// Returns `true` if the slot took the offered action.
    pub fn offer(&mut self, class: ErrorClass, action: Action, prio: u8) -> bool {
        let slot = &mut self.slots[class.index()];
        let prio = prio.min(PRIO_MAX);
        slot.error = true;
        if slot.pinned || prio < slot.prio {
            return false;
        }
        if slot.overridden && prio == slot.prio && action < slot.action {
            return false;
        }
        slot.action = action;
        slot.prio = prio;
        slot.overridden = true;
        true
    }

    /// Pins a notifier override at maximum priority.
    pub fn pin(&mut self, class: ErrorClass, action: Action) {
        let slot = &mut self.slots[class.index()];
        slot.error = true;
        slot.action = action;
        slot.prio = PRIO_MAX;
        slot.pinned = true;
    }

    /// Observed class with the most severe action; ties go to the earlier class.
    pub fn dominant(&self) -> Option<(ErrorClass, Action)> {
        let mut best: Option<(ErrorClass, Action)> = None;
        for (class, slot) in ErrorClass::ALL.iter().zip(&self.slots) {
            if !slot.error {
                continue;
            }
            if best.is_none_or(|(_, action)| slot.action > action) {
                best = Some((*class, slot.action));
            }
        }
        best
    }

    /// Action of [`Self::dominant`], or [`Action::Default`] when nothing was observed.
    pub fn dominant_action(&self) -> Action {
        self.dominant().map_or(Action::Default, |(_, action)| action)
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::new([
            Action::Panic,
            Action::Default,
            Action::Default,
            Action::Default,
            Action::Panic,
        ])
    }
}

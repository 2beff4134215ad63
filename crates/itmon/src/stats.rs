//! Triage statistics collection and reporting.
//!
//! This module tracks what the engine has seen across fault cycles. It provides:
//! 1. **Cycles:** Scans run and scans that found faults.
//! 2. **Capture:** Faults detected, records captured, records dropped on a full pool.
//! 3. **Resolution:** Transactions resolved and per-class observation counts.
//! 4. **Decisions:** Escalations and the last action handed to the executor.

use std::fmt;

use crate::policy::{Action, ErrorClass};

/// Engine statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItmonStats {
    /// Scan cycles run.
    pub scans: u64,
    /// Scan cycles that found at least one fault.
    pub faulty_scans: u64,
    /// Faults detected (error-report banks, protocol-checker hits, frozen timeout directions).
    pub faults: u64,
    /// Trace records captured.
    pub records: u64,
    /// Trace records dropped because the record pool was full.
    pub dropped_records: u64,
    /// Transactions resolved.
    pub transactions: u64,
    /// Timeout ring-buffer entries decoded.
    pub timeout_entries: u64,
    /// Cycles in which each class was observed, in [`ErrorClass::ALL`] order.
    pub class_counts: [u64; 5],
    /// Escalations fired.
    pub escalations: u64,
    /// Last action handed to the executor.
    pub last_action: Option<Action>,
}

impl ItmonStats {
    /// Count of cycles that observed `class`.
    pub fn class_count(&self, class: ErrorClass) -> u64 {
        self.class_counts[class.index()]
    }

    /// Prints the statistics block to stdout.
    pub fn print(&self) {
        println!("{self}");
    }
}

impl fmt::Display for ItmonStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "==========================================================")?;
        writeln!(f, "ITMON TRIAGE STATISTICS")?;
        writeln!(f, "==========================================================")?;
        writeln!(f, "scans                    {}", self.scans)?;
        writeln!(f, "scans.faulty             {}", self.faulty_scans)?;
        writeln!(f, "faults                   {}", self.faults)?;
        writeln!(f, "records                  {}", self.records)?;
        writeln!(f, "records.dropped          {}", self.dropped_records)?;
        writeln!(f, "transactions             {}", self.transactions)?;
        writeln!(f, "timeout.entries          {}", self.timeout_entries)?;
        writeln!(f, "----------------------------------------------------------")?;
        writeln!(f, "ERROR CLASSES")?;
        for class in ErrorClass::ALL {
            writeln!(f, "  {:<22} {}", class.name(), self.class_count(class))?;
        }
        writeln!(f, "----------------------------------------------------------")?;
        writeln!(f, "escalations              {}", self.escalations)?;
        match self.last_action {
            Some(action) => writeln!(f, "last_action              {action}")?,
            None => writeln!(f, "last_action              none")?,
        }
        write!(f, "==========================================================")
    }
}

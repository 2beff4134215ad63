//! Error codes and engine error definitions.
//!
//! Two distinct taxonomies live here:
//! 1. **Hardware error codes:** What the monitored interconnect reported. These describe
//!    faults in *other* blocks and never fail the engine.
//! 2. **Engine errors:** Failures of operator-facing calls (unknown node, bad policy bits,
//!    malformed configuration).

use std::fmt;

use thiserror::Error;

use crate::topology::NodeKind;

/// Error code decoded from a captured transaction.
///
/// Values 0..=3 and 6 come from `INT_INFO[31:28]`; the protocol-checker code is
/// assigned to records captured through the protocol-checker path. Reserved codes
/// are preserved in [`ErrorCode::Unknown`] rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Error detected by the slave (SLVERR).
    SlaveError,
    /// No slave decodes the address (DECERR).
    DecodeError,
    /// Transaction type not supported by the destination.
    UnsupportedTransaction,
    /// Access to a powered-down block.
    PowerDownAccess,
    /// AXI protocol violation caught by the protocol checker.
    ProtocolChecker,
    /// No response within the programmed timeout interval.
    Timeout,
    /// Reserved hardware code.
    Unknown(u8),
}

impl ErrorCode {
    /// Decodes the 4-bit hardware error-code field.
    pub const fn from_raw(code: u32) -> Self {
        match code & 0xF {
            0 => Self::SlaveError,
            1 => Self::DecodeError,
            2 => Self::UnsupportedTransaction,
            3 => Self::PowerDownAccess,
            6 => Self::Timeout,
            other => Self::Unknown(other as u8),
        }
    }

    /// Human-readable description used in fault reports.
    pub const fn description(self) -> &'static str {
        match self {
            Self::SlaveError => "Error Detect by the Slave(SLVERR)",
            Self::DecodeError => "Decode error(DECERR)",
            Self::UnsupportedTransaction => "Unsupported transaction error",
            Self::PowerDownAccess => "Power Down access error",
            Self::ProtocolChecker => "Protocol Checker Error",
            Self::Timeout => "Timeout error - response timeout in timeout value",
            Self::Unknown(_) => "Invalid errorcode",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "{} ({code:#x})", self.description()),
            _ => f.write_str(self.description()),
        }
    }
}

/// Errors returned by engine configuration and operator calls.
#[derive(Debug, Error)]
pub enum ItmonError {
    /// No node with the given name exists in the topology.
    #[error("no node named `{0}`")]
    NodeNotFound(String),

    /// The operation only applies to slave nodes.
    #[error("node `{name}` is a {kind} node; the operation requires a slave node")]
    NotSlaveNode {
        /// Node name.
        name: String,
        /// Actual node kind.
        kind: NodeKind,
    },

    /// Two nodes share a name.
    #[error("duplicate node name `{0}`")]
    DuplicateNode(String),

    /// A group holds more nodes than its status vector can address.
    #[error("group `{group}` has {count} nodes; at most {max} are supported")]
    GroupTooLarge {
        /// Group name.
        group: String,
        /// Configured node count.
        count: usize,
        /// Supported maximum.
        max: usize,
    },

    /// Node-policy priority outside 0..=7.
    #[error("node policy priority {0} exceeds the maximum of 7")]
    InvalidPriority(u8),

    /// Action index outside the recovery-action table.
    #[error("invalid action index {0}")]
    InvalidAction(u8),

    /// Packed node-policy word has bits set outside the defined layout.
    #[error("node policy bits {0:#x} set undefined fields")]
    InvalidPolicyBits(u64),

    /// Configuration text could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// Configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

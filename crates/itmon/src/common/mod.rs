//! Common types and constants used throughout the triage engine.
//!
//! This module provides the building blocks shared by every stage of the pipeline:
//! 1. **Constants:** Register offsets, bit positions, and fixed limits of the ITMON block.
//! 2. **Fields:** Accessors over raw interrupt-info and extended-info register words.
//! 3. **Error Handling:** The hardware error-code taxonomy and the engine's own error type.
//! 4. **Clock:** The time source used by the escalation rule.

/// Time source abstraction for escalation timestamps.
pub mod clock;

/// Register layout and engine-wide limits.
pub mod constants;

/// Error codes reported by hardware and errors returned by the engine.
pub mod error;

/// Bitfield accessors over raw register words.
pub mod fields;

pub use clock::{Clock, MonotonicClock};
pub use error::{ErrorCode, ItmonError};
pub use fields::{ExtInfo1, ExtInfo2, IntInfo, PrtChkInt, TmoutPayload0};

/// Transaction direction of a captured fault.
///
/// Trace records are kept in two direction-keyed lists; `index` selects the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Read transaction (AR/R channels).
    Read,
    /// Write transaction (AW/W/B channels).
    Write,
}

impl Direction {
    /// Both directions in list order (read list first).
    pub const ALL: [Self; 2] = [Self::Read, Self::Write];

    /// Returns the list index for this direction.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Self::Read => 0,
            Self::Write => 1,
        }
    }

    /// Returns the opposite direction.
    #[inline]
    pub const fn other(self) -> Self {
        match self {
            Self::Read => Self::Write,
            Self::Write => Self::Read,
        }
    }

    /// Classifies a sub-bank offset within a node.
    ///
    /// `REQ_R`/`RESP_R` map to reads and `REQ_W`/`RESP_W` map to writes; the banks
    /// alternate read/write at a stride of [`constants::OFFSET_ERR_REPT`].
    #[inline]
    pub const fn from_offset(offset: u64) -> Self {
        if (offset / constants::OFFSET_ERR_REPT) % 2 == 0 {
            Self::Read
        } else {
            Self::Write
        }
    }

    /// Returns the timeout-freeze status bit that reports this direction.
    #[inline]
    pub const fn freeze_bit(self) -> u32 {
        match self {
            Self::Read => constants::TMOUT_FRZ_READ,
            Self::Write => constants::TMOUT_FRZ_WRITE,
        }
    }

    /// Returns `true` for reads.
    #[inline]
    pub const fn is_read(self) -> bool {
        matches!(self, Self::Read)
    }

    /// Upper-case label used in reports.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Read => "READ",
            Self::Write => "WRITE",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

//! Per-node policy overrides.
//!
//! A node policy is configured as named fields (from configuration "customize"
//! entries or an operator call) and only converted to its packed `u64` form at
//! the operator boundary.
//!
//! # Packed layout
//!
//! | Bits      | Field                                    |
//! |-----------|------------------------------------------|
//! | `0`       | `chk_set`                                |
//! | `3:1`     | `prio`                                   |
//! | `4` / `5` | error-report override present / value    |
//! | `6` / `7` | timeout override present / value         |
//! | `8` / `9` | protocol-check override present / value  |
//! | `10`/`11` | freeze override present / value          |
//! | `12`      | `irq_mask`                               |
//! | `13`      | timeout-value override present           |
//! | `33:14`   | timeout value                            |
//! | `39:36`   | decode-error job (present bit + action)  |
//! | `43:40`   | slave-error job                          |
//! | `47:44`   | timeout job                              |
//! | `51:48`   | protocol-checker job                     |

use serde::Deserialize;

use crate::common::ItmonError;
use crate::common::constants::{PRIO_MAX, TMOUT_VAL_MASK};
use crate::policy::{Action, ErrorClass};

const CHK_SET: u64 = 1 << 0;
const PRIO_SHIFT: u32 = 1;
const PRIO_MASK: u64 = 0x7;
const ERR_REPORT_SHIFT: u32 = 4;
const TIMEOUT_SHIFT: u32 = 6;
const PRT_CHK_SHIFT: u32 = 8;
const FREEZE_SHIFT: u32 = 10;
const IRQ_MASK: u64 = 1 << 12;
const TMOUT_VAL_SET: u64 = 1 << 13;
const TMOUT_VAL_SHIFT: u32 = 14;
const DECERR_JOB_SHIFT: u32 = 36;
const SLVERR_JOB_SHIFT: u32 = 40;
const TMOUT_JOB_SHIFT: u32 = 44;
const PRTCHK_JOB_SHIFT: u32 = 48;
const DEFINED_BITS: u64 = ((1 << 52) - 1) & !(0x3 << 34);

/// Per-node override of enables and recovery jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct NodePolicy {
    /// Master switch; nothing below takes effect while clear.
    pub chk_set: bool,
    /// Priority 0..=7 used against other overrides of the same class.
    pub prio: u8,
    /// Error-report enable override.
    pub err_report: Option<bool>,
    /// Timeout-monitor enable override.
    pub timeout: Option<bool>,
    /// Protocol-checker enable override.
    pub prt_chk: Option<bool>,
    /// Ring-buffer freeze enable override.
    pub freeze: Option<bool>,
    /// Timeout interval override.
    pub timeout_val: Option<u32>,
    /// Disable the faulting feature on this node as soon as it fires.
    pub irq_mask: bool,
    /// Job forced for decode errors.
    pub decerr_job: Option<Action>,
    /// Job forced for slave errors.
    pub slverr_job: Option<Action>,
    /// Job forced for timeouts.
    pub tmout_job: Option<Action>,
    /// Job forced for protocol-checker errors.
    pub prtchk_job: Option<Action>,
}

impl NodePolicy {
    /// Returns `true` if the policy is switched on.
    #[inline]
    pub const fn is_set(&self) -> bool {
        self.chk_set
    }

    /// Job override for `class`, if the policy is set and configures one.
    pub const fn job_for(&self, class: ErrorClass) -> Option<Action> {
        if !self.chk_set {
            return None;
        }
        match class {
            ErrorClass::DecodeError => self.decerr_job,
            ErrorClass::SlaveError => self.slverr_job,
            ErrorClass::Timeout => self.tmout_job,
            ErrorClass::ProtocolChecker => self.prtchk_job,
            ErrorClass::Fatal => None,
        }
    }

    /// Returns `true` if faults on this node should mask the feature that raised them.
    #[inline]
    pub const fn masks_irq(&self) -> bool {
        self.chk_set && self.irq_mask
    }

    /// Checks field ranges.
    ///
    /// # Errors
    ///
    /// Fails if `prio` exceeds [`PRIO_MAX`].
    pub const fn validate(&self) -> Result<(), ItmonError> {
        if self.prio > PRIO_MAX {
            return Err(ItmonError::InvalidPriority(self.prio));
        }
        Ok(())
    }

    /// Packs the policy into its operator-facing `u64` form.
    pub fn pack(&self) -> u64 {
        let mut bits = 0u64;
        if self.chk_set {
            bits |= CHK_SET;
        }
        bits |= (self.prio as u64 & PRIO_MASK) << PRIO_SHIFT;
        bits |= pack_flag(self.err_report, ERR_REPORT_SHIFT);
        bits |= pack_flag(self.timeout, TIMEOUT_SHIFT);
        bits |= pack_flag(self.prt_chk, PRT_CHK_SHIFT);
        bits |= pack_flag(self.freeze, FREEZE_SHIFT);
        if self.irq_mask {
            bits |= IRQ_MASK;
        }
        if let Some(val) = self.timeout_val {
            bits |= TMOUT_VAL_SET | ((val & TMOUT_VAL_MASK) as u64) << TMOUT_VAL_SHIFT;
        }
        bits |= pack_job(self.decerr_job, DECERR_JOB_SHIFT);
        bits |= pack_job(self.slverr_job, SLVERR_JOB_SHIFT);
        bits |= pack_job(self.tmout_job, TMOUT_JOB_SHIFT);
        bits |= pack_job(self.prtchk_job, PRTCHK_JOB_SHIFT);
        bits
    }

    /// Unpacks an operator-supplied policy word.
    ///
    /// # Errors
    ///
    /// Fails on bits outside the layout or a job naming an undefined action.
    pub fn unpack(bits: u64) -> Result<Self, ItmonError> {
        if bits & !DEFINED_BITS != 0 {
            return Err(ItmonError::InvalidPolicyBits(bits));
        }
        Ok(Self {
            chk_set: bits & CHK_SET != 0,
            prio: ((bits >> PRIO_SHIFT) & PRIO_MASK) as u8,
            err_report: unpack_flag(bits, ERR_REPORT_SHIFT),
            timeout: unpack_flag(bits, TIMEOUT_SHIFT),
            prt_chk: unpack_flag(bits, PRT_CHK_SHIFT),
            freeze: unpack_flag(bits, FREEZE_SHIFT),
            irq_mask: bits & IRQ_MASK != 0,
            timeout_val: (bits & TMOUT_VAL_SET != 0)
                .then(|| ((bits >> TMOUT_VAL_SHIFT) as u32) & TMOUT_VAL_MASK),
            decerr_job: unpack_job(bits, DECERR_JOB_SHIFT)?,
            slverr_job: unpack_job(bits, SLVERR_JOB_SHIFT)?,
            tmout_job: unpack_job(bits, TMOUT_JOB_SHIFT)?,
            prtchk_job: unpack_job(bits, PRTCHK_JOB_SHIFT)?,
        })
    }
}

fn pack_flag(flag: Option<bool>, shift: u32) -> u64 {
    match flag {
        None => 0,
        Some(false) => 1 << shift,
        Some(true) => 0x3 << shift,
    }
}

fn unpack_flag(bits: u64, shift: u32) -> Option<bool> {
    (bits & (1 << shift) != 0).then_some(bits & (1 << (shift + 1)) != 0)
}

fn pack_job(job: Option<Action>, shift: u32) -> u64 {
    job.map_or(0, |action| (1 | (action.index() as u64) << 1) << shift)
}

fn unpack_job(bits: u64, shift: u32) -> Result<Option<Action>, ItmonError> {
    let field = (bits >> shift) & 0xF;
    if field & 1 == 0 {
        return Ok(None);
    }
    let index = (field >> 1) as u8;
    Action::from_index(index)
        .map(Some)
        .ok_or(ItmonError::InvalidAction(index))
}

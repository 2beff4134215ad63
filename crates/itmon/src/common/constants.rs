//! Register layout and engine-wide constants.
//!
//! Offsets are relative to a node's register base. Each node exposes four
//! error-report sub-banks, a protocol-checker block, and (on slave nodes) a
//! timeout block with a frozen ring buffer of outstanding transactions.
//!
//! # Node register map
//!
//! * `0x0000`: Request read bank (`REQ_R`), populated by slave-side nodes
//! * `0x0020`: Request write bank (`REQ_W`)
//! * `0x0040`: Response read bank (`RESP_R`), populated by master-side nodes
//! * `0x0060`: Response write bank (`RESP_W`)
//! * `0x0100`: Protocol checker
//! * `0x2000`: Timeout control and ring buffer

use std::time::Duration;

/// Request read sub-bank.
pub const OFFSET_REQ_R: u64 = 0x00;
/// Request write sub-bank.
pub const OFFSET_REQ_W: u64 = 0x20;
/// Response read sub-bank.
pub const OFFSET_RESP_R: u64 = 0x40;
/// Response write sub-bank.
pub const OFFSET_RESP_W: u64 = 0x60;
/// Stride between error-report sub-banks.
pub const OFFSET_ERR_REPT: u64 = 0x20;
/// Number of error-report sub-banks per node.
pub const OFFSET_NUM: u64 = 4;
/// Protocol-checker block.
pub const OFFSET_PRT_CHK: u64 = 0x100;
/// Timeout block.
pub const OFFSET_TMOUT_REG: u64 = 0x2000;

/// Interrupt enable mask (per sub-bank).
pub const REG_INT_MASK: u64 = 0x00;
/// Interrupt clear, write-1-to-clear (per sub-bank).
pub const REG_INT_CLR: u64 = 0x04;
/// Interrupt info: id, valid bit, error code (per sub-bank).
pub const REG_INT_INFO: u64 = 0x08;
/// Extended info 0: target address [31:0].
pub const REG_EXT_INFO_0: u64 = 0x10;
/// Extended info 1: target address [47:32], length, size.
pub const REG_EXT_INFO_1: u64 = 0x14;
/// Extended info 2: burst, protection, user.
pub const REG_EXT_INFO_2: u64 = 0x18;
/// Extended user word, present on externally tagged groups.
pub const REG_EXT_USER: u64 = 0x80;

/// Protocol-checker control (interrupt enables).
pub const REG_PRT_CHK_CTL: u64 = 0x04;
/// Protocol-checker interrupt status.
pub const REG_PRT_CHK_INT: u64 = 0x08;
/// Protocol-checker offending transaction id.
pub const REG_PRT_CHK_INT_ID: u64 = 0x0C;
/// Intended-access window start address [31:0].
pub const REG_PRT_CHK_START_ADDR_LOW: u64 = 0x10;
/// Intended-access window end address [31:0].
pub const REG_PRT_CHK_END_ADDR_LOW: u64 = 0x14;
/// Intended-access window upper address bits (start [15:0], end [31:16]).
pub const REG_PRT_CHK_START_END_ADDR_UPPER: u64 = 0x18;

/// Outstanding-transaction (MO) counter.
pub const REG_DBG_MO_CNT: u64 = 0x08;
/// Debug control; bit 0 enables the timeout monitor.
pub const REG_DBG_CTL: u64 = 0x10;
/// Timeout interval.
pub const REG_TMOUT_INIT_VAL: u64 = 0x14;
/// Timeout freeze enable.
pub const REG_TMOUT_FRZ_EN: u64 = 0x18;
/// Timeout freeze status; bit 0 write frozen, bit 1 read frozen.
pub const REG_TMOUT_BUF_STATUS: u64 = 0x1C;
/// Ring-buffer entry selector.
pub const REG_TMOUT_BUF_POINT_ADDR: u64 = 0x20;
/// Ring-buffer entry transaction id.
pub const REG_TMOUT_BUF_ID: u64 = 0x24;
/// Ring-buffer payload 0: valid bit, timeout counter.
pub const REG_TMOUT_BUF_PAYLOAD_0: u64 = 0x28;
/// Ring-buffer payload 1: address [31:0].
pub const REG_TMOUT_BUF_PAYLOAD_1: u64 = 0x2C;
/// Ring-buffer payload 2: address [47:32].
pub const REG_TMOUT_BUF_PAYLOAD_2: u64 = 0x30;
/// Ring-buffer payload 3: user.
pub const REG_TMOUT_BUF_PAYLOAD_3: u64 = 0x34;
/// Distance from the read ring-buffer window to the write window.
pub const REG_TMOUT_BUF_WR_OFFSET: u64 = 0x40;

/// Read response error interrupt enable.
pub const RD_RESP_INT_ENABLE: u32 = 1 << 0;
/// Write response error interrupt enable.
pub const WR_RESP_INT_ENABLE: u32 = 1 << 1;
/// ARLEN/RLAST mismatch interrupt enable.
pub const ARLEN_RLAST_INT_ENABLE: u32 = 1 << 2;
/// AWLEN/WLAST mismatch interrupt enable.
pub const AWLEN_WLAST_INT_ENABLE: u32 = 1 << 3;
/// Intended-access window interrupt enable.
pub const INTEND_ACCESS_INT_ENABLE: u32 = 1 << 4;

/// `REG_DBG_CTL` timeout enable bit.
pub const DBG_CTL_TMOUT_EN: u32 = 1 << 0;
/// `REG_TMOUT_FRZ_EN` enable bit.
pub const TMOUT_FRZ_EN: u32 = 1 << 0;
/// Freeze status: write buffer frozen.
pub const TMOUT_FRZ_WRITE: u32 = 1 << 0;
/// Freeze status: read buffer frozen.
pub const TMOUT_FRZ_READ: u32 = 1 << 1;

/// Entries in the read timeout ring buffer.
pub const TMOUT_BUF_READ_ENTRIES: u32 = 128;
/// Entries in the write timeout ring buffer.
pub const TMOUT_BUF_WRITE_ENTRIES: u32 = 64;

/// Width mask of the timeout interval register.
pub const TMOUT_VAL_MASK: u32 = 0xF_FFFF;
/// Default timeout interval programmed at arm time.
pub const TMOUT_DEFAULT: u32 = 0xF_FFFF;

/// Repeated faults tolerated inside the escalation window.
pub const ERR_THRESHOLD: u32 = 5;
/// Faults closer together than this count toward escalation.
pub const ESCALATION_WINDOW: Duration = Duration::from_secs(1);

/// Status vectors are at most 64 bits wide.
pub const MAX_NODES_PER_GROUP: usize = 64;

/// Width of a status vector read without the extended table.
pub const NARROW_VECTOR_NODES: usize = 32;
/// Worst case records per node per scan: four banks, protocol checker, two timeout directions.
pub const RECORDS_PER_NODE: usize = 7;
/// Highest node-policy priority; notifier overrides pin at this level.
pub const PRIO_MAX: u8 = 7;

/// Placeholder rendered for unresolved names.
pub const NOT_AVAILABLE_STR: &str = "N/A";

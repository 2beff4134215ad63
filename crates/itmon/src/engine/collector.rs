//! Trace collection: raw register snapshots of a faulting node.

use tracing::{debug, warn};

use crate::common::constants::{
    OFFSET_PRT_CHK, OFFSET_TMOUT_REG, REG_DBG_MO_CNT, REG_EXT_INFO_0, REG_EXT_INFO_1,
    REG_EXT_INFO_2, REG_EXT_USER, REG_INT_INFO, REG_PRT_CHK_CTL, REG_PRT_CHK_END_ADDR_LOW,
    REG_PRT_CHK_INT, REG_PRT_CHK_INT_ID, REG_PRT_CHK_START_ADDR_LOW,
    REG_PRT_CHK_START_END_ADDR_UPPER,
};
use crate::common::{Direction, ErrorCode, ExtInfo1, ExtInfo2, IntInfo, PrtChkInt};
use crate::engine::{CyclePhase, InfoId, TriageEngine};
use crate::topology::{GroupId, NodeId, PathKind};

/// What raised a trace record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultSource {
    /// Error-valid bit of an error-report sub-bank.
    ErrorReport,
    /// Protocol-checker interrupt.
    ProtocolChecker,
    /// Frozen timeout ring buffer.
    Timeout,
}

impl FaultSource {
    /// Short label used in raw dumps.
    pub const fn label(self) -> &'static str {
        match self {
            Self::ErrorReport => "error-report",
            Self::ProtocolChecker => "protocol-checker",
            Self::Timeout => "timeout",
        }
    }
}

/// Protocol-checker block of a node at capture time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrtChkSnapshot {
    /// Control register.
    pub ctl: u32,
    /// Interrupt status.
    pub int: PrtChkInt,
    /// Offending transaction id.
    pub int_id: u32,
    /// Window start address `[31:0]`.
    pub start_addr: u32,
    /// Window end address `[31:0]`.
    pub end_addr: u32,
    /// Window upper bits: start `[15:0]`, end `[31:16]`.
    pub addr_upper: u32,
}

impl PrtChkSnapshot {
    /// Full intended-access window start address.
    pub const fn window_start(&self) -> u64 {
        (((self.addr_upper & 0xFFFF) as u64) << 32) | self.start_addr as u64
    }

    /// Full intended-access window end address.
    pub const fn window_end(&self) -> u64 {
        (((self.addr_upper >> 16) as u64) << 32) | self.end_addr as u64
    }
}

/// Raw register snapshot of one fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    /// Interrupt info word.
    pub int_info: IntInfo,
    /// Target address `[31:0]`.
    pub ext_info_0: u32,
    /// Extended info 1.
    pub ext_info_1: ExtInfo1,
    /// Extended info 2.
    pub ext_info_2: ExtInfo2,
    /// User bits, extracted according to the group's path kind.
    pub user: u32,
    /// Outstanding-transaction debug counter.
    pub dbg_mo_cnt: u32,
    /// Protocol-checker block.
    pub prt_chk: PrtChkSnapshot,
    /// Sub-bank offset within the node.
    pub offset: u64,
    /// Transaction direction.
    pub dir: Direction,
    /// What raised the record.
    pub source: FaultSource,
    /// Owning group.
    pub group: GroupId,
    /// Faulting node.
    pub node: NodeId,
    /// The record carries a reportable transaction.
    pub logging: bool,
    /// Transaction this record was folded into.
    pub ref_info: Option<InfoId>,
}

impl TraceRecord {
    /// Target address, 48 bits.
    pub const fn target_addr(&self) -> u64 {
        self.ext_info_1.addr_hi() | self.ext_info_0 as u64
    }

    /// Error code of the captured fault.
    ///
    /// Protocol-checker and timeout records report their source regardless of what
    /// the sub-bank they were read from holds.
    pub const fn errcode(&self) -> ErrorCode {
        match self.source {
            FaultSource::ErrorReport => ErrorCode::from_raw(self.int_info.code()),
            FaultSource::ProtocolChecker => ErrorCode::ProtocolChecker,
            FaultSource::Timeout => ErrorCode::Timeout,
        }
    }
}

impl TriageEngine {
    /// Snapshots the sub-bank at `offset` of `node` and appends it to the `dir` list.
    ///
    /// Returns `false` if the record pool for `dir` is full or the node is unmapped.
    pub(crate) fn collect(
        &mut self,
        node: NodeId,
        offset: u64,
        source: FaultSource,
        dir: Direction,
    ) -> bool {
        let info = self.topology.node(node);
        let Some(base) = info.regs else {
            return false;
        };
        if self.records[dir.index()].len() >= self.record_capacity {
            warn!(node = %info.name, %dir, "itmon: trace record pool exhausted, record dropped");
            self.stats.dropped_records += 1;
            return false;
        }
        self.phase = CyclePhase::Collecting;
        let group = info.group;
        let path = self.topology.group(group).path;

        let bank = base + offset;
        let int_info = IntInfo(self.mmio.read_u32(bank + REG_INT_INFO));
        let ext_info_0 = self.mmio.read_u32(bank + REG_EXT_INFO_0);
        let ext_info_1 = ExtInfo1(self.mmio.read_u32(bank + REG_EXT_INFO_1));
        let ext_info_2 = ExtInfo2(self.mmio.read_u32(bank + REG_EXT_INFO_2));
        let user = match path {
            PathKind::ExtTagged => self.mmio.read_u32(bank + REG_EXT_USER),
            PathKind::Info2Tagged => ext_info_2.user(),
            PathKind::Peripheral => ext_info_2.user_peri(),
            PathKind::BusPath => 0,
        };

        let prt = base + OFFSET_PRT_CHK;
        let prt_chk = PrtChkSnapshot {
            ctl: self.mmio.read_u32(prt + REG_PRT_CHK_CTL),
            int: PrtChkInt(self.mmio.read_u32(prt + REG_PRT_CHK_INT)),
            int_id: self.mmio.read_u32(prt + REG_PRT_CHK_INT_ID),
            start_addr: self.mmio.read_u32(prt + REG_PRT_CHK_START_ADDR_LOW),
            end_addr: self.mmio.read_u32(prt + REG_PRT_CHK_END_ADDR_LOW),
            addr_upper: self.mmio.read_u32(prt + REG_PRT_CHK_START_END_ADDR_UPPER),
        };
        let dbg_mo_cnt = self.mmio.read_u32(base + OFFSET_TMOUT_REG + REG_DBG_MO_CNT);

        let logging = match source {
            FaultSource::ErrorReport => int_info.err_valid(),
            FaultSource::ProtocolChecker | FaultSource::Timeout => true,
        };

        debug!(
            node = %info.name,
            offset = format_args!("{offset:#x}"),
            %dir,
            source = source.label(),
            "itmon: trace record captured"
        );

        self.records[dir.index()].push(TraceRecord {
            int_info,
            ext_info_0,
            ext_info_1,
            ext_info_2,
            user,
            dbg_mo_cnt,
            prt_chk,
            offset,
            dir,
            source,
            group,
            node,
            logging,
            ref_info: None,
        });
        self.stats.records += 1;
        true
    }
}

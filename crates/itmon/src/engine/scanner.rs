//! Register scanning.
//!
//! Walks a group's status vector and probes each flagged node for the three fault
//! sources: error-valid sub-banks, a protocol-checker interrupt, and frozen
//! timeout buffers. Every hit is captured through the collector.

use tracing::{debug, warn};

use crate::common::constants::{
    OFFSET_ERR_REPT, OFFSET_NUM, OFFSET_PRT_CHK, OFFSET_REQ_R, OFFSET_TMOUT_REG, REG_INT_CLR,
    REG_INT_INFO, REG_PRT_CHK_INT, REG_TMOUT_BUF_ID, REG_TMOUT_BUF_PAYLOAD_0,
    REG_TMOUT_BUF_PAYLOAD_1, REG_TMOUT_BUF_PAYLOAD_2, REG_TMOUT_BUF_PAYLOAD_3,
    REG_TMOUT_BUF_POINT_ADDR, REG_TMOUT_BUF_STATUS, REG_TMOUT_BUF_WR_OFFSET,
    TMOUT_BUF_READ_ENTRIES, TMOUT_BUF_WRITE_ENTRIES, TMOUT_FRZ_READ, TMOUT_FRZ_WRITE,
};
use crate::common::{Direction, IntInfo, PrtChkInt, TmoutPayload0};
use crate::engine::collector::FaultSource;
use crate::engine::{CyclePhase, TriageEngine};
use crate::policy::ErrorClass;
use crate::report;
use crate::topology::{GroupId, NodeId, NodeKind};

/// One valid entry of a frozen timeout ring buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutEntry {
    /// Slot in the ring buffer.
    pub index: u32,
    /// Transaction id.
    pub id: u32,
    /// Target address, 38 bits.
    pub addr: u64,
    /// User bits.
    pub user: u32,
    /// Timeout counter at freeze time.
    pub timeout: u32,
    /// Entry port resolved through the routing table.
    pub port: String,
    /// Master resolved through the master table.
    pub master: String,
}

const fn buffer_entries(dir: Direction) -> u32 {
    match dir {
        Direction::Read => TMOUT_BUF_READ_ENTRIES,
        Direction::Write => TMOUT_BUF_WRITE_ENTRIES,
    }
}

const fn buffer_window(dir: Direction) -> u64 {
    match dir {
        Direction::Read => 0,
        Direction::Write => REG_TMOUT_BUF_WR_OFFSET,
    }
}

impl TriageEngine {
    /// Scans one group; returns the number of faults found.
    ///
    /// Groups whose power domain is off are skipped without touching registers.
    pub(crate) fn scan_group(&mut self, gid: GroupId, clear: bool) -> usize {
        self.phase = CyclePhase::Scanning;
        let group = self.topology.group(gid);
        if !group.is_active() {
            debug!(group = %group.name, "itmon: group powered off, skipped");
            return 0;
        }
        let len = group.len();
        let vector = match group.status_reg {
            Some(addr) if group.ex_table => self.mmio.read_u64(addr),
            Some(addr) => u64::from(self.mmio.read_u32(addr)),
            None => group.synthesized_vector(),
        };
        debug!(group = %group.name, vector = format_args!("{vector:#x}"), "itmon: scanning group");

        let mut faults = 0;
        for bit in 0..len.min(64) {
            if vector & (1u64 << bit) == 0 {
                continue;
            }
            if let Some(node) = self.topology.group(gid).node_at(bit) {
                faults += self.scan_node(node, clear);
            }
        }
        faults
    }

    /// Probes one node for every fault source; returns the number of faults found.
    pub(crate) fn scan_node(&mut self, node: NodeId, clear: bool) -> usize {
        let info = self.topology.node(node);
        let Some(base) = info.regs else {
            warn!(node = %info.name, "itmon: node has no register base, skipped");
            return 0;
        };
        let kind = info.kind;
        let features = info.features;
        let mut faults = 0;

        for bank in 0..OFFSET_NUM {
            let offset = OFFSET_REQ_R + bank * OFFSET_ERR_REPT;
            let int_info = IntInfo(self.mmio.read_u32(base + offset + REG_INT_INFO));
            if !int_info.err_valid() {
                continue;
            }
            faults += 1;
            let dir = Direction::from_offset(offset);
            let _ = self.collect(node, offset, FaultSource::ErrorReport, dir);
            if clear {
                self.mmio.write_u32(base + offset + REG_INT_CLR, 1);
            }
        }

        if features.prt_chk {
            let int_addr = base + OFFSET_PRT_CHK + REG_PRT_CHK_INT;
            let int = PrtChkInt(self.mmio.read_u32(int_addr));
            if int.occurred() {
                faults += 1;
                let source = FaultSource::ProtocolChecker;
                let _ = self.collect(node, OFFSET_REQ_R, source, Direction::Read);
                self.reflect_policy_by_node(node, ErrorClass::ProtocolChecker);
                if clear {
                    self.mmio.write_u32(int_addr, int.0);
                }
            }
        }

        if kind == NodeKind::Slave && features.timeout && features.timeout_freeze {
            let status_addr = base + OFFSET_TMOUT_REG + REG_TMOUT_BUF_STATUS;
            let status = self.mmio.read_u32(status_addr) & (TMOUT_FRZ_READ | TMOUT_FRZ_WRITE);
            if status != 0 {
                for dir in Direction::ALL {
                    if status & dir.freeze_bit() == 0 {
                        continue;
                    }
                    faults += 1;
                    let _ = self.dump_timeout_buffer(node, dir);
                    let _ = self.collect(node, OFFSET_REQ_R, FaultSource::Timeout, dir);
                }
                self.reflect_policy_by_node(node, ErrorClass::Timeout);
                if clear {
                    self.mmio.write_u32(status_addr, status);
                }
            }
        }

        faults
    }

    /// Decodes the frozen ring buffer of `dir` on a slave node into the report.
    ///
    /// Returns the number of valid entries found.
    pub(crate) fn dump_timeout_buffer(&mut self, node: NodeId, dir: Direction) -> usize {
        let info = self.topology.node(node);
        let Some(base) = info.regs else {
            return 0;
        };
        let window = base + OFFSET_TMOUT_REG + buffer_window(dir);

        let start = self.timeouts.len();
        for index in 0..buffer_entries(dir) {
            self.mmio.write_u32(window + REG_TMOUT_BUF_POINT_ADDR, index);
            let payload0 = TmoutPayload0(self.mmio.read_u32(window + REG_TMOUT_BUF_PAYLOAD_0));
            if !payload0.valid() {
                continue;
            }
            let id = self.mmio.read_u32(window + REG_TMOUT_BUF_ID);
            let addr_lo = self.mmio.read_u32(window + REG_TMOUT_BUF_PAYLOAD_1);
            let addr_hi = self.mmio.read_u32(window + REG_TMOUT_BUF_PAYLOAD_2);
            let user = self.mmio.read_u32(window + REG_TMOUT_BUF_PAYLOAD_3);

            let port = self
                .topology
                .find_route(id, &info.name)
                .map(|route| route.port.clone())
                .unwrap_or_default();
            let master = if port.is_empty() {
                String::new()
            } else {
                self.topology
                    .find_master(&port, user)
                    .map(|entry| entry.master.clone())
                    .unwrap_or_default()
            };
            self.timeouts.push(TimeoutEntry {
                index,
                id,
                addr: (u64::from(addr_hi & 0x3F) << 32) | u64::from(addr_lo),
                user,
                timeout: payload0.timeout(),
                port,
                master,
            });
        }

        let entries = &self.timeouts[start..];
        if !entries.is_empty() {
            let res = report::write_timeout_header(&mut self.report, &info.name, dir)
                .and_then(|()| {
                    entries
                        .iter()
                        .try_for_each(|entry| report::write_timeout_entry(&mut self.report, entry))
                });
            if let Err(e) = res {
                warn!(error = %e, "itmon: failed to format timeout buffer");
            }
        }
        let valid = entries.len();
        debug!(node = %info.name, %dir, valid, "itmon: timeout buffer dumped");
        self.stats.timeout_entries += valid as u64;
        valid
    }
}

//! Transaction resolution.
//!
//! Turns qualifying trace records into [`TraceInfo`]s by naming the port, master,
//! and destination of the faulting transaction. Slave-side records are the anchor:
//! the transaction id seen at the slave is routed back to the entry port, the user
//! bits name the master behind it, and a master-side record of the same transaction
//! (if one was captured) is folded into the same info.

use tracing::{debug, warn};

use crate::common::{Direction, ErrorCode};
use crate::engine::TriageEngine;
use crate::engine::collector::TraceRecord;
use crate::topology::{NodeId, NodeKind};

/// Index of a resolved transaction within the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoId(pub usize);

/// A resolved faulting transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceInfo {
    /// Entry port; empty if unresolved.
    pub port: String,
    /// Master behind the port; empty if unresolved.
    pub master: String,
    /// Destination node; empty for master-anchored transactions.
    pub dest: String,
    /// Target address, 48 bits.
    pub target_addr: u64,
    /// Error code.
    pub errcode: ErrorCode,
    /// Transaction direction.
    pub dir: Direction,
    /// Transaction id as seen by the anchoring node.
    pub axid: u32,
    /// Burst type.
    pub burst: u8,
    /// Burst length.
    pub len: u8,
    /// Beat size.
    pub size: u8,
    /// Protection bits.
    pub prot: u8,
    /// User bits.
    pub user: u32,
    /// Address is a protection-remapper redirect target.
    pub baaw_prot: bool,
    /// Destination power domain was on.
    pub onoff: bool,
    /// Master-side node, if known.
    pub m_node: Option<NodeId>,
    /// Slave-side node, if known.
    pub s_node: Option<NodeId>,
    /// Transaction block already reported.
    pub dirty: bool,
    /// Path header already reported.
    pub path_dirty: bool,
}

impl TraceInfo {
    /// Returns `true` for reads.
    pub const fn is_read(&self) -> bool {
        self.dir.is_read()
    }
}

impl TriageEngine {
    /// Resolves every qualifying record, read list first.
    ///
    /// Slave-anchored records are resolved before master-anchored ones so that a
    /// master record paired with a slave record is folded into the slave's
    /// transaction regardless of scan order.
    ///
    /// Returns the number of transactions created.
    pub(crate) fn analyze(&mut self) -> usize {
        let before = self.infos.len();
        for anchor in [NodeKind::Slave, NodeKind::Master] {
            for dir in Direction::ALL {
                self.analyze_list(anchor, dir);
            }
        }
        let created = self.infos.len() - before;
        self.stats.transactions += created as u64;
        created
    }

    fn analyze_list(&mut self, anchor: NodeKind, dir: Direction) {
        for idx in 0..self.records[dir.index()].len() {
            let rec = &self.records[dir.index()][idx];
            if self.topology.node(rec.node).kind != anchor || !self.qualifies(rec) {
                continue;
            }
            if self.infos.len() >= self.info_capacity {
                warn!("itmon: transaction pool exhausted, record left unresolved");
                continue;
            }
            let (info, master_rec) = self.build_info(rec);
            let id = InfoId(self.infos.len());
            debug!(
                id = id.0,
                port = %info.port,
                master = %info.master,
                dest = %info.dest,
                "itmon: transaction resolved"
            );
            self.infos.push(info);
            self.records[dir.index()][idx].ref_info = Some(id);
            if let Some((mdir, midx)) = master_rec {
                let _ = self.records[mdir.index()][midx].ref_info.get_or_insert(id);
            }
        }
    }

    fn qualifies(&self, rec: &TraceRecord) -> bool {
        if !rec.logging || rec.ref_info.is_some() {
            return false;
        }
        let node = self.topology.node(rec.node);
        match node.kind {
            NodeKind::TaxiSlave | NodeKind::TaxiMaster => false,
            NodeKind::Master => rec.errcode() == ErrorCode::DecodeError,
            NodeKind::Slave => {
                !(rec.errcode() == ErrorCode::DecodeError && self.topology.is_midpoint(&node.name))
            }
        }
    }

    /// Builds the transaction for `rec` and locates the master-side record it pairs with.
    fn build_info(&self, rec: &TraceRecord) -> (TraceInfo, Option<(Direction, usize)>) {
        let topo = &self.topology;
        let node = topo.node(rec.node);
        let target_addr = rec.target_addr();

        let (port, dest, m_node, s_node, master_rec) = if node.kind == NodeKind::Slave {
            let port = topo
                .cpu_port(rec.user)
                .or_else(|| {
                    topo.find_route(rec.int_info.axid(), &node.name)
                        .map(|route| route.port.clone())
                })
                .unwrap_or_default();
            let master_rec = self.find_master_record(&port, rec.dir);
            let m_node = master_rec.map(|(dir, idx)| self.records[dir.index()][idx].node);
            (port, node.name.clone(), m_node, Some(rec.node), master_rec)
        } else {
            (node.name.clone(), String::new(), Some(rec.node), None, None)
        };

        let master = if port.is_empty() {
            String::new()
        } else {
            topo.find_master(&port, rec.user)
                .map(|entry| entry.master.clone())
                .unwrap_or_default()
        };

        let info = TraceInfo {
            port,
            master,
            dest,
            target_addr,
            errcode: rec.errcode(),
            dir: rec.dir,
            axid: rec.int_info.axid(),
            burst: rec.ext_info_2.burst(),
            len: rec.ext_info_1.len(),
            size: rec.ext_info_1.size(),
            prot: rec.ext_info_2.prot(),
            user: rec.user,
            baaw_prot: topo.is_baaw(target_addr),
            onoff: topo.group(node.group).is_active(),
            m_node,
            s_node,
            dirty: false,
            path_dirty: false,
        };
        (info, master_rec)
    }

    /// Finds a record captured on the master node named `port`, same direction first.
    fn find_master_record(&self, port: &str, dir: Direction) -> Option<(Direction, usize)> {
        if port.is_empty() {
            return None;
        }
        [dir, dir.other()].into_iter().find_map(|d| {
            self.records[d.index()]
                .iter()
                .position(|r| {
                    let node = self.topology.node(r.node);
                    node.kind == NodeKind::Master && node.name == port
                })
                .map(|idx| (d, idx))
        })
    }
}

//! Static description of the monitored interconnect.
//!
//! The topology is built once from configuration and is read-only afterwards,
//! apart from three runtime-mutable pieces of per-node and per-group state:
//! power-domain status, feature enable flags, and node policy.
//!
//! Nodes are stored contiguously per group; a [`NodeId`] is a flat index into that
//! storage and a node's bit in its group's status vector is its offset within the
//! group's range. Groups and trace structures refer to nodes by index only.

use std::collections::HashMap;
use std::fmt;
use std::ops::Range;

use serde::Deserialize;

use crate::common::ItmonError;
use crate::common::constants::{MAX_NODES_PER_GROUP, NARROW_VECTOR_NODES, TMOUT_DEFAULT};
use crate::config::GroupConfig;
use crate::policy::NodePolicy;

/// Routing, master, and CPU-origin tables.
pub mod tables;

pub use tables::{CpuOrigin, MasterEntry, NameMatch, RouteEntry};

/// Index of a group in configuration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub usize);

/// Flat index of a node across all groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Role of a node on the interconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Entry point of a master; reports on the response banks.
    #[serde(alias = "M_NODE")]
    Master,
    /// Slave side of an inter-bus relay.
    #[serde(alias = "T_S_NODE")]
    TaxiSlave,
    /// Master side of an inter-bus relay.
    #[serde(alias = "T_M_NODE")]
    TaxiMaster,
    /// Exit point toward a slave; reports on the request banks and owns the timeout monitor.
    #[serde(alias = "S_NODE")]
    Slave,
}

impl NodeKind {
    /// Short tag used in reports.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Master => "M_NODE",
            Self::TaxiSlave => "T_S_NODE",
            Self::TaxiMaster => "T_M_NODE",
            Self::Slave => "S_NODE",
        }
    }

    /// Relay nodes never anchor a resolved transaction.
    pub const fn is_taxi(self) -> bool {
        matches!(self, Self::TaxiSlave | Self::TaxiMaster)
    }

    /// Master-facing nodes latch errors on the response banks.
    pub const fn reports_on_response(self) -> bool {
        matches!(self, Self::Master | Self::TaxiMaster)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Master => "master",
            Self::TaxiSlave => "taxi-slave",
            Self::TaxiMaster => "taxi-master",
            Self::Slave => "slave",
        };
        f.write_str(name)
    }
}

/// How a group's captured transactions carry their user bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    /// Data bus with a dedicated extended-user register per sub-bank.
    #[default]
    ExtTagged,
    /// Peripheral bus; a narrow user field rides in `EXT_INFO_2`.
    Peripheral,
    /// Bus path without user information.
    BusPath,
    /// User bits ride in the upper half of `EXT_INFO_2`.
    Info2Tagged,
}

/// Feature enables currently programmed on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeFeatures {
    /// Error-report interrupts.
    pub err_report: bool,
    /// Protocol checker.
    pub prt_chk: bool,
    /// Intended-access window check inside the protocol checker.
    pub addr_detect: bool,
    /// Timeout monitor (slave nodes).
    pub timeout: bool,
    /// Ring-buffer freeze on timeout (slave nodes).
    pub timeout_freeze: bool,
    /// Timeout interval.
    pub timeout_val: u32,
}

impl Default for NodeFeatures {
    fn default() -> Self {
        Self {
            err_report: true,
            prt_chk: true,
            addr_detect: false,
            timeout: true,
            timeout_freeze: true,
            timeout_val: TMOUT_DEFAULT,
        }
    }
}

/// One monitor point on the interconnect.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    /// Unique node name.
    pub name: String,
    /// Node role.
    pub kind: NodeKind,
    /// Owning group.
    pub group: GroupId,
    /// Bit index in the owning group's status vector.
    pub bit: usize,
    /// Register base; `None` means the node was left unmapped.
    pub regs: Option<u64>,
    /// Programmed feature enables.
    pub features: NodeFeatures,
    /// Per-node policy overrides.
    pub policy: NodePolicy,
}

/// Cluster of nodes sharing an interrupt line and a status vector.
#[derive(Debug, Clone)]
pub struct NodeGroup {
    /// Group name.
    pub name: String,
    /// Status-vector register; `None` synthesizes an all-ones vector.
    pub status_reg: Option<u64>,
    /// Status vector is 64 bits wide.
    pub ex_table: bool,
    /// User-bit transport of this group.
    pub path: PathKind,
    /// Power domain gating this group, if any.
    pub power_domain: Option<String>,
    /// Current power state; only meaningful with a power domain.
    pub powered: bool,
    nodes: Range<usize>,
}

impl NodeGroup {
    /// Number of nodes in the group.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the group has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node at `bit` of the status vector.
    pub fn node_at(&self, bit: usize) -> Option<NodeId> {
        (bit < self.nodes.len()).then(|| NodeId(self.nodes.start + bit))
    }

    /// Ids of all nodes in bit order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + use<> {
        self.nodes.clone().map(NodeId)
    }

    /// Returns `true` unless the group's power domain is off.
    pub fn is_active(&self) -> bool {
        self.power_domain.is_none() || self.powered
    }

    /// Status vector used when the group has no summary register.
    pub fn synthesized_vector(&self) -> u64 {
        match self.nodes.len() {
            0 => 0,
            n if n >= 64 => u64::MAX,
            n => (1u64 << n) - 1,
        }
    }
}

/// The complete interconnect description.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    groups: Vec<NodeGroup>,
    nodes: Vec<NodeInfo>,
    by_name: HashMap<String, NodeId>,
    /// Routing table, scanned in order.
    pub routes: Vec<RouteEntry>,
    /// Master table, scanned in order.
    pub masters: Vec<MasterEntry>,
    /// Slave nodes sitting midway on a path; decode errors there are reported upstream.
    pub midpoints: Vec<String>,
    /// Addresses a protection remapper redirects filtered accesses to.
    pub baaw_addrs: Vec<u64>,
    /// Optional CPU-origin rule.
    pub cpu_origin: Option<CpuOrigin>,
    /// Name comparison used by the routing and master tables.
    pub name_match: NameMatch,
}

impl Topology {
    /// Creates an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a group and its nodes.
    ///
    /// # Errors
    ///
    /// Fails if the group exceeds the status-vector width or a node name is already taken.
    pub fn add_group(&mut self, cfg: &GroupConfig) -> Result<GroupId, ItmonError> {
        let max = if cfg.status_reg.is_some() && !cfg.ex_table {
            NARROW_VECTOR_NODES
        } else {
            MAX_NODES_PER_GROUP
        };
        if cfg.nodes.len() > max {
            return Err(ItmonError::GroupTooLarge {
                group: cfg.name.clone(),
                count: cfg.nodes.len(),
                max,
            });
        }

        let gid = GroupId(self.groups.len());
        let start = self.nodes.len();
        for (bit, node) in cfg.nodes.iter().enumerate() {
            let id = NodeId(self.nodes.len());
            if self.by_name.insert(node.name.clone(), id).is_some() {
                return Err(ItmonError::DuplicateNode(node.name.clone()));
            }
            self.nodes.push(NodeInfo {
                name: node.name.clone(),
                kind: node.kind,
                group: gid,
                bit,
                regs: node.regs,
                features: NodeFeatures {
                    err_report: node.err_report,
                    prt_chk: node.prt_chk,
                    addr_detect: node.addr_detect,
                    timeout: node.timeout && node.kind == NodeKind::Slave,
                    timeout_freeze: node.timeout_freeze && node.kind == NodeKind::Slave,
                    timeout_val: node.timeout_val & crate::common::constants::TMOUT_VAL_MASK,
                },
                policy: NodePolicy::default(),
            });
        }

        self.groups.push(NodeGroup {
            name: cfg.name.clone(),
            status_reg: cfg.status_reg,
            ex_table: cfg.ex_table,
            path: cfg.path,
            power_domain: cfg.power_domain.clone(),
            powered: cfg.power_domain.is_none() || cfg.powered,
            nodes: start..self.nodes.len(),
        });
        Ok(gid)
    }

    /// All groups in configuration order.
    pub fn groups(&self) -> &[NodeGroup] {
        &self.groups
    }

    /// All nodes in flat order.
    pub fn nodes(&self) -> &[NodeInfo] {
        &self.nodes
    }

    /// Group by id.
    ///
    /// Ids are only minted by this topology, so they are always in range.
    pub fn group(&self, id: GroupId) -> &NodeGroup {
        &self.groups[id.0]
    }

    pub(crate) fn group_mut(&mut self, id: GroupId) -> &mut NodeGroup {
        &mut self.groups[id.0]
    }

    /// Node by id.
    pub fn node(&self, id: NodeId) -> &NodeInfo {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut NodeInfo {
        &mut self.nodes[id.0]
    }

    /// Looks up a node by exact name.
    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    /// Looks up a group by name.
    pub fn group_by_name(&self, name: &str) -> Option<GroupId> {
        self.groups.iter().position(|g| g.name == name).map(GroupId)
    }

    /// Total node count across all groups.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// First route matching `axid` observed at `dest`.
    pub fn find_route(&self, axid: u32, dest: &str) -> Option<&RouteEntry> {
        self.routes
            .iter()
            .find(|r| r.matches(axid, dest, self.name_match))
    }

    /// First master entry matching `port` and `user`.
    pub fn find_master(&self, port: &str, user: u32) -> Option<&MasterEntry> {
        self.masters
            .iter()
            .find(|m| m.matches(port, user, self.name_match))
    }

    /// Port name synthesized by the CPU-origin rule, if configured and matching.
    pub fn cpu_port(&self, user: u32) -> Option<String> {
        self.cpu_origin.as_ref().and_then(|rule| rule.port_for(user))
    }

    /// Returns `true` if `name` is a midpoint slave node.
    pub fn is_midpoint(&self, name: &str) -> bool {
        self.midpoints
            .iter()
            .any(|m| self.name_match.matches(m, name))
    }

    /// Returns `true` if `addr` is exactly a protection-remapper redirect address.
    pub fn is_baaw(&self, addr: u64) -> bool {
        self.baaw_addrs.contains(&addr)
    }
}

//! Feature control: programming node enables and the operator surface over them.
//!
//! Enables live in the topology so they survive power cycles; they reach the
//! hardware when a node is armed, when its power domain comes back, or when an
//! operator call changes them. Nodes in a powered-off group are updated in the
//! topology only.

use std::fmt;

use tracing::{debug, info};

use crate::common::ItmonError;
use crate::common::constants::{
    ARLEN_RLAST_INT_ENABLE, AWLEN_WLAST_INT_ENABLE, DBG_CTL_TMOUT_EN, INTEND_ACCESS_INT_ENABLE,
    OFFSET_ERR_REPT, OFFSET_NUM, OFFSET_PRT_CHK, OFFSET_TMOUT_REG, RD_RESP_INT_ENABLE,
    REG_DBG_CTL, REG_INT_CLR, REG_INT_MASK, REG_PRT_CHK_CTL, REG_TMOUT_FRZ_EN,
    REG_TMOUT_INIT_VAL, TMOUT_FRZ_EN, TMOUT_VAL_MASK, WR_RESP_INT_ENABLE,
};
use crate::engine::TriageEngine;
use crate::policy::NodePolicy;
use crate::topology::{NodeId, NodeInfo, NodeKind};

/// Enable state of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    /// Node name.
    pub name: String,
    /// Node role.
    pub kind: NodeKind,
    /// Owning group name.
    pub group: String,
    /// Error-report enable.
    pub err_report: bool,
    /// Protocol-checker enable.
    pub prt_chk: bool,
    /// Intended-access window check.
    pub addr_detect: bool,
    /// Timeout monitor enable.
    pub timeout: bool,
    /// Ring-buffer freeze enable.
    pub timeout_freeze: bool,
    /// Timeout interval.
    pub timeout_val: u32,
    /// Packed node policy.
    pub policy_bits: u64,
}

impl NodeStatus {
    fn new(node: &NodeInfo, group: &str) -> Self {
        Self {
            name: node.name.clone(),
            kind: node.kind,
            group: group.to_string(),
            err_report: node.features.err_report,
            prt_chk: node.features.prt_chk,
            addr_detect: node.features.addr_detect,
            timeout: node.features.timeout,
            timeout_freeze: node.features.timeout_freeze,
            timeout_val: node.features.timeout_val,
            policy_bits: node.policy.pack(),
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let on = |b: bool| if b { "on" } else { "off" };
        write!(
            f,
            "{:<20} {:<9} {:<12} err {:<3} prtchk {:<3} addr {:<3}",
            self.name,
            self.kind.tag(),
            self.group,
            on(self.err_report),
            on(self.prt_chk),
            on(self.addr_detect)
        )?;
        if self.kind == NodeKind::Slave {
            write!(
                f,
                " tmout {:<3} freeze {:<3} val {:#07x}",
                on(self.timeout),
                on(self.timeout_freeze),
                self.timeout_val
            )?;
        }
        if self.policy_bits != 0 {
            write!(f, " policy {:#x}", self.policy_bits)?;
        }
        Ok(())
    }
}

impl TriageEngine {
    /// Writes the node's current enables to hardware.
    pub(crate) fn program_node(&mut self, id: NodeId) {
        let node = self.topology.node(id);
        let Some(base) = node.regs else {
            return;
        };
        if !self.topology.group(node.group).is_active() {
            return;
        }
        let features = node.features;

        let resp_mask = if features.err_report {
            RD_RESP_INT_ENABLE | WR_RESP_INT_ENABLE
        } else {
            0
        };
        for bank in 0..OFFSET_NUM {
            let bank_base = base + bank * OFFSET_ERR_REPT;
            if features.err_report {
                self.mmio.write_u32(bank_base + REG_INT_CLR, 1);
            }
            self.mmio.write_u32(bank_base + REG_INT_MASK, resp_mask);
        }

        let ctl_addr = base + OFFSET_PRT_CHK + REG_PRT_CHK_CTL;
        let mut ctl = self.mmio.read_u32(ctl_addr)
            & !(ARLEN_RLAST_INT_ENABLE | AWLEN_WLAST_INT_ENABLE | INTEND_ACCESS_INT_ENABLE);
        if features.prt_chk {
            ctl |= ARLEN_RLAST_INT_ENABLE | AWLEN_WLAST_INT_ENABLE;
            if features.addr_detect {
                ctl |= INTEND_ACCESS_INT_ENABLE;
            }
        }
        self.mmio.write_u32(ctl_addr, ctl);

        if node.kind == NodeKind::Slave {
            let tmout = base + OFFSET_TMOUT_REG;
            self.mmio.write_u32(tmout + REG_TMOUT_INIT_VAL, features.timeout_val);
            self.mmio.write_u32(
                tmout + REG_TMOUT_FRZ_EN,
                if features.timeout_freeze { TMOUT_FRZ_EN } else { 0 },
            );
            self.mmio.write_u32(
                tmout + REG_DBG_CTL,
                if features.timeout { DBG_CTL_TMOUT_EN } else { 0 },
            );
        }
        debug!(node = %node.name, ?features, "itmon: node programmed");
    }

    /// Folds the node policy's enable overrides into the node's features.
    ///
    /// Returns `false` if the policy is not switched on.
    pub(crate) fn apply_node_policy(&mut self, id: NodeId) -> bool {
        let node = self.topology.node_mut(id);
        let policy = node.policy;
        if !policy.is_set() {
            return false;
        }
        let slave = node.kind == NodeKind::Slave;
        let features = &mut node.features;
        if let Some(en) = policy.err_report {
            features.err_report = en;
        }
        if let Some(en) = policy.prt_chk {
            features.prt_chk = en;
        }
        if slave {
            if let Some(en) = policy.timeout {
                features.timeout = en;
            }
            if let Some(en) = policy.freeze {
                features.timeout_freeze = en;
            }
            if let Some(val) = policy.timeout_val {
                features.timeout_val = val & TMOUT_VAL_MASK;
            }
        }
        true
    }

    fn rearm_node(&mut self, id: NodeId) {
        let _ = self.apply_node_policy(id);
        self.program_node(id);
    }

    /// Programs every node of every powered group; returns the number of nodes armed.
    pub fn arm(&mut self) -> usize {
        let mut armed = 0;
        for id in (0..self.topology.node_count()).map(NodeId) {
            self.rearm_node(id);
            let node = self.topology.node(id);
            if node.regs.is_some() && self.topology.group(node.group).is_active() {
                armed += 1;
            }
        }
        info!(nodes = armed, "itmon: armed");
        armed
    }

    /// Records a power-domain transition; re-arms the affected groups when powered on.
    ///
    /// Returns the number of groups gated by `domain`.
    pub fn on_power_domain_change(&mut self, domain: &str, on: bool) -> usize {
        let gids: Vec<_> = (0..self.topology.groups().len())
            .map(crate::topology::GroupId)
            .filter(|gid| self.topology.group(*gid).power_domain.as_deref() == Some(domain))
            .collect();
        for gid in &gids {
            self.topology.group_mut(*gid).powered = on;
            if on {
                let ids: Vec<_> = self.topology.group(*gid).node_ids().collect();
                for id in ids {
                    self.rearm_node(id);
                }
            }
        }
        info!(domain, on, groups = gids.len(), "itmon: power domain changed");
        gids.len()
    }

    fn lookup(&self, name: &str) -> Result<NodeId, ItmonError> {
        self.topology
            .node_by_name(name)
            .ok_or_else(|| ItmonError::NodeNotFound(name.to_string()))
    }

    fn lookup_slave(&self, name: &str) -> Result<NodeId, ItmonError> {
        let id = self.lookup(name)?;
        let kind = self.topology.node(id).kind;
        if kind != NodeKind::Slave {
            return Err(ItmonError::NotSlaveNode {
                name: name.to_string(),
                kind,
            });
        }
        Ok(id)
    }

    /// Enables or disables error reporting and protocol checking on one node.
    ///
    /// # Errors
    ///
    /// Returns [`ItmonError::NodeNotFound`] for an unknown name.
    pub fn enable_by_name(&mut self, name: &str, enabled: bool) -> Result<(), ItmonError> {
        let id = self.lookup(name)?;
        let features = &mut self.topology.node_mut(id).features;
        features.err_report = enabled;
        features.prt_chk = enabled;
        self.program_node(id);
        info!(node = name, enabled, "itmon: node enable changed");
        Ok(())
    }

    /// Replaces a node's policy from its packed form, optionally applying it at once.
    ///
    /// # Errors
    ///
    /// Fails for an unknown name or undefined policy bits.
    pub fn set_node_policy_by_name(
        &mut self,
        name: &str,
        bits: u64,
        apply_now: bool,
    ) -> Result<NodePolicy, ItmonError> {
        let id = self.lookup(name)?;
        let policy = NodePolicy::unpack(bits)?;
        self.topology.node_mut(id).policy = policy;
        if apply_now {
            self.rearm_node(id);
        }
        info!(node = name, bits = format_args!("{bits:#x}"), apply_now, "itmon: node policy set");
        Ok(policy)
    }

    /// Enables or disables every fault source on every node.
    pub fn enable_all(&mut self, enabled: bool) {
        for id in (0..self.topology.node_count()).map(NodeId) {
            let node = self.topology.node_mut(id);
            let slave = node.kind == NodeKind::Slave;
            node.features.err_report = enabled;
            node.features.prt_chk = enabled;
            if slave {
                node.features.timeout = enabled;
            }
            self.program_node(id);
        }
        info!(enabled, "itmon: all nodes enable changed");
    }

    /// Enable state of every node.
    pub fn enable_all_status(&self) -> Vec<NodeStatus> {
        self.topology
            .nodes()
            .iter()
            .map(|node| NodeStatus::new(node, &self.topology.group(node.group).name))
            .collect()
    }

    /// Enables or disables the timeout monitor of a slave node.
    ///
    /// # Errors
    ///
    /// Fails for an unknown name or a node that is not a slave.
    pub fn set_timeout(&mut self, name: &str, enabled: bool) -> Result<(), ItmonError> {
        let id = self.lookup_slave(name)?;
        self.topology.node_mut(id).features.timeout = enabled;
        self.program_node(id);
        Ok(())
    }

    /// Sets the timeout interval of a slave node; the value is truncated to the register width.
    ///
    /// # Errors
    ///
    /// Fails for an unknown name or a node that is not a slave.
    pub fn set_timeout_val(&mut self, name: &str, val: u32) -> Result<(), ItmonError> {
        let id = self.lookup_slave(name)?;
        self.topology.node_mut(id).features.timeout_val = val & TMOUT_VAL_MASK;
        self.program_node(id);
        Ok(())
    }

    /// Enables or disables ring-buffer freeze on a slave node.
    ///
    /// # Errors
    ///
    /// Fails for an unknown name or a node that is not a slave.
    pub fn set_timeout_freeze(&mut self, name: &str, enabled: bool) -> Result<(), ItmonError> {
        let id = self.lookup_slave(name)?;
        self.topology.node_mut(id).features.timeout_freeze = enabled;
        self.program_node(id);
        Ok(())
    }

    /// Timeout state of every slave node.
    pub fn timeout_status(&self) -> Vec<NodeStatus> {
        self.enable_all_status()
            .into_iter()
            .filter(|status| status.kind == NodeKind::Slave)
            .collect()
    }
}

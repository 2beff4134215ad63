//! Configuration for the triage engine.
//!
//! This module defines the serde structures a board description is loaded from.
//! It provides:
//! 1. **Defaults:** Per-class recovery actions, escalation threshold, and node enables.
//! 2. **Topology:** Groups, nodes, and the routing/master/midpoint tables.
//! 3. **Policy:** Global per-class actions and per-node "customize" overrides.
//!
//! Configuration is supplied as JSON (`ItmonConfig::from_json` / `from_path`) and
//! turned into an immutable [`Topology`] by [`ItmonConfig::build_topology`].

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::common::ItmonError;
use crate::policy::{Action, NodePolicy};
use crate::topology::{CpuOrigin, MasterEntry, NameMatch, NodeKind, PathKind, RouteEntry, Topology};

/// Default configuration constants for the engine.
mod defaults {
    use crate::common::constants::{ERR_THRESHOLD, TMOUT_DEFAULT};
    use crate::policy::Action;

    /// Timeout faults stop the system.
    pub const TIMEOUT_ACTION: Action = Action::Panic;

    /// Protocol-checker faults are logged only.
    pub const PRTCHK_ACTION: Action = Action::Default;

    /// Decode errors are logged only.
    pub const DECERR_ACTION: Action = Action::Default;

    /// Slave errors are logged only.
    pub const SLVERR_ACTION: Action = Action::Default;

    /// Unresolvable or unsupported faults stop the system.
    pub const FATAL_ACTION: Action = Action::Panic;

    /// Action forced when repeated faults cross the threshold.
    pub const ESCALATION_ACTION: Action = Action::MOST_SEVERE;

    /// Repeats tolerated inside the escalation window.
    pub const ERR_THRESHOLD_VAL: u32 = ERR_THRESHOLD;

    /// Timeout interval programmed when a node does not name one.
    pub const TIMEOUT_VAL: u32 = TMOUT_DEFAULT;
}

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItmonConfig {
    /// Node groups in interrupt order.
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
    /// Routing table.
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
    /// Master table.
    #[serde(default)]
    pub masters: Vec<MasterEntry>,
    /// Names of midpoint slave nodes.
    #[serde(default)]
    pub midpoints: Vec<String>,
    /// Protection-remapper redirect addresses.
    #[serde(default)]
    pub baaw_addrs: Vec<u64>,
    /// CPU-origin rule.
    #[serde(default)]
    pub cpu_origin: Option<CpuOrigin>,
    /// Table name comparison mode.
    #[serde(default)]
    pub name_match: NameMatch,
    /// Global policy.
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Per-node policy overrides applied at init.
    #[serde(default)]
    pub customize: Vec<CustomizeConfig>,
}

/// One node group.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupConfig {
    /// Group name.
    pub name: String,
    /// Status-vector register; omitted groups are scanned node by node.
    #[serde(default)]
    pub status_reg: Option<u64>,
    /// Status vector is 64 bits wide.
    #[serde(default)]
    pub ex_table: bool,
    /// User-bit transport.
    #[serde(default)]
    pub path: PathKind,
    /// Gating power domain.
    #[serde(default)]
    pub power_domain: Option<String>,
    /// Initial power state of the domain.
    #[serde(default = "GroupConfig::default_powered")]
    pub powered: bool,
    /// Nodes in status-vector bit order.
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

impl GroupConfig {
    fn default_powered() -> bool {
        true
    }
}

/// One node.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Unique node name.
    pub name: String,
    /// Node role.
    #[serde(rename = "type", alias = "kind")]
    pub kind: NodeKind,
    /// Register base; omitted nodes are skipped at scan time.
    #[serde(default)]
    pub regs: Option<u64>,
    /// Error-report enable.
    #[serde(default = "NodeConfig::enabled")]
    pub err_report: bool,
    /// Protocol-checker enable.
    #[serde(default = "NodeConfig::enabled")]
    pub prt_chk: bool,
    /// Intended-access window check.
    #[serde(default)]
    pub addr_detect: bool,
    /// Timeout monitor enable (slave nodes only).
    #[serde(default = "NodeConfig::enabled")]
    pub timeout: bool,
    /// Ring-buffer freeze enable (slave nodes only).
    #[serde(default = "NodeConfig::enabled")]
    pub timeout_freeze: bool,
    /// Timeout interval.
    #[serde(default = "NodeConfig::default_timeout_val")]
    pub timeout_val: u32,
}

impl NodeConfig {
    fn enabled() -> bool {
        true
    }

    fn default_timeout_val() -> u32 {
        defaults::TIMEOUT_VAL
    }

    /// Creates a node with default enables.
    pub fn new(name: impl Into<String>, kind: NodeKind, regs: Option<u64>) -> Self {
        Self {
            name: name.into(),
            kind,
            regs,
            err_report: true,
            prt_chk: true,
            addr_detect: false,
            timeout: true,
            timeout_freeze: true,
            timeout_val: defaults::TIMEOUT_VAL,
        }
    }
}

/// Global policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PolicyConfig {
    /// Action for timeouts.
    #[serde(default = "PolicyConfig::default_timeout")]
    pub timeout: Action,
    /// Action for protocol-checker faults.
    #[serde(default = "PolicyConfig::default_prtchk")]
    pub prtchk: Action,
    /// Action for decode errors.
    #[serde(default = "PolicyConfig::default_decerr")]
    pub decerr: Action,
    /// Action for slave errors.
    #[serde(default = "PolicyConfig::default_slverr")]
    pub slverr: Action,
    /// Action for everything else.
    #[serde(default = "PolicyConfig::default_fatal")]
    pub fatal: Action,
    /// Action forced by the repeated-fault rule.
    #[serde(default = "PolicyConfig::default_escalation")]
    pub escalation: Action,
    /// Repeats tolerated inside the escalation window.
    #[serde(default = "PolicyConfig::default_err_threshold")]
    pub err_threshold: u32,
}

impl PolicyConfig {
    fn default_timeout() -> Action {
        defaults::TIMEOUT_ACTION
    }

    fn default_prtchk() -> Action {
        defaults::PRTCHK_ACTION
    }

    fn default_decerr() -> Action {
        defaults::DECERR_ACTION
    }

    fn default_slverr() -> Action {
        defaults::SLVERR_ACTION
    }

    fn default_fatal() -> Action {
        defaults::FATAL_ACTION
    }

    fn default_escalation() -> Action {
        defaults::ESCALATION_ACTION
    }

    fn default_err_threshold() -> u32 {
        defaults::ERR_THRESHOLD_VAL
    }

    /// Per-class actions in [`ErrorClass::ALL`](crate::policy::ErrorClass::ALL) order.
    pub const fn class_defaults(&self) -> [Action; 5] {
        [self.timeout, self.prtchk, self.decerr, self.slverr, self.fatal]
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            timeout: defaults::TIMEOUT_ACTION,
            prtchk: defaults::PRTCHK_ACTION,
            decerr: defaults::DECERR_ACTION,
            slverr: defaults::SLVERR_ACTION,
            fatal: defaults::FATAL_ACTION,
            escalation: defaults::ESCALATION_ACTION,
            err_threshold: defaults::ERR_THRESHOLD_VAL,
        }
    }
}

/// Policy override for one node.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomizeConfig {
    /// Target node.
    pub node: String,
    /// Override fields.
    #[serde(flatten)]
    pub policy: NodePolicy,
}

impl ItmonConfig {
    /// Parses a configuration from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`ItmonError::Parse`] on malformed input.
    pub fn from_json(text: &str) -> Result<Self, ItmonError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ItmonError::Io`] if the file cannot be read and
    /// [`ItmonError::Parse`] if it is malformed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ItmonError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Validates the configuration and builds the topology.
    ///
    /// Customize entries are validated and stored on their nodes; they reach the
    /// hardware when the engine arms the nodes.
    ///
    /// # Errors
    ///
    /// Fails on oversized groups, duplicate node names, customize entries naming
    /// unknown nodes, and out-of-range priorities.
    pub fn build_topology(&self) -> Result<Topology, ItmonError> {
        let mut topo = Topology::new();
        for group in &self.groups {
            let gid = topo.add_group(group)?;
            debug!(
                group = %group.name,
                id = gid.0,
                nodes = group.nodes.len(),
                "itmon: group added"
            );
        }

        for route in &self.routes {
            if self.name_match == NameMatch::Exact && topo.node_by_name(&route.dest).is_none() {
                warn!(
                    port = %route.port,
                    dest = %route.dest,
                    "itmon: route names an unknown destination"
                );
            }
        }

        topo.routes.clone_from(&self.routes);
        topo.masters.clone_from(&self.masters);
        topo.midpoints.clone_from(&self.midpoints);
        topo.baaw_addrs.clone_from(&self.baaw_addrs);
        topo.cpu_origin.clone_from(&self.cpu_origin);
        topo.name_match = self.name_match;

        for custom in &self.customize {
            let id = topo
                .node_by_name(&custom.node)
                .ok_or_else(|| ItmonError::NodeNotFound(custom.node.clone()))?;
            custom.policy.validate()?;
            topo.node_mut(id).policy = custom.policy;
            debug!(
                node = %custom.node,
                bits = format_args!("{:#x}", custom.policy.pack()),
                "itmon: node policy customized"
            );
        }

        Ok(topo)
    }
}

//! Routing, master, and CPU-origin lookup tables.
//!
//! The resolver turns a raw transaction id into a port name through the routing
//! table, and a port name plus user bits into a master name through the master
//! table. Both are small and scanned linearly in configuration order; the first
//! matching entry wins.

use serde::Deserialize;

/// How table names are compared against node and port names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameMatch {
    /// Names must be equal.
    #[default]
    Exact,
    /// The stored name only has to be a prefix of the looked-up name.
    ///
    /// Compatible with tables written for `strncmp(stored, name, strlen(stored))`;
    /// a short stored name shadows every longer name it prefixes.
    Prefix,
}

impl NameMatch {
    /// Compares a stored table name against a looked-up name.
    #[inline]
    pub fn matches(self, stored: &str, name: &str) -> bool {
        match self {
            Self::Exact => stored == name,
            Self::Prefix => name.starts_with(stored),
        }
    }
}

/// Routing-table entry: transaction id on a destination node → originating port.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouteEntry {
    /// Port the transaction entered the interconnect from.
    pub port: String,
    /// Destination (slave) node the id is observed at.
    pub dest: String,
    /// Id value after shifting and masking.
    pub id: u32,
    /// Mask applied to the shifted transaction id.
    #[serde(default = "RouteEntry::default_mask")]
    pub mask: u32,
    /// Right shift applied to the transaction id before masking.
    #[serde(default)]
    pub shift: u32,
}

impl RouteEntry {
    fn default_mask() -> u32 {
        0xFFFF
    }

    /// Returns `true` if `axid` observed at `dest` belongs to this route.
    #[inline]
    pub fn matches(&self, axid: u32, dest: &str, mode: NameMatch) -> bool {
        (axid >> self.shift) & self.mask == self.id && mode.matches(&self.dest, dest)
    }
}

/// Master-table entry: port plus user bits → master name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MasterEntry {
    /// Port name, as produced by the routing table.
    pub port: String,
    /// Master name reported to operators.
    pub master: String,
    /// Expected user value after masking.
    #[serde(default)]
    pub user: u32,
    /// Mask applied to the captured user bits.
    #[serde(default)]
    pub mask: u32,
}

impl MasterEntry {
    /// Returns `true` if this entry names the master behind `port` with `user` bits.
    #[inline]
    pub fn matches(&self, port: &str, user: u32, mode: NameMatch) -> bool {
        user & self.mask == self.user && mode.matches(&self.port, port)
    }
}

/// Rule recognizing CPU-originated transactions from their user bits alone.
///
/// CPU traffic carries its core number in the user field, so the port name is
/// synthesized as `<prefix><core>` without consulting the routing table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CpuOrigin {
    /// Mask selecting the bits that identify CPU traffic.
    pub mask: u32,
    /// Value of the masked bits for CPU traffic.
    pub value: u32,
    /// Shift of the core-number field.
    #[serde(default)]
    pub core_shift: u32,
    /// Mask of the core-number field (after shifting).
    #[serde(default = "CpuOrigin::default_core_mask")]
    pub core_mask: u32,
    /// Port-name prefix.
    #[serde(default = "CpuOrigin::default_prefix")]
    pub prefix: String,
}

impl CpuOrigin {
    fn default_core_mask() -> u32 {
        0xF
    }

    fn default_prefix() -> String {
        "CPU".to_string()
    }

    /// Returns the synthesized port name if `user` marks CPU traffic.
    pub fn port_for(&self, user: u32) -> Option<String> {
        if self.mask == 0 || user & self.mask != self.value {
            return None;
        }
        let core = (user >> self.core_shift) & self.core_mask;
        Some(format!("{}{core}", self.prefix))
    }
}

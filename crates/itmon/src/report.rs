//! Fault report formatting.
//!
//! Every writer appends to a [`fmt::Write`] sink so the engine can build the
//! per-cycle report text without touching the console; the engine also mirrors
//! the finished text to the `error` log level. Unresolved names render as
//! [`NOT_AVAILABLE_STR`].

use std::fmt;

use crate::common::constants::NOT_AVAILABLE_STR;
use crate::engine::{FaultSource, ScanOutcome, TimeoutEntry, TraceInfo, TraceRecord};
use crate::topology::{NodeId, Topology};

const RULE: &str = "--------------------------------------------------------------------------";

/// Returns `s`, or the not-available marker if it is empty.
#[inline]
pub fn or_na(s: &str) -> &str {
    if s.is_empty() { NOT_AVAILABLE_STR } else { s }
}

fn node_label(topo: &Topology, node: Option<NodeId>) -> String {
    node.map_or_else(
        || NOT_AVAILABLE_STR.to_string(),
        |id| {
            let n = topo.node(id);
            format!("{}({}) in {}", n.name, n.kind.tag(), topo.group(n.group).name)
        },
    )
}

/// Writes the path header of a transaction.
///
/// # Errors
///
/// Propagates sink errors.
pub fn write_path_info(
    out: &mut impl fmt::Write,
    info: &TraceInfo,
    topo: &Topology,
) -> fmt::Result {
    writeln!(out, "{RULE}")?;
    writeln!(out, "ITMON Report ({})", info.dir)?;
    writeln!(out, "{RULE}")?;
    writeln!(out, "PATH Information")?;
    writeln!(out, "> {} -> {}", or_na(&info.port), or_na(&info.dest))?;
    writeln!(out, "  m_node        : {}", node_label(topo, info.m_node))?;
    writeln!(out, "  s_node        : {}", node_label(topo, info.s_node))
}

/// Writes the transaction block.
///
/// # Errors
///
/// Propagates sink errors.
pub fn write_transaction_info(out: &mut impl fmt::Write, info: &TraceInfo) -> fmt::Result {
    writeln!(out, "TRANSACTION Information")?;
    writeln!(out, "> Master         : {} ({})", or_na(&info.master), or_na(&info.port))?;
    write!(out, "> Target address : {:#014x}", info.target_addr)?;
    if info.baaw_prot {
        write!(out, " (BAAW remapped)")?;
    }
    writeln!(out)?;
    writeln!(out, "> Target         : {}", or_na(&info.dest))?;
    writeln!(out, "> Type           : {}", info.dir)?;
    writeln!(out, "> Error code     : {}", info.errcode)?;
    writeln!(
        out,
        "> Size           : {} bytes x {} beats, burst {}, prot {:#x}",
        1u32 << info.size,
        u32::from(info.len) + 1,
        info.burst,
        info.prot
    )?;
    writeln!(out, "> AxID / User    : {:#06x} / {:#x}", info.axid, info.user)?;
    writeln!(out, "> Power domain   : {}", if info.onoff { "on" } else { "off" })?;
    writeln!(out, "{RULE}")
}

/// Writes the raw register dump of a trace record.
///
/// # Errors
///
/// Propagates sink errors.
pub fn write_raw_record(
    out: &mut impl fmt::Write,
    rec: &TraceRecord,
    topo: &Topology,
) -> fmt::Result {
    let node = topo.node(rec.node);
    writeln!(
        out,
        "> {}({}) {} {} at +{:#x}",
        node.name,
        node.kind.tag(),
        rec.dir,
        rec.source.label(),
        rec.offset
    )?;
    writeln!(
        out,
        "  int_info {:#010x} ext_info_0 {:#010x} ext_info_1 {:#010x} ext_info_2 {:#010x}",
        rec.int_info.0, rec.ext_info_0, rec.ext_info_1.0, rec.ext_info_2.0
    )?;
    writeln!(
        out,
        "  user {:#010x} dbg_mo_cnt {:#x} err_occurred {}",
        rec.user,
        rec.dbg_mo_cnt,
        rec.int_info.err_occurred()
    )?;
    if rec.source == FaultSource::ProtocolChecker {
        let chk = &rec.prt_chk;
        writeln!(
            out,
            "  prt_chk ctl {:#x} int {:#x} (occurred {}, dropped {}) id {:#x}",
            chk.ctl,
            chk.int.0,
            chk.int.occurred(),
            chk.int.dropped(),
            chk.int_id
        )?;
        writeln!(
            out,
            "  prt_chk window {:#014x} - {:#014x}",
            chk.window_start(),
            chk.window_end()
        )?;
    }
    Ok(())
}

/// Writes the header preceding a timeout ring-buffer dump.
///
/// # Errors
///
/// Propagates sink errors.
pub fn write_timeout_header(
    out: &mut impl fmt::Write,
    node: &str,
    dir: crate::common::Direction,
) -> fmt::Result {
    writeln!(out, "{RULE}")?;
    writeln!(out, "ITMON Timeout buffer: {node} ({dir})")?;
    writeln!(out, "{RULE}")
}

/// Writes one valid timeout ring-buffer entry.
///
/// # Errors
///
/// Propagates sink errors.
pub fn write_timeout_entry(out: &mut impl fmt::Write, entry: &TimeoutEntry) -> fmt::Result {
    writeln!(
        out,
        "  [{:03}] id {:#06x} addr {:#012x} user {:#x} tmout {:#x} port {} master {}",
        entry.index,
        entry.id,
        entry.addr,
        entry.user,
        entry.timeout,
        or_na(&entry.port),
        or_na(&entry.master)
    )
}

/// Writes the decision summary of a finished cycle.
///
/// # Errors
///
/// Propagates sink errors.
pub fn write_decision(out: &mut impl fmt::Write, outcome: &ScanOutcome) -> fmt::Result {
    writeln!(out, "faults        : {}", outcome.fault_count)?;
    writeln!(out, "transactions  : {}", outcome.transactions.len())?;
    match (outcome.class, outcome.action) {
        (Some(class), Some(action)) => writeln!(out, "decision      : {action} ({class})")?,
        (None, Some(action)) => writeln!(out, "decision      : {action}")?,
        _ => writeln!(out, "decision      : none")?,
    }
    if outcome.escalated {
        writeln!(out, "escalated     : repeated faults crossed the threshold")?;
    }
    Ok(())
}

//! ITMON offline triage CLI.
//!
//! This binary runs the triage engine against a board description and a captured
//! (or hand-written) register image. It provides:
//! 1. **Show:** Print the topology and per-node enable state.
//! 2. **Scan:** Seed a register file, run one or more fault cycles, print the report and decision.
//! 3. **Policy:** Decode or encode packed node-policy words.
//! 4. **Timeout:** Inspect or change the slave-node timeout surface.

use std::collections::BTreeMap;
use std::{fs, process};

use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use itmon_core::config::ItmonConfig;
use itmon_core::engine::{Itmon, ScanTarget};
use itmon_core::mmio::{RingSlot, SparseRegisters};
use itmon_core::policy::NodePolicy;
use itmon_core::report;

#[derive(Parser, Debug)]
#[command(
    name = "itmon",
    author,
    version,
    about = "Interconnect traffic monitor triage",
    long_about = "Run ITMON fault triage offline against a board description and a register image.\n\nExamples:\n  itmon show -c board.json\n  itmon scan -c board.json -r regs.json\n  itmon policy decode 0x10000000003\n  itmon timeout -c board.json --node DRAM0 --val 0x1000"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print groups, nodes, and their enable state.
    Show {
        /// Board description (JSON).
        #[arg(short, long)]
        config: String,
    },

    /// Run fault cycles over a register image.
    Scan {
        /// Board description (JSON).
        #[arg(short, long)]
        config: String,

        /// Register image (JSON): `{"regs": {"0x...": "0x..."}, "rings": {"0x...": [[id, p0, p1, p2, p3]]}}`.
        #[arg(short, long)]
        regs: String,

        /// Only scan this group.
        #[arg(short, long)]
        group: Option<String>,

        /// Leave fault sources latched after capture.
        #[arg(long)]
        no_clear: bool,

        /// Number of back-to-back cycles to run.
        #[arg(long, default_value_t = 1)]
        repeat: u32,
    },

    /// Decode or encode packed node-policy words.
    Policy {
        #[command(subcommand)]
        action: PolicyCommand,
    },

    /// Inspect or change slave-node timeout settings.
    Timeout {
        /// Board description (JSON).
        #[arg(short, long)]
        config: String,

        /// Slave node to change.
        #[arg(long)]
        node: Option<String>,

        /// Enable (`true`) or disable (`false`) the timeout monitor.
        #[arg(long)]
        enable: Option<bool>,

        /// Timeout interval.
        #[arg(long, value_parser = parse_u32)]
        val: Option<u32>,

        /// Enable (`true`) or disable (`false`) ring-buffer freeze.
        #[arg(long)]
        freeze: Option<bool>,
    },
}

#[derive(Subcommand, Debug)]
enum PolicyCommand {
    /// Decode a packed policy word.
    Decode {
        /// Policy bits (decimal or `0x` hex).
        #[arg(value_parser = parse_u64)]
        bits: u64,
    },
    /// Encode a policy given as JSON fields, e.g. `{"chk_set":true,"prio":3,"decerr_job":"panic"}`.
    Encode {
        /// Policy fields (JSON).
        json: String,
    },
}

/// Register value given either as a number or as a (hex) string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RegValue {
    Num(u64),
    Text(String),
}

#[derive(Debug, Default, Deserialize)]
struct RegImage {
    #[serde(default)]
    regs: BTreeMap<String, RegValue>,
    #[serde(default)]
    rings: BTreeMap<String, Vec<[RegValue; 5]>>,
}

fn parse_u64(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    };
    parsed.map_err(|e| format!("invalid number `{s}`: {e}"))
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let v = parse_u64(s)?;
    u32::try_from(v).map_err(|_| format!("`{s}` does not fit in 32 bits"))
}

fn reg_value(v: &RegValue) -> Result<u64, String> {
    match v {
        RegValue::Num(n) => Ok(*n),
        RegValue::Text(s) => parse_u64(s),
    }
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("Error: {msg}");
    process::exit(1);
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Show { config } => cmd_show(&config),
        Commands::Scan {
            config,
            regs,
            group,
            no_clear,
            repeat,
        } => cmd_scan(&config, &regs, group.as_deref(), !no_clear, repeat),
        Commands::Policy { action } => cmd_policy(action),
        Commands::Timeout {
            config,
            node,
            enable,
            val,
            freeze,
        } => cmd_timeout(&config, node.as_deref(), enable, val, freeze),
    }
}

fn load_config(path: &str) -> ItmonConfig {
    ItmonConfig::from_path(path).unwrap_or_else(|e| fail(format_args!("{path}: {e}")))
}

fn build(config: &ItmonConfig, regs: SparseRegisters) -> Itmon {
    Itmon::from_config(config, Box::new(regs)).unwrap_or_else(|e| fail(e))
}

/// Loads a register image into a fresh register file.
fn load_regs(path: &str) -> SparseRegisters {
    let text = fs::read_to_string(path).unwrap_or_else(|e| fail(format_args!("{path}: {e}")));
    let image: RegImage =
        serde_json::from_str(&text).unwrap_or_else(|e| fail(format_args!("{path}: {e}")));

    let regs = SparseRegisters::new();
    for (addr, val) in &image.regs {
        let addr = parse_u64(addr).unwrap_or_else(|e| fail(e));
        let val = reg_value(val).unwrap_or_else(|e| fail(e));
        regs.set(addr, val as u32);
    }
    for (window, slots) in &image.rings {
        let window = parse_u64(window).unwrap_or_else(|e| fail(e));
        let slots: Vec<RingSlot> = slots
            .iter()
            .map(|slot| {
                let mut out = [0u32; 5];
                for (dst, src) in out.iter_mut().zip(slot) {
                    *dst = reg_value(src).unwrap_or_else(|e| fail(e)) as u32;
                }
                out
            })
            .collect();
        regs.set_ring(window, slots);
    }
    info!(
        path,
        regs = image.regs.len(),
        rings = image.rings.len(),
        "loaded register image"
    );
    regs
}

/// Prints the topology and the enable state of every node.
fn cmd_show(config_path: &str) {
    let config = load_config(config_path);
    let itmon = build(&config, SparseRegisters::new());
    itmon.with_engine(|engine| {
        let topo = engine.topology();
        println!("Groups: {}  Nodes: {}", topo.groups().len(), topo.node_count());
        for group in topo.groups() {
            let status = group
                .status_reg
                .map_or_else(|| "synthesized".to_string(), |addr| format!("{addr:#x}"));
            let domain = group.power_domain.as_deref().unwrap_or("-");
            println!(
                "  {:<16} nodes {:<3} status {:<12} path {:?} domain {}",
                group.name,
                group.len(),
                status,
                group.path,
                domain
            );
        }
        println!();
        for status in engine.enable_all_status() {
            println!("  {status}");
        }
        println!();
        println!(
            "Routes: {}  Masters: {}  Midpoints: {}  BAAW: {}  Name match: {:?}",
            topo.routes.len(),
            topo.masters.len(),
            topo.midpoints.len(),
            topo.baaw_addrs.len(),
            topo.name_match
        );
    });
}

/// Runs `repeat` fault cycles over a register image and prints each outcome.
fn cmd_scan(config_path: &str, regs_path: &str, group: Option<&str>, clear: bool, repeat: u32) {
    let config = load_config(config_path);
    let regs = load_regs(regs_path);
    let itmon = build(&config, regs);

    let target = match group {
        Some(name) => {
            let gid = itmon
                .with_engine(|engine| engine.topology().group_by_name(name))
                .unwrap_or_else(|| fail(format_args!("no group named `{name}`")));
            ScanTarget::Group(gid)
        }
        None => ScanTarget::All,
    };

    for cycle in 0..repeat.max(1) {
        let outcome = itmon.scan_and_report(target, clear);
        info!(cycle, faults = outcome.fault_count, "scan cycle complete");
        if outcome.fault_count == 0 {
            continue;
        }
        print!("{}", outcome.report);
        let mut decision = String::new();
        if let Err(e) = report::write_decision(&mut decision, &outcome) {
            fail(e);
        }
        print!("{decision}");
    }
    itmon.stats().print();
}

/// Decodes or encodes a packed node-policy word.
fn cmd_policy(action: PolicyCommand) {
    match action {
        PolicyCommand::Decode { bits } => {
            let policy = NodePolicy::unpack(bits).unwrap_or_else(|e| fail(e));
            println!("{policy:#?}");
        }
        PolicyCommand::Encode { json } => {
            let policy: NodePolicy = serde_json::from_str(&json).unwrap_or_else(|e| fail(e));
            if let Err(e) = policy.validate() {
                fail(e);
            }
            println!("{:#x}", policy.pack());
        }
    }
}

/// Applies timeout changes to a simulated register file and prints the result.
fn cmd_timeout(
    config_path: &str,
    node: Option<&str>,
    enable: Option<bool>,
    val: Option<u32>,
    freeze: Option<bool>,
) {
    let config = load_config(config_path);
    let regs = SparseRegisters::new();
    let itmon = build(&config, regs.clone());
    let _ = itmon.arm();
    regs.clear_writes();

    if let Some(name) = node {
        let result = enable
            .map_or(Ok(()), |en| itmon.set_timeout(name, en))
            .and_then(|()| val.map_or(Ok(()), |v| itmon.set_timeout_val(name, v)))
            .and_then(|()| freeze.map_or(Ok(()), |f| itmon.set_timeout_freeze(name, f)));
        if let Err(e) = result {
            fail(e);
        }
    } else if enable.is_some() || val.is_some() || freeze.is_some() {
        fail("--enable/--val/--freeze need --node");
    }

    for status in itmon.timeout_status() {
        println!("  {status}");
    }
    let writes = regs.writes();
    if !writes.is_empty() {
        println!();
        println!("Register writes:");
        for (addr, val) in writes {
            println!("  {addr:#012x} <= {val:#010x}");
        }
    }
}

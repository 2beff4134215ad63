//! # Scanner Tests
//!
//! Status-vector walks, error-report banks, the protocol checker, and frozen
//! timeout ring buffers.

use itmon_core::common::constants::*;
use itmon_core::common::{Direction, ErrorCode, ItmonError};
use itmon_core::engine::{ScanTarget, TriageEngine};
use itmon_core::mmio::SparseRegisters;
use itmon_core::policy::ErrorClass;
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::common::harness::*;

const ADDR: u64 = 0x8000_1000;

#[test]
fn test_clean_board_finds_nothing() {
    let mut ctx = TestContext::new();
    let outcome = ctx.scan();
    assert_eq!(outcome.fault_count, 0);
    assert_eq!(outcome.action, None);
    assert!(outcome.report.is_empty());
    assert!(ctx.executor.taken().is_empty());
    assert_eq!(ctx.engine.stats().scans, 1);
    assert_eq!(ctx.engine.stats().faulty_scans, 0);
}

#[test]
fn test_record_pool_sized_from_topology() {
    let ctx = TestContext::new();
    assert_eq!(ctx.engine.record_capacity(), 7 * RECORDS_PER_NODE);
}

#[test]
fn test_error_report_bank_cleared_after_capture() {
    let mut ctx = TestContext::new();
    ctx.raise(DRAM0, OFFSET_REQ_R, Fault::new(SLVERR, 2, ADDR));
    let outcome = ctx.scan();
    assert_eq!(outcome.fault_count, 1);
    assert_eq!(ctx.regs.writes_to(DRAM0.base + OFFSET_REQ_R + REG_INT_CLR), vec![1]);
}

#[test]
fn test_no_clear_leaves_registers_untouched() {
    let mut ctx = TestContext::new();
    ctx.raise(DRAM0, OFFSET_REQ_R, Fault::new(SLVERR, 2, ADDR));
    let outcome = ctx.engine.scan_and_report(ScanTarget::All, false);
    assert_eq!(outcome.fault_count, 1);
    assert!(ctx.regs.writes().is_empty());
}

#[test]
fn test_every_valid_bank_counts() {
    let mut ctx = TestContext::new();
    ctx.raise(DRAM0, OFFSET_REQ_R, Fault::new(SLVERR, 2, ADDR));
    ctx.raise(DRAM0, OFFSET_REQ_W, Fault::new(SLVERR, 2, ADDR + 0x40));
    let outcome = ctx.scan();
    assert_eq!(outcome.fault_count, 2);
    assert_eq!(ctx.engine.stats().records, 2);
    let dirs: Vec<Direction> = outcome.transactions.iter().map(|t| t.dir).collect();
    assert_eq!(dirs, vec![Direction::Read, Direction::Write]);
}

#[test]
fn test_unflagged_node_is_not_probed() {
    let mut ctx = TestContext::new();
    ctx.regs.set(DRAM0.base + REG_INT_INFO, 1 << 26);
    assert_eq!(ctx.scan().fault_count, 0);
}

#[test]
fn test_flagged_node_without_valid_bank_finds_nothing() {
    let mut ctx = TestContext::new();
    ctx.flag(DRAM0);
    assert_eq!(ctx.scan().fault_count, 0);
    assert!(ctx.executor.taken().is_empty());
}

#[test]
fn test_unmapped_node_is_skipped() {
    // BUS_PERI has no status register, so GHOST is always probed and has no base.
    let mut ctx = TestContext::new();
    ctx.raise(UART_S, OFFSET_REQ_R, Fault::new(SLVERR, 2, ADDR));
    assert_eq!(ctx.scan().fault_count, 1);
}

#[test]
fn test_powered_off_group_is_skipped() {
    let mut ctx = TestContext::new();
    ctx.raise(UART_S, OFFSET_REQ_R, Fault::new(SLVERR, 2, ADDR));

    assert_eq!(ctx.engine.on_power_domain_change("PD_PERI", false), 1);
    assert_eq!(ctx.scan().fault_count, 0);

    let _ = ctx.engine.on_power_domain_change("PD_PERI", true);
    assert_eq!(ctx.scan().fault_count, 1);
}

#[test]
fn test_group_target_limits_scan() {
    let mut ctx = TestContext::new();
    ctx.raise(DRAM0, OFFSET_REQ_R, Fault::new(SLVERR, 2, ADDR));
    let peri = ctx.engine.topology().group_by_name("BUS_PERI").unwrap();
    let data = ctx.engine.topology().group_by_name("BUS_DATA").unwrap();

    assert_eq!(ctx.engine.scan_and_report(ScanTarget::Group(peri), true).fault_count, 0);
    assert_eq!(ctx.engine.scan_and_report(ScanTarget::Group(data), true).fault_count, 1);
}

#[test]
fn test_out_of_range_group_target_scans_nothing() {
    let mut ctx = TestContext::new();
    ctx.raise(DRAM0, OFFSET_REQ_R, Fault::new(SLVERR, 2, ADDR));
    let target = ScanTarget::Group(itmon_core::topology::GroupId(9));
    assert_eq!(ctx.engine.scan_and_report(target, true).fault_count, 0);
}

fn wide_board(ex_table: bool) -> serde_json::Value {
    let nodes: Vec<serde_json::Value> = (0..40u64)
        .map(|i| json!({ "name": format!("N{i}"), "type": "S_NODE", "regs": 0x2000_0000 + i * 0x1_0000 }))
        .collect();
    json!({
        "groups": [{ "name": "WIDE", "status_reg": 0x3000_0000u64, "ex_table": ex_table, "nodes": nodes }]
    })
}

#[test]
fn test_extended_table_reads_upper_vector_word() {
    let high = Node {
        name: "N33",
        base: 0x2000_0000 + 33 * 0x1_0000,
        status: None,
        bit: 33,
    };
    let mut ctx = TestContext::with_config(&config_from(wide_board(true)));
    ctx.raise(high, OFFSET_REQ_R, Fault::new(DECERR, 0, ADDR));
    ctx.regs.set(0x3000_0004, 1 << (33 - 32));
    assert_eq!(ctx.scan().fault_count, 1);
}

#[test]
fn test_wide_group_without_extended_table_is_rejected() {
    let config = config_from(wide_board(false));
    let err = TriageEngine::from_config(&config, Box::new(SparseRegisters::new())).unwrap_err();
    assert!(matches!(err, ItmonError::GroupTooLarge { count: 40, max: 32, .. }));
}

#[test]
fn test_protocol_checker_fault() {
    let mut ctx = TestContext::new();
    ctx.raise_prt_chk(DRAM0, 0x2);
    let outcome = ctx.scan();

    assert_eq!(outcome.fault_count, 1);
    assert_eq!(outcome.transactions.len(), 1);
    assert_eq!(outcome.transactions[0].errcode, ErrorCode::ProtocolChecker);
    assert_eq!(outcome.transactions[0].dest, "DRAM0");
    assert_eq!(outcome.class, Some(ErrorClass::ProtocolChecker));
    assert!(outcome.report.contains("protocol-checker"));
    assert_eq!(
        ctx.regs.writes_to(DRAM0.base + OFFSET_PRT_CHK + REG_PRT_CHK_INT),
        vec![1]
    );
}

#[test]
fn test_protocol_checker_ignored_when_disabled() {
    let mut ctx = TestContext::new();
    ctx.engine.enable_by_name("DRAM0", false).unwrap();
    ctx.raise_prt_chk(DRAM0, 0x2);
    assert_eq!(ctx.scan().fault_count, 0);
}

#[test]
fn test_timeout_buffer_dump() {
    let mut ctx = TestContext::new();
    ctx.freeze(
        DRAM0,
        Direction::Read,
        vec![
            tmout_slot(2, 0x1_8000_0000, 0, 3),
            [0; 5],
            tmout_slot(1, 0x2000, 0, 1),
        ],
    );
    let outcome = ctx.scan();

    assert_eq!(outcome.fault_count, 1);
    assert_eq!(outcome.timeouts.len(), 2);
    let first = &outcome.timeouts[0];
    assert_eq!((first.index, first.id, first.addr, first.timeout), (0, 2, 0x1_8000_0000, 3));
    assert_eq!((first.port.as_str(), first.master.as_str()), ("DMA", "DMA_CH0"));
    let second = &outcome.timeouts[1];
    assert_eq!(second.index, 2);
    assert_eq!((second.port.as_str(), second.master.as_str()), ("CPU0", "CPU0_CLUSTER"));

    assert!(outcome.report.contains("ITMON Timeout buffer: DRAM0 (READ)"));
    assert_eq!(ctx.engine.stats().timeout_entries, 2);

    let tmout = DRAM0.base + OFFSET_TMOUT_REG;
    assert_eq!(
        ctx.regs.writes_to(tmout + REG_TMOUT_BUF_POINT_ADDR).len(),
        TMOUT_BUF_READ_ENTRIES as usize
    );
    assert_eq!(ctx.regs.writes_to(tmout + REG_TMOUT_BUF_STATUS), vec![TMOUT_FRZ_READ]);
}

#[test]
fn test_timeout_record_per_frozen_direction() {
    let mut ctx = TestContext::new();
    ctx.freeze(DRAM0, Direction::Read, vec![tmout_slot(2, 0x1000, 0, 1)]);
    ctx.freeze(DRAM0, Direction::Write, vec![tmout_slot(2, 0x2000, 1, 1)]);
    let outcome = ctx.scan();

    assert_eq!(outcome.fault_count, 2);
    let dirs: Vec<(Direction, ErrorCode)> =
        outcome.transactions.iter().map(|t| (t.dir, t.errcode)).collect();
    assert_eq!(
        dirs,
        vec![(Direction::Read, ErrorCode::Timeout), (Direction::Write, ErrorCode::Timeout)]
    );
    let masters: Vec<&str> = outcome.timeouts.iter().map(|t| t.master.as_str()).collect();
    assert_eq!(masters, vec!["DMA_CH0", "DMA_CH1"]);

    let write_window = DRAM0.base + OFFSET_TMOUT_REG + REG_TMOUT_BUF_WR_OFFSET;
    assert_eq!(
        ctx.regs.writes_to(write_window + REG_TMOUT_BUF_POINT_ADDR).len(),
        TMOUT_BUF_WRITE_ENTRIES as usize
    );
}

#[test]
fn test_timeout_ignored_on_master_node() {
    let mut ctx = TestContext::new();
    ctx.freeze(CPU0, Direction::Read, vec![tmout_slot(1, 0x1000, 0, 1)]);
    let outcome = ctx.scan();
    assert_eq!(outcome.fault_count, 0);
    assert!(outcome.timeouts.is_empty());
}

#[test]
fn test_timeout_ignored_without_freeze_enable() {
    let mut ctx = TestContext::new();
    ctx.engine.set_timeout_freeze("DRAM0", false).unwrap();
    ctx.freeze(DRAM0, Direction::Read, vec![tmout_slot(2, 0x1000, 0, 1)]);
    assert_eq!(ctx.scan().fault_count, 0);
}

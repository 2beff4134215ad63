//! # Fault Cycle Tests
//!
//! End-to-end cycles: the final decision, node and notifier overrides, the
//! repeated-fault escalation rule, and what reaches the executor.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use itmon_core::common::Direction;
use itmon_core::common::constants::*;
use itmon_core::engine::{CyclePhase, ScanTarget, TriageEngine};
use itmon_core::mmio::SparseRegisters;
use itmon_core::notifier::{NotifyInfo, NotifyResult};
use itmon_core::policy::{Action, ErrorClass};
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::common::harness::*;
use crate::common::mocks::executor::MockExecutor;

const ADDR: u64 = 0x8000_1000;

fn with_customize(entries: serde_json::Value) -> TestContext {
    let mut board = board();
    board["customize"] = entries;
    TestContext::with_config(&config_from(board))
}

#[test]
fn test_slave_error_takes_default_action() {
    let mut ctx = TestContext::new();
    ctx.raise(DRAM0, OFFSET_REQ_R, Fault::new(SLVERR, 2, ADDR).user(1));
    let outcome = ctx.scan();

    assert_eq!(outcome.fault_count, 1);
    assert_eq!(outcome.class, Some(ErrorClass::SlaveError));
    assert_eq!(outcome.action, Some(Action::Default));
    assert!(!outcome.escalated);
    assert_eq!(ctx.executor.taken(), vec![Action::Default]);
    assert_eq!(ctx.engine.phase(), CyclePhase::Idle);
}

#[test]
fn test_report_layout() {
    let mut ctx = TestContext::new();
    ctx.raise(DRAM0, OFFSET_REQ_R, Fault::new(SLVERR, 2, ADDR).user(1));
    let report = ctx.scan().report;

    let path = report.find("PATH Information").unwrap();
    let transaction = report.find("TRANSACTION Information").unwrap();
    let raw = report.find("> DRAM0(S_NODE) READ error-report").unwrap();
    assert!(path < transaction && transaction < raw);
    assert!(report.contains("ITMON Report (READ)"));
    assert!(report.contains("> DMA -> DRAM0"));
    assert!(report.contains("> Master         : DMA_CH1 (DMA)"));
    assert!(report.contains("> Error code     : Error Detect by the Slave(SLVERR)"));
    assert!(report.contains("> Power domain   : on"));
}

#[test]
fn test_fatal_code_panics() {
    let mut ctx = TestContext::new();
    ctx.raise(DRAM0, OFFSET_REQ_R, Fault::new(UNSUPPORTED, 2, ADDR));
    let outcome = ctx.scan();
    assert_eq!(outcome.class, Some(ErrorClass::Fatal));
    assert_eq!(outcome.action, Some(Action::Panic));
}

#[test]
fn test_most_severe_class_decides() {
    let mut ctx = TestContext::new();
    ctx.raise(DRAM0, OFFSET_REQ_R, Fault::new(SLVERR, 2, ADDR));
    ctx.freeze(PERI_MID, Direction::Write, vec![tmout_slot(2, 0x1000, 0, 1)]);
    let outcome = ctx.scan();

    assert_eq!(outcome.fault_count, 2);
    assert_eq!(outcome.class, Some(ErrorClass::Timeout));
    assert_eq!(outcome.action, Some(Action::Panic));
}

#[test]
fn test_timeout_default_and_node_job() {
    let mut ctx = TestContext::new();
    ctx.freeze(DRAM0, Direction::Read, vec![tmout_slot(2, 0x1_8000_0000, 0, 3)]);
    let outcome = ctx.scan();
    assert_eq!(outcome.timeouts.len(), 1);
    assert_eq!(outcome.transactions[0].port, "");
    assert_eq!(outcome.action, Some(Action::Panic));

    let mut ctx = with_customize(json!([
        { "node": "DRAM0", "chk_set": true, "prio": 2, "tmout_job": "watchdog" }
    ]));
    ctx.freeze(DRAM0, Direction::Read, vec![tmout_slot(2, 0x1_8000_0000, 0, 3)]);
    let outcome = ctx.scan();
    assert_eq!(outcome.class, Some(ErrorClass::Timeout));
    assert_eq!(outcome.action, Some(Action::Watchdog));
}

#[test]
fn test_node_job_ignored_without_chk_set() {
    let mut ctx = with_customize(json!([{ "node": "DRAM0", "slverr_job": "halt" }]));
    ctx.raise(DRAM0, OFFSET_REQ_R, Fault::new(SLVERR, 2, ADDR));
    assert_eq!(ctx.scan().action, Some(Action::Default));
}

#[test]
fn test_higher_priority_end_of_transaction_wins() {
    let mut ctx = with_customize(json!([
        { "node": "DRAM0", "chk_set": true, "prio": 1, "decerr_job": "watchdog" },
        { "node": "DMA", "chk_set": true, "prio": 4, "decerr_job": "array_dump" }
    ]));
    ctx.raise(DMA, OFFSET_RESP_R, Fault::new(DECERR, 2, ADDR));
    ctx.raise(DRAM0, OFFSET_REQ_R, Fault::new(DECERR, 2, ADDR));
    let outcome = ctx.scan();
    assert_eq!(outcome.transactions.len(), 1);
    assert_eq!(outcome.action, Some(Action::ArrayDump));
    assert_eq!(ctx.engine.policy().slot(ErrorClass::DecodeError).prio, 4);
}

#[test]
fn test_priority_tie_goes_to_slave() {
    let mut ctx = with_customize(json!([
        { "node": "DRAM0", "chk_set": true, "prio": 3, "decerr_job": "panic" },
        { "node": "DMA", "chk_set": true, "prio": 3, "decerr_job": "halt" }
    ]));
    ctx.raise(DMA, OFFSET_RESP_R, Fault::new(DECERR, 2, ADDR));
    ctx.raise(DRAM0, OFFSET_REQ_R, Fault::new(DECERR, 2, ADDR));
    assert_eq!(ctx.scan().action, Some(Action::Panic));
}

#[test]
fn test_notifier_sees_each_transaction() {
    let mut ctx = TestContext::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _ = ctx.engine.register_notifier(Box::new(move |info: &NotifyInfo<'_>| {
        sink.lock()
            .unwrap()
            .push(format!("{}/{}->{} read={}", info.port, info.master, info.dest, info.read));
        NotifyResult::Ok
    }));
    ctx.raise(DRAM0, OFFSET_REQ_R, Fault::new(SLVERR, 2, ADDR).user(1));
    ctx.raise(DRAM0, OFFSET_REQ_W, Fault::new(SLVERR, 1, ADDR));
    let _ = ctx.scan();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            "DMA/DMA_CH1->DRAM0 read=true".to_string(),
            "CPU0/CPU0_CLUSTER->DRAM0 read=false".to_string()
        ]
    );
}

#[test]
fn test_notifier_override_beats_node_priority() {
    let mut ctx = with_customize(json!([
        { "node": "DRAM0", "chk_set": true, "prio": 7, "slverr_job": "halt" }
    ]));
    let _ = ctx
        .engine
        .register_notifier(Box::new(|_: &NotifyInfo<'_>| NotifyResult::Override(Action::Watchdog)));
    ctx.raise(DRAM0, OFFSET_REQ_R, Fault::new(SLVERR, 2, ADDR));
    let outcome = ctx.scan();

    assert_eq!(outcome.action, Some(Action::Watchdog));
    assert!(ctx.engine.policy().slot(ErrorClass::SlaveError).pinned);
}

#[test]
fn test_pinned_class_ignores_later_transactions() {
    let mut ctx = with_customize(json!([
        { "node": "PERI_MID", "chk_set": true, "prio": 7, "slverr_job": "halt" }
    ]));
    let calls = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&calls);
    let _ = ctx.engine.register_notifier(Box::new(move |_: &NotifyInfo<'_>| {
        let mut n = counter.lock().unwrap();
        *n += 1;
        if *n == 1 {
            NotifyResult::Override(Action::StoreToDram)
        } else {
            NotifyResult::Ok
        }
    }));
    ctx.raise(DRAM0, OFFSET_REQ_R, Fault::new(SLVERR, 2, ADDR));
    ctx.raise(PERI_MID, OFFSET_REQ_R, Fault::new(SLVERR, 2, ADDR));
    let outcome = ctx.scan();

    assert_eq!(*calls.lock().unwrap(), 2);
    assert_eq!(outcome.action, Some(Action::StoreToDram));
}

#[test]
fn test_unregistered_notifier_is_not_called() {
    let mut ctx = TestContext::new();
    let id = ctx
        .engine
        .register_notifier(Box::new(|_: &NotifyInfo<'_>| NotifyResult::Override(Action::Halt)));
    assert!(ctx.engine.unregister_notifier(id));
    ctx.raise(DRAM0, OFFSET_REQ_R, Fault::new(SLVERR, 2, ADDR));
    assert_eq!(ctx.scan().action, Some(Action::Default));
}

#[test]
fn test_policy_resets_between_cycles() {
    let mut ctx = TestContext::new();
    let id = ctx
        .engine
        .register_notifier(Box::new(|_: &NotifyInfo<'_>| NotifyResult::Override(Action::Halt)));
    ctx.raise(DRAM0, OFFSET_REQ_R, Fault::new(SLVERR, 2, ADDR));
    assert_eq!(ctx.scan().action, Some(Action::Halt));

    let _ = ctx.engine.unregister_notifier(id);
    ctx.clock.advance(Duration::from_secs(5));
    assert_eq!(ctx.scan().action, Some(Action::Default));
}

#[test]
fn test_escalation_fires_once_per_burst() {
    let mut ctx = TestContext::new();
    ctx.raise(DRAM0, OFFSET_REQ_R, Fault::new(SLVERR, 2, ADDR));

    let mut escalated = Vec::new();
    for _ in 0..9 {
        let outcome = ctx.scan();
        escalated.push(outcome.escalated);
        ctx.clock.advance(Duration::from_millis(100));
    }
    let fired: Vec<usize> = escalated
        .iter()
        .enumerate()
        .filter_map(|(i, e)| e.then_some(i))
        .collect();
    assert_eq!(fired, vec![ERR_THRESHOLD as usize + 1]);

    let taken = ctx.executor.taken();
    assert_eq!(taken[ERR_THRESHOLD as usize + 1], Action::Halt);
    assert_eq!(taken.iter().filter(|a| **a == Action::Halt).count(), 1);
    assert_eq!(ctx.engine.stats().escalations, 1);
}

#[test]
fn test_escalation_resets_after_quiet_gap() {
    let mut ctx = TestContext::new();
    ctx.raise(DRAM0, OFFSET_REQ_R, Fault::new(SLVERR, 2, ADDR));

    for _ in 0..ERR_THRESHOLD {
        assert!(!ctx.scan().escalated);
        ctx.clock.advance(Duration::from_millis(100));
    }
    ctx.clock.advance(Duration::from_secs(2));
    for _ in 0..=ERR_THRESHOLD {
        assert!(!ctx.scan().escalated);
        ctx.clock.advance(Duration::from_millis(100));
    }
    assert!(ctx.scan().escalated);
}

#[test]
fn test_escalation_uses_configured_action() {
    let mut board = board();
    board["policy"] = json!({ "escalation": "scan_dump", "err_threshold": 1 });
    let mut ctx = TestContext::with_config(&config_from(board));
    ctx.raise(DRAM0, OFFSET_REQ_R, Fault::new(SLVERR, 2, ADDR));

    let actions: Vec<Option<Action>> = (0..3)
        .map(|_| {
            let action = ctx.scan().action;
            ctx.clock.advance(Duration::from_millis(10));
            action
        })
        .collect();
    assert_eq!(
        actions,
        vec![Some(Action::Default), Some(Action::Default), Some(Action::ScanDump)]
    );
}

#[test]
fn test_clean_cycles_do_not_count_toward_escalation() {
    let mut ctx = TestContext::new();
    for _ in 0..20 {
        let _ = ctx.scan();
        ctx.clock.advance(Duration::from_millis(10));
    }
    assert_eq!(ctx.engine.stats().escalations, 0);
    assert!(ctx.executor.taken().is_empty());
}

#[test]
fn test_executor_not_called_without_faults() {
    let mut mock = MockExecutor::new();
    let _ = mock.expect_execute().times(0);
    let config = config_from(board());
    let mut engine = TriageEngine::from_config(&config, Box::new(SparseRegisters::new()))
        .unwrap()
        .with_executor(Box::new(mock));

    let outcome = engine.scan_and_report(ScanTarget::All, true);
    assert_eq!(outcome.action, None);
    assert_eq!(outcome.class, None);
}

#[test]
fn test_executor_called_once_per_faulty_cycle() {
    let regs = SparseRegisters::new();
    let mut mock = MockExecutor::new();
    let _ = mock
        .expect_execute()
        .withf(|action| *action == Action::Panic)
        .times(1)
        .return_const(());
    let mut engine = TriageEngine::from_config(&config_from(board()), Box::new(regs.clone()))
        .unwrap()
        .with_executor(Box::new(mock));

    regs.set(DRAM0.base + REG_INT_INFO, (1 << 26) | (UNSUPPORTED << 28) | 2);
    regs.set(BUS_STATUS, 1 << DRAM0.bit);
    let outcome = engine.scan_and_report(ScanTarget::All, true);
    assert_eq!(outcome.action, Some(Action::Panic));
}

#[test]
fn test_stats_after_cycles() {
    let mut ctx = TestContext::new();
    let _ = ctx.scan();
    ctx.raise(DRAM0, OFFSET_REQ_R, Fault::new(SLVERR, 2, ADDR));
    ctx.raise(DMA, OFFSET_RESP_R, Fault::new(SLVERR, 2, ADDR));
    let _ = ctx.scan();

    let stats = ctx.engine.stats();
    assert_eq!(stats.scans, 2);
    assert_eq!(stats.faulty_scans, 1);
    assert_eq!(stats.faults, 2);
    assert_eq!(stats.records, 2);
    assert_eq!(stats.transactions, 1);
    assert_eq!(stats.class_count(ErrorClass::SlaveError), 1);
    assert_eq!(stats.class_count(ErrorClass::Fatal), 0);
    assert_eq!(stats.last_action, Some(Action::Default));
}

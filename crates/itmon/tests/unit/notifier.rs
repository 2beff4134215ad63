//! # Notifier Tests
//!
//! Chain ordering, early stop, override aggregation, and raw return values.

use std::sync::{Arc, Mutex};

use itmon_core::common::ErrorCode;
use itmon_core::notifier::*;
use itmon_core::policy::Action;
use pretty_assertions::assert_eq;
use rstest::rstest;

fn sample() -> NotifyInfo<'static> {
    NotifyInfo {
        port: "DMA",
        master: "DMA_CH0",
        dest: "DRAM0",
        read: true,
        target_addr: 0x8000_0000,
        errcode: ErrorCode::SlaveError,
        onoff: true,
    }
}

fn tracer(log: &Arc<Mutex<Vec<&'static str>>>, tag: &'static str, ret: NotifyResult) -> NotifierFn {
    let log = Arc::clone(log);
    Box::new(move |_: &NotifyInfo<'_>| {
        log.lock().unwrap().push(tag);
        ret
    })
}

#[test]
fn test_empty_chain_is_ok() {
    let mut chain = NotifierChain::new();
    assert!(chain.is_empty());
    assert_eq!(chain.call(&sample()), NotifyResult::Ok);
}

#[test]
fn test_callbacks_run_in_registration_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut chain = NotifierChain::new();
    let _ = chain.register(tracer(&log, "first", NotifyResult::Ok));
    let _ = chain.register(tracer(&log, "second", NotifyResult::Ok));
    let _ = chain.register(tracer(&log, "third", NotifyResult::Ok));
    assert_eq!(chain.len(), 3);

    assert_eq!(chain.call(&sample()), NotifyResult::Ok);
    assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
}

#[test]
fn test_stop_skips_remaining_callbacks() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut chain = NotifierChain::new();
    let _ = chain.register(tracer(&log, "first", NotifyResult::Stop));
    let _ = chain.register(tracer(&log, "second", NotifyResult::Override(Action::Halt)));

    assert_eq!(chain.call(&sample()), NotifyResult::Stop);
    assert_eq!(*log.lock().unwrap(), vec!["first"]);
}

#[test]
fn test_override_survives_later_stop() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut chain = NotifierChain::new();
    let _ = chain.register(tracer(&log, "a", NotifyResult::Override(Action::Watchdog)));
    let _ = chain.register(tracer(&log, "b", NotifyResult::Stop));

    assert_eq!(chain.call(&sample()), NotifyResult::Override(Action::Watchdog));
}

#[test]
fn test_most_severe_override_wins() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut chain = NotifierChain::new();
    let _ = chain.register(tracer(&log, "a", NotifyResult::Override(Action::Watchdog)));
    let _ = chain.register(tracer(&log, "b", NotifyResult::Override(Action::ScanDump)));
    let _ = chain.register(tracer(&log, "c", NotifyResult::Override(Action::Panic)));

    assert_eq!(chain.call(&sample()), NotifyResult::Override(Action::ScanDump));
}

#[test]
fn test_unregister_removes_only_that_callback() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut chain = NotifierChain::new();
    let first = chain.register(tracer(&log, "first", NotifyResult::Ok));
    let _ = chain.register(tracer(&log, "second", NotifyResult::Ok));

    assert!(chain.unregister(first));
    assert!(!chain.unregister(first));
    let _ = chain.call(&sample());
    assert_eq!(*log.lock().unwrap(), vec!["second"]);
}

#[test]
fn test_callback_sees_transaction() {
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    let mut chain = NotifierChain::new();
    let _ = chain.register(Box::new(move |info: &NotifyInfo<'_>| {
        *sink.lock().unwrap() = Some((info.port.to_string(), info.dest.to_string(), info.errcode));
        NotifyResult::Ok
    }));
    let _ = chain.call(&sample());
    assert_eq!(
        *seen.lock().unwrap(),
        Some(("DMA".to_string(), "DRAM0".to_string(), ErrorCode::SlaveError))
    );
}

#[rstest]
#[case(0x0000_0001, NotifyResult::Ok)]
#[case(0x0000_0000, NotifyResult::Ok)]
#[case(0x0000_8000, NotifyResult::Stop)]
#[case(0x0000_8002, NotifyResult::Stop)]
#[case(0x1324_0000, NotifyResult::Override(Action::Default))]
#[case(0x1324_0006, NotifyResult::Override(Action::Halt))]
#[case(0x1324_0009, NotifyResult::Ok)]
fn test_raw_results(#[case] raw: u32, #[case] expected: NotifyResult) {
    assert_eq!(NotifyResult::from_raw(raw), expected);
}

#[test]
fn test_raw_encoding() {
    assert_eq!(NotifyResult::Ok.to_raw(), NOTIFY_OK);
    assert_eq!(NotifyResult::Stop.to_raw(), NOTIFY_STOP_MASK);
    assert_eq!(NotifyResult::Override(Action::StoreToDram).to_raw(), ITMON_NOTIFY_MASK | 3);
}

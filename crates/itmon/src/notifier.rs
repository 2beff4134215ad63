//! Notifier chain for resolved transactions.
//!
//! Other subsystems register callbacks that see every resolved transaction of a
//! fault cycle, synchronously and in registration order, before the transaction
//! is released. A callback may stop the chain or force a recovery action for the
//! transaction's error class.
//!
//! Callbacks run with the engine lock held and must not call back into the
//! [`Itmon`](crate::engine::Itmon) handle.

use std::fmt;

use crate::common::ErrorCode;
use crate::policy::Action;

/// Marker in the upper half of a raw return value that requests a policy override.
pub const ITMON_NOTIFY_MASK: u32 = 0x1324_0000;
/// Raw "stop the chain" bit.
pub const NOTIFY_STOP_MASK: u32 = 0x8000;
/// Raw "handled, continue" value.
pub const NOTIFY_OK: u32 = 0x0001;

/// Transaction summary passed to callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyInfo<'a> {
    /// Originating port, empty if unresolved.
    pub port: &'a str,
    /// Originating master, empty if unresolved.
    pub master: &'a str,
    /// Destination node, empty if unresolved.
    pub dest: &'a str,
    /// Read transaction.
    pub read: bool,
    /// Target address.
    pub target_addr: u64,
    /// Error code.
    pub errcode: ErrorCode,
    /// Destination power domain was on.
    pub onoff: bool,
}

/// Callback return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotifyResult {
    /// Continue with the next callback.
    #[default]
    Ok,
    /// Skip the remaining callbacks.
    Stop,
    /// Force `Action` for this transaction's error class for the rest of the cycle.
    Override(Action),
}

impl NotifyResult {
    /// Decodes a raw return value (`ITMON_NOTIFY_MASK | action`, stop bit, or plain status).
    ///
    /// An override naming an undefined action decodes as [`NotifyResult::Ok`].
    pub fn from_raw(raw: u32) -> Self {
        if raw & 0xFFFF_0000 == ITMON_NOTIFY_MASK {
            return Action::from_index((raw & 0xF) as u8).map_or(Self::Ok, Self::Override);
        }
        if raw & NOTIFY_STOP_MASK != 0 {
            Self::Stop
        } else {
            Self::Ok
        }
    }

    /// Encodes this result as a raw return value.
    pub const fn to_raw(self) -> u32 {
        match self {
            Self::Ok => NOTIFY_OK,
            Self::Stop => NOTIFY_STOP_MASK,
            Self::Override(action) => ITMON_NOTIFY_MASK | action.index() as u32,
        }
    }
}

/// Handle returned by [`NotifierChain::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotifierId(u64);

/// Boxed notifier callback.
pub type NotifierFn = Box<dyn FnMut(&NotifyInfo<'_>) -> NotifyResult + Send>;

/// Ordered list of callbacks.
#[derive(Default)]
pub struct NotifierChain {
    next_id: u64,
    entries: Vec<(NotifierId, NotifierFn)>,
}

impl fmt::Debug for NotifierChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifierChain")
            .field("callbacks", &self.entries.len())
            .finish()
    }
}

impl NotifierChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a callback.
    pub fn register(&mut self, callback: NotifierFn) -> NotifierId {
        let id = NotifierId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, callback));
        id
    }

    /// Removes a callback; returns `false` if `id` was not registered.
    pub fn unregister(&mut self, id: NotifierId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no callback is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Calls every callback in order until one returns [`NotifyResult::Stop`].
    ///
    /// Returns the most severe override seen, or the last plain status.
    pub fn call(&mut self, info: &NotifyInfo<'_>) -> NotifyResult {
        let mut result = NotifyResult::Ok;
        let mut forced: Option<Action> = None;
        for (_, callback) in &mut self.entries {
            match callback(info) {
                NotifyResult::Override(action) => {
                    forced = Some(forced.map_or(action, |prev| prev.max(action)));
                }
                NotifyResult::Stop => {
                    result = NotifyResult::Stop;
                    break;
                }
                NotifyResult::Ok => {}
            }
        }
        forced.map_or(result, NotifyResult::Override)
    }
}

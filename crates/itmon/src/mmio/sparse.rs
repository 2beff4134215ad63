//! Sparse in-memory register file.
//!
//! Backs the CLI's offline analysis of captured register images and the test
//! harness. Unpopulated addresses read as zero. Clones share storage, so a caller
//! can keep a handle to inspect or re-seed registers after moving another clone
//! into an engine.
//!
//! Timeout ring buffers are modeled as pointer-selected windows: writing the
//! pointer register of a window selects the slot its id and payload registers read.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::common::constants::{
    REG_TMOUT_BUF_ID, REG_TMOUT_BUF_PAYLOAD_0, REG_TMOUT_BUF_PAYLOAD_1, REG_TMOUT_BUF_PAYLOAD_2,
    REG_TMOUT_BUF_PAYLOAD_3, REG_TMOUT_BUF_POINT_ADDR,
};
use crate::mmio::Mmio;

/// One ring-buffer slot: `[id, payload0, payload1, payload2, payload3]`.
pub type RingSlot = [u32; 5];

#[derive(Debug, Default)]
struct Ring {
    pointer: u32,
    slots: Vec<RingSlot>,
}

#[derive(Debug, Default)]
struct Inner {
    regs: BTreeMap<u64, u32>,
    writes: Vec<(u64, u32)>,
    rings: BTreeMap<u64, Ring>,
}

impl Inner {
    /// Ring and register index addressed by `addr`, if it falls in a ring window.
    fn ring_reg(&mut self, addr: u64) -> Option<(&mut Ring, u64)> {
        let (window, ring) = self.rings.range_mut(..=addr).next_back()?;
        let offset = addr - window;
        (offset <= REG_TMOUT_BUF_PAYLOAD_3).then_some((ring, offset))
    }
}

/// Register file keyed by physical address.
#[derive(Debug, Clone, Default)]
pub struct SparseRegisters {
    inner: Arc<Mutex<Inner>>,
}

impl SparseRegisters {
    /// Creates an empty register file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a register file populated from `(address, value)` pairs.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (u64, u32)>,
    {
        let regs = Self::new();
        for (addr, val) in pairs {
            regs.set(addr, val);
        }
        regs
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets a register without logging it as a write.
    pub fn set(&self, addr: u64, val: u32) {
        let _ = self.lock().regs.insert(addr, val);
    }

    /// Current value of a register.
    pub fn get(&self, addr: u64) -> u32 {
        self.lock().regs.get(&addr).copied().unwrap_or(0)
    }

    /// All writes issued through [`Mmio::write_u32`], in order.
    pub fn writes(&self) -> Vec<(u64, u32)> {
        self.lock().writes.clone()
    }

    /// Writes issued to `addr`, in order.
    pub fn writes_to(&self, addr: u64) -> Vec<u32> {
        self.lock()
            .writes
            .iter()
            .filter(|(a, _)| *a == addr)
            .map(|(_, v)| *v)
            .collect()
    }

    /// Forgets the write log.
    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }

    /// Installs a ring buffer whose pointer, id, and payload registers sit at `window`.
    ///
    /// Slots past the end of `slots` read as zero.
    pub fn set_ring(&self, window: u64, slots: Vec<RingSlot>) {
        let _ = self.lock().rings.insert(window, Ring { pointer: 0, slots });
    }

    /// Number of populated registers.
    pub fn len(&self) -> usize {
        self.lock().regs.len()
    }

    /// Returns `true` if no register is populated.
    pub fn is_empty(&self) -> bool {
        self.lock().regs.is_empty()
    }
}

impl Mmio for SparseRegisters {
    fn read_u32(&mut self, addr: u64) -> u32 {
        let mut inner = self.lock();
        if let Some((ring, offset)) = inner.ring_reg(addr) {
            let field = match offset {
                REG_TMOUT_BUF_ID => Some(0),
                REG_TMOUT_BUF_PAYLOAD_0 => Some(1),
                REG_TMOUT_BUF_PAYLOAD_1 => Some(2),
                REG_TMOUT_BUF_PAYLOAD_2 => Some(3),
                REG_TMOUT_BUF_PAYLOAD_3 => Some(4),
                _ => None,
            };
            if let Some(field) = field {
                return ring
                    .slots
                    .get(ring.pointer as usize)
                    .map_or(0, |slot| slot[field]);
            }
        }
        inner.regs.get(&addr).copied().unwrap_or(0)
    }

    fn write_u32(&mut self, addr: u64, val: u32) {
        let mut inner = self.lock();
        inner.writes.push((addr, val));
        if let Some((ring, REG_TMOUT_BUF_POINT_ADDR)) = inner.ring_reg(addr) {
            ring.pointer = val;
        }
        let _ = inner.regs.insert(addr, val);
    }
}

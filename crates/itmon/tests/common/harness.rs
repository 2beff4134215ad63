use itmon_core::common::Direction;
use itmon_core::common::constants::{
    OFFSET_PRT_CHK, OFFSET_TMOUT_REG, REG_EXT_INFO_0, REG_EXT_INFO_1, REG_EXT_INFO_2,
    REG_EXT_USER, REG_INT_INFO, REG_PRT_CHK_INT, REG_PRT_CHK_INT_ID, REG_TMOUT_BUF_STATUS,
    REG_TMOUT_BUF_WR_OFFSET,
};
use itmon_core::config::ItmonConfig;
use itmon_core::engine::{ScanOutcome, ScanTarget, TriageEngine};
use itmon_core::mmio::{RingSlot, SparseRegisters};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use crate::common::mocks::clock::ManualClock;
use crate::common::mocks::executor::RecordingExecutor;

/// Status vector of the `BUS_DATA` group.
pub const BUS_STATUS: u64 = 0x1000_0000;

/// A node of the fixture board: register base and status-vector bit.
#[derive(Debug, Clone, Copy)]
pub struct Node {
    pub name: &'static str,
    pub base: u64,
    pub status: Option<u64>,
    pub bit: u32,
}

pub const CPU0: Node = Node {
    name: "CPU0",
    base: 0x1001_0000,
    status: Some(BUS_STATUS),
    bit: 0,
};
pub const DMA: Node = Node {
    name: "DMA",
    base: 0x1002_0000,
    status: Some(BUS_STATUS),
    bit: 1,
};
pub const TAXI_S: Node = Node {
    name: "TAXI_S",
    base: 0x1003_0000,
    status: Some(BUS_STATUS),
    bit: 2,
};
pub const DRAM0: Node = Node {
    name: "DRAM0",
    base: 0x1004_0000,
    status: Some(BUS_STATUS),
    bit: 3,
};
pub const PERI_MID: Node = Node {
    name: "PERI_MID",
    base: 0x1005_0000,
    status: Some(BUS_STATUS),
    bit: 4,
};
pub const UART_S: Node = Node {
    name: "UART_S",
    base: 0x1100_0000,
    status: None,
    bit: 0,
};

/// Protection-remapper redirect address of the fixture board.
pub const BAAW_ADDR: u64 = 0xF000_0000;

/// Installs a test-writer subscriber once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

/// Fixture board: a data bus with two masters, a relay, two slaves, and a
/// power-gated peripheral bus without a status register.
pub fn board() -> serde_json::Value {
    json!({
        "groups": [
            {
                "name": "BUS_DATA",
                "status_reg": BUS_STATUS,
                "path": "ext_tagged",
                "nodes": [
                    { "name": "CPU0", "type": "M_NODE", "regs": CPU0.base },
                    { "name": "DMA", "type": "M_NODE", "regs": DMA.base },
                    { "name": "TAXI_S", "type": "T_S_NODE", "regs": TAXI_S.base },
                    { "name": "DRAM0", "type": "S_NODE", "regs": DRAM0.base },
                    { "name": "PERI_MID", "type": "S_NODE", "regs": PERI_MID.base }
                ]
            },
            {
                "name": "BUS_PERI",
                "path": "peripheral",
                "power_domain": "PD_PERI",
                "nodes": [
                    { "name": "UART_S", "type": "S_NODE", "regs": UART_S.base },
                    { "name": "GHOST", "type": "S_NODE" }
                ]
            }
        ],
        "routes": [
            { "port": "DMA", "dest": "DRAM0", "id": 2, "mask": 0xF },
            { "port": "CPU0", "dest": "DRAM0", "id": 1, "mask": 0xF },
            { "port": "DMA", "dest": "UART_S", "id": 2, "mask": 0xF },
            { "port": "DMA", "dest": "PERI_MID", "id": 2, "mask": 0xF }
        ],
        "masters": [
            { "port": "DMA", "master": "DMA_CH0", "user": 0, "mask": 0xF },
            { "port": "DMA", "master": "DMA_CH1", "user": 1, "mask": 0xF },
            { "port": "CPU0", "master": "CPU0_CLUSTER", "user": 0, "mask": 0 },
            { "port": "CPU1", "master": "CPU_CORE1", "user": 0, "mask": 0 }
        ],
        "midpoints": ["PERI_MID"],
        "baaw_addrs": [BAAW_ADDR],
        "cpu_origin": { "mask": 0x80, "value": 0x80, "core_mask": 0x7, "prefix": "CPU" }
    })
}

/// Parses `value` as a board configuration.
pub fn config_from(value: serde_json::Value) -> ItmonConfig {
    serde_json::from_value(value).unwrap()
}

/// Captured transaction fields to seed into an error-report bank.
#[derive(Debug, Clone, Copy)]
pub struct Fault {
    pub code: u32,
    pub axid: u32,
    pub addr: u64,
    pub user: u32,
    pub len: u32,
    pub size: u32,
    pub burst: u32,
    pub prot: u32,
}

impl Fault {
    pub const fn new(code: u32, axid: u32, addr: u64) -> Self {
        Self {
            code,
            axid,
            addr,
            user: 0,
            len: 0,
            size: 2,
            burst: 1,
            prot: 0,
        }
    }

    pub const fn user(mut self, user: u32) -> Self {
        self.user = user;
        self
    }

    pub const fn shape(mut self, len: u32, size: u32, burst: u32, prot: u32) -> Self {
        self.len = len;
        self.size = size;
        self.burst = burst;
        self.prot = prot;
        self
    }
}

/// Error codes as latched in `INT_INFO[31:28]`.
pub const SLVERR: u32 = 0;
pub const DECERR: u32 = 1;
pub const UNSUPPORTED: u32 = 2;

/// Owns a board, its register file, and an engine wired to a manual clock and a
/// recording executor.
pub struct TestContext {
    pub regs: SparseRegisters,
    pub clock: ManualClock,
    pub executor: RecordingExecutor,
    pub engine: TriageEngine,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(&config_from(board()))
    }

    pub fn with_config(config: &ItmonConfig) -> Self {
        init_tracing();
        let regs = SparseRegisters::new();
        let clock = ManualClock::new();
        let executor = RecordingExecutor::new();
        let engine = TriageEngine::from_config(config, Box::new(regs.clone()))
            .unwrap()
            .with_clock(Box::new(clock.clone()))
            .with_executor(Box::new(executor.clone()));
        Self {
            regs,
            clock,
            executor,
            engine,
        }
    }

    /// Sets `node`'s bit in its group status vector.
    pub fn flag(&self, node: Node) {
        if let Some(status) = node.status {
            let old = self.regs.get(status);
            self.regs.set(status, old | (1 << node.bit));
        }
    }

    /// Latches `fault` in the sub-bank at `offset` of `node` and flags the node.
    pub fn raise(&self, node: Node, offset: u64, fault: Fault) {
        let bank = node.base + offset;
        let int_info = (1 << 26) | (fault.code << 28) | (fault.axid & 0xFFFF);
        let ext1 = ((fault.addr >> 32) as u32 & 0xFFFF) | (fault.len << 16) | (fault.size << 28);
        let ext2 = fault.burst | (fault.prot << 2) | (fault.user << 16);
        self.regs.set(bank + REG_INT_INFO, int_info);
        self.regs.set(bank + REG_EXT_INFO_0, fault.addr as u32);
        self.regs.set(bank + REG_EXT_INFO_1, ext1);
        self.regs.set(bank + REG_EXT_INFO_2, ext2);
        self.regs.set(bank + REG_EXT_USER, fault.user);
        self.flag(node);
    }

    /// Latches a protocol-checker violation on `node`.
    pub fn raise_prt_chk(&self, node: Node, int_id: u32) {
        let prt = node.base + OFFSET_PRT_CHK;
        self.regs.set(prt + REG_PRT_CHK_INT, 1);
        self.regs.set(prt + REG_PRT_CHK_INT_ID, int_id);
        self.flag(node);
    }

    /// Freezes the timeout buffer of `dir` on `node` with `slots`.
    pub fn freeze(&self, node: Node, dir: Direction, slots: Vec<RingSlot>) {
        let tmout = node.base + OFFSET_TMOUT_REG;
        let status = self.regs.get(tmout + REG_TMOUT_BUF_STATUS) | dir.freeze_bit();
        self.regs.set(tmout + REG_TMOUT_BUF_STATUS, status);
        let window = match dir {
            Direction::Read => tmout,
            Direction::Write => tmout + REG_TMOUT_BUF_WR_OFFSET,
        };
        self.regs.set_ring(window, slots);
        self.flag(node);
    }

    /// Runs one cycle over every group, clearing what it finds.
    pub fn scan(&mut self) -> ScanOutcome {
        self.engine.scan_and_report(ScanTarget::All, true)
    }
}

/// Builds a valid timeout ring-buffer slot.
pub const fn tmout_slot(id: u32, addr: u64, user: u32, counter: u32) -> RingSlot {
    [
        id,
        1 | (counter << 16),
        addr as u32,
        ((addr >> 32) as u32) & 0x3F,
        user,
    ]
}

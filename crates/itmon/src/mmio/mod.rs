//! Register access for ITMON blocks.
//!
//! The engine never touches memory directly; every register read and write goes
//! through the [`Mmio`] trait so that the same triage code runs against mapped
//! hardware, a recorded register image, or a test double.

/// In-memory register file.
pub mod sparse;

/// Register access trait.
pub mod traits;

pub use sparse::{RingSlot, SparseRegisters};
pub use traits::Mmio;

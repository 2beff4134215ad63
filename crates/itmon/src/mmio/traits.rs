//! Register access trait for memory-mapped ITMON blocks.
//!
//! All implementors must be `Send` so an engine can be moved into the context that
//! owns the interrupt line.

/// 32-bit register access by physical address.
///
/// Reads take `&mut self` because reading some ITMON registers has side effects
/// on real hardware (pointer-selected ring-buffer windows).
pub trait Mmio: Send {
    /// Reads the 32-bit register at `addr`.
    fn read_u32(&mut self, addr: u64) -> u32;

    /// Writes `val` to the 32-bit register at `addr`.
    fn write_u32(&mut self, addr: u64, val: u32);

    /// Reads a 64-bit status vector as two consecutive words (low word first).
    fn read_u64(&mut self, addr: u64) -> u64 {
        let lo = self.read_u32(addr) as u64;
        let hi = self.read_u32(addr + 4) as u64;
        (hi << 32) | lo
    }
}

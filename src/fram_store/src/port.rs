//! Storage driver and clock abstraction.
//!
//! Everything below the index in the data model is a named external
//! collaborator, not something this crate implements: the actual byte
//! storage (FRAM, battery-backed SRAM, a flash sector pretending to be
//! byte-rewriteable) and the monotonic clock both live on the other side
//! of this trait. Tests and tooling supply an in-memory implementation;
//! real firmware supplies one backed by a peripheral driver.

use crate::error::EngineError;

/// Random-access byte-range storage plus a monotonic time source.
///
/// Implementations are expected to be synchronous: every call may be slow,
/// but none of them yield control back to the engine mid-operation. The
/// engine itself never retries a port call; `Err` is propagated to the
/// caller (after snapshot rollback where one is in effect).
pub trait Port {
    /// One-time driver initialisation. Called once from `Engine::init`.
    fn init(&mut self) -> Result<(), EngineError>;

    /// Read exactly `buf.len()` bytes starting at `addr`.
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), EngineError>;

    /// Write exactly `buf.len()` bytes starting at `addr`.
    fn write(&mut self, addr: u32, buf: &[u8]) -> Result<(), EngineError>;

    /// Seconds since an arbitrary but monotonic epoch.
    fn now_seconds(&self) -> u32;

    /// Milliseconds since an arbitrary but monotonic epoch.
    fn now_millis(&self) -> u64;
}

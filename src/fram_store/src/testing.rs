//! In-memory `Port` used by this crate's own unit tests. The integration
//! tests under `tests/` have their own copy (`tests/support/memory_port.rs`)
//! since they compile against this crate as an external consumer and
//! cannot reach a `#[cfg(test)]`-only module.

use crate::error::EngineError;
use crate::port::Port;

pub struct MemoryPort {
    bytes: Vec<u8>,
    clock_seconds: u32,
    clock_millis: u64,
    fail_after: Option<usize>,
    writes_done: usize,
}

impl MemoryPort {
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0u8; size],
            clock_seconds: 0,
            clock_millis: 0,
            fail_after: None,
            writes_done: 0,
        }
    }

    pub fn corrupt_byte(&mut self, addr: u32) {
        let idx = addr as usize;
        self.bytes[idx] ^= 0xFF;
    }

    pub fn advance_clock(&mut self, seconds: u32) {
        self.clock_seconds += seconds;
        self.clock_millis += seconds as u64 * 1000;
    }

    /// After this many accepted writes, every subsequent `write` fails.
    /// Used to simulate a power loss partway through a multi-step commit.
    pub fn fail_after_writes(&mut self, count: usize) {
        self.fail_after = Some(count);
    }
}

impl Port for MemoryPort {
    fn init(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), EngineError> {
        let start = addr as usize;
        let end = start + buf.len();
        if end > self.bytes.len() {
            return Err(EngineError::Port);
        }
        buf.copy_from_slice(&self.bytes[start..end]);
        Ok(())
    }

    fn write(&mut self, addr: u32, buf: &[u8]) -> Result<(), EngineError> {
        if let Some(limit) = self.fail_after {
            if self.writes_done >= limit {
                return Err(EngineError::Port);
            }
        }
        let start = addr as usize;
        let end = start + buf.len();
        if end > self.bytes.len() {
            return Err(EngineError::Port);
        }
        self.bytes[start..end].copy_from_slice(buf);
        self.writes_done += 1;
        Ok(())
    }

    fn now_seconds(&self) -> u32 {
        self.clock_seconds
    }

    fn now_millis(&self) -> u64 {
        self.clock_millis
    }
}

//! Bounded pool of chunked-I/O state machines.
//!
//! Handles are identified externally by a `StreamToken` bundling a
//! generation counter with the slot index, replacing the source
//! firmware's `magic || index` opaque handle: a token whose generation no
//! longer matches the slot's current generation is stale and rejected,
//! the same guarantee the magic scheme provided, without a reserved
//! sentinel value to keep in sync by hand.

use crate::crc::Crc16;
use crate::error::EngineError;
use crate::snapshot::TransactionSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Idle,
    Writing,
    Reading,
}

/// A displaced predecessor entry a stream write is responsible for
/// marking DIRTY once the stream completes.
#[derive(Debug, Clone, Copy)]
pub struct DisplacedEntry {
    pub slot: usize,
    pub old_frame_size: u32,
}

pub struct Handle {
    pub state: HandleState,
    generation: u32,
    pub tag: u16,
    pub addr: u32,
    pub offset: u32,
    pub total_len: u32,
    pub processed: u32,
    pub crc: Option<Crc16<'static>>,
    pub displaced: Option<DisplacedEntry>,
    pub snapshot: Option<TransactionSnapshot>,
}

impl Handle {
    fn idle(generation: u32) -> Self {
        Self {
            state: HandleState::Idle,
            generation,
            tag: 0,
            addr: 0,
            offset: 0,
            total_len: 0,
            processed: 0,
            crc: None,
            displaced: None,
            snapshot: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamToken {
    generation: u32,
    slot: usize,
}

pub struct StreamPool {
    handles: Vec<Handle>,
}

impl StreamPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            handles: (0..capacity).map(|_| Handle::idle(1)).collect(),
        }
    }

    /// Reserves the first Idle handle and returns the token that now
    /// identifies it. Callers populate the returned handle via
    /// `get_mut` before transitioning it out of `Idle`.
    pub fn acquire(&mut self) -> Result<StreamToken, EngineError> {
        let slot = self
            .handles
            .iter()
            .position(|h| h.state == HandleState::Idle)
            .ok_or(EngineError::InvalidState)?;
        Ok(StreamToken {
            generation: self.handles[slot].generation,
            slot,
        })
    }

    fn validate(&self, token: StreamToken) -> Result<(), EngineError> {
        let handle = self.handles.get(token.slot).ok_or(EngineError::InvalidHandle)?;
        if handle.generation != token.generation {
            return Err(EngineError::InvalidHandle);
        }
        Ok(())
    }

    pub fn get(&self, token: StreamToken) -> Result<&Handle, EngineError> {
        self.validate(token)?;
        Ok(&self.handles[token.slot])
    }

    pub fn get_mut(&mut self, token: StreamToken) -> Result<&mut Handle, EngineError> {
        self.validate(token)?;
        Ok(&mut self.handles[token.slot])
    }

    /// Returns the handle to Idle and bumps its generation, invalidating
    /// every token issued for the previous occupant.
    pub fn release(&mut self, token: StreamToken) -> Result<(), EngineError> {
        self.validate(token)?;
        let generation = self.handles[token.slot].generation;
        self.handles[token.slot] = Handle::idle(generation.wrapping_add(1));
        Ok(())
    }

    /// Releases `token` if it is still valid; a stale or out-of-range
    /// token is treated as already-released rather than an error, so
    /// callers (namely the stream `abort` operations) are idempotent.
    pub fn abort(&mut self, token: StreamToken) {
        let _ = self.release(token);
    }

    pub fn any_open(&self) -> bool {
        self.handles.iter().any(|h| h.state != HandleState::Idle)
    }
}

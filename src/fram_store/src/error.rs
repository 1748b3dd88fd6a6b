//! Error taxonomy.
//!
//! `EngineError` is the Rust-idiomatic surface every fallible operation in
//! this crate returns. `ErrorCode` is the flat, C-ABI-friendly integer
//! surface named in the external interface (negative for failure, 0 for
//! success) for host bindings that switch on an error *kind* rather than
//! match a Rust enum.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    Ok = 0,
    Error = -1,
    InvalidParam = -2,
    NoBufferMemory = -3,
    NotFound = -4,
    CrcFailed = -5,
    Version = -6,
    NoMemorySpace = -7,
    NoIndexSpace = -8,
    Corrupted = -9,
    InvalidHandle = -10,
    InvalidState = -11,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("storage driver error")]
    Port,

    #[error("invalid parameter")]
    InvalidParam,

    /// Caller's buffer was too small. `required` carries the size a retry
    /// would need.
    #[error("buffer too small, {required} bytes required")]
    NoBufferMemory { required: u32 },

    #[error("tag not found")]
    NotFound,

    #[error("CRC mismatch")]
    CrcFailed,

    #[error("incompatible schema or format version")]
    Version,

    #[error("data region exhausted")]
    NoMemorySpace,

    #[error("index table full")]
    NoIndexSpace,

    #[error("on-medium structure failed validation")]
    Corrupted,

    #[error("stream handle is stale or out of range")]
    InvalidHandle,

    #[error("operation not legal in the current state")]
    InvalidState,
}

impl From<&EngineError> for ErrorCode {
    fn from(err: &EngineError) -> Self {
        match err {
            EngineError::Port => ErrorCode::Error,
            EngineError::InvalidParam => ErrorCode::InvalidParam,
            EngineError::NoBufferMemory { .. } => ErrorCode::NoBufferMemory,
            EngineError::NotFound => ErrorCode::NotFound,
            EngineError::CrcFailed => ErrorCode::CrcFailed,
            EngineError::Version => ErrorCode::Version,
            EngineError::NoMemorySpace => ErrorCode::NoMemorySpace,
            EngineError::NoIndexSpace => ErrorCode::NoIndexSpace,
            EngineError::Corrupted => ErrorCode::Corrupted,
            EngineError::InvalidHandle => ErrorCode::InvalidHandle,
            EngineError::InvalidState => ErrorCode::InvalidState,
        }
    }
}

impl From<EngineError> for ErrorCode {
    fn from(err: EngineError) -> Self {
        ErrorCode::from(&err)
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// A single recorded failure, as described by the error-context component.
#[derive(Debug, Clone, Copy)]
pub struct ErrorRecord {
    pub code: ErrorCode,
    pub tag: u16,
    pub timestamp: u32,
    pub site: &'static str,
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} (tag={:#06x}, t={}, at {})",
            self.code, self.tag, self.timestamp, self.site
        )
    }
}

/// Last-error slot plus an optional bounded history, as described in the
/// error-context component. Getters never allocate: the history is a
/// pre-sized ring buffer, not a growing `Vec`.
pub struct ErrorContext {
    last: Option<ErrorRecord>,
    history: Vec<ErrorRecord>,
    capacity: usize,
    next: usize,
    tracking: bool,
}

impl ErrorContext {
    pub fn new(tracking: bool, history_depth: usize) -> Self {
        Self {
            last: None,
            history: Vec::with_capacity(if tracking { history_depth } else { 0 }),
            capacity: history_depth,
            next: 0,
            tracking,
        }
    }

    pub fn record(&mut self, code: ErrorCode, tag: u16, timestamp: u32, site: &'static str) {
        let record = ErrorRecord {
            code,
            tag,
            timestamp,
            site,
        };
        self.last = Some(record);
        log::error!("{record}");

        if !self.tracking || self.capacity == 0 {
            return;
        }
        if self.history.len() < self.capacity {
            self.history.push(record);
        } else {
            self.history[self.next] = record;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    pub fn last(&self) -> Option<ErrorRecord> {
        self.last
    }

    pub fn history(&self) -> &[ErrorRecord] {
        &self.history
    }

    pub fn clear(&mut self) {
        self.last = None;
        self.history.clear();
        self.next = 0;
    }
}

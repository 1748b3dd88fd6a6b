//! Embedded key/value storage engine for a byte-addressable non-volatile
//! medium (FRAM-class): fixed Header/Index/Data/Backup layout, CRC-16
//! end-to-end, up to 256 tags, transactional single writes, chunked
//! stream I/O for records too large to buffer whole, and schema migration
//! on read.
//!
//! The core never touches storage or the clock directly — every access
//! goes through the [`Port`] trait a host implements for its medium
//! driver — and never owns tag definitions, which a host supplies through
//! [`MetaTable`]. There is no global engine state: everything lives on one
//! [`Engine`] value the caller holds `&mut` to.

pub mod alloc;
pub mod config;
pub mod crc;
pub mod engine;
pub mod error;
pub mod format;
pub mod meta;
pub mod migration;
pub mod port;
pub mod snapshot;
pub mod stream;

#[cfg(test)]
pub(crate) mod testing;

pub use config::EngineConfig;
pub use engine::{DefragmentReport, Engine, EngineState, InitOutcome, Statistics, VerifyReport};
pub use error::{EngineError, EngineResult, ErrorCode, ErrorContext, ErrorRecord};
pub use meta::{MetaEntry, MetaTable, Migrator};
pub use port::Port;
pub use stream::StreamToken;

//! The engine object: owns Header, Index, stream-handle pool and error
//! context, and exposes the public API surface over them. Replaces the
//! source firmware's single global context with a value the caller holds
//! `&mut` to — no global singletons are required for correctness.

mod backup;
mod batch;
mod delete;
mod maintenance;
mod migrate;
mod read;
mod stats;
mod write;

pub use maintenance::{DefragmentReport, VerifyReport};
pub use stats::Statistics;

use crate::config::EngineConfig;
use crate::error::{EngineError, ErrorContext};
use crate::format::header;
use crate::format::{IndexTable, SystemHeader};
use crate::meta::MetaTable;
use crate::port::Port;
use crate::stream::StreamPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialised,
    Initialised,
    Formatted,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Ok,
    FirstBoot,
    Recovered,
}

pub struct Engine<P: Port, M: MetaTable> {
    pub(crate) port: P,
    pub(crate) meta: M,
    pub(crate) config: EngineConfig,
    pub(crate) state: EngineState,
    pub(crate) header: SystemHeader,
    pub(crate) index: IndexTable,
    pub(crate) streams: StreamPool,
    pub(crate) errors: ErrorContext,
    pub(crate) migrated_count: u32,
    pub(crate) migration_failed_count: u32,
}

impl<P: Port, M: MetaTable> Engine<P, M> {
    pub fn new(port: P, meta: M, config: EngineConfig) -> Self {
        let streams = StreamPool::new(config.stream_handle_count);
        let errors = ErrorContext::new(config.error_tracking, config.error_history_depth);
        Self {
            header: SystemHeader::new(&config, header::MAGIC),
            index: IndexTable::new(),
            streams,
            errors,
            port,
            meta,
            config,
            state: EngineState::Uninitialised,
            migrated_count: 0,
            migration_failed_count: 0,
        }
    }

    pub fn get_state(&self) -> EngineState {
        self.state
    }

    pub fn errors(&self) -> &ErrorContext {
        &self.errors
    }

    pub(crate) fn require_initialised(&self) -> Result<(), EngineError> {
        if self.state != EngineState::Initialised {
            return Err(EngineError::InvalidState);
        }
        Ok(())
    }

    pub(crate) fn record_error(&mut self, err: &EngineError, tag: u16, site: &'static str) {
        let code = err.into();
        let timestamp = self.port.now_seconds();
        self.errors.record(code, tag, timestamp, site);
    }

    /// `init`: bind Header and Index to storage, loading what is already
    /// there. See the state-machine description in the component design.
    pub fn init(&mut self) -> Result<InitOutcome, EngineError> {
        self.port.init()?;

        let header = match SystemHeader::load(&mut self.port, self.config.header_addr, header::MAGIC) {
            Ok(header) => header,
            Err(_) => {
                self.state = EngineState::Uninitialised;
                return Ok(InitOutcome::FirstBoot);
            }
        };
        self.header = header;

        match IndexTable::load(&mut self.port, self.config.index_addr) {
            Ok(index) => {
                self.index = index;
                self.state = EngineState::Initialised;
                if self.config.auto_migrate_on_boot {
                    let (migrated, failed) = self.migrate_all();
                    if self.config.debug_trace {
                        log::debug!("auto_migrate_on_boot: {migrated} migrated, {failed} failed");
                    }
                }
                Ok(InitOutcome::Ok)
            }
            Err(err) => {
                log::warn!("index load failed ({err}), attempting restore from backup");
                match self.restore_from_backup() {
                    Ok(()) => {
                        self.state = EngineState::Initialised;
                        Ok(InitOutcome::Recovered)
                    }
                    Err(restore_err) => {
                        self.state = EngineState::Error;
                        Err(restore_err)
                    }
                }
            }
        }
    }

    pub fn deinit(&mut self) {
        self.state = EngineState::Uninitialised;
    }

    /// `format`: reinitialise Header (overriding magic when non-zero),
    /// reinitialise Index, save both, and back them up. The caller must
    /// call `init` again afterwards.
    pub fn format(&mut self, magic: u32) -> Result<(), EngineError> {
        match self.format_inner(magic) {
            Ok(()) => {
                self.state = EngineState::Formatted;
                Ok(())
            }
            Err(err) => {
                self.state = EngineState::Error;
                Err(err)
            }
        }
    }

    fn format_inner(&mut self, magic: u32) -> Result<(), EngineError> {
        let effective_magic = if magic != 0 { magic } else { header::MAGIC };
        self.header = SystemHeader::new(&self.config, effective_magic);
        self.index = IndexTable::new();
        self.header.save(&mut self.port, self.config.header_addr)?;
        self.index.save(&mut self.port, self.config.index_addr)?;
        self.backup_all()?;
        Ok(())
    }
}

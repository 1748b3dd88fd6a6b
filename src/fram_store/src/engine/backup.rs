//! Whole-region backup and restore.

use super::Engine;
use crate::error::EngineError;
use crate::format::header;
use crate::format::{IndexTable, SystemHeader};
use crate::meta::MetaTable;
use crate::port::Port;

/// Shared staging buffer size for backup, restore, defragment and verify.
/// Single-threaded, so the one buffer is never used concurrently by two
/// of these operations.
const STAGING_BUFFER_SIZE: usize = 512;

impl<P: Port, M: MetaTable> Engine<P, M> {
    /// Copies Header+Index+Data to the Backup region, a fixed-size
    /// staging buffer at a time. Invoked after format, after a successful
    /// defragment, and on explicit request — never on every write, which
    /// would double write amplification.
    pub fn backup_all(&mut self) -> Result<(), EngineError> {
        self.stream_region(self.config.header_addr, self.config.backup_addr, self.config.primary_region_size())
    }

    /// Validates the Backup region's own header, then streams
    /// Backup → primary and reloads Header and Index from the restored
    /// primary region.
    pub fn restore_from_backup(&mut self) -> Result<(), EngineError> {
        let mut backup_header_bytes = [0u8; header::HEADER_SIZE];
        self.port.read(self.config.backup_addr, &mut backup_header_bytes)?;

        if header::SystemHeader::verify(&backup_header_bytes, header::MAGIC).is_err() {
            return Err(EngineError::Corrupted);
        }
        let backup_header = SystemHeader::from_bytes(&backup_header_bytes);
        if backup_header.data_region_size != self.config.data_region_size {
            return Err(EngineError::Corrupted);
        }

        self.stream_region(self.config.backup_addr, self.config.header_addr, self.config.primary_region_size())?;

        self.header = SystemHeader::load(&mut self.port, self.config.header_addr, header::MAGIC)?;
        self.index = IndexTable::load(&mut self.port, self.config.index_addr)?;
        Ok(())
    }

    pub(crate) fn stream_region(&mut self, src: u32, dst: u32, len: u32) -> Result<(), EngineError> {
        let mut buf = [0u8; STAGING_BUFFER_SIZE];
        let mut offset = 0u32;
        while offset < len {
            let chunk = (len - offset).min(STAGING_BUFFER_SIZE as u32) as usize;
            self.port.read(src + offset, &mut buf[..chunk])?;
            self.port.write(dst + offset, &buf[..chunk])?;
            offset += chunk as u32;
        }
        Ok(())
    }
}

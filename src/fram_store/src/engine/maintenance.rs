//! Defragmentation and whole-store verification.

use super::Engine;
use crate::error::EngineError;
use crate::format::header::{self, SystemHeader};
use crate::format::record;
use crate::format::IndexEntry;
use crate::meta::MetaTable;
use crate::port::Port;

/// Outcome of a `defragment` pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefragmentReport {
    pub relocated: u32,
    pub reclaimed_bytes: u32,
}

/// Result of `verify_all` walking every VALID tag's stored frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyReport {
    pub checked: u32,
    pub corrupt: u32,
}

impl<P: Port, M: MetaTable> Engine<P, M> {
    /// Compacts the Data region in place: relocates every VALID record
    /// toward the start of the region in ascending address order, drops
    /// every DIRTY entry, and zeroes fragmentation accounting. Rejected
    /// while any stream handle is open — see the design notes on why
    /// compaction and a half-completed chunk transfer don't mix.
    pub fn defragment(&mut self) -> Result<DefragmentReport, EngineError> {
        self.require_initialised()?;
        if self.streams.any_open() {
            return Err(EngineError::InvalidState);
        }

        let reclaimed_bytes = self.header.fragment_size;
        let slots: Vec<usize> = self.index.valid_slots().collect();

        if slots.is_empty() {
            self.header = SystemHeader::new(&self.config, self.header.magic);
            self.index.reset();
            if let Err(err) = self.index.save(&mut self.port, self.config.index_addr) {
                self.record_error(&err, 0, "defragment::index_save");
                return Err(err);
            }
            self.header.save(&mut self.port, self.config.header_addr)?;
            self.backup_all()?;
            return Ok(DefragmentReport { relocated: 0, reclaimed_bytes });
        }

        let mut entries: Vec<IndexEntry> = slots.iter().map(|&s| self.index.entry_at(s)).collect();
        entries.sort_by_key(|e| e.addr);

        let mut write_pos = self.config.data_addr;
        let mut used_space = 0u32;
        let mut relocated = 0u32;

        for entry in entries.iter_mut() {
            let old_header = record::read_header(&mut self.port, entry.addr)?;
            let frame = record::frame_size(old_header.payload_len as u32);

            if entry.addr != write_pos {
                let mut frame_buf = vec![0u8; frame as usize];
                self.port.read(entry.addr, &mut frame_buf)?;
                self.port.write(write_pos, &frame_buf)?;
                relocated += 1;
            }
            entry.addr = write_pos;
            write_pos += frame;
            used_space += frame;
        }

        self.index.reset();
        for (slot, entry) in entries.iter().enumerate() {
            self.index.set_entry(slot, *entry);
        }

        self.header.tag_count = entries.len() as u16;
        self.header.next_free_addr = write_pos;
        self.header.used_space = used_space;
        self.header.free_space = self.config.data_region_size - used_space;
        self.header.fragment_count = 0;
        self.header.fragment_size = 0;

        if let Err(err) = self.index.save(&mut self.port, self.config.index_addr) {
            self.record_error(&err, 0, "defragment::index_save");
            return Err(err);
        }
        self.header.save(&mut self.port, self.config.header_addr)?;
        self.backup_all()?;

        if self.config.debug_trace {
            log::debug!("defragment: relocated={relocated} reclaimed_bytes={reclaimed_bytes}");
        }

        Ok(DefragmentReport { relocated, reclaimed_bytes })
    }

    /// Reads and CRC-checks every VALID tag's stored frame without
    /// mutating anything. A read-only diagnostic, distinct from the
    /// restore path: a corrupt frame here does not trigger backup restore.
    pub fn verify_all(&mut self) -> Result<VerifyReport, EngineError> {
        self.require_initialised()?;
        let slots: Vec<usize> = self.index.valid_slots().collect();
        let mut checked = 0u32;
        let mut corrupt = 0u32;
        let mut buf = [0u8; header::HEADER_SIZE];

        for slot in slots {
            let entry = self.index.entry_at(slot);
            let payload_len = match record::read_header(&mut self.port, entry.addr) {
                Ok(h) => h.payload_len as usize,
                Err(_) => {
                    corrupt += 1;
                    checked += 1;
                    continue;
                }
            };
            checked += 1;
            if payload_len > buf.len() {
                let mut frame_buf = vec![0u8; payload_len];
                if record::read_record(&mut self.port, entry.addr, &mut frame_buf).is_err() {
                    corrupt += 1;
                }
            } else if record::read_record(&mut self.port, entry.addr, &mut buf[..payload_len]).is_err() {
                corrupt += 1;
            }
        }

        Ok(VerifyReport { checked, corrupt })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::Engine;
    use crate::meta::MetaEntry;
    use crate::testing::MemoryPort;

    static TABLE: &[MetaEntry] = &[MetaEntry {
        tag: 0x1001,
        max_length: 64,
        priority: 0,
        version: 1,
        backup: false,
        name: "widget",
        migrator: None,
    }];

    fn engine() -> Engine<MemoryPort, &'static [MetaEntry]> {
        let port = MemoryPort::new(0x40000);
        let config = EngineConfig::default();
        let mut e = Engine::new(port, TABLE, config);
        e.format(0).unwrap();
        e.init().unwrap();
        e
    }

    #[test]
    fn defragment_reclaims_displaced_space_and_keeps_data_readable() {
        let mut e = engine();
        e.write(0x1001, &[1, 2, 3]).unwrap();
        e.write(0x1001, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert!(e.get_statistics().fragment_size > 0);

        let report = e.defragment().unwrap();
        assert!(report.relocated >= 1 || report.reclaimed_bytes > 0);
        assert_eq!(e.get_statistics().fragment_size, 0);

        let mut buf = [0u8; 8];
        let len = e.read(0x1001, &mut buf).unwrap();
        assert_eq!(&buf[..len], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn defragment_rejects_while_stream_handle_open() {
        let mut e = engine();
        e.write(0x1001, &[1, 2, 3]).unwrap();
        let token = e.write_begin(0x1001, 3).unwrap();

        assert!(matches!(e.defragment(), Err(EngineError::InvalidState)));

        e.write_abort(token).unwrap();
    }

    #[test]
    fn verify_all_reports_no_corruption_on_a_clean_store() {
        let mut e = engine();
        e.write(0x1001, &[9, 9, 9]).unwrap();

        let report = e.verify_all().unwrap();
        assert_eq!(report.checked, 1);
        assert_eq!(report.corrupt, 0);
    }
}

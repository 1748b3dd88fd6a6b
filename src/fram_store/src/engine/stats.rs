//! Usage statistics and fragmentation accounting.

use super::Engine;
use crate::error::EngineError;
use crate::meta::MetaTable;
use crate::port::Port;

/// Snapshot of the medium's space accounting, read straight from Header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Statistics {
    pub tag_count: u16,
    pub free_space: u32,
    pub used_space: u32,
    pub fragment_count: u32,
    pub fragment_size: u32,
    pub total_writes: u32,
}

impl<P: Port, M: MetaTable> Engine<P, M> {
    pub fn get_statistics(&self) -> Statistics {
        Statistics {
            tag_count: self.header.tag_count,
            free_space: self.header.free_space,
            used_space: self.header.used_space,
            fragment_count: self.header.fragment_count,
            fragment_size: self.header.fragment_size,
            total_writes: self.header.total_writes,
        }
    }

    pub fn get_free_space(&self) -> u32 {
        self.header.free_space
    }

    pub fn get_used_space(&self) -> u32 {
        self.header.used_space
    }

    /// Percentage (0-100) of reclaimed-but-unswept space relative to the
    /// Data region. Driven off `fragment_size`, not `fragment_count`, so a
    /// handful of large displaced frames trips the threshold just as
    /// readily as many small ones.
    pub fn calculate_fragmentation(&self) -> u8 {
        if self.config.data_region_size == 0 {
            return 0;
        }
        let pct = (self.header.fragment_size as u64 * 100) / self.config.data_region_size as u64;
        pct.min(100) as u8
    }

    /// Calls `f(tag, length)` for every VALID tag currently present, in
    /// index-table order. `f` returning `false` stops the walk early.
    pub fn foreach<F: FnMut(u16, usize) -> bool>(&mut self, mut f: F) -> Result<(), EngineError> {
        self.require_initialised()?;
        let slots: Vec<usize> = self.index.valid_slots().collect();
        for slot in slots {
            let entry = self.index.entry_at(slot);
            let header = crate::format::record::read_header(&mut self.port, entry.addr)?;
            if !f(entry.tag, header.payload_len as usize) {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::meta::{MetaEntry, MetaTable};
    use crate::testing::MemoryPort;
    use crate::engine::Engine;

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
        Engine::new(port, TABLE, config)
    }

    #[test]
    fn fragmentation_tracks_fragment_size() {
        let mut e = engine();
        e.format(0).unwrap();
        e.init().unwrap();
        assert_eq!(e.calculate_fragmentation(), 0);

        e.write(0x1001, &[1, 2, 3]).unwrap();
        e.write(0x1001, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert!(e.calculate_fragmentation() > 0);
    }

    #[test]
    fn foreach_visits_every_valid_tag() {
        let mut e = engine();
        e.format(0).unwrap();
        e.init().unwrap();
        e.write(0x1001, b"hello").unwrap();

        let mut seen = Vec::new();
        e.foreach(|tag, len| {
            seen.push((tag, len));
            true
        })
        .unwrap();
        assert_eq!(seen, vec![(0x1001, 5)]);
    }
}

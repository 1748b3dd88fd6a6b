//! Fixed-size table of tag → data-address entries.
//!
//! Lookups return a slot index rather than an interior pointer/reference,
//! per the redesign away from the source firmware's pointer-into-table
//! idiom: callers look up a slot, then mutate through an explicit method,
//! and never hold a long-lived reference into the table.

use super::flags::IndexEntryFlags;
use crate::crc;
use crate::error::EngineError;
use crate::port::Port;
use byteorder::{ByteOrder, LittleEndian};

pub const MAX_TAG_COUNT: usize = 256;
pub const ENTRY_SIZE: usize = 8;
pub const TABLE_SIZE: usize = MAX_TAG_COUNT * ENTRY_SIZE + 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexEntry {
    pub tag: u16,
    pub flags: IndexEntryFlags,
    pub version: u8,
    pub addr: u32,
}

impl IndexEntry {
    fn to_bytes(self) -> [u8; ENTRY_SIZE] {
        let mut buf = [0u8; ENTRY_SIZE];
        LittleEndian::write_u16(&mut buf[0..2], self.tag);
        buf[2] = self.flags.0;
        buf[3] = self.version;
        LittleEndian::write_u32(&mut buf[4..8], self.addr);
        buf
    }

    fn from_bytes(buf: &[u8; ENTRY_SIZE]) -> Self {
        Self {
            tag: LittleEndian::read_u16(&buf[0..2]),
            flags: IndexEntryFlags(buf[2]),
            version: buf[3],
            addr: LittleEndian::read_u32(&buf[4..8]),
        }
    }
}

pub struct IndexTable {
    entries: [IndexEntry; MAX_TAG_COUNT],
}

impl IndexTable {
    pub fn new() -> Self {
        Self {
            entries: [IndexEntry::default(); MAX_TAG_COUNT],
        }
    }

    pub fn to_bytes(&self) -> [u8; TABLE_SIZE] {
        let mut buf = [0u8; TABLE_SIZE];
        for (i, entry) in self.entries.iter().enumerate() {
            let off = i * ENTRY_SIZE;
            buf[off..off + ENTRY_SIZE].copy_from_slice(&entry.to_bytes());
        }
        let crc = crc::checksum(&buf[..MAX_TAG_COUNT * ENTRY_SIZE]);
        LittleEndian::write_u16(&mut buf[MAX_TAG_COUNT * ENTRY_SIZE..], crc);
        buf
    }

    pub fn from_bytes(buf: &[u8; TABLE_SIZE]) -> Self {
        let mut entries = [IndexEntry::default(); MAX_TAG_COUNT];
        for (i, slot) in entries.iter_mut().enumerate() {
            let off = i * ENTRY_SIZE;
            let mut raw = [0u8; ENTRY_SIZE];
            raw.copy_from_slice(&buf[off..off + ENTRY_SIZE]);
            *slot = IndexEntry::from_bytes(&raw);
        }
        Self { entries }
    }

    pub fn verify(buf: &[u8; TABLE_SIZE]) -> Result<(), EngineError> {
        let body = &buf[..MAX_TAG_COUNT * ENTRY_SIZE];
        let stored_crc = LittleEndian::read_u16(&buf[MAX_TAG_COUNT * ENTRY_SIZE..]);
        if crc::checksum(body) != stored_crc {
            return Err(EngineError::CrcFailed);
        }
        Ok(())
    }

    pub fn load(port: &mut dyn Port, addr: u32) -> Result<Self, EngineError> {
        let mut buf = [0u8; TABLE_SIZE];
        port.read(addr, &mut buf)?;
        Self::verify(&buf)?;
        Ok(Self::from_bytes(&buf))
    }

    pub fn save(&self, port: &mut dyn Port, addr: u32) -> Result<(), EngineError> {
        port.write(addr, &self.to_bytes())
    }

    /// Slot holding a VALID entry for `tag`, if any.
    pub fn find(&self, tag: u16) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.tag == tag && e.flags.is_valid())
    }

    /// First slot whose tag is the empty-slot sentinel (0).
    pub fn find_free_slot(&self) -> Option<usize> {
        self.entries.iter().position(|e| e.tag == 0)
    }

    pub fn entry_at(&self, slot: usize) -> IndexEntry {
        self.entries[slot]
    }

    pub fn set_entry(&mut self, slot: usize, entry: IndexEntry) {
        self.entries[slot] = entry;
    }

    pub fn count_valid(&self) -> usize {
        self.entries.iter().filter(|e| e.flags.is_valid()).count()
    }

    /// Slots holding a VALID entry, in table order.
    pub fn valid_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.flags.is_valid())
            .map(|(i, _)| i)
    }

    /// Inserts a fresh entry for `tag`. If a VALID entry for `tag` already
    /// exists, its address is simply updated in place (mirroring how the
    /// source firmware's `add` behaves when called on an already-present
    /// tag) and `VALID` is (re)asserted; otherwise a free slot is consumed.
    pub fn add(&mut self, tag: u16, addr: u32, version: u8) -> Result<usize, EngineError> {
        if let Some(slot) = self.find(tag) {
            self.entries[slot].addr = addr;
            self.entries[slot].version = version;
            self.entries[slot].flags.set(IndexEntryFlags::VALID);
            return Ok(slot);
        }

        let slot = self.find_free_slot().ok_or(EngineError::NoIndexSpace)?;
        self.entries[slot] = IndexEntry {
            tag,
            flags: IndexEntryFlags(IndexEntryFlags::VALID),
            version,
            addr,
        };
        Ok(slot)
    }

    /// Rewrites the address of an existing VALID entry (in-place update
    /// path): clears DIRTY, reasserts VALID, refreshes the schema version.
    pub fn update(&mut self, tag: u16, addr: u32, version: u8) -> Result<usize, EngineError> {
        let slot = self.find(tag).ok_or(EngineError::NotFound)?;
        self.entries[slot].addr = addr;
        self.entries[slot].version = version;
        self.entries[slot].flags.clear(IndexEntryFlags::DIRTY);
        self.entries[slot].flags.set(IndexEntryFlags::VALID);
        Ok(slot)
    }

    /// Clears VALID and sets DIRTY on the entry at `slot` without zeroing
    /// it, abandoning its space while keeping the entry inspectable. Used
    /// when a write displaces a tag to a freshly-allocated, larger frame.
    pub fn mark_dirty(&mut self, slot: usize) {
        self.entries[slot].flags.clear(IndexEntryFlags::VALID);
        self.entries[slot].flags.set(IndexEntryFlags::DIRTY);
    }

    /// Zeroes the entry for `tag`, returning its previous contents.
    pub fn remove(&mut self, tag: u16) -> Result<IndexEntry, EngineError> {
        let slot = self.find(tag).ok_or(EngineError::NotFound)?;
        let old = self.entries[slot];
        self.entries[slot] = IndexEntry::default();
        Ok(old)
    }

    /// Zeroes every entry, as called by `format`.
    pub fn reset(&mut self) {
        self.entries = [IndexEntry::default(); MAX_TAG_COUNT];
    }
}

impl Default for IndexTable {
    fn default() -> Self {
        Self::new()
    }
}

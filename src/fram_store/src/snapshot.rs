//! In-memory capture/restore of the mutable Header accounting fields,
//! taken at the start of every mutating operation so a failure partway
//! through can roll the Header back to a state consistent with whatever
//! the Index still says is true.

use crate::format::SystemHeader;

#[derive(Debug, Clone, Copy)]
pub struct TransactionSnapshot {
    next_free_addr: u32,
    free_space: u32,
    used_space: u32,
    fragment_count: u32,
    fragment_size: u32,
    tag_count: u16,
}

impl TransactionSnapshot {
    pub fn capture(header: &SystemHeader) -> Self {
        Self {
            next_free_addr: header.next_free_addr,
            free_space: header.free_space,
            used_space: header.used_space,
            fragment_count: header.fragment_count,
            fragment_size: header.fragment_size,
            tag_count: header.tag_count,
        }
    }

    /// Restores the captured fields onto `header`, leaving everything
    /// else (format version, magic, data region bounds) untouched.
    pub fn rollback(&self, header: &mut SystemHeader) {
        header.next_free_addr = self.next_free_addr;
        header.free_space = self.free_space;
        header.used_space = self.used_space;
        header.fragment_count = self.fragment_count;
        header.fragment_size = self.fragment_size;
        header.tag_count = self.tag_count;
    }
}

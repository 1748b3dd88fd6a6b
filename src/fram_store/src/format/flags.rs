//! Index entry flag bits.
//!
//! A newtype over the raw byte rather than the `bitflags` crate, matching
//! how this codebase already represents small bitmask fields elsewhere.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexEntryFlags(pub u8);

impl IndexEntryFlags {
    pub const VALID: u8 = 0x01;
    pub const DIRTY: u8 = 0x02;
    pub const BACKUP: u8 = 0x04;
    pub const ENCRYPTED: u8 = 0x08;
    pub const CRITICAL: u8 = 0x10;

    pub fn is_valid(&self) -> bool {
        self.check_flag(Self::VALID)
    }

    pub fn is_dirty(&self) -> bool {
        self.check_flag(Self::DIRTY)
    }

    pub fn check_flag(&self, flag: u8) -> bool {
        self.0 & flag == flag
    }

    pub fn set(&mut self, flag: u8) {
        self.0 |= flag;
    }

    pub fn clear(&mut self, flag: u8) {
        self.0 &= !flag;
    }
}

impl From<u8> for IndexEntryFlags {
    fn from(raw: u8) -> Self {
        Self(raw)
    }
}

impl From<IndexEntryFlags> for u8 {
    fn from(flags: IndexEntryFlags) -> Self {
        flags.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_clear_round_trip() {
        let mut flags = IndexEntryFlags::default();
        flags.set(IndexEntryFlags::VALID);
        flags.set(IndexEntryFlags::DIRTY);
        assert!(flags.is_valid());
        assert!(flags.is_dirty());

        flags.clear(IndexEntryFlags::DIRTY);
        assert!(flags.is_valid());
        assert!(!flags.is_dirty());
    }
}

//! Per-tag metadata registry.
//!
//! The core never owns tag definitions; it only looks them up through
//! this trait. Hosts provide a static table (a `&'static [MetaEntry]`
//! is the common case) built once at link time.
//!
//! The source firmware iterates a C array terminated by a sentinel entry
//! with `tag == 0xFFFF`. That idiom is deliberately not reproduced here:
//! `MetaTable` is a trait over an explicit-length slice, so an empty table
//! and a table that happens to need a tag of `0xFFFF` are both
//! representable.

use crate::error::EngineError;

/// Migration capability for a single tag family. One implementation per
/// tag (or per group of tags sharing a payload shape), registered on the
/// corresponding `MetaEntry`.
pub trait Migrator {
    /// Transform `buf[..old_len]` in place from `old_version` to
    /// `old_version + 1`, returning the new length.
    ///
    /// `buf` has capacity `max_size`; if the upgraded payload would not
    /// fit, return `Err(EngineError::NoBufferMemory { required })` with
    /// the length that would have been needed.
    fn upgrade_step(
        &self,
        buf: &mut [u8],
        old_len: usize,
        max_size: usize,
        old_version: u8,
    ) -> Result<usize, EngineError>;
}

/// Read-only description of one tag, as consumed by the index and
/// migration components.
pub struct MetaEntry {
    pub tag: u16,
    pub max_length: u32,
    pub priority: u8,
    pub version: u8,
    pub backup: bool,
    pub name: &'static str,
    pub migrator: Option<&'static dyn Migrator>,
}

/// Read-only registry mapping tag to `MetaEntry`. The core only ever calls
/// `find`; the lookup helpers below exist for the diagnostics surface.
pub trait MetaTable {
    fn entries(&self) -> &[MetaEntry];

    fn find(&self, tag: u16) -> Option<&MetaEntry> {
        self.entries().iter().find(|e| e.tag == tag)
    }

    fn name_of(&self, tag: u16) -> Option<&'static str> {
        self.find(tag).map(|e| e.name)
    }

    fn max_length_of(&self, tag: u16) -> Option<u32> {
        self.find(tag).map(|e| e.max_length)
    }

    fn find_by_name(&self, name: &str) -> Option<&MetaEntry> {
        self.entries().iter().find(|e| e.name == name)
    }
}

impl MetaTable for &'static [MetaEntry] {
    fn entries(&self) -> &[MetaEntry] {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;
    impl Migrator for Noop {
        fn upgrade_step(
            &self,
            _buf: &mut [u8],
            old_len: usize,
            _max_size: usize,
            _old_version: u8,
        ) -> Result<usize, EngineError> {
            Ok(old_len)
        }
    }
    static NOOP: Noop = Noop;

    static TABLE: &[MetaEntry] = &[
        MetaEntry {
            tag: 0x1001,
            max_length: 64,
            priority: 0,
            version: 1,
            backup: false,
            name: "widget_count",
            migrator: None,
        },
        MetaEntry {
            tag: 0x4001,
            max_length: 256,
            priority: 0,
            version: 3,
            backup: true,
            name: "stream_blob",
            migrator: Some(&NOOP),
        },
    ];

    #[test]
    fn find_by_tag_and_name() {
        assert_eq!(TABLE.find(0x1001).unwrap().name, "widget_count");
        assert_eq!(TABLE.find_by_name("stream_blob").unwrap().tag, 0x4001);
        assert!(TABLE.find(0x9999).is_none());
    }

    #[test]
    fn lookup_helpers_match_find() {
        assert_eq!(TABLE.max_length_of(0x1001), Some(64));
        assert_eq!(TABLE.name_of(0x4001), Some("stream_blob"));
    }
}

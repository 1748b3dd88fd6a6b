//! Engine configuration.
//!
//! Replaces the preprocessor-gated feature set of the source firmware
//! (debug printing, optional migration, optional auto-defragment, optional
//! error tracking) with a plain configuration record passed at
//! construction time, plus the medium layout constants so one engine type
//! can address different geometries rather than hard-coding them per
//! board.

/// Medium layout and feature switches for one `Engine` instance.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Byte offset of the `SystemHeader`.
    pub header_addr: u32,
    /// Byte offset of the `IndexTable`.
    pub index_addr: u32,
    /// Byte offset of the start of the Data region.
    pub data_addr: u32,
    /// Size in bytes of the Data region (excludes Header/Index/Backup).
    pub data_region_size: u32,
    /// Byte offset of the Backup region (Header+Index+Data mirror).
    pub backup_addr: u32,

    /// Emit `log::debug!` traces for commit points and allocator decisions.
    pub debug_trace: bool,
    /// Migrate a record forward on read when its stored version trails
    /// the tag's current meta version.
    pub lazy_migrate_on_read: bool,
    /// Run a best-effort migration pass over every tag once during `init`.
    pub auto_migrate_on_boot: bool,
    /// Run `defragment` automatically from `write` once fragmentation
    /// crosses `auto_defrag_threshold_percent`.
    pub auto_clean_fragment: bool,
    /// Fragmentation percentage (0-100) that triggers automatic
    /// defragmentation when `auto_clean_fragment` is set.
    pub auto_defrag_threshold_percent: u8,
    /// Keep the last-error slot and, if true, a bounded history.
    pub error_tracking: bool,
    /// Depth of the error history ring buffer. Ignored when
    /// `error_tracking` is false.
    pub error_history_depth: usize,
    /// Number of concurrently open stream handles.
    pub stream_handle_count: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            header_addr: 0x0000,
            index_addr: 0x0200,
            data_addr: 0x1000,
            data_region_size: 0x1E000,
            backup_addr: 0x1F000,

            debug_trace: false,
            lazy_migrate_on_read: true,
            auto_migrate_on_boot: false,
            auto_clean_fragment: false,
            auto_defrag_threshold_percent: 30,
            error_tracking: true,
            error_history_depth: 8,
            stream_handle_count: 4,
        }
    }
}

impl EngineConfig {
    pub fn data_region_end(&self) -> u32 {
        self.data_addr + self.data_region_size
    }

    /// Total byte span copied by `backup_all`/`restore_from_backup`:
    /// Header + Index + Data, starting at `header_addr`.
    pub fn primary_region_size(&self) -> u32 {
        self.data_region_end() - self.header_addr
    }
}

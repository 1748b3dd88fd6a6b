//! Best-effort batch migration over every stored tag, distinct from the
//! lazy on-read path in `read.rs`. Both share `migration::migrate_tag`.

use super::Engine;
use crate::format::record;
use crate::meta::MetaTable;
use crate::migration;
use crate::port::Port;

impl<P: Port, M: MetaTable> Engine<P, M> {
    /// Walks every VALID tag, migrating any whose stored version trails
    /// its meta version and writing the result back through the normal
    /// write path. A tag whose stored version is *ahead* of its meta
    /// version, a read or migration failure, or a rejected write-back all
    /// count toward `failed` rather than aborting the pass. Resets the
    /// running counters at the start of the call; read them back with
    /// `get_migration_stats`.
    pub fn migrate_all(&mut self) -> (u32, u32) {
        self.migrated_count = 0;
        self.migration_failed_count = 0;

        let slots: Vec<usize> = self.index.valid_slots().collect();
        for slot in slots {
            let entry = self.index.entry_at(slot);
            let tag = entry.tag;

            let header = match record::read_header(&mut self.port, entry.addr) {
                Ok(h) => h,
                Err(_) => {
                    self.migration_failed_count += 1;
                    continue;
                }
            };

            let Some(meta) = self.meta.find(tag) else {
                continue;
            };
            if header.version == meta.version {
                continue;
            }
            if header.version > meta.version {
                self.migration_failed_count += 1;
                continue;
            }

            let old_len = header.payload_len as usize;
            let mut buf = vec![0u8; meta.max_length as usize];
            if record::read_record(&mut self.port, entry.addr, &mut buf).is_err() {
                self.migration_failed_count += 1;
                continue;
            }

            match migration::migrate_tag(meta, &mut buf, old_len, header.version) {
                Ok(outcome) => {
                    buf.truncate(outcome.new_len);
                    match self.write(tag, &buf) {
                        Ok(()) => self.migrated_count += 1,
                        Err(_) => self.migration_failed_count += 1,
                    }
                }
                Err(_) => self.migration_failed_count += 1,
            }
        }

        (self.migrated_count, self.migration_failed_count)
    }

    /// The `(migrated, failed)` counters accumulated by the most recent
    /// `migrate_all` call.
    pub fn get_migration_stats(&self) -> (u32, u32) {
        (self.migrated_count, self.migration_failed_count)
    }
}

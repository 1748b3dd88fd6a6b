//! Batch convenience wrappers over the single-shot read/write ops.
//!
//! `batch_write` amortizes the Index save and Header save across the
//! whole batch rather than paying them per record — a deliberate
//! widening of the window in which a crash loses more than one record,
//! matching the source firmware's own batch routines.

use super::Engine;
use crate::error::EngineError;
use crate::meta::MetaTable;
use crate::port::Port;
use crate::snapshot::TransactionSnapshot;

impl<P: Port, M: MetaTable> Engine<P, M> {
    /// Writes every `(tag, data)` pair, committing the Index and Header
    /// once at the end. Per-item failures are tolerated and counted, not
    /// propagated; returns `(succeeded, failed)`. If every item fails,
    /// neither Index nor Header is touched. If the commit itself fails,
    /// the Header is rolled back to its state before the first item in
    /// this batch, the same way a single failed `write` rolls back.
    pub fn batch_write(&mut self, items: &[(u16, &[u8])]) -> Result<(usize, usize), EngineError> {
        self.require_initialised()?;
        let snapshot = TransactionSnapshot::capture(&self.header);
        let mut succeeded = 0usize;
        let mut failed = 0usize;

        for &(tag, data) in items {
            if tag == 0 || data.is_empty() {
                failed += 1;
                continue;
            }
            match self.commit_one(tag, data) {
                Ok(()) => succeeded += 1,
                Err(err) => {
                    self.record_error(&err, tag, "batch_write::commit_one");
                    failed += 1;
                }
            }
        }

        if succeeded > 0 {
            if let Err(err) = self.index.save(&mut self.port, self.config.index_addr) {
                self.record_error(&err, 0, "batch_write::index_save");
                self.rollback_and_save(&snapshot);
                return Err(err);
            }
            self.header.total_writes = self.header.total_writes.wrapping_add(succeeded as u32);
            self.header.last_update_time = self.port.now_seconds();
            if let Err(err) = self.header.save(&mut self.port, self.config.header_addr) {
                self.record_error(&err, 0, "batch_write::header_save");
                self.rollback_and_save(&snapshot);
                return Err(err);
            }

            if self.config.auto_clean_fragment
                && self.calculate_fragmentation() >= self.config.auto_defrag_threshold_percent
            {
                self.defragment()?;
            }
        }

        Ok((succeeded, failed))
    }

    /// Reads every `(tag, buf)` pair, each through the normal `read` path
    /// (lazy migration included). Returns the count that succeeded;
    /// per-item failures are recorded in the error context but do not
    /// stop the batch.
    pub fn batch_read(&mut self, requests: &mut [(u16, &mut [u8])]) -> Result<usize, EngineError> {
        self.require_initialised()?;
        let mut succeeded = 0usize;
        for (tag, buf) in requests.iter_mut() {
            match self.read(*tag, buf) {
                Ok(_) => succeeded += 1,
                Err(err) => self.record_error(&err, *tag, "batch_read"),
            }
        }
        Ok(succeeded)
    }
}

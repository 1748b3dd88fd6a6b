//! Core delete.

use super::Engine;
use crate::error::EngineError;
use crate::format::record;
use crate::meta::MetaTable;
use crate::port::Port;

impl<P: Port, M: MetaTable> Engine<P, M> {
    /// `delete`: durable only once Index is saved.
    pub fn delete(&mut self, tag: u16) -> Result<(), EngineError> {
        self.require_initialised()?;
        if tag == 0 {
            return Err(EngineError::InvalidParam);
        }

        let slot = match self.index.find(tag) {
            Some(s) => s,
            None => {
                self.record_error(&EngineError::NotFound, tag, "delete");
                return Err(EngineError::NotFound);
            }
        };
        let addr = self.index.entry_at(slot).addr;
        let header = record::read_header(&mut self.port, addr)?;
        let frame = crate::format::record::frame_size(header.payload_len as u32);

        self.header.used_space -= frame;
        self.header.fragment_count += 1;
        self.header.fragment_size += frame;

        self.index.remove(tag)?;
        self.header.tag_count = self.index.count_valid() as u16;
        if let Err(err) = self.index.save(&mut self.port, self.config.index_addr) {
            self.record_error(&err, tag, "delete::index_save");
            return Err(err);
        }
        self.header.save(&mut self.port, self.config.header_addr)?;
        Ok(())
    }
}

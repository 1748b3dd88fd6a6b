//! Core write (single-shot) and chunked stream write.

use super::Engine;
use crate::alloc;
use crate::error::EngineError;
use crate::format::record::{self, frame_size, RecordHeader};
use crate::meta::MetaTable;
use crate::port::Port;
use crate::snapshot::TransactionSnapshot;
use crate::stream::{DisplacedEntry, HandleState, StreamToken};
use byteorder::{ByteOrder, LittleEndian};

#[derive(Clone, Copy)]
enum Placement {
    InPlace { addr: u32 },
    Displace { old_slot: usize, old_frame: u32, addr: u32 },
    Fresh { addr: u32 },
}

impl<P: Port, M: MetaTable> Engine<P, M> {
    /// `write`: see the core-write algorithm. Input constraints: `tag` is
    /// non-zero, `data` is non-empty, `data.len() <= meta.max_length`.
    pub fn write(&mut self, tag: u16, data: &[u8]) -> Result<(), EngineError> {
        self.require_initialised()?;
        if tag == 0 || data.is_empty() {
            return Err(EngineError::InvalidParam);
        }

        let snapshot = TransactionSnapshot::capture(&self.header);

        if let Err(err) = self.commit_one(tag, data) {
            self.record_error(&err, tag, "write::commit_one");
            return Err(err);
        }

        if let Err(err) = self.index.save(&mut self.port, self.config.index_addr) {
            self.record_error(&err, tag, "write::index_save");
            self.rollback_and_save(&snapshot);
            return Err(err);
        }

        self.header.total_writes = self.header.total_writes.wrapping_add(1);
        self.header.last_update_time = self.port.now_seconds();
        if let Err(err) = self.header.save(&mut self.port, self.config.header_addr) {
            self.record_error(&err, tag, "write::header_save");
            self.rollback_and_save(&snapshot);
            return Err(err);
        }

        if self.config.debug_trace {
            log::debug!("write: tag={tag:#06x} len={}", data.len());
        }

        if self.config.auto_clean_fragment
            && self.calculate_fragmentation() >= self.config.auto_defrag_threshold_percent
        {
            self.defragment()?;
        }

        Ok(())
    }

    /// Plans placement, writes the record frame, and updates the
    /// in-memory Index/Header, but does not persist either — the caller
    /// commits once it knows whether more records are coming (`write`
    /// commits immediately; `batch_write` commits once for the whole
    /// batch). Any failure rolls `self.header`'s accounting fields back
    /// in memory; nothing is written to the medium by this call, so no
    /// on-port state needs undoing.
    pub(crate) fn commit_one(&mut self, tag: u16, data: &[u8]) -> Result<(), EngineError> {
        let max_length = self
            .meta
            .max_length_of(tag)
            .ok_or(EngineError::NotFound)?;
        if data.len() as u32 > max_length {
            return Err(EngineError::InvalidParam);
        }
        let version = self.meta.find(tag).map(|e| e.version).unwrap_or(1);

        let snapshot = TransactionSnapshot::capture(&self.header);
        let placement = match self.plan_placement(tag, data.len() as u32) {
            Ok(p) => p,
            Err(err) => {
                snapshot.rollback(&mut self.header);
                return Err(err);
            }
        };

        let addr = match placement {
            Placement::InPlace { addr } => addr,
            Placement::Displace { addr, .. } => addr,
            Placement::Fresh { addr } => addr,
        };

        let write_counter = self.next_write_counter(tag, addr);
        let header = RecordHeader {
            tag,
            payload_len: data.len() as u16,
            version,
            flags: 0,
            timestamp: self.port.now_seconds(),
            write_counter,
        };

        if let Err(err) = record::write_record(&mut self.port, addr, &header, data) {
            snapshot.rollback(&mut self.header);
            return Err(err);
        }

        if let Err(err) = self.apply_placement(tag, version, addr, placement) {
            snapshot.rollback(&mut self.header);
            return Err(err);
        }

        Ok(())
    }

    /// Decides in-place vs. displace vs. fresh-allocate, mutating
    /// `self.header`'s accounting fields for the branches that allocate.
    /// Does not touch the index; that happens once the record bytes are
    /// safely on the medium (`apply_placement`).
    fn plan_placement(&mut self, tag: u16, len: u32) -> Result<Placement, EngineError> {
        let new_frame = frame_size(len);

        if let Some(slot) = self.index.find(tag) {
            let entry = self.index.entry_at(slot);
            let old_header = record::read_header(&mut self.port, entry.addr)?;
            let old_frame = frame_size(old_header.payload_len as u32);

            if new_frame <= old_frame {
                self.header.used_space = self.header.used_space - old_frame + new_frame;
                return Ok(Placement::InPlace { addr: entry.addr });
            }

            if self.index.find_free_slot().is_none() {
                return Err(EngineError::NoIndexSpace);
            }
            let addr = self.try_allocate(new_frame)?;
            return Ok(Placement::Displace { old_slot: slot, old_frame, addr });
        }

        if self.index.find_free_slot().is_none() {
            return Err(EngineError::NoIndexSpace);
        }
        let addr = self.try_allocate(new_frame)?;
        Ok(Placement::Fresh { addr })
    }

    fn try_allocate(&mut self, len: u32) -> Result<u32, EngineError> {
        let addr = alloc::alloc(self.header.next_free_addr, self.config.data_region_end(), len)
            .ok_or(EngineError::NoMemorySpace)?;
        self.header.next_free_addr += len;
        self.header.used_space += len;
        self.header.free_space -= len;
        Ok(addr)
    }

    /// Previous frame's write counter at `addr`, plus one, if the header
    /// already there claims the same tag; otherwise 1.
    fn next_write_counter(&mut self, tag: u16, addr: u32) -> u32 {
        match record::read_header(&mut self.port, addr) {
            Ok(old) if old.tag == tag => old.write_counter.wrapping_add(1),
            _ => 1,
        }
    }

    fn apply_placement(&mut self, tag: u16, version: u8, addr: u32, placement: Placement) -> Result<(), EngineError> {
        match placement {
            Placement::InPlace { .. } => {
                self.index.update(tag, addr, version)?;
            }
            Placement::Displace { old_slot, old_frame, .. } => {
                self.index.mark_dirty(old_slot);
                self.header.used_space -= old_frame;
                self.header.fragment_count += 1;
                self.header.fragment_size += old_frame;
                self.index.add(tag, addr, version)?;
            }
            Placement::Fresh { .. } => {
                self.index.add(tag, addr, version)?;
            }
        }
        self.header.tag_count = self.index.count_valid() as u16;
        Ok(())
    }

    pub(crate) fn rollback_and_save(&mut self, snapshot: &TransactionSnapshot) {
        snapshot.rollback(&mut self.header);
        if let Err(err) = self.header.save(&mut self.port, self.config.header_addr) {
            log::error!("header save during rollback failed: {err}");
        }
    }

    // ---- Stream write (chunked update), component 4.8 ----

    /// `write_begin`: validates `tag`/`total_len` against the meta table,
    /// decides placement exactly as `write` does, and writes the frame
    /// header immediately so `write_chunk` only ever appends payload
    /// bytes and feeds the running CRC.
    pub fn write_begin(&mut self, tag: u16, total_len: u32) -> Result<StreamToken, EngineError> {
        self.require_initialised()?;
        if tag == 0 || total_len == 0 {
            return Err(EngineError::InvalidParam);
        }
        let max_length = self.meta.max_length_of(tag).ok_or(EngineError::NotFound)?;
        if total_len > max_length {
            return Err(EngineError::InvalidParam);
        }
        let version = self.meta.find(tag).map(|e| e.version).unwrap_or(1);

        let snapshot = TransactionSnapshot::capture(&self.header);
        let placement = self.plan_placement(tag, total_len)?;
        let addr = match placement {
            Placement::InPlace { addr } => addr,
            Placement::Displace { addr, .. } => addr,
            Placement::Fresh { addr } => addr,
        };

        let write_counter = self.next_write_counter(tag, addr);
        let header = RecordHeader {
            tag,
            payload_len: total_len as u16,
            version,
            flags: 0,
            timestamp: self.port.now_seconds(),
            write_counter,
        };
        let header_bytes = header.to_bytes();
        if let Err(err) = self.port.write(addr, &header_bytes) {
            self.rollback_and_save(&snapshot);
            return Err(err);
        }

        let token = match self.streams.acquire() {
            Ok(t) => t,
            Err(err) => {
                self.rollback_and_save(&snapshot);
                return Err(err);
            }
        };
        let handle = self.streams.get_mut(token)?;
        handle.state = HandleState::Writing;
        handle.tag = tag;
        handle.addr = addr;
        handle.offset = crate::format::RECORD_HEADER_SIZE;
        handle.total_len = total_len;
        handle.processed = 0;
        handle.snapshot = Some(snapshot);
        handle.displaced = match placement {
            Placement::Displace { old_slot, old_frame, .. } => Some(DisplacedEntry { slot: old_slot, old_frame_size: old_frame }),
            _ => None,
        };
        let mut crc = crate::crc::Crc16::init();
        crc.update(&header_bytes);
        handle.crc = Some(crc);

        Ok(token)
    }

    pub fn write_chunk(&mut self, token: StreamToken, data: &[u8]) -> Result<(), EngineError> {
        self.require_initialised()?;
        let handle = self.streams.get_mut(token)?;
        if handle.state != HandleState::Writing {
            return Err(EngineError::InvalidState);
        }
        if handle.processed + data.len() as u32 > handle.total_len {
            return Err(EngineError::InvalidParam);
        }

        let addr = handle.addr + handle.offset;
        self.port.write(addr, data)?;

        let handle = self.streams.get_mut(token)?;
        handle.crc.as_mut().unwrap().update(data);
        handle.offset += data.len() as u32;
        handle.processed += data.len() as u32;
        Ok(())
    }

    /// `write_end`: finalises the CRC, writes the trailing bytes, then
    /// runs the same commit sequence as the single-shot write (steps 5-8
    /// of the core-write algorithm).
    pub fn write_end(&mut self, token: StreamToken) -> Result<(), EngineError> {
        self.require_initialised()?;
        let handle = self.streams.get(token)?;
        if handle.state != HandleState::Writing {
            return Err(EngineError::InvalidState);
        }
        if handle.processed != handle.total_len {
            return Err(EngineError::InvalidParam);
        }

        let tag = handle.tag;
        let addr = handle.addr;
        let offset = handle.offset;
        let snapshot = *handle.snapshot.as_ref().unwrap();
        let displaced = handle.displaced;
        let version = self.meta.find(tag).map(|e| e.version).unwrap_or(1);

        let crc = self.streams.get_mut(token)?.crc.take().unwrap().finalize();
        let mut crc_buf = [0u8; 2];
        LittleEndian::write_u16(&mut crc_buf, crc);

        let result = self.finish_stream_write_commit(tag, addr, offset, version, displaced, &crc_buf);

        match result {
            Ok(()) => {
                self.header.total_writes = self.header.total_writes.wrapping_add(1);
                self.header.last_update_time = self.port.now_seconds();
                if let Err(err) = self.header.save(&mut self.port, self.config.header_addr) {
                    self.record_error(&err, tag, "write_end::header_save");
                    self.rollback_and_save(&snapshot);
                    self.streams.release(token)?;
                    return Err(err);
                }
                self.streams.release(token)?;
                if self.config.auto_clean_fragment
                    && self.calculate_fragmentation() >= self.config.auto_defrag_threshold_percent
                {
                    self.defragment()?;
                }
                Ok(())
            }
            Err(err) => {
                self.rollback_and_save(&snapshot);
                self.streams.release(token)?;
                self.record_error(&err, tag, "write_end");
                Err(err)
            }
        }
    }

    fn finish_stream_write_commit(
        &mut self,
        tag: u16,
        addr: u32,
        offset: u32,
        version: u8,
        displaced: Option<DisplacedEntry>,
        crc_buf: &[u8; 2],
    ) -> Result<(), EngineError> {
        self.port.write(addr + offset, crc_buf)?;

        if let Some(d) = displaced {
            self.index.mark_dirty(d.slot);
            self.header.used_space -= d.old_frame_size;
            self.header.fragment_count += 1;
            self.header.fragment_size += d.old_frame_size;
            self.index.add(tag, addr, version)?;
        } else if self.index.find(tag).is_some() {
            self.index.update(tag, addr, version)?;
        } else {
            self.index.add(tag, addr, version)?;
        }

        self.header.tag_count = self.index.count_valid() as u16;
        self.index.save(&mut self.port, self.config.index_addr)
    }

    /// `write_abort`: rolls back the snapshot, saves Header, counts the
    /// allocated region as waste, and releases the handle.
    pub fn write_abort(&mut self, token: StreamToken) -> Result<(), EngineError> {
        let handle = match self.streams.get(token) {
            Ok(h) => h,
            Err(_) => return Ok(()),
        };
        if handle.state != HandleState::Writing {
            self.streams.abort(token);
            return Ok(());
        }
        let snapshot = *handle.snapshot.as_ref().unwrap();
        let frame = frame_size(handle.total_len);

        snapshot.rollback(&mut self.header);
        self.header.fragment_count += 1;
        self.header.fragment_size += frame;
        self.header.save(&mut self.port, self.config.header_addr)?;
        self.streams.abort(token);
        Ok(())
    }
}

//! Record frame codec: header + payload + trailing CRC-16.
//!
//! The CRC covers header bytes and payload bytes; it is never computed
//! over a concatenated copy, since the payload usually lives in a
//! caller-supplied buffer the codec should not have to clone.

use crate::crc;
use crate::error::EngineError;
use crate::port::Port;
use byteorder::{ByteOrder, LittleEndian};

pub const RECORD_HEADER_SIZE: u32 = 14;
pub const RECORD_CRC_SIZE: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub tag: u16,
    pub payload_len: u16,
    pub version: u8,
    pub flags: u8,
    pub timestamp: u32,
    pub write_counter: u32,
}

impl RecordHeader {
    pub fn to_bytes(&self) -> [u8; RECORD_HEADER_SIZE as usize] {
        let mut buf = [0u8; RECORD_HEADER_SIZE as usize];
        LittleEndian::write_u16(&mut buf[0..2], self.tag);
        LittleEndian::write_u16(&mut buf[2..4], self.payload_len);
        buf[4] = self.version;
        buf[5] = self.flags;
        LittleEndian::write_u32(&mut buf[6..10], self.timestamp);
        LittleEndian::write_u32(&mut buf[10..14], self.write_counter);
        buf
    }

    pub fn from_bytes(buf: &[u8; RECORD_HEADER_SIZE as usize]) -> Self {
        Self {
            tag: LittleEndian::read_u16(&buf[0..2]),
            payload_len: LittleEndian::read_u16(&buf[2..4]),
            version: buf[4],
            flags: buf[5],
            timestamp: LittleEndian::read_u32(&buf[6..10]),
            write_counter: LittleEndian::read_u32(&buf[10..14]),
        }
    }
}

/// Total on-medium size of a frame carrying `payload_len` payload bytes.
pub fn frame_size(payload_len: u32) -> u32 {
    RECORD_HEADER_SIZE + payload_len + RECORD_CRC_SIZE
}

/// Reads and parses only the frame header at `addr`, without touching
/// payload or CRC. Used by defragment and stream-read `begin`, which only
/// need the declared length up front.
pub fn read_header(port: &mut dyn Port, addr: u32) -> Result<RecordHeader, EngineError> {
    let mut buf = [0u8; RECORD_HEADER_SIZE as usize];
    port.read(addr, &mut buf)?;
    Ok(RecordHeader::from_bytes(&buf))
}

/// Reads a full frame at `addr` into `buf`, verifying the trailing CRC.
/// Returns the parsed header (whose `payload_len` tells the caller how
/// much of `buf` was filled). Fails with `NoBufferMemory` before issuing
/// the payload read if `buf` is too small.
pub fn read_record(port: &mut dyn Port, addr: u32, buf: &mut [u8]) -> Result<RecordHeader, EngineError> {
    let header = read_header(port, addr)?;
    let len = header.payload_len as usize;
    if len > buf.len() {
        return Err(EngineError::NoBufferMemory {
            required: header.payload_len as u32,
        });
    }

    port.read(addr + RECORD_HEADER_SIZE, &mut buf[..len])?;

    let mut crc_buf = [0u8; 2];
    port.read(addr + RECORD_HEADER_SIZE + len as u32, &mut crc_buf)?;
    let stored_crc = LittleEndian::read_u16(&crc_buf);
    let calc_crc = crc::checksum_parts(&header.to_bytes(), &buf[..len]);
    if calc_crc != stored_crc {
        return Err(EngineError::CrcFailed);
    }

    Ok(header)
}

/// Writes header, payload and trailing CRC, in that order, as three
/// separate port writes. Partial completion is tolerated by design: the
/// commit point for visibility is the index save, not this call.
pub fn write_record(port: &mut dyn Port, addr: u32, header: &RecordHeader, data: &[u8]) -> Result<(), EngineError> {
    debug_assert_eq!(header.payload_len as usize, data.len());

    let header_bytes = header.to_bytes();
    let crc = crc::checksum_parts(&header_bytes, data);

    port.write(addr, &header_bytes)?;
    port.write(addr + RECORD_HEADER_SIZE, data)?;

    let mut crc_buf = [0u8; 2];
    LittleEndian::write_u16(&mut crc_buf, crc);
    port.write(addr + RECORD_HEADER_SIZE + data.len() as u32, &crc_buf)?;

    Ok(())
}

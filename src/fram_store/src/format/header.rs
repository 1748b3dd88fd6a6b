//! The superblock: the single source of truth for free/used accounting.
//! The index never duplicates these values.

use crate::config::EngineConfig;
use crate::crc;
use crate::error::EngineError;
use crate::port::Port;
use byteorder::{ByteOrder, LittleEndian};

pub const HEADER_SIZE: usize = 256;
const FIXED_FIELDS_SIZE: usize = 44;
const RESERVED_SIZE: usize = HEADER_SIZE - FIXED_FIELDS_SIZE - 2;

/// `"FRAM"` read as a little-endian `u32`.
pub const MAGIC: u32 = u32::from_le_bytes(*b"FRAM");

/// Major.minor packed into one `u16`; major in the high byte.
pub const CURRENT_FORMAT_VERSION: u16 = 0x0100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemHeader {
    pub magic: u32,
    pub format_version: u16,
    pub tag_count: u16,
    pub data_region_start: u32,
    pub data_region_size: u32,
    pub next_free_addr: u32,
    pub total_writes: u32,
    pub last_update_time: u32,
    pub free_space: u32,
    pub used_space: u32,
    pub fragment_count: u32,
    pub fragment_size: u32,
}

impl SystemHeader {
    /// A zeroed-then-initialised header for a fresh medium of the given
    /// layout. Does not touch storage; callers persist it with `save`.
    pub fn new(config: &EngineConfig, magic: u32) -> Self {
        Self {
            magic,
            format_version: CURRENT_FORMAT_VERSION,
            tag_count: 0,
            data_region_start: config.data_addr,
            data_region_size: config.data_region_size,
            next_free_addr: config.data_addr,
            total_writes: 0,
            last_update_time: 0,
            free_space: config.data_region_size,
            used_space: 0,
            fragment_count: 0,
            fragment_size: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        let mut off = 0;
        LittleEndian::write_u32(&mut buf[off..off + 4], self.magic);
        off += 4;
        LittleEndian::write_u16(&mut buf[off..off + 2], self.format_version);
        off += 2;
        LittleEndian::write_u16(&mut buf[off..off + 2], self.tag_count);
        off += 2;
        LittleEndian::write_u32(&mut buf[off..off + 4], self.data_region_start);
        off += 4;
        LittleEndian::write_u32(&mut buf[off..off + 4], self.data_region_size);
        off += 4;
        LittleEndian::write_u32(&mut buf[off..off + 4], self.next_free_addr);
        off += 4;
        LittleEndian::write_u32(&mut buf[off..off + 4], self.total_writes);
        off += 4;
        LittleEndian::write_u32(&mut buf[off..off + 4], self.last_update_time);
        off += 4;
        LittleEndian::write_u32(&mut buf[off..off + 4], self.free_space);
        off += 4;
        LittleEndian::write_u32(&mut buf[off..off + 4], self.used_space);
        off += 4;
        LittleEndian::write_u32(&mut buf[off..off + 4], self.fragment_count);
        off += 4;
        LittleEndian::write_u32(&mut buf[off..off + 4], self.fragment_size);
        off += 4;
        debug_assert_eq!(off, FIXED_FIELDS_SIZE);
        // buf[off..off+RESERVED_SIZE] stays zeroed (reserved padding).
        let crc_field = off + RESERVED_SIZE;
        let crc = crc::checksum(&buf[..crc_field]);
        LittleEndian::write_u16(&mut buf[crc_field..crc_field + 2], crc);
        buf
    }

    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Self {
        let mut off = 0;
        let magic = LittleEndian::read_u32(&buf[off..off + 4]);
        off += 4;
        let format_version = LittleEndian::read_u16(&buf[off..off + 2]);
        off += 2;
        let tag_count = LittleEndian::read_u16(&buf[off..off + 2]);
        off += 2;
        let data_region_start = LittleEndian::read_u32(&buf[off..off + 4]);
        off += 4;
        let data_region_size = LittleEndian::read_u32(&buf[off..off + 4]);
        off += 4;
        let next_free_addr = LittleEndian::read_u32(&buf[off..off + 4]);
        off += 4;
        let total_writes = LittleEndian::read_u32(&buf[off..off + 4]);
        off += 4;
        let last_update_time = LittleEndian::read_u32(&buf[off..off + 4]);
        off += 4;
        let free_space = LittleEndian::read_u32(&buf[off..off + 4]);
        off += 4;
        let used_space = LittleEndian::read_u32(&buf[off..off + 4]);
        off += 4;
        let fragment_count = LittleEndian::read_u32(&buf[off..off + 4]);
        off += 4;
        let fragment_size = LittleEndian::read_u32(&buf[off..off + 4]);

        Self {
            magic,
            format_version,
            tag_count,
            data_region_start,
            data_region_size,
            next_free_addr,
            total_writes,
            last_update_time,
            free_space,
            used_space,
            fragment_count,
            fragment_size,
        }
    }

    /// Checks magic, format-version compatibility and the trailing CRC.
    /// Major version must match exactly; minor stored version may be at
    /// or below the firmware's expected minor.
    pub fn verify(buf: &[u8; HEADER_SIZE], expected_magic: u32) -> Result<(), EngineError> {
        let crc_field = FIXED_FIELDS_SIZE + RESERVED_SIZE;
        let stored_crc = LittleEndian::read_u16(&buf[crc_field..crc_field + 2]);
        let calc_crc = crc::checksum(&buf[..crc_field]);
        if calc_crc != stored_crc {
            return Err(EngineError::CrcFailed);
        }

        let magic = LittleEndian::read_u32(&buf[0..4]);
        if magic != expected_magic {
            return Err(EngineError::Corrupted);
        }

        let format_version = LittleEndian::read_u16(&buf[4..6]);
        let stored_major = (format_version >> 8) as u8;
        let stored_minor = (format_version & 0xFF) as u8;
        let expected_major = (CURRENT_FORMAT_VERSION >> 8) as u8;
        let expected_minor = (CURRENT_FORMAT_VERSION & 0xFF) as u8;
        if stored_major != expected_major || stored_minor > expected_minor {
            return Err(EngineError::Version);
        }

        Ok(())
    }

    pub fn load(port: &mut dyn Port, addr: u32, expected_magic: u32) -> Result<Self, EngineError> {
        let mut buf = [0u8; HEADER_SIZE];
        port.read(addr, &mut buf)?;
        Self::verify(&buf, expected_magic)?;
        Ok(Self::from_bytes(&buf))
    }

    pub fn save(&self, port: &mut dyn Port, addr: u32) -> Result<(), EngineError> {
        let buf = self.to_bytes();
        port.write(addr, &buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let config = EngineConfig::default();
        let header = SystemHeader::new(&config, MAGIC);
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE);
        let parsed = SystemHeader::from_bytes(&bytes);
        assert_eq!(header, parsed);
    }

    #[test]
    fn verify_detects_crc_corruption() {
        let config = EngineConfig::default();
        let header = SystemHeader::new(&config, MAGIC);
        let mut bytes = header.to_bytes();
        bytes[10] ^= 0xFF;
        assert!(matches!(
            SystemHeader::verify(&bytes, MAGIC),
            Err(EngineError::CrcFailed)
        ));
    }

    #[test]
    fn verify_detects_wrong_magic() {
        let config = EngineConfig::default();
        let header = SystemHeader::new(&config, 0xDEADBEEF);
        let bytes = header.to_bytes();
        assert!(matches!(
            SystemHeader::verify(&bytes, MAGIC),
            Err(EngineError::Corrupted)
        ));
    }

    #[test]
    fn verify_rejects_newer_major_version() {
        let config = EngineConfig::default();
        let mut header = SystemHeader::new(&config, MAGIC);
        header.format_version = 0x0200;
        let bytes = header.to_bytes();
        assert!(matches!(
            SystemHeader::verify(&bytes, MAGIC),
            Err(EngineError::Version)
        ));
    }
}

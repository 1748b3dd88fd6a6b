//! CRC-16 checksum helper shared by the header, index and record codecs.
//!
//! Wraps the `crc` crate's table-driven implementation behind a small
//! streaming `init`/`update`/`finalize` interface plus a one-shot
//! convenience, so callers that need to checksum a value assembled from
//! several discontiguous slices (header bytes then payload bytes, for
//! instance) never have to concatenate them first.

use crc::{Algorithm, Crc, Digest, CRC_16_ARC};

/// The polynomial used across the whole on-medium format. Every CRC field
/// described in the data model (header, index, record) is computed with
/// this one algorithm.
static CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_ARC);

/// A running CRC-16 computation.
pub struct Crc16<'a> {
    digest: Digest<'a, u16>,
}

impl<'a> Crc16<'a> {
    pub fn init() -> Self {
        Self {
            digest: CRC16.digest(),
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.digest.update(bytes);
    }

    pub fn finalize(self) -> u16 {
        self.digest.finalize()
    }
}

/// One-shot checksum over a single contiguous slice.
pub fn checksum(bytes: &[u8]) -> u16 {
    CRC16.checksum(bytes)
}

/// One-shot checksum over two slices, as if they had been concatenated.
/// Used for record frames, where header and payload are separate buffers.
pub fn checksum_parts(a: &[u8], b: &[u8]) -> u16 {
    let mut crc = Crc16::init();
    crc.update(a);
    crc.update(b);
    crc.finalize()
}

#[allow(dead_code)]
const _ALGORITHM_DOC: &Algorithm<u16> = &CRC_16_ARC;

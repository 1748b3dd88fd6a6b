//! On-read schema migration: the single-step driver invoked by both the
//! lazy on-read path (`Engine::read`) and the best-effort boot-time batch
//! pass (`Engine::migrate_all`).

use crate::error::EngineError;
use crate::meta::MetaEntry;

pub struct MigrationOutcome {
    pub new_len: usize,
    pub new_version: u8,
}

/// Walks `buf` forward one schema version at a time until it reaches
/// `meta.version`, calling `meta.migrator` once per step so a V1→V3
/// upgrade runs V1→V2 then V2→V3.
///
/// `buf`'s usable capacity for growth is its full length; `old_len` is how
/// much of it is populated going in.
pub fn migrate_tag(meta: &MetaEntry, buf: &mut [u8], old_len: usize, old_version: u8) -> Result<MigrationOutcome, EngineError> {
    if old_version > meta.version {
        return Err(EngineError::Version);
    }
    if old_version == meta.version {
        return Ok(MigrationOutcome {
            new_len: old_len,
            new_version: old_version,
        });
    }

    let migrator = meta.migrator.ok_or(EngineError::Version)?;
    let max_size = buf.len();
    let mut len = old_len;
    let mut version = old_version;

    while version < meta.version {
        len = migrator.upgrade_step(buf, len, max_size, version)?;
        if len > meta.max_length as usize {
            return Err(EngineError::InvalidParam);
        }
        version += 1;
    }

    Ok(MigrationOutcome {
        new_len: len,
        new_version: version,
    })
}

//! Compaction engine — minor (memtable → L0) and L0→L1 compaction.
//!
//! Both operations are plain functions rather than a struct: they take the
//! durable state they need to mutate (the manifest, the data directory,
//! the relevant SST readers) by reference, perform the on-disk work, and
//! return the new reader(s) for the caller to fold into its in-memory
//! level vectors. The caller — the DB facade — holds the catalog mutex
//! across the whole call so no other writer can observe a half-applied
//! compaction.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::manifest::{Manifest, ManifestError};
use crate::memtable::{Memtable, MemtableError, ValueRecord};
use crate::sstable::{self, builder::SstBuilder, SstError, SstReader};
use crate::wal::{RecordType, WalError};

/// Errors from a compaction operation.
#[derive(Debug, Error)]
pub enum CompactionError {
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("SST error: {0}")]
    Sst(#[from] SstError),

    #[error("WAL error: {0}")]
    Wal(#[from] WalError),

    #[error("memtable error: {0}")]
    Memtable(#[from] MemtableError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Flushes an immutable memtable to a new L0 SST.
///
/// `imm` must already be detached from the active write path (the caller
/// rotated to a new memtable before calling this). On success, removes
/// `imm`'s WAL file and its manifest entry; on an SST build/open failure,
/// leaves the WAL in place untouched — correctness over freshness, since
/// the data is still recoverable from it.
///
/// Returns the new L0 reader, or `None` if `imm` held no records (in which
/// case the stale WAL is still cleaned up, since there is nothing in it
/// worth preserving).
pub fn minor_compaction(
    dir: &Path,
    manifest: &Manifest,
    imm: Memtable,
    bits_per_key: u32,
    data_block_target_size: usize,
) -> Result<Option<Arc<SstReader>>, CompactionError> {
    let entries = imm.iter()?;
    let old_wal_number = imm.file_number();
    let wal = imm.into_wal();

    let id = manifest.allocate_file_number()?;
    let sst_path = dir.join(format!("{id}.sst"));

    let built = sstable::builder::build_and_open_with_options(
        &sst_path,
        id,
        bits_per_key,
        data_block_target_size,
        entries.iter().map(|(k, v)| (k.as_slice(), v)),
    )?;

    // A failure above leaves `wal` untouched on disk (we haven't called
    // `remove` yet). AddSST for the new file must happen-before DelWAL for
    // the file it replaces.
    match built {
        Some(reader) => {
            manifest.add_sst(id, 0)?;
            manifest.remove_wal(old_wal_number)?;
            wal.remove()?;
            info!(id, records = entries.len(), "minor compaction: L0 SST written");
            Ok(Some(Arc::new(reader)))
        }
        None => {
            manifest.remove_wal(old_wal_number)?;
            wal.remove()?;
            info!(old_wal_number, "minor compaction: memtable was empty, nothing written");
            Ok(None)
        }
    }
}

/// Merges every L0 SST into at most one new L1 SST, applying newest-wins
/// resolution and dropping tombstones that have nothing left to shadow in
/// L1 (the "bottom-most" check).
///
/// `l0` and `l1` must be in ascending file-number order (oldest first).
/// On success, every input L0 file is unlinked and its manifest entry
/// removed; the caller should clear its in-memory L0 vector and, if a
/// reader was returned, append it to L1.
pub fn compact_l0_to_l1(
    dir: &Path,
    manifest: &Manifest,
    l0: &[Arc<SstReader>],
    l1: &[Arc<SstReader>],
    bits_per_key: u32,
    data_block_target_size: usize,
) -> Result<Option<Arc<SstReader>>, CompactionError> {
    if l0.is_empty() {
        return Ok(None);
    }

    let mut merged: BTreeMap<Vec<u8>, ValueRecord> = BTreeMap::new();
    for reader in l0.iter().rev() {
        for (key, record) in reader.scan(None) {
            merged.entry(key).or_insert(record);
        }
    }

    let id = manifest.allocate_file_number()?;
    let sst_path = dir.join(format!("{id}.sst"));
    let mut builder = SstBuilder::with_options(&sst_path, bits_per_key, data_block_target_size)?;
    for (key, record) in &merged {
        match record {
            ValueRecord::Put(value) => {
                builder.add(key, RecordType::Put, value)?;
            }
            ValueRecord::Tombstone => {
                if is_visible_in_l1(key, l1) {
                    builder.add(key, RecordType::Tombstone, &[])?;
                }
            }
        }
    }

    let new_reader = if builder.is_empty() {
        builder.discard();
        None
    } else {
        builder.finish()?;
        match SstReader::open(&sst_path, id) {
            Ok(reader) => Some(reader),
            Err(e) => {
                warn!(id, error = %e, "L0→L1 compaction: failed to open new SST, aborting without consuming L0");
                let _ = std::fs::remove_file(&sst_path);
                return Err(e.into());
            }
        }
    };

    if new_reader.is_some() {
        manifest.add_sst(id, 1)?;
    }

    for input in l0 {
        manifest.remove_sst(input.file_number())?;
        if let Err(e) = sstable::remove(input.path()) {
            warn!(id = input.file_number(), error = %e, "failed to remove compacted L0 file");
        }
    }

    info!(
        l0_inputs = l0.len(),
        merged_keys = merged.len(),
        new_sst = new_reader.as_ref().map(|r| r.file_number()),
        "L0→L1 compaction complete"
    );

    Ok(new_reader.map(Arc::new))
}

/// Bottom-most visibility check: is `key` visible (via a Put, not shadowed
/// by a Tombstone) anywhere in L1, scanned newest to oldest?
fn is_visible_in_l1(key: &[u8], l1: &[Arc<SstReader>]) -> bool {
    for reader in l1.iter().rev() {
        match reader.get(key) {
            Some(ValueRecord::Put(_)) => return true,
            Some(ValueRecord::Tombstone) => return false,
            None => continue,
        }
    }
    false
}

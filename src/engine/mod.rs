//! # Db — the embeddable key-value store facade
//!
//! This module ties together the WAL, memtable, SST, manifest, and
//! compaction layers into the single public handle: [`Db`].
//!
//! ## Design overview
//!
//! Data flows through three layers, queried newest-first:
//!
//! 1. **Active memtable** — an in-memory sorted map backed by a WAL.
//! 2. **L0 SSTs** — immutable files produced by flushing a full memtable,
//!    scanned newest-to-oldest.
//! 3. **L1 SSTs** — the result of merging all of L0 into one file via
//!    [`Db::compact_l0_to_l1`], newest-wins, with tombstones dropped once
//!    nothing below them could resurrect the key.
//!
//! Minor compaction (memtable → L0) happens synchronously, inline, the
//! moment a write would exceed [`DbConfig::flush_threshold`] — there is no
//! background thread and no "frozen memtable" held for concurrent reads;
//! the flush runs to completion under the same write-lock hold that
//! triggered it.
//!
//! ## Concurrency
//!
//! All mutable engine state lives behind a single `RwLock<DbInner>`. Reads
//! take a read guard; writes, flushes, and compaction take a write guard
//! for the whole operation. SST readers, once installed in a level vector,
//! are immutable — their mmap and index never change, so lookups against
//! an `Arc<SstReader>` cloned out from under the lock are lock-free.
//!
//! ## Recovery
//!
//! [`Db::open`] rebuilds the last durable state from the MANIFEST snapshot
//! and edit log, falling back to a directory scan when no snapshot exists,
//! then replays every WAL still on disk (including ones the manifest
//! didn't know about) into a freshly allocated active memtable.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::compaction::{self, CompactionError};
use crate::manifest::{Manifest, ManifestError};
use crate::memtable::{Memtable, MemtableError, ValueRecord};
use crate::sstable::{SstError, SstReader};
use crate::wal::WalError;

#[cfg(test)]
mod tests;

/// Errors that can occur during a [`Db`] operation.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("memtable error: {0}")]
    Memtable(#[from] MemtableError),

    #[error("SST error: {0}")]
    Sst(#[from] SstError),

    #[error("compaction error: {0}")]
    Compaction(#[from] CompactionError),

    #[error("WAL error: {0}")]
    Wal(#[from] WalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Configuration for a [`Db`] instance.
///
/// `Default` matches the tunable defaults: a 1000-record flush threshold,
/// a 4 KiB data block target, 10 Bloom bits per key, a 100-edit MANIFEST
/// checkpoint threshold, and an L0→L1 trigger at 2 files.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Number of records the active memtable may hold before it is
    /// flushed to a new L0 SST.
    pub flush_threshold: usize,

    /// Target size, in bytes, of one SST data block.
    pub data_block_target_size: usize,

    /// Bloom filter bits-per-key used when building new SSTs.
    pub bits_per_key: u32,

    /// Number of MANIFEST.log edits before an automatic checkpoint.
    pub manifest_checkpoint_threshold: u32,

    /// Number of L0 files at which `Db` should consider an automatic
    /// L0→L1 compaction after a flush.
    pub l0_compaction_trigger: usize,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            flush_threshold: 1000,
            data_block_target_size: crate::sstable::DATA_BLOCK_TARGET_SIZE,
            bits_per_key: crate::sstable::DEFAULT_BITS_PER_KEY,
            manifest_checkpoint_threshold: crate::manifest::CHECKPOINT_THRESHOLD,
            l0_compaction_trigger: 2,
        }
    }
}

struct DbInner {
    dir: PathBuf,
    config: DbConfig,
    manifest: Manifest,
    active: Memtable,
    /// `levels[0]` is L0 (newest-to-oldest is the iteration order callers
    /// must apply), `levels[1]` is L1.
    levels: [Vec<Arc<SstReader>>; 2],
}

/// The embeddable key-value store handle.
///
/// Cloning is not provided — share a `Db` across threads via `Arc<Db>` if
/// needed; the internal `RwLock` already makes every method safe to call
/// concurrently.
pub struct Db {
    inner: RwLock<DbInner>,
}

impl Db {
    /// Opens (or creates) a database rooted at `dir`.
    ///
    /// Runs the full recovery protocol: load or bootstrap the MANIFEST,
    /// open readers for every catalogued SST (skipping and logging any
    /// that are missing on disk), adopt orphaned `.sst` files into L0 if
    /// the catalog came up empty, then replay every `.wal` file on disk
    /// — catalogued or not — into a freshly allocated active memtable.
    pub fn open(dir: impl AsRef<Path>, config: DbConfig) -> Result<Self, DbError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let manifest =
            Manifest::open_with_checkpoint_threshold(&dir, config.manifest_checkpoint_threshold)?;
        let mut state = manifest.state()?;

        let snapshot_existed = dir.join("MANIFEST").exists();
        if !snapshot_existed {
            let max_sst = scan_file_numbers(&dir, "sst").into_iter().max();
            let max_wal = scan_file_numbers(&dir, "wal").into_iter().max();
            let max_id = max_sst.into_iter().chain(max_wal).max();
            if let Some(max_id) = max_id {
                let next = max_id + 1;
                manifest.set_next_file_number(next)?;
                state.next_file_number = next;
                info!(next_file_number = next, "bootstrapped file numbering from directory scan");
            }
        }

        let mut levels: [Vec<Arc<SstReader>>; 2] = [Vec::new(), Vec::new()];
        for (&id, &level) in &state.sst_levels {
            let path = dir.join(format!("{id}.sst"));
            if !path.exists() {
                warn!(id, level, "SST registered in MANIFEST is missing on disk, skipping");
                continue;
            }
            let reader = Arc::new(SstReader::open(&path, id)?);
            let idx = level.min(1) as usize;
            levels[idx].push(reader);
        }

        if state.sst_levels.is_empty() {
            for id in scan_file_numbers(&dir, "sst") {
                let path = dir.join(format!("{id}.sst"));
                let reader = Arc::new(SstReader::open(&path, id)?);
                manifest.add_sst(id, 0)?;
                levels[0].push(reader);
            }
            if !levels[0].is_empty() {
                manifest.checkpoint()?;
                info!(count = levels[0].len(), "adopted orphan SST files into L0");
            }
        }
        levels[0].sort_by_key(|r| r.file_number());
        levels[1].sort_by_key(|r| r.file_number());

        let new_active_id = manifest.allocate_file_number()?;
        let wal_path = dir.join(format!("{new_active_id}.wal"));
        let active = Memtable::new(&wal_path, new_active_id)?;
        manifest.add_wal(new_active_id)?;

        let mut wal_ids: Vec<u64> = scan_file_numbers(&dir, "wal");
        wal_ids.sort_unstable();
        for id in wal_ids {
            if id == new_active_id {
                continue;
            }
            let stray_path = dir.join(format!("{id}.wal"));
            let stray = Memtable::new(&stray_path, id)?;
            let replayed = stray.replay_own_wal()?;
            for (key, record) in stray.iter()? {
                active.apply_without_wal(key, record)?;
            }
            // The replayed records were never appended to the active
            // memtable's own WAL, so this WAL file remains the only
            // durable copy until `active` is itself flushed; it is
            // intentionally left on disk rather than deleted here.
            debug!(id, replayed, "replayed stray WAL into active memtable");
        }

        info!(
            dir = %dir.display(),
            l0 = levels[0].len(),
            l1 = levels[1].len(),
            active_wal = new_active_id,
            "database opened"
        );

        Ok(Self {
            inner: RwLock::new(DbInner {
                dir,
                config,
                manifest,
                active,
                levels,
            }),
        })
    }

    /// Inserts or overwrites `key` with `value`.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), DbError> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        inner.active.put(key, value)?;
        Self::maybe_flush(&mut inner)?;
        Ok(())
    }

    /// Writes a tombstone for `key`.
    pub fn delete(&self, key: &[u8]) -> Result<(), DbError> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        inner.active.delete(key)?;
        Self::maybe_flush(&mut inner)?;
        Ok(())
    }

    /// Looks up a single key.
    ///
    /// Checked newest-first: active memtable, then L0 (newest file
    /// first), then L1. A Tombstone at any layer returns `Ok(None)`
    /// immediately — an older Put for the same key does not resurrect it.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, DbError> {
        let inner = self.inner.read().map_err(|_| poisoned())?;

        if let Some(record) = inner.active.get(key)? {
            return Ok(resolve(record));
        }
        for reader in inner.levels[0].iter().rev() {
            if let Some(record) = reader.get(key) {
                return Ok(resolve(record));
            }
        }
        for reader in inner.levels[1].iter().rev() {
            if let Some(record) = reader.get(key) {
                return Ok(resolve(record));
            }
        }
        Ok(None)
    }

    /// Scans all live keys from `start_key` (inclusive) to the end of the
    /// keyspace, in ascending order, tombstones hidden, newest version
    /// wins.
    ///
    /// Materializes the merged result eagerly under a read lock rather
    /// than streaming across the lock boundary — an acceptable
    /// simplification for an embedded, single-directory store.
    pub fn scan(
        &self,
        start_key: Option<&[u8]>,
    ) -> Result<impl Iterator<Item = (Vec<u8>, Vec<u8>)>, DbError> {
        let inner = self.inner.read().map_err(|_| poisoned())?;

        let mut merged: BTreeMap<Vec<u8>, ValueRecord> = BTreeMap::new();
        for reader in &inner.levels[1] {
            for (key, record) in reader.scan(start_key) {
                merged.insert(key, record);
            }
        }
        for reader in &inner.levels[0] {
            for (key, record) in reader.scan(start_key) {
                merged.insert(key, record);
            }
        }
        for (key, record) in inner.active.iter()? {
            if start_key.is_none_or(|from| key.as_slice() >= from) {
                merged.insert(key, record);
            }
        }

        Ok(merged
            .into_iter()
            .filter_map(|(k, v)| match v {
                ValueRecord::Put(value) => Some((k, value)),
                ValueRecord::Tombstone => None,
            })
            .collect::<Vec<_>>()
            .into_iter())
    }

    /// Manually triggers an L0→L1 compaction.
    ///
    /// Returns `Ok(false)` if L0 was already empty (nothing to do).
    pub fn compact_l0_to_l1(&self) -> Result<bool, DbError> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        Self::do_compact_l0_to_l1(&mut inner)
    }

    /// Number of SSTs currently live at `level` (0 or 1).
    pub fn level_size(&self, level: u8) -> usize {
        let inner = match self.inner.read() {
            Ok(inner) => inner,
            Err(_) => return 0,
        };
        inner.levels[level.min(1) as usize].len()
    }

    /// Flushes the active memtable if non-empty, then closes.
    ///
    /// Consumes `self`: once closed, the handle cannot be reused. Readers
    /// unmap on drop as each `Arc<SstReader>` goes out of scope.
    pub fn close(self) -> Result<(), DbError> {
        let mut inner = self.inner.into_inner().map_err(|_| poisoned())?;
        if !inner.active.is_empty()? {
            Self::flush_active(&mut inner)?;
        }
        inner.manifest.checkpoint()?;
        Ok(())
    }

    fn maybe_flush(inner: &mut DbInner) -> Result<(), DbError> {
        if inner.active.len()? < inner.config.flush_threshold {
            return Ok(());
        }
        Self::flush_active(inner)?;
        if inner.levels[0].len() >= inner.config.l0_compaction_trigger {
            Self::do_compact_l0_to_l1(inner)?;
        }
        Ok(())
    }

    fn flush_active(inner: &mut DbInner) -> Result<(), DbError> {
        let new_id = inner.manifest.allocate_file_number()?;
        let new_wal_path = inner.dir.join(format!("{new_id}.wal"));
        let new_active = Memtable::new(&new_wal_path, new_id)?;
        inner.manifest.add_wal(new_id)?;

        let old_active = std::mem::replace(&mut inner.active, new_active);

        if let Some(reader) = compaction::minor_compaction(
            &inner.dir,
            &inner.manifest,
            old_active,
            inner.config.bits_per_key,
            inner.config.data_block_target_size,
        )? {
            inner.levels[0].push(reader);
        }
        Ok(())
    }

    fn do_compact_l0_to_l1(inner: &mut DbInner) -> Result<bool, DbError> {
        if inner.levels[0].is_empty() {
            return Ok(false);
        }
        let new_reader = compaction::compact_l0_to_l1(
            &inner.dir,
            &inner.manifest,
            &inner.levels[0],
            &inner.levels[1],
            inner.config.bits_per_key,
            inner.config.data_block_target_size,
        )?;
        inner.levels[0].clear();
        if let Some(reader) = new_reader {
            inner.levels[1].push(reader);
        }
        Ok(true)
    }
}

fn resolve(record: ValueRecord) -> Option<Vec<u8>> {
    match record {
        ValueRecord::Put(value) => Some(value),
        ValueRecord::Tombstone => None,
    }
}

fn poisoned() -> DbError {
    DbError::Internal("RwLock poisoned".into())
}

/// Lists the numeric file numbers of `<digits>.<ext>` files in `dir`.
fn scan_file_numbers(dir: &Path, ext: &str) -> Vec<u64> {
    let mut ids = Vec::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return ids;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(ext) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            && let Ok(id) = stem.parse::<u64>()
        {
            ids.push(id);
        }
    }
    ids
}

//! In-memory write buffer (MemTable)
//!
//! A [`Memtable`] is an ordered map from key to [`ValueRecord`], paired with
//! exactly one [`Wal`]. It holds at most one entry per key — the most
//! recent write, including tombstones. Every write goes through the WAL
//! first and the in-memory map second; reads never see a write that isn't
//! already durable.
//!
//! # Concurrency
//!
//! The map is guarded by a `RwLock`. The WAL append happens before the
//! lock is taken — the WAL already serializes its own writers, so there's
//! no benefit to holding the map lock across the fsync.

#[cfg(test)]
mod tests;

use std::path::Path;
use std::sync::RwLock;

use thiserror::Error;
use tracing::{debug, trace};

use crate::wal::{RecordType, Wal, WalError};

/// A tracing-friendly hex preview of a key, truncated for long keys.
struct HexKey<'a>(&'a [u8]);

impl std::fmt::Display for HexKey<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const MAX: usize = 16;
        for b in self.0.iter().take(MAX) {
            write!(f, "{b:02x}")?;
        }
        if self.0.len() > MAX {
            write!(f, "..")?;
        }
        Ok(())
    }
}

/// Errors produced by memtable operations.
#[derive(Debug, Error)]
pub enum MemtableError {
    /// The underlying WAL failed.
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),

    /// Underlying filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal consistency error (e.g. poisoned lock).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A value or a delete marker held in the memtable / SST.
///
/// A `Tombstone` always carries an empty value; physical deletion never
/// happens at this layer — a tombstone simply shadows whatever came before
/// it until it is dropped by compaction at the bottom level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueRecord {
    /// A live value.
    Put(Vec<u8>),
    /// A delete marker.
    Tombstone,
}

impl ValueRecord {
    /// The WAL/SST type tag and value bytes for this record.
    fn as_wal_parts(&self) -> (RecordType, &[u8]) {
        match self {
            ValueRecord::Put(v) => (RecordType::Put, v.as_slice()),
            ValueRecord::Tombstone => (RecordType::Tombstone, &[]),
        }
    }

    fn from_wal(record_type: RecordType, value: Vec<u8>) -> Self {
        match record_type {
            RecordType::Put => ValueRecord::Put(value),
            RecordType::Tombstone => ValueRecord::Tombstone,
        }
    }

    /// Whether this record is a tombstone.
    pub fn is_tombstone(&self) -> bool {
        matches!(self, ValueRecord::Tombstone)
    }

    fn byte_len(&self) -> usize {
        match self {
            ValueRecord::Put(v) => v.len(),
            ValueRecord::Tombstone => 0,
        }
    }
}

/// Fixed per-entry overhead assumed by [`Memtable::approx_memory_usage`] to
/// account for map/allocator bookkeeping not captured by key/value lengths
/// alone.
const PER_ENTRY_OVERHEAD: usize = 48;

struct MemtableInner {
    map: std::collections::BTreeMap<Vec<u8>, ValueRecord>,
    approx_size: usize,
}

/// An in-memory ordered map of the most recent write per key, backed by a
/// write-ahead log.
pub struct Memtable {
    inner: RwLock<MemtableInner>,
    wal: Wal,
}

impl Memtable {
    /// Creates a memtable bound to a freshly-opened WAL at `wal_path`.
    ///
    /// Does **not** replay the WAL — recovery calls [`Memtable::replay_own_wal`]
    /// explicitly once the memtable has been constructed, so the order of
    /// operations stays explicit at the call site.
    pub fn new(wal_path: impl AsRef<Path>, file_number: u64) -> Result<Self, MemtableError> {
        let wal = Wal::open(wal_path, file_number)?;
        Ok(Self {
            inner: RwLock::new(MemtableInner {
                map: std::collections::BTreeMap::new(),
                approx_size: 0,
            }),
            wal,
        })
    }

    /// Path of the bound WAL file.
    pub fn wal_path(&self) -> &Path {
        self.wal.path()
    }

    /// File number of the bound WAL.
    pub fn file_number(&self) -> u64 {
        self.wal.file_number()
    }

    /// Inserts `key -> Put(value)`, durably logging the write first.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), MemtableError> {
        self.write_through(key, ValueRecord::Put(value.to_vec()))
    }

    /// Inserts `key -> Tombstone`, durably logging the write first.
    ///
    /// Sugar over a `put` with a delete marker — physical removal never
    /// happens in the memtable.
    pub fn delete(&self, key: &[u8]) -> Result<(), MemtableError> {
        self.write_through(key, ValueRecord::Tombstone)
    }

    fn write_through(&self, key: &[u8], record: ValueRecord) -> Result<(), MemtableError> {
        let (record_type, value) = record.as_wal_parts();
        self.wal.append(key, value, record_type)?;
        self.apply_without_wal(key.to_vec(), record)
    }

    /// Looks up the most recent record for `key`, if any.
    pub fn get(&self, key: &[u8]) -> Result<Option<ValueRecord>, MemtableError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| MemtableError::Internal("lock poisoned".into()))?;
        Ok(inner.map.get(key).cloned())
    }

    /// Returns every entry in ascending key order.
    pub fn iter(&self) -> Result<Vec<(Vec<u8>, ValueRecord)>, MemtableError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| MemtableError::Internal("lock poisoned".into()))?;
        Ok(inner
            .map
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    /// Number of distinct keys currently held.
    pub fn len(&self) -> Result<usize, MemtableError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| MemtableError::Internal("lock poisoned".into()))?;
        Ok(inner.map.len())
    }

    /// Whether the memtable holds no entries.
    pub fn is_empty(&self) -> Result<bool, MemtableError> {
        Ok(self.len()? == 0)
    }

    /// Approximate resident size in bytes; the engine compares this (and
    /// the record count) against the configured flush threshold.
    pub fn approx_memory_usage(&self) -> Result<usize, MemtableError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| MemtableError::Internal("lock poisoned".into()))?;
        Ok(inner.approx_size)
    }

    /// Applies a record to the in-memory map **without** touching the WAL.
    ///
    /// This is the replay door used by recovery: the record already came
    /// from a WAL being replayed, so re-logging it would be both redundant
    /// and, for the file it came from, actively wrong.
    pub fn apply_without_wal(&self, key: Vec<u8>, record: ValueRecord) -> Result<(), MemtableError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| MemtableError::Internal("lock poisoned".into()))?;
        let added = key.len() + record.byte_len() + PER_ENTRY_OVERHEAD;
        inner.map.insert(key, record);
        inner.approx_size += added;

        trace!(size = inner.approx_size, "memtable write");
        Ok(())
    }

    /// Replays every record in this memtable's own WAL into itself.
    ///
    /// Used by the recovery loader immediately after binding a memtable to
    /// a pre-existing WAL file.
    pub fn replay_own_wal(&self) -> Result<usize, MemtableError> {
        let mut count = 0;
        for record in self.wal.replay_iter() {
            let record = record?;
            let value = ValueRecord::from_wal(record.record_type, record.value);
            self.apply_without_wal(record.key, value)?;
            count += 1;
        }
        debug!(
            file_number = self.wal.file_number(),
            count, "memtable replayed own WAL"
        );
        Ok(count)
    }

    /// Consumes the memtable, returning its bound WAL so the caller can
    /// remove it once the memtable's flushed SST is durably registered.
    pub fn into_wal(self) -> Wal {
        self.wal
    }
}

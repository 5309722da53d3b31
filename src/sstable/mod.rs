//! Sorted String Table (SSTable) module.
//!
//! An SST is an immutable, disk-backed, sorted run of `(key, ValueRecord)`
//! entries produced by flushing a memtable or by compacting older SSTs. It
//! is made of three parts, in file order: zero or more ~4 KiB data blocks,
//! one filter block, one index block, and a fixed 40-byte footer.
//!
//! # On-disk layout
//!
//! ```text
//! [DATA BLOCK]...
//! [FILTER BLOCK]
//! [INDEX BLOCK]
//! [FOOTER: index_off:u64 | index_size:u64 | filter_off:u64 | filter_size:u64 | magic:u64]
//! ```
//!
//! A data block holds a run of records (§[`block::append_record`]) in
//! ascending key order. The index block holds one record per data block:
//! its `key` is the block's last key, its "value" is an encoded
//! [`block::BlockHandle`] pointing at the block. The filter block is the
//! raw bytes from [`bloom::create_filter`] over every key in the table.
//!
//! There is no per-block checksum — the whole file is read once via mmap
//! and any corruption surfaces as a malformed footer or index, which
//! `open` reports as an error rather than silently tolerating (unlike the
//! WAL, an SST is never appended to after creation, so there is no torn
//! tail to tolerate).
//!
//! # Concurrency model
//!
//! SSTs are immutable once written: readers hold only a read-only mmap and
//! need no locking. Multiple readers may share one SST concurrently.
//!
//! # Sub-modules
//!
//! - [`block`] — shared block record codec.
//! - [`bloom`] — hand-rolled Bloom filter.
//! - [`builder`] — [`builder::SstBuilder`] for writing a new SST from a
//!   sorted stream.
//! - [`iterator`] — [`iterator::SstScan`] for the tombstone-surfacing scan.

pub mod block;
pub mod bloom;
pub mod builder;
pub mod iterator;

#[cfg(test)]
mod tests;

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::memtable::ValueRecord;
use crate::wal::RecordType;
use block::BlockHandle;

/// Magic trailing the 40-byte SST footer.
pub const SST_MAGIC: u64 = 0xDEAD_C0DE_FA11_2026;
/// Footer size in bytes.
pub const FOOTER_SIZE: usize = 40;
/// Target size of a data block before the writer starts a new one.
pub const DATA_BLOCK_TARGET_SIZE: usize = 4096;
/// Default Bloom filter bits-per-key.
pub const DEFAULT_BITS_PER_KEY: u32 = 10;

/// Errors returned by SST operations.
#[derive(Debug, Error)]
pub enum SstError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The footer, index, or a data block could not be parsed.
    #[error("corrupt SST file: {0}")]
    Corrupt(String),
}

/// One `(offset, size)` footer, decoded from the trailing [`FOOTER_SIZE`]
/// bytes of an SST file.
struct Footer {
    index: BlockHandle,
    filter: BlockHandle,
}

impl Footer {
    fn decode(buf: &[u8]) -> Result<Self, SstError> {
        if buf.len() < FOOTER_SIZE {
            return Err(SstError::Corrupt("file shorter than footer".into()));
        }
        let tail = &buf[buf.len() - FOOTER_SIZE..];
        let index = BlockHandle::decode(&tail[0..16])
            .ok_or_else(|| SstError::Corrupt("bad index handle".into()))?;
        let filter = BlockHandle::decode(&tail[16..32])
            .ok_or_else(|| SstError::Corrupt("bad filter handle".into()))?;
        let magic = u64::from_le_bytes(tail[32..40].try_into().unwrap());
        if magic != SST_MAGIC {
            return Err(SstError::Corrupt(format!("bad magic: {magic:#x}")));
        }
        Ok(Self { index, filter })
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        self.index.encode(buf);
        self.filter.encode(buf);
        buf.extend_from_slice(&SST_MAGIC.to_le_bytes());
    }
}

/// One entry in the decoded index: the last key in a data block, and the
/// block's location.
struct IndexEntry {
    last_key: Vec<u8>,
    handle: BlockHandle,
}

/// An opened, immutable SST file.
///
/// Holds the file memory-mapped for its whole lifetime; the index and
/// filter are decoded eagerly at open so `get`/`scan` need no further I/O.
pub struct SstReader {
    mmap: Mmap,
    path: PathBuf,
    file_number: u64,
    index: Vec<IndexEntry>,
    filter: Vec<u8>,
}

impl SstReader {
    /// Opens and validates the SST at `path`.
    ///
    /// Fails if the file is too short to hold a footer, the magic doesn't
    /// match, or the index block cannot be decoded or is empty.
    pub fn open(path: impl AsRef<Path>, file_number: u64) -> Result<Self, SstError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        let footer = Footer::decode(&mmap)?;

        let index_bytes = slice_handle(&mmap, &footer.index)
            .ok_or_else(|| SstError::Corrupt("index handle out of bounds".into()))?;
        let mut index = Vec::new();
        for record in block::BlockIterator::new(index_bytes) {
            let handle = BlockHandle::decode(record.value)
                .ok_or_else(|| SstError::Corrupt("bad index entry handle".into()))?;
            index.push(IndexEntry {
                last_key: record.key.to_vec(),
                handle,
            });
        }
        if index.is_empty() {
            return Err(SstError::Corrupt("empty index block".into()));
        }

        let filter = slice_handle(&mmap, &footer.filter)
            .ok_or_else(|| SstError::Corrupt("filter handle out of bounds".into()))?
            .to_vec();

        debug!(path = %path.display(), file_number, blocks = index.len(), "SST opened");

        Ok(Self {
            mmap,
            path,
            file_number,
            index,
            filter,
        })
    }

    /// File number this SST is identified by (parsed from its filename by
    /// the caller and threaded through here).
    pub fn file_number(&self) -> u64 {
        self.file_number
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Looks up `key`, returning its record (Put or Tombstone) if present.
    ///
    /// The Bloom filter short-circuits definite misses; an empty filter is
    /// treated as "may match" so a missing/degenerate filter never causes
    /// a false negative.
    pub fn get(&self, key: &[u8]) -> Option<ValueRecord> {
        if !bloom::key_may_match(key, &self.filter) {
            return None;
        }

        let entry_idx = self
            .index
            .partition_point(|entry| entry.last_key.as_slice() < key);
        let entry = self.index.get(entry_idx)?;

        let block = slice_handle(&self.mmap, &entry.handle)?;
        for record in block::BlockIterator::new(block) {
            if record.key == key {
                return Some(decode_value(record.record_type, record.value));
            }
        }
        None
    }

    /// Iterates every record from the data block containing `from` (or the
    /// first block if `from` is `None`) onward, in ascending key order,
    /// surfacing tombstones with their type intact.
    pub fn scan(&self, from: Option<&[u8]>) -> iterator::SstScan<'_> {
        let start_idx = match from {
            Some(key) => self.index.partition_point(|e| e.last_key.as_slice() < key),
            None => 0,
        };
        iterator::SstScan::new(self, start_idx, from.map(|k| k.to_vec()))
    }

    fn block_bytes(&self, idx: usize) -> Option<&[u8]> {
        let entry = self.index.get(idx)?;
        slice_handle(&self.mmap, &entry.handle)
    }

    fn block_count(&self) -> usize {
        self.index.len()
    }
}

fn slice_handle<'a>(mmap: &'a [u8], handle: &BlockHandle) -> Option<&'a [u8]> {
    let start = usize::try_from(handle.offset).ok()?;
    let end = start.checked_add(usize::try_from(handle.size).ok()?)?;
    mmap.get(start..end)
}

fn decode_value(record_type: RecordType, value: &[u8]) -> ValueRecord {
    match record_type {
        RecordType::Put => ValueRecord::Put(value.to_vec()),
        RecordType::Tombstone => ValueRecord::Tombstone,
    }
}

/// Removes the SST file from disk. Callers must ensure the catalog no
/// longer references this file number before calling this.
pub fn remove(path: impl AsRef<Path>) -> Result<(), SstError> {
    let path = path.as_ref();
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "SST already absent on remove");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

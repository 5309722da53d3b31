//! SST writer — builds one complete SST file from a single ascending-key
//! stream of `(key, type, value)` triples.
//!
//! Keys must be added in strictly ascending order; the builder does not
//! sort or deduplicate. Data is written straight to a `.tmp` file as
//! blocks fill; the filter and index are assembled in memory (they must
//! be, since the filter needs every key and the index needs every block's
//! last key) and appended once [`SstBuilder::finish`] is called, followed
//! by the footer, an `fsync`, and an atomic rename over the final path.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::memtable::ValueRecord;
use crate::wal::RecordType;

use super::block::{self, BlockHandle};
use super::bloom;
use super::{SstError, SstReader, DATA_BLOCK_TARGET_SIZE, DEFAULT_BITS_PER_KEY};

/// Incrementally writes an SST to a temporary path, to be finalized with
/// [`SstBuilder::finish`].
pub struct SstBuilder {
    final_path: PathBuf,
    tmp_path: PathBuf,
    file: File,
    offset: u64,
    current_block: Vec<u8>,
    index: Vec<u8>,
    keys: Vec<Vec<u8>>,
    bits_per_key: u32,
    data_block_target_size: usize,
    last_key: Option<Vec<u8>>,
}

impl SstBuilder {
    /// Creates a builder that will write to `path` once [`finish`](Self::finish)
    /// is called; until then all data lives in a sibling `.tmp` file.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SstError> {
        Self::with_bits_per_key(path, DEFAULT_BITS_PER_KEY)
    }

    /// As [`new`](Self::new) but with an explicit Bloom bits-per-key.
    pub fn with_bits_per_key(path: impl AsRef<Path>, bits_per_key: u32) -> Result<Self, SstError> {
        Self::with_options(path, bits_per_key, DATA_BLOCK_TARGET_SIZE)
    }

    /// As [`with_bits_per_key`](Self::with_bits_per_key) but with an
    /// explicit data block target size.
    pub fn with_options(
        path: impl AsRef<Path>,
        bits_per_key: u32,
        data_block_target_size: usize,
    ) -> Result<Self, SstError> {
        let final_path = path.as_ref().to_path_buf();
        let mut tmp_path = final_path.clone();
        tmp_path.set_extension("sst.tmp");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;

        Ok(Self {
            final_path,
            tmp_path,
            file,
            offset: 0,
            current_block: Vec::new(),
            index: Vec::new(),
            keys: Vec::new(),
            bits_per_key,
            data_block_target_size,
            last_key: None,
        })
    }

    /// Appends one record. `key` must be strictly greater than the
    /// previously added key.
    pub fn add(&mut self, key: &[u8], record_type: RecordType, value: &[u8]) -> Result<(), SstError> {
        if let Some(last) = &self.last_key {
            debug_assert!(last.as_slice() < key, "SST builder requires ascending keys");
        }

        block::append_record(&mut self.current_block, key, record_type, value);
        self.keys.push(key.to_vec());
        self.last_key = Some(key.to_vec());

        if self.current_block.len() >= self.data_block_target_size {
            self.flush_data_block()?;
        }
        Ok(())
    }

    /// Convenience over [`add`](Self::add) for a [`ValueRecord`].
    pub fn add_record(&mut self, key: &[u8], record: &ValueRecord) -> Result<(), SstError> {
        match record {
            ValueRecord::Put(v) => self.add(key, RecordType::Put, v),
            ValueRecord::Tombstone => self.add(key, RecordType::Tombstone, &[]),
        }
    }

    /// Number of records added so far.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no records have been added yet.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Abandons this builder, unlinking its `.tmp` file without ever
    /// producing a file at the final path.
    ///
    /// Callers that decide not to call [`finish`](Self::finish) — typically
    /// because the builder turned out empty — must call this instead, or
    /// the `.tmp` file is leaked.
    pub fn discard(self) {
        let path = self.tmp_path.clone();
        drop(self.file);
        let _ = fs::remove_file(&path);
    }

    fn flush_data_block(&mut self) -> Result<(), SstError> {
        if self.current_block.is_empty() {
            return Ok(());
        }
        let handle = BlockHandle {
            offset: self.offset,
            size: self.current_block.len() as u64,
        };
        self.file.write_all(&self.current_block)?;
        self.offset += self.current_block.len() as u64;

        let last_key = self.last_key.clone().expect("non-empty block has a last key");
        let mut handle_bytes = Vec::with_capacity(BlockHandle::ENCODED_SIZE);
        handle.encode(&mut handle_bytes);
        block::append_record(&mut self.index, &last_key, RecordType::Put, &handle_bytes);

        self.current_block.clear();
        Ok(())
    }

    /// Writes the filter block, index block, and footer, fsyncs, and
    /// atomically renames the temp file onto the final path.
    ///
    /// Returns `Err` and leaves no final-path file behind if `self` holds
    /// no records — callers decide whether an empty result means "nothing
    /// to do" rather than treating it as success.
    pub fn finish(mut self) -> Result<(), SstError> {
        if self.keys.is_empty() {
            drop(self.file);
            let _ = fs::remove_file(&self.tmp_path);
            return Err(SstError::Corrupt("refusing to finish an empty SST".into()));
        }

        self.flush_data_block()?;

        let filter = bloom::create_filter(self.keys.iter().map(|k| k.as_slice()), self.bits_per_key);
        let filter_handle = BlockHandle {
            offset: self.offset,
            size: filter.len() as u64,
        };
        self.file.write_all(&filter)?;
        self.offset += filter.len() as u64;

        let index_handle = BlockHandle {
            offset: self.offset,
            size: self.index.len() as u64,
        };
        self.file.write_all(&self.index)?;
        self.offset += self.index.len() as u64;

        let mut footer = Vec::with_capacity(super::FOOTER_SIZE);
        let footer_struct = super::Footer {
            index: index_handle,
            filter: filter_handle,
        };
        footer_struct.encode(&mut footer);
        self.file.write_all(&footer)?;

        self.file.sync_all()?;
        drop(self.file);

        fs::rename(&self.tmp_path, &self.final_path)?;
        if let Some(parent) = self.final_path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        debug!(path = %self.final_path.display(), records = self.keys.len(), "SST written");
        Ok(())
    }
}

/// Builds a complete SST at `path` from a sorted `(key, record)` stream,
/// opening a reader on success.
///
/// This is the convenience entry point used by minor and L0→L1 compaction:
/// build, then immediately open to verify the file is readable before the
/// caller registers it in MANIFEST.
pub fn build_and_open<'a>(
    path: impl AsRef<Path>,
    file_number: u64,
    bits_per_key: u32,
    records: impl Iterator<Item = (&'a [u8], &'a ValueRecord)>,
) -> Result<Option<SstReader>, SstError> {
    build_and_open_with_options(path, file_number, bits_per_key, DATA_BLOCK_TARGET_SIZE, records)
}

/// As [`build_and_open`] but with an explicit data block target size.
pub fn build_and_open_with_options<'a>(
    path: impl AsRef<Path>,
    file_number: u64,
    bits_per_key: u32,
    data_block_target_size: usize,
    records: impl Iterator<Item = (&'a [u8], &'a ValueRecord)>,
) -> Result<Option<SstReader>, SstError> {
    let mut builder = SstBuilder::with_options(path.as_ref(), bits_per_key, data_block_target_size)?;
    for (key, record) in records {
        builder.add_record(key, record)?;
    }
    if builder.is_empty() {
        builder.discard();
        return Ok(None);
    }
    builder.finish()?;
    Ok(Some(SstReader::open(path, file_number)?))
}

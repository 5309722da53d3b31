//! Write-Ahead Logging (WAL) Module
//!
//! This module implements a **durable**, **append-only** Write-Ahead Log (WAL)
//! for the active memtable. Every `put`/`delete` is appended here and fsynced
//! before the in-memory map is mutated, so a crash can never lose an
//! acknowledged write.
//!
//! # On-disk layout
//!
//! There is no file header: file identity is carried entirely by the
//! filename (`<file_number>.wal`). Each record is:
//!
//! ```text
//! [CRC32_LE][TYPE:u8][KEY_LEN_LE][KEY][VAL_LEN_LE][VAL]
//! ```
//!
//! The checksum covers every byte that follows it (`type || key_len || key
//! || val_len || val`), computed with the reflected CRC32 (polynomial
//! `0xEDB88320`, init/xorout `0xFFFFFFFF`) that [`crc32fast`] implements by
//! default.
//!
//! # Concurrency model
//!
//! - WAL access is **synchronized** via `Arc<Mutex<File>>`.
//! - [`WalIter`] tracks its own logical offset, seeking before each read to
//!   avoid races with concurrent appends.
//!
//! # Guarantees
//!
//! - **Durability:** every `append()` is followed by [`File::sync_all`].
//! - **Integrity:** the checksum is verified during replay.
//! - **Torn-tail tolerance:** replay stops at the first checksum mismatch or
//!   truncated read without raising — the tail is treated as an in-flight
//!   write that never completed.

#[cfg(test)]
mod tests;

use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use crc32fast::Hasher as Crc32;
use thiserror::Error;
use tracing::{debug, error, trace, warn};

const U32_SIZE: usize = std::mem::size_of::<u32>();

// ------------------------------------------------------------------------------------------------
// Errors
// ------------------------------------------------------------------------------------------------

/// Errors returned by WAL operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WalError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record carried a type byte other than Put or Tombstone.
    #[error("invalid record type byte: 0x{0:02X}")]
    InvalidRecordType(u8),

    /// Internal consistency or locking error.
    #[error("internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Record type
// ------------------------------------------------------------------------------------------------

/// Whether a record is a live value or a delete marker.
///
/// Stored as a single byte (`1` / `2`) in the WAL, the SST data blocks, and
/// nowhere else — this is the one type tag threaded through the whole
/// write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    /// A live value.
    Put = 1,
    /// A delete marker; the accompanying value is always empty.
    Tombstone = 2,
}

impl RecordType {
    fn from_u8(b: u8) -> Result<Self, WalError> {
        match b {
            1 => Ok(RecordType::Put),
            2 => Ok(RecordType::Tombstone),
            other => Err(WalError::InvalidRecordType(other)),
        }
    }
}

/// One decoded WAL record: a key, its value (empty for a tombstone), and
/// the record type.
#[derive(Debug, Clone)]
pub struct WalRecord {
    /// The record's key.
    pub key: Vec<u8>,
    /// The record's value; empty for a [`RecordType::Tombstone`].
    pub value: Vec<u8>,
    /// Put or Tombstone.
    pub record_type: RecordType,
}

// ------------------------------------------------------------------------------------------------
// WAL
// ------------------------------------------------------------------------------------------------

/// An append-only, CRC-protected write-ahead log bound to one file number.
#[derive(Debug)]
pub struct Wal {
    /// Thread-safe file handle for WAL operations.
    inner_file: Arc<Mutex<File>>,
    /// Path to the WAL file on disk.
    path: PathBuf,
    /// The file number this WAL is bound to (parsed from its filename).
    file_number: u64,
}

impl Wal {
    /// Opens or creates the WAL at `path`.
    ///
    /// `path`'s file stem must be the decimal `file_number` (e.g.
    /// `7.wal`), matching the directory layout in the external interface.
    pub fn open<P: AsRef<Path>>(path: P, file_number: u64) -> Result<Self, WalError> {
        let path_ref = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path_ref)?;

        debug!(path = %path_ref.display(), file_number, "WAL opened");

        Ok(Self {
            inner_file: Arc::new(Mutex::new(file)),
            path: path_ref.to_path_buf(),
            file_number,
        })
    }

    /// The file number this WAL is bound to.
    pub fn file_number(&self) -> u64 {
        self.file_number
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record and fsyncs before returning.
    ///
    /// Write order is `crc || type || key_len || key || val_len || val`;
    /// the checksum covers every byte after itself.
    pub fn append(&self, key: &[u8], value: &[u8], record_type: RecordType) -> Result<(), WalError> {
        let mut body = Vec::with_capacity(1 + 4 + key.len() + 4 + value.len());
        body.push(record_type as u8);
        body.extend_from_slice(&(key.len() as u32).to_le_bytes());
        body.extend_from_slice(key);
        body.extend_from_slice(&(value.len() as u32).to_le_bytes());
        body.extend_from_slice(value);

        let crc = crc32(&body);

        let mut guard = self
            .inner_file
            .lock()
            .map_err(|_| WalError::Internal("mutex poisoned".into()))?;
        guard.write_all(&crc.to_le_bytes())?;
        guard.write_all(&body)?;
        guard.sync_all()?;

        trace!(
            key_len = key.len(),
            val_len = value.len(),
            crc = format_args!("{crc:08x}"),
            "WAL record appended"
        );
        Ok(())
    }

    /// Returns an iterator that replays every valid record from the start
    /// of the file, stopping silently on the first corrupt or truncated
    /// record (the torn-tail contract in §4.5 of the design).
    pub fn replay_iter(&self) -> WalIter {
        WalIter {
            file: Arc::clone(&self.inner_file),
            offset: 0,
        }
    }

    /// Removes the WAL file from disk. Callers must ensure the file's
    /// successor SST is already durably registered in MANIFEST first.
    pub fn remove(self) -> Result<(), WalError> {
        let path = self.path.clone();
        drop(self);
        std::fs::remove_file(&path)?;
        Ok(())
    }
}

impl Drop for Wal {
    fn drop(&mut self) {
        match self.inner_file.lock() {
            Ok(guard) => {
                if let Err(e) = guard.sync_all() {
                    error!(path = %self.path.display(), error = %e, "WAL sync failed on drop");
                }
            }
            Err(poisoned) => {
                let file = poisoned.into_inner();
                if let Err(e) = file.sync_all() {
                    error!(path = %self.path.display(), error = %e, "WAL sync failed on drop (poisoned lock)");
                }
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// WalIter
// ------------------------------------------------------------------------------------------------

/// Streaming WAL replay iterator.
///
/// Holds an `Arc` to the same file handle as its [`Wal`], so it can outlive
/// the value that created it.
pub struct WalIter {
    file: Arc<Mutex<File>>,
    offset: u64,
}

impl Iterator for WalIter {
    type Item = Result<WalRecord, WalError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut guard = match self.file.lock() {
            Ok(g) => g,
            Err(_) => return Some(Err(WalError::Internal("mutex poisoned".into()))),
        };

        if let Err(e) = guard.seek(SeekFrom::Start(self.offset)) {
            return Some(Err(WalError::Io(e)));
        }

        let mut crc_bytes = [0u8; U32_SIZE];
        match guard.read_exact(&mut crc_bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                trace!(offset = self.offset, "WAL replay reached end of file");
                return None;
            }
            Err(e) => return Some(Err(WalError::Io(e))),
        }
        let stored_crc = u32::from_le_bytes(crc_bytes);

        let mut type_byte = [0u8; 1];
        if guard.read_exact(&mut type_byte).is_err() {
            warn!(offset = self.offset, "WAL torn tail: truncated type byte");
            return None;
        }
        let record_type = match RecordType::from_u8(type_byte[0]) {
            Ok(t) => t,
            Err(_) => {
                warn!(offset = self.offset, "WAL torn tail: invalid type byte");
                return None;
            }
        };

        let mut key_len_bytes = [0u8; U32_SIZE];
        if guard.read_exact(&mut key_len_bytes).is_err() {
            warn!(offset = self.offset, "WAL torn tail: truncated key length");
            return None;
        }
        let key_len = u32::from_le_bytes(key_len_bytes) as usize;

        let mut key = vec![0u8; key_len];
        if guard.read_exact(&mut key).is_err() {
            warn!(offset = self.offset, "WAL torn tail: truncated key");
            return None;
        }

        let mut val_len_bytes = [0u8; U32_SIZE];
        if guard.read_exact(&mut val_len_bytes).is_err() {
            warn!(offset = self.offset, "WAL torn tail: truncated value length");
            return None;
        }
        let val_len = u32::from_le_bytes(val_len_bytes) as usize;

        let mut value = vec![0u8; val_len];
        if guard.read_exact(&mut value).is_err() {
            warn!(offset = self.offset, "WAL torn tail: truncated value");
            return None;
        }

        let mut body = Vec::with_capacity(1 + 4 + key.len() + 4 + value.len());
        body.push(type_byte[0]);
        body.extend_from_slice(&key_len_bytes);
        body.extend_from_slice(&key);
        body.extend_from_slice(&val_len_bytes);
        body.extend_from_slice(&value);

        if crc32(&body) != stored_crc {
            warn!(offset = self.offset, "WAL torn tail: checksum mismatch");
            return None;
        }

        match guard.stream_position() {
            Ok(pos) => self.offset = pos,
            Err(e) => return Some(Err(WalError::Io(e))),
        }

        Some(Ok(WalRecord {
            key,
            value,
            record_type,
        }))
    }
}

impl std::fmt::Debug for WalIter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalIter")
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

// ------------------------------------------------------------------------------------------------
// CRC helper
// ------------------------------------------------------------------------------------------------

/// CRC32, reflected, polynomial `0xEDB88320`, init/xorout `0xFFFFFFFF`.
fn crc32(bytes: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(bytes);
    hasher.finalize()
}

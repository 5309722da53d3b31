//! MANIFEST — the durable catalog of file identity and level assignment.
//!
//! The manifest tracks three pieces of state: the next file number to
//! allocate, which level each live SST belongs to, and which WAL files are
//! still live. It is the single source of truth an engine restart uses to
//! rebuild its in-memory view of the data directory.
//!
//! # Durability strategy
//!
//! Two files: `MANIFEST` (a snapshot) and `MANIFEST.log` (an edit log).
//! Every mutation appends one fixed-format edit record to the log; after
//! [`CHECKPOINT_THRESHOLD`] edits, the in-memory state is written out as a
//! fresh snapshot (via `MANIFEST.tmp` + rename) and the log is truncated
//! back to zero length. Recovery loads the snapshot, if any, then replays
//! the log on top of it.
//!
//! There is no CRC on edit-log records. Each record's `magic`/`version`
//! bind it to a recognizable, non-silent failure mode for anything but a
//! bit flip inside an otherwise well-formed record, and a truncated
//! trailing record — the only corruption this format is expected to
//! tolerate — is already distinguishable from a well-formed one by its
//! short read.

#[cfg(test)]
mod tests;

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, info, warn};

/// Magic prefixing both the snapshot and every edit-log record.
const MAGIC: u32 = 0x1234_5678;
/// Format version.
const VERSION: u32 = 1;
/// Number of edits appended before an automatic checkpoint.
pub const CHECKPOINT_THRESHOLD: u32 = 100;

const SNAPSHOT_FILENAME: &str = "MANIFEST";
const SNAPSHOT_TMP_FILENAME: &str = "MANIFEST.tmp";
const LOG_FILENAME: &str = "MANIFEST.log";

/// Errors returned by manifest operations.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An edit-log record's magic, version, or payload size did not match
    /// expectations — this is a hard error, not a tolerated truncation.
    #[error("corrupt MANIFEST.log record: {0}")]
    CorruptLog(String),

    /// The snapshot file failed to parse.
    #[error("corrupt MANIFEST snapshot: {0}")]
    CorruptSnapshot(String),

    /// Internal invariant violation or poisoned lock.
    #[error("internal error: {0}")]
    Internal(String),
}

/// One mutation applied to the catalog, and its corresponding edit-log op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    SetNextFileNumber = 1,
    AddSst = 2,
    DelSst = 3,
    AddWal = 4,
    DelWal = 5,
}

impl Op {
    fn from_u8(b: u8) -> Result<Self, ManifestError> {
        match b {
            1 => Ok(Op::SetNextFileNumber),
            2 => Ok(Op::AddSst),
            3 => Ok(Op::DelSst),
            4 => Ok(Op::AddWal),
            5 => Ok(Op::DelWal),
            other => Err(ManifestError::CorruptLog(format!("unknown op byte {other}"))),
        }
    }

    /// Payload size for this op — must match on write and replay per the
    /// edit payload sizing table.
    fn payload_size(self) -> usize {
        match self {
            Op::SetNextFileNumber => 8,
            Op::AddSst => 12,
            Op::DelSst => 8,
            Op::AddWal => 8,
            Op::DelWal => 8,
        }
    }
}

/// The catalog's in-memory state: the next file number to hand out, which
/// level each live SST belongs to, and which WALs are still live.
#[derive(Debug, Clone, Default)]
pub struct ManifestState {
    pub next_file_number: u64,
    pub sst_levels: std::collections::BTreeMap<u64, u32>,
    pub live_wals: std::collections::BTreeSet<u64>,
}

struct Inner {
    state: ManifestState,
    edits_since_checkpoint: u32,
    log_file: File,
}

/// The durable catalog: snapshot + edit log, guarded by a mutex since every
/// mutating call appends to the log and may trigger a checkpoint.
pub struct Manifest {
    dir: PathBuf,
    checkpoint_threshold: u32,
    inner: Mutex<Inner>,
}

impl Manifest {
    /// Opens the manifest at `dir`, creating a fresh snapshot if none
    /// exists and no recognizable file-number state can be inferred.
    ///
    /// Does not scan the directory for orphan `.sst`/`.wal` files — that
    /// fallback is the recovery loader's responsibility (C9), since it
    /// needs visibility into both the manifest and the directory listing
    /// at once.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, ManifestError> {
        Self::open_with_checkpoint_threshold(dir, CHECKPOINT_THRESHOLD)
    }

    /// As [`open`](Self::open) but with an explicit checkpoint threshold.
    pub fn open_with_checkpoint_threshold(
        dir: impl AsRef<Path>,
        checkpoint_threshold: u32,
    ) -> Result<Self, ManifestError> {
        let dir = dir.as_ref().to_path_buf();
        let snapshot_path = dir.join(SNAPSHOT_FILENAME);
        let log_path = dir.join(LOG_FILENAME);

        let mut state = if snapshot_path.exists() {
            Self::load_snapshot(&snapshot_path)?
        } else {
            ManifestState::default()
        };

        let edits_replayed = if log_path.exists() {
            Self::replay_log(&log_path, &mut state)?
        } else {
            0
        };

        let log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&log_path)?;

        debug!(
            path = %dir.display(),
            next_file_number = state.next_file_number,
            ssts = state.sst_levels.len(),
            wals = state.live_wals.len(),
            edits_replayed,
            "MANIFEST opened"
        );

        Ok(Self {
            dir,
            checkpoint_threshold,
            inner: Mutex::new(Inner {
                state,
                edits_since_checkpoint: edits_replayed as u32,
                log_file,
            }),
        })
    }

    /// A snapshot of the current in-memory state.
    pub fn state(&self) -> Result<ManifestState, ManifestError> {
        Ok(self.lock()?.state.clone())
    }

    /// Allocates and persists the next file number.
    pub fn allocate_file_number(&self) -> Result<u64, ManifestError> {
        let mut inner = self.lock()?;
        let id = inner.state.next_file_number;
        inner.state.next_file_number += 1;
        let next = inner.state.next_file_number;
        self.record_edit(&mut inner, Op::SetNextFileNumber, &next.to_le_bytes())?;
        Ok(id)
    }

    /// Records a new live WAL file.
    pub fn add_wal(&self, id: u64) -> Result<(), ManifestError> {
        let mut inner = self.lock()?;
        inner.state.live_wals.insert(id);
        self.record_edit(&mut inner, Op::AddWal, &id.to_le_bytes())
    }

    /// Removes a WAL file from the live set.
    pub fn remove_wal(&self, id: u64) -> Result<(), ManifestError> {
        let mut inner = self.lock()?;
        inner.state.live_wals.remove(&id);
        self.record_edit(&mut inner, Op::DelWal, &id.to_le_bytes())
    }

    /// Records a new SST at `level`.
    pub fn add_sst(&self, id: u64, level: u32) -> Result<(), ManifestError> {
        let mut inner = self.lock()?;
        inner.state.sst_levels.insert(id, level);
        let mut payload = Vec::with_capacity(12);
        payload.extend_from_slice(&id.to_le_bytes());
        payload.extend_from_slice(&level.to_le_bytes());
        self.record_edit(&mut inner, Op::AddSst, &payload)
    }

    /// Removes an SST from the catalog.
    pub fn remove_sst(&self, id: u64) -> Result<(), ManifestError> {
        let mut inner = self.lock()?;
        inner.state.sst_levels.remove(&id);
        self.record_edit(&mut inner, Op::DelSst, &id.to_le_bytes())
    }

    /// Overwrites `next_file_number` directly, used by the recovery loader
    /// when bootstrapping from a directory scan rather than a snapshot.
    pub fn set_next_file_number(&self, next: u64) -> Result<(), ManifestError> {
        let mut inner = self.lock()?;
        inner.state.next_file_number = next;
        self.record_edit(&mut inner, Op::SetNextFileNumber, &next.to_le_bytes())
    }

    /// Forces an immediate checkpoint regardless of the edit counter.
    pub fn checkpoint(&self) -> Result<(), ManifestError> {
        let mut inner = self.lock()?;
        self.do_checkpoint(&mut inner)
    }

    fn record_edit(&self, inner: &mut Inner, op: Op, payload: &[u8]) -> Result<(), ManifestError> {
        debug_assert_eq!(payload.len(), op.payload_size());

        let mut record = Vec::with_capacity(4 + 4 + 1 + 4 + payload.len());
        record.extend_from_slice(&MAGIC.to_le_bytes());
        record.extend_from_slice(&VERSION.to_le_bytes());
        record.push(op as u8);
        record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        record.extend_from_slice(payload);

        match inner.log_file.write_all(&record).and_then(|_| inner.log_file.sync_all()) {
            Ok(()) => {
                inner.edits_since_checkpoint += 1;
            }
            Err(e) => {
                warn!(error = %e, "MANIFEST.log append failed, falling back to snapshot");
                self.persist_snapshot(&inner.state)?;
                inner.edits_since_checkpoint = 0;
                return Ok(());
            }
        }

        if inner.edits_since_checkpoint >= self.checkpoint_threshold {
            self.do_checkpoint(inner)?;
        }
        Ok(())
    }

    fn do_checkpoint(&self, inner: &mut Inner) -> Result<(), ManifestError> {
        self.persist_snapshot(&inner.state)?;
        match Self::truncate_log(&self.dir) {
            Ok(file) => {
                inner.log_file = file;
                inner.edits_since_checkpoint = 0;
            }
            Err(e) => {
                warn!(error = %e, "MANIFEST.log truncation failed; log retained (idempotent on replay)");
            }
        }
        Ok(())
    }

    fn persist_snapshot(&self, state: &ManifestState) -> Result<(), ManifestError> {
        let bytes = encode_snapshot(state);
        let tmp_path = self.dir.join(SNAPSHOT_TMP_FILENAME);
        {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            f.write_all(&bytes)?;
            f.sync_all()?;
        }
        let final_path = self.dir.join(SNAPSHOT_FILENAME);
        fs::rename(&tmp_path, &final_path)?;
        fsync_dir(&self.dir)?;
        info!(path = %final_path.display(), "MANIFEST checkpoint written");
        Ok(())
    }

    fn truncate_log(dir: &Path) -> Result<File, ManifestError> {
        let log_path = dir.join(LOG_FILENAME);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .read(true)
            .open(&log_path)?;
        file.sync_all()?;
        let appendable = OpenOptions::new().create(true).append(true).read(true).open(&log_path)?;
        drop(file);
        Ok(appendable)
    }

    fn load_snapshot(path: &Path) -> Result<ManifestState, ManifestError> {
        let mut buf = Vec::new();
        File::open(path)?.read_to_end(&mut buf)?;
        decode_snapshot(&buf)
    }

    fn replay_log(path: &Path, state: &mut ManifestState) -> Result<u32, ManifestError> {
        let mut buf = Vec::new();
        File::open(path)?.read_to_end(&mut buf)?;

        let mut offset = 0usize;
        let mut count = 0u32;
        loop {
            match read_one_edit(&buf, offset)? {
                Some((op, payload, next_offset)) => {
                    apply_edit(state, op, &payload);
                    offset = next_offset;
                    count += 1;
                }
                None => break,
            }
        }
        Ok(count)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, ManifestError> {
        self.inner.lock().map_err(|_| ManifestError::Internal("mutex poisoned".into()))
    }
}

fn apply_edit(state: &mut ManifestState, op: Op, payload: &[u8]) {
    match op {
        Op::SetNextFileNumber => {
            state.next_file_number = u64::from_le_bytes(payload[0..8].try_into().unwrap());
        }
        Op::AddSst => {
            let id = u64::from_le_bytes(payload[0..8].try_into().unwrap());
            let level = u32::from_le_bytes(payload[8..12].try_into().unwrap());
            state.sst_levels.insert(id, level);
        }
        Op::DelSst => {
            let id = u64::from_le_bytes(payload[0..8].try_into().unwrap());
            state.sst_levels.remove(&id);
        }
        Op::AddWal => {
            let id = u64::from_le_bytes(payload[0..8].try_into().unwrap());
            state.live_wals.insert(id);
        }
        Op::DelWal => {
            let id = u64::from_le_bytes(payload[0..8].try_into().unwrap());
            state.live_wals.remove(&id);
        }
    }
}

/// Reads one edit-log record at `offset`.
///
/// Returns `Ok(None)` on a clean end-of-buffer (no bytes left, or too few
/// bytes left to hold even the fixed header — the tolerated truncated
/// tail). Returns `Err` on a magic/version/payload-size mismatch found
/// mid-record, which is never a truncation and is always a hard error.
fn read_one_edit(buf: &[u8], offset: usize) -> Result<Option<(Op, Vec<u8>, usize)>, ManifestError> {
    if offset >= buf.len() {
        return Ok(None);
    }
    const HEADER_LEN: usize = 4 + 4 + 1 + 4;
    if offset + HEADER_LEN > buf.len() {
        return Ok(None);
    }

    let magic = u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap());
    if magic != MAGIC {
        return Err(ManifestError::CorruptLog(format!("bad magic {magic:#x}")));
    }
    let version = u32::from_le_bytes(buf[offset + 4..offset + 8].try_into().unwrap());
    if version != VERSION {
        return Err(ManifestError::CorruptLog(format!("unsupported version {version}")));
    }
    let op = Op::from_u8(buf[offset + 8])?;
    let payload_size = u32::from_le_bytes(buf[offset + 9..offset + 13].try_into().unwrap()) as usize;
    if payload_size != op.payload_size() {
        return Err(ManifestError::CorruptLog(format!(
            "payload size {payload_size} does not match op {op:?}"
        )));
    }

    let payload_start = offset + HEADER_LEN;
    let payload_end = payload_start + payload_size;
    if payload_end > buf.len() {
        // Truncated trailing record: tolerated, not an error.
        return Ok(None);
    }

    Ok(Some((op, buf[payload_start..payload_end].to_vec(), payload_end)))
}

fn encode_snapshot(state: &ManifestState) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&MAGIC.to_le_bytes());
    buf.extend_from_slice(&VERSION.to_le_bytes());
    buf.extend_from_slice(&state.next_file_number.to_le_bytes());

    buf.extend_from_slice(&(state.sst_levels.len() as u32).to_le_bytes());
    for (id, level) in &state.sst_levels {
        buf.extend_from_slice(&id.to_le_bytes());
        buf.extend_from_slice(&level.to_le_bytes());
    }

    buf.extend_from_slice(&(state.live_wals.len() as u32).to_le_bytes());
    for id in &state.live_wals {
        buf.extend_from_slice(&id.to_le_bytes());
    }
    buf
}

fn decode_snapshot(buf: &[u8]) -> Result<ManifestState, ManifestError> {
    let mut pos = 0usize;
    let read_u32 = |buf: &[u8], pos: &mut usize| -> Result<u32, ManifestError> {
        let v = buf
            .get(*pos..*pos + 4)
            .ok_or_else(|| ManifestError::CorruptSnapshot("truncated u32".into()))?;
        *pos += 4;
        Ok(u32::from_le_bytes(v.try_into().unwrap()))
    };
    let read_u64 = |buf: &[u8], pos: &mut usize| -> Result<u64, ManifestError> {
        let v = buf
            .get(*pos..*pos + 8)
            .ok_or_else(|| ManifestError::CorruptSnapshot("truncated u64".into()))?;
        *pos += 8;
        Ok(u64::from_le_bytes(v.try_into().unwrap()))
    };

    let magic = read_u32(buf, &mut pos)?;
    if magic != MAGIC {
        return Err(ManifestError::CorruptSnapshot(format!("bad magic {magic:#x}")));
    }
    let version = read_u32(buf, &mut pos)?;
    if version != VERSION {
        return Err(ManifestError::CorruptSnapshot(format!("unsupported version {version}")));
    }
    let next_file_number = read_u64(buf, &mut pos)?;

    let sst_count = read_u32(buf, &mut pos)?;
    let mut sst_levels = std::collections::BTreeMap::new();
    for _ in 0..sst_count {
        let id = read_u64(buf, &mut pos)?;
        let level = read_u32(buf, &mut pos)?;
        sst_levels.insert(id, level);
    }

    let wal_count = read_u32(buf, &mut pos)?;
    let mut live_wals = std::collections::BTreeSet::new();
    for _ in 0..wal_count {
        live_wals.insert(read_u64(buf, &mut pos)?);
    }

    Ok(ManifestState {
        next_file_number,
        sst_levels,
        live_wals,
    })
}

fn fsync_dir(dir: &Path) -> Result<(), ManifestError> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

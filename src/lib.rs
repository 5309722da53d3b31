//! # stratumdb
//!
//! An embeddable, ordered, crash-safe key-value store built on a
//! two-level **Log-Structured Merge Tree (LSM-tree)** architecture.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                        Db                            │
//! │  ┌────────────┐   ┌─────────────┐  ┌─────────────┐   │
//! │  │  Active     │   │  L0 SSTs    │  │  L1 SST     │   │
//! │  │  MemTable   │   │ (per flush) │  │  (merged)   │   │
//! │  │  + WAL      │   │             │  │             │   │
//! │  └─────┬──────┘   └──────┬──────┘  └──────┬──────┘   │
//! │        │   flush          │  L0→L1 merge    │         │
//! │        └──────────►       └────────────────►         │
//! │                                                       │
//! │  ┌─────────────────────────────────────────────────┐  │
//! │  │        MANIFEST (snapshot + edit log)           │  │
//! │  └─────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`engine`] | The [`engine::Db`] facade — open, read, write, scan, compact |
//! | [`memtable`] | In-memory write buffer paired with a WAL |
//! | [`wal`] | CRC-protected write-ahead log for crash recovery |
//! | [`sstable`] | Immutable, sorted, on-disk tables with Bloom filters and block indices |
//! | [`manifest`] | Persistent file catalog (snapshot + edit log model) |
//! | [`compaction`] | Minor (flush) and L0→L1 compaction |
//!
//! ## Key properties
//!
//! - **Write-ahead logging** — every mutation is fsynced to its WAL
//!   before being acknowledged.
//! - **Crash recovery** — [`Db::open`] replays the MANIFEST and every WAL
//!   still on disk to reconstruct the last durable state.
//! - **Newest-wins reads** — active memtable, then L0 (newest file
//!   first), then L1; a tombstone at any layer hides older values.
//! - **Bloom filter lookups** — each SST carries a Bloom filter sized by
//!   [`engine::DbConfig::bits_per_key`] for fast negative point lookups.
//! - **Two-level compaction** — flushing (minor) and merging L0 into L1,
//!   both inline on the caller's thread.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use stratumdb::{Db, DbConfig};
//!
//! let db = Db::open("/tmp/my_db", DbConfig::default()).unwrap();
//!
//! db.put(b"hello", b"world").unwrap();
//! assert_eq!(db.get(b"hello").unwrap(), Some(b"world".to_vec()));
//!
//! db.delete(b"hello").unwrap();
//! assert_eq!(db.get(b"hello").unwrap(), None);
//!
//! db.put(b"a", b"1").unwrap();
//! db.put(b"b", b"2").unwrap();
//! let all: Vec<_> = db.scan(None).unwrap().collect();
//! assert_eq!(all, vec![(b"a".to_vec(), b"1".to_vec()), (b"b".to_vec(), b"2".to_vec())]);
//!
//! db.close().unwrap();
//! ```

#![allow(dead_code)]

pub mod compaction;
pub mod engine;
pub mod manifest;
pub mod memtable;
pub mod sstable;
pub mod wal;

pub use engine::{Db, DbConfig, DbError};

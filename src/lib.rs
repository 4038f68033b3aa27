//! # ordinalkv
//!
//! An embeddable key-value store keyed by `u64`, built on a **leveled
//! Log-Structured Merge-tree**. Designed for fast sequential writes and a
//! small, auditable on-disk format.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                      Engine                          │
//! │  ┌────────────┐        ┌─────────────────────────┐  │
//! │  │  MemTable   │ flush  │   Catalog (levels 0..N)  │  │
//! │  │  (BTreeMap) │ ─────► │   sparse index per SST    │  │
//! │  └────────────┘        └─────────────┬─────────────┘  │
//! │                                      │ overflow        │
//! │                          ┌───────────▼───────────┐    │
//! │                          │      Compaction        │    │
//! │                          │  (k-way merge, cascade) │    │
//! │                          └────────────────────────┘    │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`engine`] | Core storage engine — open, put, get, delete, reset |
//! | [`memtable`] | In-memory ordered write buffer |
//! | [`sstable`] | Immutable, sorted, on-disk tables with a sparse index footer |
//! | [`catalog`] | In-memory directory of every SST's sparse index, by level |
//! | [`compaction`] | Leveled compaction: victim selection, merge, slicing, cascade |
//! | [`clock`] | Injectable monotonic wall-clock source |
//! | [`config`] | Engine configuration and the on-disk settings file it is built from |
//!
//! ## Key properties
//!
//! - **No write-ahead log.** A crash between flush completion and directory
//!   rename cannot corrupt existing tables, but unflushed writes may be lost.
//! - **Single-threaded, synchronous.** No operation may overlap another on
//!   the same [`Engine`](engine::Engine) instance.
//! - **Tombstone deletes.** A delete writes an empty-value record; compaction
//!   drops it once it reaches the deepest level and is no longer shadowing
//!   anything.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use ordinalkv::engine::{Engine, EngineConfig, KvEngine};
//!
//! let config = EngineConfig::new("/tmp/my_store", 2 * 1024 * 1024);
//! let mut engine = Engine::open(config).unwrap();
//!
//! engine.put(1, b"hello".to_vec()).unwrap();
//! assert_eq!(engine.get(1).unwrap(), Some(b"hello".to_vec()));
//!
//! engine.delete(1).unwrap();
//! assert_eq!(engine.get(1).unwrap(), None);
//! ```

pub mod catalog;
pub mod clock;
pub mod compaction;
pub mod config;
pub mod engine;
pub mod memtable;
pub mod record;
pub mod sstable;

//! # Engine Module
//!
//! Wires the [`MemTable`](crate::memtable::MemTable), [`Catalog`], and
//! [`compaction`](crate::compaction) modules into the single public surface
//! applications use: [`KvEngine`], implemented by [`Engine`].
//!
//! The engine is single-threaded and synchronous by design — there is no
//! internal locking, and callers needing concurrent access are expected to
//! provide their own (a `Mutex<Engine>` or similar), matching the
//! WAL-less, single-writer model this store targets.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, trace};

use crate::catalog::{Catalog, CatalogError};
use crate::clock::{Clock, SystemClock};
use crate::compaction::{self, CompactionError};
use crate::memtable::{MemTable, MemTableError};
use crate::record::Record;
use crate::sstable::{SsTableError, SstWriter};

/// Errors an [`Engine`] operation can produce, composed from every layer it
/// touches.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("memtable error: {0}")]
    MemTable(#[from] MemTableError),

    #[error("SSTable error: {0}")]
    SsTable(#[from] SsTableError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("compaction error: {0}")]
    Compaction(#[from] CompactionError),
}

/// Engine configuration. Unlike [`crate::config::StoreSettings`], this
/// carries no I/O or serde dependency — it is the minimal set of knobs the
/// core engine needs, independent of how a host application loads them.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory the engine owns: level directories and the staging
    /// directory are created directly beneath it.
    pub root: PathBuf,
    /// Byte ceiling (per [`Record::size_estimate`]) at which the memtable
    /// is flushed to a new level-0 SSTable.
    pub write_buffer_size: usize,
}

impl EngineConfig {
    pub fn new(root: impl Into<PathBuf>, write_buffer_size: usize) -> Self {
        Self {
            root: root.into(),
            write_buffer_size,
        }
    }
}

/// The four operations every storage engine implementation in this crate
/// must support, pulled out as a trait so callers (and tests) can depend on
/// the interface rather than the concrete [`Engine`] type.
pub trait KvEngine {
    /// Inserts or overwrites `key` with `value`. An empty `value` is
    /// indistinguishable from a tombstone once written — callers wanting to
    /// store an empty byte string should not rely on being able to tell it
    /// apart from a deletion on a later `get`.
    fn put(&mut self, key: u64, value: Vec<u8>) -> Result<(), EngineError>;

    /// Returns the live value for `key`, or `None` if it was never written
    /// or has been deleted.
    fn get(&self, key: u64) -> Result<Option<Vec<u8>>, EngineError>;

    /// Deletes `key`, returning whether it had a live value beforehand.
    fn delete(&mut self, key: u64) -> Result<bool, EngineError>;

    /// Wipes all data: the memtable and every on-disk level are discarded.
    fn reset(&mut self) -> Result<(), EngineError>;
}

/// The concrete, file-backed LSM engine.
///
/// Generic over its [`Clock`] so tests can inject a [`crate::clock::FakeClock`]
/// for deterministic timestamp assertions; [`Engine::open`] defaults to
/// [`SystemClock`].
pub struct Engine<C: Clock = SystemClock> {
    config: EngineConfig,
    memtable: MemTable,
    catalog: Catalog,
    clock: C,
}

impl Engine<SystemClock> {
    /// Opens (or creates) an engine rooted at `config.root`, recovering the
    /// catalog from whatever level directories already exist and clearing
    /// any leftover staging files from a prior run that crashed mid-flush
    /// or mid-compaction.
    pub fn open(config: EngineConfig) -> Result<Self, EngineError> {
        Self::open_with_clock(config, SystemClock)
    }
}

impl<C: Clock> Engine<C> {
    /// Same as [`Engine::open`], with an explicit [`Clock`] implementation.
    pub fn open_with_clock(config: EngineConfig, clock: C) -> Result<Self, EngineError> {
        std::fs::create_dir_all(&config.root)?;
        let catalog = Catalog::open(&config.root)?;
        clear_staging_dir(&config.root)?;
        info!(root = %config.root.display(), "engine opened");
        Ok(Self {
            config,
            memtable: MemTable::new(),
            catalog,
            clock,
        })
    }

    /// Flushes the memtable to a new, newest-first level-0 SSTable if it is
    /// non-empty, then runs compaction if level 0 is now over capacity.
    fn flush(&mut self) -> Result<(), EngineError> {
        if self.memtable.is_empty() {
            return Ok(());
        }

        let records: Vec<Record> = self
            .memtable
            .drain_sorted()
            .map(|(key, entry)| Record::new(key, entry.timestamp, entry.value))
            .collect();
        let count = records.len();

        self.catalog.create_level_dir(0)?;
        self.catalog.create_staging_dir()?;
        let staged_path = self.catalog.staging_dir().join("flush-incoming");
        SstWriter::write(&staged_path, records.into_iter())?;

        let mut ordered = vec![staged_path];
        ordered.extend(self.catalog.level_paths(0));
        let sstables = self.catalog.renumber_level(0, &ordered)?;
        self.catalog.replace_level(0, sstables);

        info!(records = count, level0_files = self.catalog.file_count(0), "memtable flushed");

        if self
            .catalog
            .level(0)
            .map(|l| l.is_over_capacity(0))
            .unwrap_or(false)
        {
            compaction::compact(&mut self.catalog, 0, self.config.write_buffer_size)?;
        }

        Ok(())
    }
}

impl<C: Clock> KvEngine for Engine<C> {
    fn put(&mut self, key: u64, value: Vec<u8>) -> Result<(), EngineError> {
        let timestamp = self.clock.now_secs();
        trace!(key, timestamp, "engine put");
        self.memtable.insert(key, timestamp, value);
        if self.memtable.approximate_size() >= self.config.write_buffer_size {
            self.flush()?;
        }
        Ok(())
    }

    fn get(&self, key: u64) -> Result<Option<Vec<u8>>, EngineError> {
        if let Some(entry) = self.memtable.lookup(key) {
            return Ok(if entry.value.is_empty() {
                None
            } else {
                Some(entry.value.clone())
            });
        }
        match self.catalog.get(key)? {
            Some(record) if !record.is_tombstone() => Ok(Some(record.value)),
            _ => Ok(None),
        }
    }

    fn delete(&mut self, key: u64) -> Result<bool, EngineError> {
        let existed = self.get(key)?.is_some();
        if existed {
            let timestamp = self.clock.now_secs();
            trace!(key, timestamp, "engine delete");
            self.memtable.insert(key, timestamp, Vec::new());
            if self.memtable.approximate_size() >= self.config.write_buffer_size {
                self.flush()?;
            }
        }
        Ok(existed)
    }

    fn reset(&mut self) -> Result<(), EngineError> {
        self.memtable = MemTable::new();
        self.catalog.remove_all()?;
        info!(root = %self.config.root.display(), "engine reset");
        Ok(())
    }
}

/// Discards anything left in the staging directory from a prior run: every
/// file there was either not yet referenced by a committed rename
/// (incomplete flush/compaction output) or already superseded by one that
/// did complete, so none of it is needed for recovery.
fn clear_staging_dir(root: &Path) -> Result<(), io::Error> {
    let staging = root.join(crate::catalog::STAGING_DIR);
    if staging.is_dir() {
        std::fs::remove_dir_all(&staging)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use tempfile::tempdir;

    fn open(dir: &Path, write_buffer_size: usize) -> Engine<FakeClock> {
        Engine::open_with_clock(
            EngineConfig::new(dir, write_buffer_size),
            FakeClock::new(1_000),
        )
        .unwrap()
    }

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let mut engine = open(dir.path(), 1 << 20);
        engine.put(1, b"hello".to_vec()).unwrap();
        assert_eq!(engine.get(1).unwrap(), Some(b"hello".to_vec()));
        assert_eq!(engine.get(2).unwrap(), None);
    }

    #[test]
    fn delete_hides_value_and_reports_prior_existence() {
        let dir = tempdir().unwrap();
        let mut engine = open(dir.path(), 1 << 20);
        assert!(!engine.delete(1).unwrap());
        engine.put(1, b"hello".to_vec()).unwrap();
        assert!(engine.delete(1).unwrap());
        assert_eq!(engine.get(1).unwrap(), None);
    }

    #[test]
    fn flush_triggers_once_write_buffer_is_exceeded_and_survives_reopen() {
        let dir = tempdir().unwrap();
        // Big enough to hold one 4-byte-value record but not two.
        let small_buffer = crate::record::PER_ENTRY_OVERHEAD + 10;
        {
            let mut engine = open(dir.path(), small_buffer);
            engine.put(1, b"aaaa".to_vec()).unwrap();
            engine.put(2, b"bbbb".to_vec()).unwrap();
            assert_eq!(engine.catalog.file_count(0), 1);
        }

        let engine = open(dir.path(), small_buffer);
        assert_eq!(engine.get(1).unwrap(), Some(b"aaaa".to_vec()));
        assert_eq!(engine.get(2).unwrap(), Some(b"bbbb".to_vec()));
    }

    #[test]
    fn reset_clears_memtable_and_every_level() {
        let dir = tempdir().unwrap();
        let small_buffer = crate::record::PER_ENTRY_OVERHEAD + 4;
        let mut engine = open(dir.path(), small_buffer);
        engine.put(1, b"aaaa".to_vec()).unwrap();
        engine.put(2, b"bbbb".to_vec()).unwrap();
        engine.put(3, b"cccc".to_vec()).unwrap();

        engine.reset().unwrap();

        assert_eq!(engine.get(1).unwrap(), None);
        assert_eq!(engine.get(2).unwrap(), None);
        assert_eq!(engine.catalog.num_levels(), 0);
    }

    #[test]
    fn recovery_clears_a_leftover_staging_directory() {
        let dir = tempdir().unwrap();
        {
            let engine = open(dir.path(), 1 << 20);
            engine.catalog.create_staging_dir().unwrap();
            std::fs::write(engine.catalog.staging_dir().join("stray"), b"partial").unwrap();
        }

        let engine = open(dir.path(), 1 << 20);
        assert!(!engine.catalog.staging_dir().join("stray").exists());
    }
}

//! Sorted String Table (SSTable) Module
//!
//! This module implements an **immutable**, **disk-backed** sorted table of
//! [`Record`]s suitable for an embedded LSM key-value store.
//!
//! ## Design Overview
//!
//! An SSTable stores its Records in a single flat **DATA region**, sorted
//! strictly ascending by key, followed by an **INDEX region** of one
//! `(key, offset)` pair per Record, followed by an 8-byte **footer** giving
//! the byte offset where the INDEX region begins.
//!
//! Opening an SSTable loads only the INDEX region into memory as a
//! [`SparseIndex`] — values are never read until a lookup actually needs
//! them, so opening a table that is gigabytes large costs only the size of
//! its index.
//!
//! # On-disk layout
//!
//! ```text
//! DATA region:   repeated Record
//!                  key:       u64  (LE)
//!                  timestamp: i64  (LE, seconds since epoch)
//!                  length:    u64  (LE, byte count of value)
//!                  value:     `length` bytes
//! INDEX region:  repeated IndexEntry
//!                  key:       u64  (LE)
//!                  offset:    u64  (LE, byte offset of the Record's key field)
//! FOOTER:        u64 (LE) = byte offset at which INDEX begins
//! ```
//!
//! # Sub-modules
//!
//! - [`builder`] — [`SstWriter`] for building SSTables from a sorted stream.
//!
//! # Guarantees
//!
//! - **Immutability:** once written, an SSTable file is never modified in place.
//! - **Strict ordering:** Records and IndexEntries are strictly increasing by key.
//! - **Sparse index completeness:** the index holds exactly one entry per Record.

pub mod builder;


pub use builder::SstWriter;

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::trace;

use crate::record::Record;

/// Size in bytes of one on-disk `IndexEntry` (key + offset).
pub const INDEX_ENTRY_SIZE: u64 = 16;
/// Size in bytes of the trailing footer.
pub const FOOTER_SIZE: u64 = 8;

/// Errors returned by SSTable read/write operations.
#[derive(Debug, Error)]
pub enum SsTableError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invariant violation: {0}")]
    Invariant(String),
}

/// One entry in a [`SparseIndex`]: a key and the byte offset of its Record
/// (the offset of the Record's `key` field, per the on-disk layout above).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: u64,
    pub offset: u64,
}

/// The ordered, in-memory index of every Record in one SSTable.
///
/// Loaded in full when the table is opened; values themselves stay on disk.
pub type SparseIndex = Vec<IndexEntry>;

/// A handle to an immutable on-disk SSTable.
///
/// Holds the file path and its [`SparseIndex`] in memory; values are read
/// from disk on demand via [`SsTable::get`].
#[derive(Debug, Clone)]
pub struct SsTable {
    path: PathBuf,
    index: SparseIndex,
}

impl SsTable {
    /// Opens an existing SSTable file, loading its sparse index into memory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SsTableError> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let index = read_index(&mut file)?;
        trace!(path = %path.display(), entries = index.len(), "opened sstable");
        Ok(Self { path, index })
    }

    /// Builds a handle from an index already known in memory (e.g. the one
    /// just returned by [`SstWriter::write`]), avoiding a redundant reopen.
    pub fn from_index(path: impl AsRef<Path>, index: SparseIndex) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            index,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn index(&self) -> &SparseIndex {
        &self.index
    }

    /// The smallest key stored in this table, if it is non-empty.
    pub fn first_key(&self) -> Option<u64> {
        self.index.first().map(|e| e.key)
    }

    /// The largest key stored in this table, if it is non-empty.
    pub fn last_key(&self) -> Option<u64> {
        self.index.last().map(|e| e.key)
    }

    /// Returns `true` if `key` falls within `[first_key, last_key]`.
    ///
    /// A cheap pre-filter; callers still need [`get`](Self::get) to confirm
    /// presence, since the range may contain gaps.
    pub fn key_range_contains(&self, key: u64) -> bool {
        match (self.first_key(), self.last_key()) {
            (Some(min), Some(max)) => key >= min && key <= max,
            _ => false,
        }
    }

    /// Binary searches the sparse index and, on a hit, reads the Record's
    /// value from disk.
    ///
    /// Returns `Ok(None)` if the key is absent from this table. A hit whose
    /// value is empty (a tombstone) is still returned as `Some` — the
    /// caller (the catalog's lookup protocol) is responsible for treating
    /// an empty value as "not found".
    pub fn get(&self, key: u64) -> Result<Option<Record>, SsTableError> {
        let pos = match self.index.binary_search_by_key(&key, |e| e.key) {
            Ok(pos) => pos,
            Err(_) => return Ok(None),
        };
        let offset = self.index[pos].offset;

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        let (read_key, record) = read_record_at_current_position(&mut file)?;
        if read_key != key {
            return Err(SsTableError::Invariant(format!(
                "sparse index disagrees with file contents: expected key {} at offset {}, found {}",
                key, offset, read_key
            )));
        }
        Ok(Some(record))
    }

    /// Reads every Record in the DATA region, in ascending key order.
    ///
    /// Used by compaction, which must merge whole tables in memory.
    pub fn read_all(&self) -> Result<Vec<Record>, SsTableError> {
        let mut file = File::open(&self.path)?;
        let data_len = index_region_start(&mut file)?;
        file.seek(SeekFrom::Start(0))?;

        let mut records = Vec::with_capacity(self.index.len());
        let mut pos = 0u64;
        while pos < data_len {
            let (_, record) = read_record_at_current_position(&mut file)?;
            pos = file.stream_position()?;
            records.push(record);
        }
        Ok(records)
    }
}

/// Seeks to the footer, reads it, and returns the byte offset at which the
/// INDEX region begins (i.e. the total length of the DATA region).
fn index_region_start(file: &mut File) -> Result<u64, SsTableError> {
    let file_len = file.metadata()?.len();
    if file_len < FOOTER_SIZE {
        return Err(SsTableError::Invariant(
            "file too short to contain a footer".into(),
        ));
    }
    file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
    let mut buf = [0u8; 8];
    file.read_exact(&mut buf)?;
    let offset = u64::from_le_bytes(buf);
    if offset > file_len - FOOTER_SIZE {
        return Err(SsTableError::Invariant(format!(
            "footer offset {} outside file of length {}",
            offset, file_len
        )));
    }
    Ok(offset)
}

/// Reads the full [`SparseIndex`] from an open file: locates the INDEX
/// region via the footer, then streams IndexEntries until reaching it.
fn read_index(file: &mut File) -> Result<SparseIndex, SsTableError> {
    let file_len = file.metadata()?.len();
    let index_start = index_region_start(file)?;
    let index_end = file_len - FOOTER_SIZE;
    let index_bytes = index_end - index_start;
    if index_bytes % INDEX_ENTRY_SIZE != 0 {
        return Err(SsTableError::Invariant(
            "index region size is not a multiple of the entry size".into(),
        ));
    }

    file.seek(SeekFrom::Start(index_start))?;
    let count = (index_bytes / INDEX_ENTRY_SIZE) as usize;
    let mut index = Vec::with_capacity(count);
    let mut last_key: Option<u64> = None;
    for _ in 0..count {
        let mut buf = [0u8; 16];
        file.read_exact(&mut buf)?;
        let key = u64::from_le_bytes(buf[0..8].try_into().unwrap());
        let offset = u64::from_le_bytes(buf[8..16].try_into().unwrap());
        if let Some(prev) = last_key {
            if key <= prev {
                return Err(SsTableError::Invariant(
                    "index keys are not strictly ascending".into(),
                ));
            }
        }
        last_key = Some(key);
        index.push(IndexEntry { key, offset });
    }
    Ok(index)
}

/// Reads one Record starting at the file's current position, which must be
/// positioned at the start of a Record's `key` field.
fn read_record_at_current_position(file: &mut File) -> Result<(u64, Record), SsTableError> {
    let mut head = [0u8; 24];
    file.read_exact(&mut head)?;
    let key = u64::from_le_bytes(head[0..8].try_into().unwrap());
    let timestamp = i64::from_le_bytes(head[8..16].try_into().unwrap());
    let length = u64::from_le_bytes(head[16..24].try_into().unwrap());

    let mut value = vec![0u8; length as usize];
    file.read_exact(&mut value)?;

    Ok((key, Record::new(key, timestamp, value)))
}

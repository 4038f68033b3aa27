//! SSTable writer — builds a complete SSTable file from a sorted stream of
//! [`Record`]s.
//!
//! # Atomicity
//!
//! 1. Write everything to `path` (callers pass a path inside the engine's
//!    staging directory so a crash mid-write never touches a live level).
//! 2. Flush and `sync_all` the file.
//! 3. The caller renames the staged file into its final level directory.
//!
//! [`SstWriter`] itself does not rename — the engine's flush and compaction
//! paths own the staging-to-final rename so that multiple files produced by
//! one compaction round can be renamed together as a single commit point.

use std::fs::OpenOptions;
use std::io::{self, BufWriter, Seek, Write};
use std::path::Path;

use super::{IndexEntry, SparseIndex, SsTableError};
use crate::record::Record;

/// Builds an SSTable file at a given path from a sorted [`Record`] stream.
pub struct SstWriter;

impl SstWriter {
    /// Writes `records` (which MUST be strictly ascending by key) to `path`,
    /// returning the [`SparseIndex`] that was written into the file's INDEX
    /// region.
    ///
    /// # Errors
    ///
    /// Returns [`SsTableError::Invariant`] if `records` is empty, or if the
    /// stream is not strictly ascending by key. Returns
    /// [`SsTableError::Io`] for any underlying I/O failure; on I/O failure
    /// the destination file may exist but is incomplete — callers must not
    /// treat it as a valid SSTable until this call returns `Ok`.
    pub fn write(
        path: impl AsRef<Path>,
        records: impl Iterator<Item = Record>,
    ) -> Result<SparseIndex, SsTableError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        let mut writer = BufWriter::new(file);

        let mut index = Vec::new();
        let mut last_key: Option<u64> = None;

        for record in records {
            if let Some(prev) = last_key {
                if record.key <= prev {
                    return Err(SsTableError::Invariant(format!(
                        "records must be strictly ascending by key, got {} after {}",
                        record.key, prev
                    )));
                }
            }
            last_key = Some(record.key);

            let offset = writer.stream_position()?;
            write_record(&mut writer, &record)?;
            index.push(IndexEntry {
                key: record.key,
                offset,
            });
        }

        if index.is_empty() {
            return Err(SsTableError::Invariant(
                "cannot write an SSTable with zero records".into(),
            ));
        }

        let data_len = writer.stream_position()?;
        for entry in &index {
            writer.write_all(&entry.key.to_le_bytes())?;
            writer.write_all(&entry.offset.to_le_bytes())?;
        }
        writer.write_all(&data_len.to_le_bytes())?;

        writer.flush()?;
        let file = writer.into_inner().map_err(io::IntoInnerError::into_error)?;
        file.sync_all()?;

        Ok(index)
    }
}

fn write_record(writer: &mut impl Write, record: &Record) -> Result<(), SsTableError> {
    writer.write_all(&record.key.to_le_bytes())?;
    writer.write_all(&record.timestamp.to_le_bytes())?;
    writer.write_all(&(record.value.len() as u64).to_le_bytes())?;
    writer.write_all(&record.value)?;
    Ok(())
}

//! # Catalog Module
//!
//! The in-memory directory of every SSTable's sparse index, organized by
//! level. The catalog is the process-wide state consulted by point lookups
//! and by compaction's victim/overlap selection; it never itself touches
//! values on disk — lookups delegate to [`SsTable::get`].
//!
//! ## Directory layout
//!
//! ```text
//! <root>/level-0/sstable-0, sstable-1, ...
//! <root>/level-1/sstable-0, ...
//! <root>/tmp/           (staging for atomic rename during flush and compaction)
//! ```
//!
//! Level directories are created on first use. A missing level directory at
//! startup means "no data at this level or below" — recovery stops at the
//! first gap.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::record::Record;
use crate::sstable::{SsTable, SsTableError};

pub const LEVEL_DIR_PREFIX: &str = "level-";
pub const SSTABLE_FILE_PREFIX: &str = "sstable-";
pub const STAGING_DIR: &str = "tmp";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("SSTable error: {0}")]
    SsTable(#[from] SsTableError),
}

/// The ordered list of SSTables at one level.
///
/// Level 0 may hold overlapping key ranges; level 0's list is newest-first
/// (index 0 is the most recently flushed table). Levels 1 and up are kept
/// key-range-disjoint and sorted by ascending first key.
#[derive(Default)]
pub struct Level {
    pub sstables: Vec<SsTable>,
}

impl Level {
    /// Capacity of level `l` is `2^(l+1)`.
    pub fn capacity(level: usize) -> usize {
        1usize << (level + 1)
    }

    pub fn is_over_capacity(&self, level: usize) -> bool {
        self.sstables.len() > Self::capacity(level)
    }
}

/// The in-memory catalog of all levels for one engine instance.
pub struct Catalog {
    root: PathBuf,
    levels: Vec<Level>,
}

impl Catalog {
    /// Recovers the catalog by walking `root`'s level directories in order
    /// until a gap is found, loading each SSTable's sparse index.
    ///
    /// Does not touch `tmp/` — callers must clear the staging directory
    /// separately at startup (the catalog has no opinion on partial writes;
    /// that is the engine's recovery responsibility).
    pub fn open(root: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let root = root.as_ref().to_path_buf();
        let mut levels = Vec::new();

        let mut level_no = 0usize;
        loop {
            let level_dir = level_dir_path(&root, level_no);
            if !level_dir.is_dir() {
                break;
            }

            let mut level = Level::default();
            let mut id = 0usize;
            loop {
                let file_path = sstable_file_path(&root, level_no, id);
                if !file_path.is_file() {
                    break;
                }
                level.sstables.push(SsTable::open(&file_path)?);
                id += 1;
            }
            debug!(level = level_no, count = level.sstables.len(), "recovered level");
            levels.push(level);
            level_no += 1;
        }

        info!(levels = levels.len(), root = %root.display(), "catalog recovered");
        Ok(Self { root, levels })
    }

    /// Creates a catalog with no levels, for a freshly reset store.
    pub fn empty(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            levels: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn level_dir(&self, level: usize) -> PathBuf {
        level_dir_path(&self.root, level)
    }

    pub fn sstable_path(&self, level: usize, id: usize) -> PathBuf {
        sstable_file_path(&self.root, level, id)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, level: usize) -> Option<&Level> {
        self.levels.get(level)
    }

    pub fn file_count(&self, level: usize) -> usize {
        self.levels.get(level).map_or(0, |l| l.sstables.len())
    }

    /// The on-disk paths of every SSTable currently at `level`, in their
    /// current (newest-first for level 0, ascending-first-key otherwise) order.
    pub fn level_paths(&self, level: usize) -> Vec<PathBuf> {
        (0..self.file_count(level))
            .map(|id| self.sstable_path(level, id))
            .collect()
    }

    /// Removes every `level-*` directory and the staging directory from
    /// disk, then clears the in-memory catalog. Used by `reset`.
    pub fn remove_all(&mut self) -> Result<(), CatalogError> {
        for level in 0..self.levels.len() {
            let dir = self.level_dir(level);
            if dir.is_dir() {
                fs::remove_dir_all(&dir)?;
            }
        }
        let staging = self.staging_dir();
        if staging.is_dir() {
            fs::remove_dir_all(&staging)?;
        }
        self.levels.clear();
        Ok(())
    }

    /// Flat index of the SSTable at (`level`, `id`) across the whole
    /// catalog: `Σ_{k<level} file_count(k) + id`.
    pub fn flat_index(&self, level: usize, id: usize) -> usize {
        let preceding: usize = (0..level).map(|k| self.file_count(k)).sum();
        preceding + id
    }

    /// Point lookup across every level, newest-first at level 0 then
    /// strictly downward, stopping at the first hit (even a tombstone).
    ///
    /// This is the correctness condition that lets more recent writes
    /// shadow older ones without consulting timestamps at read time.
    pub fn get(&self, key: u64) -> Result<Option<Record>, CatalogError> {
        for (level_no, level) in self.levels.iter().enumerate() {
            for sst in &level.sstables {
                if !sst.key_range_contains(key) {
                    continue;
                }
                if let Some(record) = sst.get(key)? {
                    debug!(key, level = level_no, "catalog lookup hit");
                    return Ok(Some(record));
                }
            }
        }
        Ok(None)
    }

    /// Ensures `level` exists (as an empty list) up to and including the
    /// requested index, extending the catalog if needed.
    pub fn ensure_level(&mut self, level: usize) {
        while self.levels.len() <= level {
            self.levels.push(Level::default());
        }
    }

    /// Replaces the entire SSTable list for `level`, e.g. after a flush or a
    /// compaction has renumbered it on disk.
    pub fn replace_level(&mut self, level: usize, sstables: Vec<SsTable>) {
        self.ensure_level(level);
        self.levels[level].sstables = sstables;
    }

    /// Creates `level-N` on disk if it does not already exist.
    pub fn create_level_dir(&self, level: usize) -> Result<(), CatalogError> {
        fs::create_dir_all(self.level_dir(level))?;
        Ok(())
    }

    /// Creates the staging directory on disk if it does not already exist.
    pub fn create_staging_dir(&self) -> Result<(), CatalogError> {
        fs::create_dir_all(self.staging_dir())?;
        Ok(())
    }

    /// Renumbers `level` so that its files are contiguous ids starting from
    /// 0, in the order given by `ordered_paths` (index 0 becomes
    /// `sstable-0`, and so on).
    ///
    /// `ordered_paths` may reference files anywhere (an existing level
    /// directory, or a freshly-built file sitting in the staging
    /// directory) — this is the single renumbering primitive used by both
    /// flush (to keep level 0 newest-first on disk) and compaction (to
    /// renumber level L+1 after splicing in new outputs).
    ///
    /// Collision-free via a two-phase rename: every source is first moved
    /// to a uniquely-named file in the staging directory, then moved again
    /// into its final, contiguous position.
    pub fn renumber_level(
        &self,
        level: usize,
        ordered_paths: &[PathBuf],
    ) -> Result<Vec<SsTable>, CatalogError> {
        self.create_level_dir(level)?;
        self.create_staging_dir()?;
        let staging = self.staging_dir();

        let mut staged = Vec::with_capacity(ordered_paths.len());
        for (i, src) in ordered_paths.iter().enumerate() {
            let tmp_path = staging.join(format!("renumber-{level}-{i}"));
            fs::rename(src, &tmp_path)?;
            staged.push(tmp_path);
        }

        let mut sstables = Vec::with_capacity(staged.len());
        for (i, staged_path) in staged.into_iter().enumerate() {
            let final_path = self.sstable_path(level, i);
            fs::rename(&staged_path, &final_path)?;
            sstables.push(SsTable::open(&final_path)?);
        }

        debug!(level, count = sstables.len(), "renumbered level");
        Ok(sstables)
    }
}

fn level_dir_path(root: &Path, level: usize) -> PathBuf {
    root.join(format!("{LEVEL_DIR_PREFIX}{level}"))
}

fn sstable_file_path(root: &Path, level: usize, id: usize) -> PathBuf {
    level_dir_path(root, level).join(format!("{SSTABLE_FILE_PREFIX}{id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::sstable::SstWriter;
    use tempfile::tempdir;

    fn write_sst(path: &Path, pairs: &[(u64, i64, &str)]) {
        let records = pairs
            .iter()
            .map(|(k, t, v)| Record::new(*k, *t, v.as_bytes().to_vec()));
        SstWriter::write(path, records).unwrap();
    }

    #[test]
    fn level_capacity_is_two_pow_level_plus_one() {
        assert_eq!(Level::capacity(0), 2);
        assert_eq!(Level::capacity(1), 4);
        assert_eq!(Level::capacity(2), 8);
    }

    #[test]
    fn flat_index_sums_preceding_levels() {
        let dir = tempdir().unwrap();
        let mut catalog = Catalog::empty(dir.path());
        catalog.ensure_level(2);
        catalog.levels[0].sstables = vec![
            SsTable::from_index("a", vec![]),
            SsTable::from_index("b", vec![]),
        ];
        catalog.levels[1].sstables = vec![SsTable::from_index("c", vec![])];

        assert_eq!(catalog.flat_index(0, 0), 0);
        assert_eq!(catalog.flat_index(0, 1), 1);
        assert_eq!(catalog.flat_index(1, 0), 2);
        assert_eq!(catalog.flat_index(2, 0), 3);
    }

    #[test]
    fn recovery_stops_at_first_missing_level() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("level-0")).unwrap();
        write_sst(&dir.path().join("level-0/sstable-0"), &[(1, 0, "a")]);
        fs::create_dir_all(dir.path().join("level-1")).unwrap();
        write_sst(&dir.path().join("level-1/sstable-0"), &[(2, 0, "b")]);
        // level-2 intentionally absent.

        let catalog = Catalog::open(dir.path()).unwrap();
        assert_eq!(catalog.num_levels(), 2);
        assert_eq!(catalog.file_count(0), 1);
        assert_eq!(catalog.file_count(1), 1);
    }

    #[test]
    fn recovery_stops_at_first_missing_file_within_a_level() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("level-0")).unwrap();
        write_sst(&dir.path().join("level-0/sstable-0"), &[(1, 0, "a")]);
        write_sst(&dir.path().join("level-0/sstable-2"), &[(9, 0, "z")]); // gap at id 1

        let catalog = Catalog::open(dir.path()).unwrap();
        assert_eq!(catalog.file_count(0), 1);
    }

    #[test]
    fn get_stops_at_first_hit_newest_first() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("level-0")).unwrap();
        write_sst(&dir.path().join("level-0/sstable-0"), &[(1, 20, "newer")]);
        write_sst(&dir.path().join("level-0/sstable-1"), &[(1, 10, "older")]);

        let catalog = Catalog::open(dir.path()).unwrap();
        let hit = catalog.get(1).unwrap().unwrap();
        assert_eq!(hit.value, b"newer".to_vec());
    }
}

//! # Compaction Module
//!
//! Implements leveled compaction for the LSM storage engine: selecting
//! victim tables, merging them with overlapping tables one level down,
//! resolving duplicate keys by recency, and cascading when the destination
//! level overflows.
//!
//! ## Victim selection
//!
//! - Level 0: every level-0 table (there are exactly `capacity(0) + 1 = 3`
//!   when compaction fires).
//! - Level L ≥ 1: the `current_count - capacity(L)` oldest tables (the
//!   tail of the ascending-by-first-key list) — i.e. just enough to bring
//!   the level back within capacity.
//!
//! ## Merge and tombstone elimination
//!
//! Victims, plus every table at L+1 whose range overlaps the victims'
//! combined range, are read fully into memory and merged by a heap-based
//! k-way merge ([`merge_sorted`]) ordered `(key ASC, source priority)`.
//! Ties on key are resolved by timestamp, and ties on timestamp by source
//! priority — victims take priority over L+1 overlap tables, and within
//! level 0 the newest-first victim order is itself the priority order, so
//! ties resolve in favor of "lower level / more recently written" exactly
//! as required.
//!
//! Tombstones survive the merge unless the destination is the deepest
//! level that exists; dropping a tombstone at any shallower destination
//! could resurrect an older value still shadowed further down.
//!
//! ## Output
//!
//! The merged stream is greedily sliced into output SSTables using the
//! same per-Record byte estimate as the memtable. Outputs are written to
//! the engine's staging directory, then the whole level is renumbered in
//! one collision-free two-phase rename via [`Catalog::renumber_level`].

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info};

use crate::catalog::{Catalog, CatalogError, Level};
use crate::record::Record;
use crate::sstable::{SsTable, SsTableError, SstWriter};

#[derive(Debug, Error)]
pub enum CompactionError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("SSTable error: {0}")]
    SsTable(#[from] SsTableError),

    #[error("invariant violation: {0}")]
    Invariant(String),
}

/// Plan for one round of compaction from level `source` into `source + 1`.
struct CompactionPlan {
    /// Index of the source level being compacted.
    source: usize,
    /// Victim SSTable paths at the source level, in merge-priority order
    /// (first element wins key/timestamp ties).
    victim_paths: Vec<PathBuf>,
    /// Overlap SSTable paths at `source + 1`, lower priority than victims.
    overlap_paths: Vec<PathBuf>,
    /// Destination-level files that are *not* part of the overlap and so
    /// survive untouched, split into those that sort before and after the
    /// newly produced range.
    before: Vec<PathBuf>,
    after: Vec<PathBuf>,
}

/// Runs one round of compaction on `level`, writing results to `level + 1`
/// and cascading if that level now overflows.
///
/// `byte_ceiling` is the same budget used by the memtable and governs how
/// large each output SSTable is allowed to grow before the
/// slicer seals it and starts a new one.
pub fn compact(
    catalog: &mut Catalog,
    level: usize,
    byte_ceiling: usize,
) -> Result<(), CompactionError> {
    let Some(plan) = build_plan(catalog, level)? else {
        return Ok(());
    };

    info!(
        source = plan.source,
        victims = plan.victim_paths.len(),
        overlap = plan.overlap_paths.len(),
        "compaction starting"
    );

    let dest = plan.source + 1;
    // Tombstones are only safe to drop once they land on the deepest level
    // that currently exists (or a brand-new one past the current end) — i.e.
    // there is no level beyond `dest` for an older value to still be hiding in.
    let drop_tombstones = dest + 1 >= catalog.num_levels();

    let mut sources: Vec<Vec<Record>> = Vec::new();
    for path in plan.victim_paths.iter().chain(plan.overlap_paths.iter()) {
        sources.push(SsTable::open(path)?.read_all()?);
    }

    let merged = merge_sorted(sources);
    let merged_len = merged.len();
    let output = if drop_tombstones {
        merged.into_iter().filter(|r| !r.is_tombstone()).collect()
    } else {
        merged
    };
    debug!(
        merged_records = merged_len,
        surviving_records = output.len(),
        drop_tombstones,
        "compaction merge complete"
    );

    catalog.create_level_dir(dest)?;
    catalog.create_staging_dir()?;
    let staging = catalog.staging_dir();

    let mut produced_paths = Vec::new();
    for (i, chunk) in slice_into_chunks(output, byte_ceiling).into_iter().enumerate() {
        let staged_path = staging.join(format!("compact-out-{dest}-{i}"));
        SstWriter::write(&staged_path, chunk.into_iter())?;
        produced_paths.push(staged_path);
    }

    // Consumed inputs are removed before renumbering `dest`: an overlap
    // file left in place could otherwise sit at the exact path a
    // surviving `before`/`after` table gets renamed into, and `rename`
    // silently replaces an existing destination.
    for consumed in plan.victim_paths.iter().chain(plan.overlap_paths.iter()) {
        std::fs::remove_file(consumed)?;
    }

    // Final ordering for level `dest`: surviving before-range tables, then
    // newly produced outputs, then surviving after-range tables.
    let mut ordered = plan.before;
    ordered.extend(produced_paths);
    ordered.extend(plan.after);

    let new_level_sstables = if ordered.is_empty() {
        Vec::new()
    } else {
        catalog.renumber_level(dest, &ordered)?
    };
    catalog.replace_level(dest, new_level_sstables);

    // Victims at the source level are gone; drop the now-stale entries and
    // renumber what remains back to contiguous ids.
    let remaining_source = catalog
        .level_paths(plan.source)
        .into_iter()
        .filter(|p| !plan.victim_paths.contains(p))
        .collect::<Vec<_>>();
    let remaining_source_sstables = if remaining_source.is_empty() {
        Vec::new()
    } else {
        catalog.renumber_level(plan.source, &remaining_source)?
    };
    catalog.replace_level(plan.source, remaining_source_sstables);

    info!(source = plan.source, dest, outputs = catalog.file_count(dest), "compaction finished");

    if catalog
        .level(dest)
        .map(|l| l.is_over_capacity(dest))
        .unwrap_or(false)
    {
        compact(catalog, dest, byte_ceiling)?;
    }

    Ok(())
}

/// Builds a [`CompactionPlan`] for `level`, or `None` if it is not
/// currently over capacity.
fn build_plan(catalog: &Catalog, level: usize) -> Result<Option<CompactionPlan>, CompactionError> {
    let count = catalog.file_count(level);
    let capacity = Level::capacity(level);
    if count <= capacity {
        return Ok(None);
    }

    let victim_paths = if level == 0 {
        // All of level 0; the list is already newest-first, which is also
        // the correct merge-priority order.
        catalog.level_paths(0)
    } else {
        // The oldest (tail of the ascending-by-first-key list) `count -
        // capacity` tables.
        let excess = count - capacity;
        catalog.level_paths(level)[count - excess..].to_vec()
    };

    let victim_range = key_range(&victim_paths)?;

    let dest = level + 1;
    let dest_paths = catalog.level_paths(dest);
    let mut before = Vec::new();
    let mut overlap_paths = Vec::new();
    let mut after = Vec::new();
    for path in dest_paths {
        let sst = SsTable::open(&path)?;
        let (lo, hi) = (sst.first_key().unwrap(), sst.last_key().unwrap());
        if hi < victim_range.0 {
            before.push(path);
        } else if lo > victim_range.1 {
            after.push(path);
        } else {
            overlap_paths.push(path);
        }
    }

    Ok(Some(CompactionPlan {
        source: level,
        victim_paths,
        overlap_paths,
        before,
        after,
    }))
}

fn key_range(paths: &[PathBuf]) -> Result<(u64, u64), CompactionError> {
    let mut min = u64::MAX;
    let mut max = 0u64;
    for path in paths {
        let sst = SsTable::open(path)?;
        min = min.min(sst.first_key().ok_or_else(|| {
            CompactionError::Invariant("victim SSTable has no records".into())
        })?);
        max = max.max(sst.last_key().unwrap());
    }
    Ok((min, max))
}

/// Heap-based k-way merge over pre-sorted [`Record`] vectors, ordered
/// `(key ASC, source priority ASC)`.
///
/// Earlier entries in `sources` have merge priority over later ones: when
/// two Records share a key, the one with the larger timestamp wins, and a
/// timestamp tie is broken in favor of the earlier (higher-priority)
/// source — which is how the "more recently written" requirement on
/// same-level ties is satisfied without needing timestamp comparisons to
/// be strict.
fn merge_sorted(sources: Vec<Vec<Record>>) -> Vec<Record> {
    use std::cmp::Ordering;
    use std::collections::BinaryHeap;

    struct HeapEntry {
        key: u64,
        source: usize,
        index: usize,
    }

    impl PartialEq for HeapEntry {
        fn eq(&self, other: &Self) -> bool {
            self.key == other.key && self.source == other.source
        }
    }
    impl Eq for HeapEntry {}
    impl Ord for HeapEntry {
        fn cmp(&self, other: &Self) -> Ordering {
            // Min-heap behavior via reversal: smallest key first, then
            // smallest source index (highest merge priority) first.
            other
                .key
                .cmp(&self.key)
                .then_with(|| other.source.cmp(&self.source))
        }
    }
    impl PartialOrd for HeapEntry {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }

    let mut heap = BinaryHeap::new();
    for (source, records) in sources.iter().enumerate() {
        if let Some(first) = records.first() {
            heap.push(HeapEntry {
                key: first.key,
                source,
                index: 0,
            });
        }
    }

    let mut out: Vec<Record> = Vec::new();
    while let Some(entry) = heap.pop() {
        if let Some(next) = sources[entry.source].get(entry.index + 1) {
            heap.push(HeapEntry {
                key: next.key,
                source: entry.source,
                index: entry.index + 1,
            });
        }

        let record = &sources[entry.source][entry.index];
        match out.last() {
            Some(last) if last.key == record.key => {
                // A higher- or equal-priority copy of this key was already
                // emitted by an earlier (lower `source`) pop; only replace
                // it if this later copy has a strictly newer timestamp.
                if record.timestamp > last.timestamp {
                    *out.last_mut().unwrap() = record.clone();
                }
            }
            _ => out.push(record.clone()),
        }
    }

    out
}

/// Greedily slices `records` into chunks whose accumulated
/// [`Record::size_estimate`] reaches `byte_ceiling`, sealing the final
/// (possibly under-full) chunk unconditionally.
fn slice_into_chunks(records: Vec<Record>, byte_ceiling: usize) -> Vec<Vec<Record>> {
    let mut chunks = Vec::new();
    let mut current = Vec::new();
    let mut current_size = 0usize;

    for record in records {
        current_size += record.size_estimate();
        current.push(record);
        if current_size >= byte_ceiling {
            chunks.push(std::mem::take(&mut current));
            current_size = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn recs(pairs: &[(u64, i64, &str)]) -> Vec<Record> {
        pairs
            .iter()
            .map(|(k, t, v)| Record::new(*k, *t, v.as_bytes().to_vec()))
            .collect()
    }

    #[test]
    fn merge_sorted_prefers_newer_timestamp_across_sources() {
        let a = recs(&[(1, 5, "old")]);
        let b = recs(&[(1, 9, "new")]);
        let merged = merge_sorted(vec![a, b]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].value, b"new".to_vec());
    }

    #[test]
    fn merge_sorted_breaks_timestamp_ties_by_source_priority() {
        let a = recs(&[(1, 5, "priority")]);
        let b = recs(&[(1, 5, "lower-priority")]);
        let merged = merge_sorted(vec![a, b]);
        assert_eq!(merged[0].value, b"priority".to_vec());
    }

    #[test]
    fn merge_sorted_interleaves_disjoint_keys_in_order() {
        let a = recs(&[(1, 0, "a"), (3, 0, "c")]);
        let b = recs(&[(2, 0, "b"), (4, 0, "d")]);
        let merged = merge_sorted(vec![a, b]);
        assert_eq!(
            merged.iter().map(|r| r.key).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
    }

    #[test]
    fn slice_into_chunks_seals_final_underfull_chunk() {
        let records = recs(&[(1, 0, "a"), (2, 0, "b"), (3, 0, "c")]);
        let ceiling = Record::new(1, 0, b"a".to_vec()).size_estimate() * 2;
        let chunks = slice_into_chunks(records, ceiling);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 2);
        assert_eq!(chunks[1].len(), 1);
    }

    fn write_sst(path: &std::path::Path, pairs: &[(u64, i64, &str)]) {
        SstWriter::write(path, recs(pairs).into_iter()).unwrap();
    }

    #[test]
    fn compact_merges_level_zero_into_level_one_and_drops_nothing_prematurely() {
        let dir = tempdir().unwrap();
        let mut catalog = Catalog::empty(dir.path());
        catalog.create_level_dir(0).unwrap();

        // Over capacity(0) = 2, so three level-0 tables trigger compaction.
        write_sst(&catalog.sstable_path(0, 0), &[(3, 30, "newest")]);
        write_sst(&catalog.sstable_path(0, 1), &[(2, 20, "mid")]);
        write_sst(&catalog.sstable_path(0, 2), &[(1, 10, "oldest")]);
        catalog.replace_level(
            0,
            vec![
                SsTable::open(catalog.sstable_path(0, 0)).unwrap(),
                SsTable::open(catalog.sstable_path(0, 1)).unwrap(),
                SsTable::open(catalog.sstable_path(0, 2)).unwrap(),
            ],
        );

        compact(&mut catalog, 0, 1 << 20).unwrap();

        assert_eq!(catalog.file_count(0), 0);
        assert_eq!(catalog.file_count(1), 1);
        assert_eq!(catalog.get(1).unwrap().unwrap().value, b"oldest".to_vec());
        assert_eq!(catalog.get(2).unwrap().unwrap().value, b"mid".to_vec());
        assert_eq!(catalog.get(3).unwrap().unwrap().value, b"newest".to_vec());
    }

    #[test]
    fn compact_drops_tombstones_only_at_the_deepest_level() {
        let dir = tempdir().unwrap();
        let mut catalog = Catalog::empty(dir.path());
        catalog.create_level_dir(0).unwrap();

        write_sst(&catalog.sstable_path(0, 0), &[(1, 30, "")]);
        write_sst(&catalog.sstable_path(0, 1), &[(2, 20, "x")]);
        write_sst(&catalog.sstable_path(0, 2), &[(3, 10, "y")]);
        catalog.replace_level(
            0,
            vec![
                SsTable::open(catalog.sstable_path(0, 0)).unwrap(),
                SsTable::open(catalog.sstable_path(0, 1)).unwrap(),
                SsTable::open(catalog.sstable_path(0, 2)).unwrap(),
            ],
        );

        // Level 1 does not exist yet, so it is the deepest destination:
        // the tombstone for key 1 is eligible for removal.
        compact(&mut catalog, 0, 1 << 20).unwrap();

        assert_eq!(catalog.get(1).unwrap(), None);
        let records = SsTable::open(catalog.sstable_path(1, 0))
            .unwrap()
            .read_all()
            .unwrap();
        assert!(records.iter().all(|r| !r.is_tombstone()));
    }

    #[test]
    fn compact_drops_tombstones_at_an_already_existing_deepest_level() {
        let dir = tempdir().unwrap();
        let mut catalog = Catalog::empty(dir.path());
        catalog.create_level_dir(0).unwrap();
        catalog.create_level_dir(1).unwrap();

        // Level 1 already exists, with data far outside level 0's key range
        // so it lands in `before`/`after`, not the overlap set.
        write_sst(&catalog.sstable_path(1, 0), &[(100, 0, "far")]);
        catalog.replace_level(1, vec![SsTable::open(catalog.sstable_path(1, 0)).unwrap()]);

        write_sst(&catalog.sstable_path(0, 0), &[(1, 30, "")]);
        write_sst(&catalog.sstable_path(0, 1), &[(2, 20, "x")]);
        write_sst(&catalog.sstable_path(0, 2), &[(3, 10, "y")]);
        catalog.replace_level(
            0,
            vec![
                SsTable::open(catalog.sstable_path(0, 0)).unwrap(),
                SsTable::open(catalog.sstable_path(0, 1)).unwrap(),
                SsTable::open(catalog.sstable_path(0, 2)).unwrap(),
            ],
        );

        // Level 1 already exists and is the deepest level before and after
        // this round (num_levels stays 2): the tombstone for key 1 must
        // still be dropped, not preserved forever.
        compact(&mut catalog, 0, 1 << 20).unwrap();

        assert_eq!(catalog.num_levels(), 2);
        assert_eq!(catalog.get(1).unwrap(), None);
        for id in 0..catalog.file_count(1) {
            let records = SsTable::open(catalog.sstable_path(1, id))
                .unwrap()
                .read_all()
                .unwrap();
            assert!(records.iter().all(|r| !r.is_tombstone()));
        }
    }
}

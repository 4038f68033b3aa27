//! Property-style invariant checks driven by a deterministic pseudo-random
//! workload, so failures stay reproducible without an external RNG
//! dependency.

use ordinalkv::catalog::Catalog;
use ordinalkv::clock::FakeClock;
use ordinalkv::engine::{Engine, EngineConfig, KvEngine};
use ordinalkv::record::PER_ENTRY_OVERHEAD;
use ordinalkv::sstable::SsTable;
use tempfile::TempDir;

/// Deterministic LCG so a failing seed can always be reproduced locally.
struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn next_u64(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0
    }

    fn next_bounded(&mut self, bound: u64) -> u64 {
        self.next_u64() % bound
    }
}

#[test]
fn level_one_and_up_stay_key_range_disjoint_and_sorted() {
    let tmp = TempDir::new().unwrap();
    let ceiling = (PER_ENTRY_OVERHEAD + 8) * 2;
    let mut engine = Engine::open_with_clock(
        EngineConfig::new(tmp.path(), ceiling),
        FakeClock::new(1_000),
    )
    .unwrap();

    let mut rng = Rng::new(42);
    for _ in 0..500 {
        let key = rng.next_bounded(200);
        if rng.next_bounded(10) == 0 {
            engine.delete(key).unwrap();
        } else {
            let value = format!("v{}", rng.next_bounded(1_000_000));
            engine.put(key, value.into_bytes()).unwrap();
        }
    }
    drop(engine);

    let catalog = Catalog::open(tmp.path()).unwrap();
    for level in 1..catalog.num_levels() {
        let Some(level_ref) = catalog.level(level) else {
            continue;
        };
        let mut prev_last: Option<u64> = None;
        let mut prev_first: Option<u64> = None;
        for sst in &level_ref.sstables {
            let first = sst.first_key().unwrap();
            let last = sst.last_key().unwrap();
            assert!(first <= last);
            if let Some(prev_first) = prev_first {
                assert!(
                    first > prev_first,
                    "level {level} is not sorted by first key"
                );
            }
            if let Some(prev_last) = prev_last {
                assert!(
                    first > prev_last,
                    "level {level} has overlapping key ranges"
                );
            }
            prev_first = Some(first);
            prev_last = Some(last);
        }
    }
}

#[test]
fn every_sstable_is_strictly_ascending_with_a_matching_sparse_index() {
    let tmp = TempDir::new().unwrap();
    let ceiling = (PER_ENTRY_OVERHEAD + 8) * 2;
    let mut engine = Engine::open_with_clock(
        EngineConfig::new(tmp.path(), ceiling),
        FakeClock::new(1_000),
    )
    .unwrap();

    let mut rng = Rng::new(7);
    for _ in 0..300 {
        let key = rng.next_bounded(100);
        let value = format!("v{}", rng.next_bounded(1_000));
        engine.put(key, value.into_bytes()).unwrap();
    }
    drop(engine);

    let catalog = Catalog::open(tmp.path()).unwrap();
    for level in 0..catalog.num_levels() {
        for id in 0..catalog.file_count(level) {
            let sst = SsTable::open(catalog.sstable_path(level, id)).unwrap();
            let records = sst.read_all().unwrap();
            let mut last_key: Option<u64> = None;
            for record in &records {
                if let Some(last) = last_key {
                    assert!(record.key > last, "data region is not strictly ascending");
                }
                last_key = Some(record.key);
            }
            assert_eq!(
                records.iter().map(|r| r.key).collect::<Vec<_>>(),
                sst.index().iter().map(|e| e.key).collect::<Vec<_>>(),
                "sparse index keys disagree with data region keys"
            );
        }
    }
}

#[test]
fn level_zero_never_exceeds_three_files_and_settles_at_two_after_compaction() {
    let tmp = TempDir::new().unwrap();
    let ceiling = PER_ENTRY_OVERHEAD + 1;
    let mut engine = Engine::open_with_clock(
        EngineConfig::new(tmp.path(), ceiling),
        FakeClock::new(1_000),
    )
    .unwrap();

    for key in 0u64..20 {
        engine.put(key, b"x".to_vec()).unwrap();
        let catalog = Catalog::open(tmp.path()).unwrap();
        assert!(catalog.file_count(0) <= 3);
    }

    let catalog = Catalog::open(tmp.path()).unwrap();
    assert!(catalog.file_count(0) <= 2);
}

#[test]
fn catalog_matches_filesystem_after_random_workload() {
    let tmp = TempDir::new().unwrap();
    let ceiling = (PER_ENTRY_OVERHEAD + 8) * 2;
    let mut engine = Engine::open_with_clock(
        EngineConfig::new(tmp.path(), ceiling),
        FakeClock::new(1_000),
    )
    .unwrap();

    let mut rng = Rng::new(99);
    for _ in 0..400 {
        let key = rng.next_bounded(150);
        if rng.next_bounded(8) == 0 {
            engine.delete(key).unwrap();
        } else {
            engine.put(key, b"payload".to_vec()).unwrap();
        }
    }
    drop(engine);

    let catalog = Catalog::open(tmp.path()).unwrap();
    for level in 0..catalog.num_levels() {
        let mut id = 0;
        loop {
            let path = catalog.sstable_path(level, id);
            if !path.is_file() {
                break;
            }
            assert!(
                id < catalog.file_count(level),
                "file exists on disk with no matching catalog entry"
            );
            id += 1;
        }
        assert_eq!(id, catalog.file_count(level));
    }
}

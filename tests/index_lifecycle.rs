//! # Index Lifecycle Tests
//!
//! End-to-end checks through the public API: build a segment index, open it,
//! query it by key and by ordinal, move its offsets and re-open the result.
//!
//! ## Scenarios
//!
//! - Empty segments produce a valid, empty index
//! - Every built key is found with its offset; absent keys are not
//! - Offset rewrites keep keys and shape and survive reopening
//! - One mapped index serves many reader threads

use std::sync::Arc;

use hashbrown::HashMap;
use tempfile::tempdir;

use btindex::btree::{expected_file_size, SENTINEL_KEY};
use btindex::{plan, BtIndex, Entry, IndexBuilder, ReadAdvice};

fn segment_entries(count: u64) -> Vec<Entry> {
    let mut entries: Vec<Entry> = (0..count)
        .map(|i| {
            let bucket = i.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 8;
            Entry::new(bucket, i ^ 0xABCD, i * 100)
        })
        .collect();
    entries.sort_by_key(|entry| entry.key);
    entries
}

mod build_and_open {
    use super::*;

    #[test]
    fn empty_segment_builds_valid_index() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.bt");

        IndexBuilder::new()
            .fanout(8)
            .build(&path, 0, std::iter::empty())
            .unwrap();
        let index = BtIndex::open(&path).unwrap();

        assert!(index.is_empty());
        assert_eq!(index.depth(), 0);
        assert_eq!(index.lookup(1, 2).unwrap(), None);
        assert_eq!(index.ordinal_lookup(0).unwrap(), None);
    }

    #[test]
    fn thousand_keys_at_fanout_eight() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("segment.bt");
        let entries = segment_entries(1000);

        IndexBuilder::new()
            .fanout(8)
            .base_data_id(77)
            .build(&path, 1000, entries.iter().copied())
            .unwrap();
        let index = BtIndex::open(&path).unwrap();

        assert_eq!(index.key_count(), 1000);
        assert_eq!(index.depth(), 4);
        assert_eq!(index.plan().vertex_budget(), &[1, 4, 27, 166, 1001]);
        assert_eq!(
            Some(index.size()),
            expected_file_size(&plan(1000, 8).unwrap())
        );

        for (ordinal, entry) in entries.iter().enumerate() {
            assert_eq!(
                index.lookup(entry.key.bucket_hash, entry.key.fingerprint).unwrap(),
                Some(entry.offset)
            );
            assert_eq!(index.ordinal_lookup(ordinal as u64).unwrap(), Some(entry.offset));
            assert_eq!(index.data_id(ordinal as u64), Some(77 + ordinal as u64));
        }
    }

    #[test]
    fn absent_keys_are_not_found() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("segment.bt");
        let entries = segment_entries(400);
        IndexBuilder::new().fanout(16).build_from_slice(&path, &entries).unwrap();
        let index = BtIndex::open(&path).unwrap();

        let present: hashbrown::HashSet<_> = entries.iter().map(|entry| entry.key).collect();
        for entry in &entries {
            for probe in [
                (entry.key.bucket_hash, entry.key.fingerprint.wrapping_add(1)),
                (entry.key.bucket_hash.wrapping_sub(1), entry.key.fingerprint),
            ] {
                let key = btindex::IndexKey::new(probe.0, probe.1);
                if !present.contains(&key) {
                    assert_eq!(index.lookup(probe.0, probe.1).unwrap(), None);
                }
            }
        }
        assert_eq!(
            index
                .lookup(SENTINEL_KEY.bucket_hash, SENTINEL_KEY.fingerprint)
                .unwrap(),
            None
        );
    }

    #[test]
    fn rebuilding_replaces_existing_index() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("segment.bt");

        IndexBuilder::new()
            .build_from_slice(&path, &segment_entries(10))
            .unwrap();
        let old = BtIndex::open(&path).unwrap();

        IndexBuilder::new()
            .build_from_slice(&path, &segment_entries(20))
            .unwrap();
        let new = BtIndex::open(&path).unwrap();

        assert_eq!(old.key_count(), 10);
        assert_eq!(new.key_count(), 20);
        assert_eq!(
            old.ordinal_lookup(9).unwrap(),
            Some(segment_entries(10)[9].offset)
        );
    }
}

mod offset_rewrite {
    use super::*;

    #[test]
    fn compaction_moves_offsets_in_place_of_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("segment.bt");
        let entries = segment_entries(2500);
        IndexBuilder::new().fanout(32).build_from_slice(&path, &entries).unwrap();
        let original_bytes = std::fs::read(&path).unwrap();

        let index = BtIndex::open(&path).unwrap();
        let compacted: HashMap<u64, u64> = index
            .extract_offsets()
            .unwrap()
            .into_iter()
            .map(|(ordinal, offset)| (ordinal, offset / 4))
            .collect();
        index.rewrite_to_path(&path, &compacted).unwrap();
        index.close().unwrap();

        let rewritten = BtIndex::open(&path).unwrap();
        let rewritten_bytes = std::fs::read(&path).unwrap();
        assert_eq!(rewritten_bytes.len(), original_bytes.len());
        for (ordinal, entry) in entries.iter().enumerate() {
            assert_eq!(
                rewritten
                    .lookup(entry.key.bucket_hash, entry.key.fingerprint)
                    .unwrap(),
                Some(entry.offset / 4)
            );
            assert_eq!(
                rewritten.ordinal_lookup(ordinal as u64).unwrap(),
                Some(entry.offset / 4)
            );
        }
    }

    #[test]
    fn std_hash_map_is_accepted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("segment.bt");
        IndexBuilder::new()
            .fanout(4)
            .build_from_slice(&path, &segment_entries(30))
            .unwrap();
        let index = BtIndex::open(&path).unwrap();

        let identity: HashMap<u64, u64, std::collections::hash_map::RandomState> =
            index.extract_offsets().unwrap().into_iter().collect();
        let mut out = Vec::new();
        index.rewrite_with_offsets(&mut out, &identity).unwrap();

        assert_eq!(out, std::fs::read(&path).unwrap());
    }
}

mod concurrent_readers {
    use super::*;

    #[test]
    fn shared_index_serves_many_threads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("segment.bt");
        let entries = Arc::new(segment_entries(5000));
        IndexBuilder::new().fanout(64).build_from_slice(&path, &entries).unwrap();
        let index = Arc::new(BtIndex::open(&path).unwrap());

        let handles: Vec<_> = (0..8u64)
            .map(|worker| {
                let index = Arc::clone(&index);
                let entries = Arc::clone(&entries);
                std::thread::spawn(move || {
                    let _probe = index.disable_read_ahead().unwrap();
                    for (ordinal, entry) in entries.iter().enumerate() {
                        if ordinal as u64 % 8 != worker {
                            continue;
                        }
                        assert_eq!(
                            index
                                .lookup(entry.key.bucket_hash, entry.key.fingerprint)
                                .unwrap(),
                            Some(entry.offset)
                        );
                        assert_eq!(
                            index.ordinal_lookup(ordinal as u64).unwrap(),
                            Some(entry.offset)
                        );
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn sweep_under_sequential_advice() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("segment.bt");
        IndexBuilder::new()
            .build_from_slice(&path, &segment_entries(1000))
            .unwrap();
        let index = BtIndex::open(&path).unwrap();

        let offsets = {
            let guard = index.enable_read_ahead().unwrap();
            assert_eq!(guard.applied(), ReadAdvice::Sequential);
            index.extract_offsets().unwrap()
        };

        assert_eq!(offsets.len(), 1000);
        assert_eq!(index.current_advice(), ReadAdvice::Normal);
    }
}

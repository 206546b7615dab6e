//! Fuzz testing for opening and querying index files.
//!
//! Builds a valid index from fuzzed entries, applies fuzzed byte corruption,
//! then opens and queries it. Corrupt files must produce errors, never
//! panics or out-of-bounds reads.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use btindex::{BtIndex, Entry, IndexBuilder};

#[derive(Debug, Arbitrary)]
struct OpenInput {
    fanout_shift: u8,
    keys: Vec<(u64, u64, u64)>,
    corruptions: Vec<(u16, u8)>,
    truncate: Option<u16>,
    probes: Vec<(u64, u64)>,
}

fuzz_target!(|input: OpenInput| {
    let fanout = 2u64 << (input.fanout_shift % 6);

    let mut entries: Vec<Entry> = input
        .keys
        .iter()
        .take(512)
        .map(|&(bucket, fingerprint, offset)| Entry::new(bucket, fingerprint, offset))
        .collect();
    entries.sort_by_key(|entry| entry.key);
    entries.dedup_by_key(|entry| entry.key);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fuzz.bt");
    IndexBuilder::new()
        .fanout(fanout)
        .build_from_slice(&path, &entries)
        .unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    for &(position, value) in &input.corruptions {
        let len = bytes.len();
        bytes[position as usize % len] ^= value;
    }
    if let Some(len) = input.truncate {
        bytes.truncate(len as usize);
    }
    std::fs::write(&path, &bytes).unwrap();

    let Ok(index) = BtIndex::open(&path) else {
        return;
    };

    for entry in &entries {
        let _ = index.lookup(entry.key.bucket_hash, entry.key.fingerprint);
    }
    for &(bucket, fingerprint) in input.probes.iter().take(64) {
        let _ = index.lookup(bucket, fingerprint);
    }
    for ordinal in 0..index.key_count().min(64) {
        let _ = index.ordinal_lookup(ordinal);
    }
    if let Ok(offsets) = index.extract_offsets() {
        let mut out = Vec::new();
        let _ = index.rewrite_with_offsets(&mut out, &offsets);
    }
});

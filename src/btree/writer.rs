//! # Index Builder
//!
//! Bulk-loads a static index from a sorted entry stream. The builder is the
//! only producer of index files; everything about the byte layout follows
//! from the plan for `(K, M)` and the Position Assigner's order.
//!
//! ## Streaming
//!
//! Records are written in post-order as placements come out of the
//! traversal. Leaves consume the next entry. Each completed node pushes the
//! maximum key of its subtree (always the most recently written leaf key)
//! onto its parent's pending list, and an internal node is written from that
//! list when its own placement arrives:
//!
//! ```text
//! leaf k0  -> pending[d-1] = [k0]
//! leaf k1  -> pending[d-1] = [k0, k1]
//! leaf k2  -> pending[d-1] = [k0, k1, k2]
//! parent   -> write [k0, k1, k2], pending[d-2] += [k2]
//! ```
//!
//! Buffered state is at most `M` keys per level, so memory stays flat no
//! matter how many keys are indexed.
//!
//! ## Validation
//!
//! Keys must be strictly increasing; the entry source must yield exactly
//! `key_count` entries. Violations abort the build with an error.
//!
//! ## Atomicity
//!
//! `build` writes to a temporary file next to the destination and renames it
//! into place only after the whole index was written and synced. A failed
//! build leaves no file behind and never touches an existing one.
//!
//! ## Usage Example
//!
//! ```ignore
//! IndexBuilder::new()
//!     .fanout(64)
//!     .base_data_id(1_000)
//!     .build("segment.bt", entries.len() as u64, entries)?;
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use eyre::{ensure, Result, WrapErr};
use tempfile::NamedTempFile;
use zerocopy::IntoBytes;

use super::format::{encode_internal, IndexHeader, LeafRecord, Preamble};
use super::key::{Entry, IndexKey, SENTINEL_KEY};
use super::plan::plan;
use super::traverse::traverse;
use crate::config::{internal_record_size, DEFAULT_FANOUT, SENTINEL_OFFSET};

#[derive(Debug, Clone)]
pub struct IndexBuilder {
    fanout: u64,
    base_data_id: u64,
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self {
            fanout: DEFAULT_FANOUT,
            base_data_id: 0,
        }
    }
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fanout(mut self, fanout: u64) -> Self {
        self.fanout = fanout;
        self
    }

    pub fn base_data_id(mut self, base_data_id: u64) -> Self {
        self.base_data_id = base_data_id;
        self
    }

    /// Streams a complete index for `key_count` sorted entries into `writer`.
    pub fn write_to<W, I>(&self, writer: &mut W, key_count: u64, entries: I) -> Result<()>
    where
        W: Write,
        I: IntoIterator<Item = Entry>,
    {
        let fanout = self.fanout;
        let plan = plan(key_count, fanout)?;
        let depth = plan.depth();
        let traversal = traverse(&plan)?;

        writer
            .write_all(IndexHeader::new(self.base_data_id, key_count).as_bytes())
            .wrap_err("failed to write index header")?;
        writer
            .write_all(Preamble::new(fanout)?.as_bytes())
            .wrap_err("failed to write index preamble")?;

        let mut pending: Vec<Vec<IndexKey>> = (0..depth)
            .map(|_| Vec::with_capacity(fanout as usize))
            .collect();
        let mut buf = Vec::with_capacity(internal_record_size(fanout));
        let mut entries = entries.into_iter();
        let mut previous: Option<IndexKey> = None;
        let mut last_key = SENTINEL_KEY;

        for placement in traversal {
            if placement.level == depth {
                let record = if placement.rank < key_count {
                    let entry = entries.next().ok_or_else(|| {
                        eyre::eyre!(
                            "entry source ended after {} of {} keys",
                            placement.rank,
                            key_count
                        )
                    })?;
                    if let Some(previous) = previous {
                        ensure!(
                            previous < entry.key,
                            "keys must be strictly increasing: {:?} at ordinal {} follows {:?}",
                            entry.key,
                            placement.rank,
                            previous
                        );
                    }
                    previous = Some(entry.key);
                    LeafRecord::new(entry.key, entry.offset)
                } else {
                    LeafRecord::new(SENTINEL_KEY, SENTINEL_OFFSET)
                };
                last_key = record.key();
                writer
                    .write_all(record.as_bytes())
                    .wrap_err_with(|| format!("failed to write leaf {}", placement.rank))?;
            } else {
                let maxima = &mut pending[placement.level];
                let (_, expected) = plan
                    .children(placement.level, placement.rank)
                    .ok_or_else(|| {
                        eyre::eyre!("node ({}, {}) missing from plan", placement.level, placement.rank)
                    })?;
                ensure!(
                    maxima.len() as u64 == expected,
                    "node ({}, {}) collected {} children, plan expects {}",
                    placement.level,
                    placement.rank,
                    maxima.len(),
                    expected
                );
                encode_internal(&mut buf, maxima, fanout)?;
                maxima.clear();
                writer.write_all(&buf).wrap_err_with(|| {
                    format!(
                        "failed to write internal node ({}, {})",
                        placement.level, placement.rank
                    )
                })?;
            }

            if placement.level > 0 {
                pending[placement.level - 1].push(last_key);
            }
        }

        ensure!(
            entries.next().is_none(),
            "entry source yielded more than {} keys",
            key_count
        );

        writer.flush().wrap_err("failed to flush index writer")?;

        log::debug!(
            "wrote btree index: keys={} fanout={} depth={} nodes={}",
            key_count,
            fanout,
            depth,
            plan.total_nodes()
        );

        Ok(())
    }

    /// Builds an index file at `path`, replacing any existing file atomically.
    pub fn build<P, I>(&self, path: P, key_count: u64, entries: I) -> Result<()>
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = Entry>,
    {
        write_atomically(path.as_ref(), |writer| {
            self.write_to(writer, key_count, entries)
        })
    }

    pub fn build_from_slice<P: AsRef<Path>>(&self, path: P, entries: &[Entry]) -> Result<()> {
        self.build(path, entries.len() as u64, entries.iter().copied())
    }
}

/// Runs `write` against a temporary file beside `path`, then syncs and
/// renames it over `path`. On error the temporary file is removed.
pub(crate) fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&File>) -> Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let tmp = NamedTempFile::new_in(dir)
        .wrap_err_with(|| format!("failed to create temporary file in '{}'", dir.display()))?;

    {
        let mut writer = BufWriter::new(tmp.as_file());
        write(&mut writer)?;
        writer
            .flush()
            .wrap_err_with(|| format!("failed to flush '{}'", tmp.path().display()))?;
    }

    tmp.as_file()
        .sync_all()
        .wrap_err_with(|| format!("failed to sync '{}'", tmp.path().display()))?;

    tmp.persist(path)
        .wrap_err_with(|| format!("failed to move index into place at '{}'", path.display()))?;

    log::debug!("published index file '{}'", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::format::{expected_file_size, node_position, InternalNode};
    use crate::config::{HEADER_SIZE, LEAF_RECORD_SIZE, NODES_START};
    use tempfile::tempdir;

    fn entries(count: u64) -> Vec<Entry> {
        (0..count).map(|i| Entry::new(i / 3, i * 7 + 1, i * 100)).collect()
    }

    fn write(fanout: u64, entries: &[Entry]) -> Vec<u8> {
        let mut out = Vec::new();
        IndexBuilder::new()
            .fanout(fanout)
            .base_data_id(77)
            .write_to(&mut out, entries.len() as u64, entries.iter().copied())
            .unwrap();
        out
    }

    #[test]
    fn empty_index_is_header_preamble_and_sentinel() {
        let bytes = write(4, &[]);

        assert_eq!(bytes.len(), NODES_START + LEAF_RECORD_SIZE);
        let header = IndexHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header.base_data_id(), 77);
        assert_eq!(header.key_count(), 0);

        let sentinel = LeafRecord::from_bytes(&bytes[NODES_START..]).unwrap();
        assert_eq!(sentinel.key(), SENTINEL_KEY);
        assert_eq!(sentinel.offset(), SENTINEL_OFFSET);
    }

    #[test]
    fn file_size_matches_plan() {
        for count in [1u64, 2, 9, 100, 1000] {
            let entries = entries(count);
            let bytes = write(8, &entries);
            let plan = plan(count, 8).unwrap();

            assert_eq!(Some(bytes.len() as u64), expected_file_size(&plan));
        }
    }

    #[test]
    fn leaves_sit_at_arithmetic_positions() {
        let entries = entries(250);
        let bytes = write(6, &entries);
        let plan = plan(250, 6).unwrap();

        for (ordinal, entry) in entries.iter().enumerate() {
            let pos = node_position(&plan, plan.depth(), ordinal as u64).unwrap() as usize;
            let leaf = LeafRecord::from_bytes(&bytes[pos..pos + LEAF_RECORD_SIZE]).unwrap();
            assert_eq!(leaf.key(), entry.key);
            assert_eq!(leaf.offset(), entry.offset);
        }
    }

    #[test]
    fn internal_nodes_store_subtree_maxima() {
        let entries = entries(40);
        let bytes = write(4, &entries);
        let plan = plan(40, 4).unwrap();
        let size = internal_record_size(4);

        let root_pos = node_position(&plan, 0, 0).unwrap() as usize;
        assert_eq!(root_pos + size, bytes.len());

        let root = InternalNode::from_bytes(&bytes[root_pos..root_pos + size], 4).unwrap();
        let (_, root_children) = plan.children(0, 0).unwrap();
        assert_eq!(root.child_count(), root_children);
        assert_eq!(root.max_key(root_children as usize - 1), Some(SENTINEL_KEY));

        let parent_level = plan.depth() - 1;
        let pos = node_position(&plan, parent_level, 0).unwrap() as usize;
        let first = InternalNode::from_bytes(&bytes[pos..pos + size], 4).unwrap();
        let (start, count) = plan.children(parent_level, 0).unwrap();
        for child in 0..count {
            assert_eq!(
                first.max_key(child as usize),
                Some(entries[(start + child) as usize].key)
            );
        }
    }

    #[test]
    fn output_is_reproducible() {
        let entries = entries(777);
        assert_eq!(write(16, &entries), write(16, &entries));
    }

    #[test]
    fn rejects_unsorted_keys() {
        let entries = vec![Entry::new(1, 1, 0), Entry::new(0, 5, 1)];
        let err = IndexBuilder::new()
            .fanout(4)
            .write_to(&mut Vec::new(), 2, entries)
            .unwrap_err();

        assert!(err.to_string().contains("strictly increasing"));
    }

    #[test]
    fn rejects_duplicate_keys() {
        let entries = vec![Entry::new(1, 1, 0), Entry::new(1, 1, 1)];
        let result = IndexBuilder::new().fanout(4).write_to(&mut Vec::new(), 2, entries);

        assert!(result.is_err());
    }

    #[test]
    fn rejects_short_and_long_sources() {
        let short = IndexBuilder::new()
            .fanout(4)
            .write_to(&mut Vec::new(), 3, entries(2));
        assert!(short.unwrap_err().to_string().contains("ended after 2 of 3"));

        let long = IndexBuilder::new()
            .fanout(4)
            .write_to(&mut Vec::new(), 2, entries(3));
        assert!(long.unwrap_err().to_string().contains("more than 2 keys"));
    }

    #[test]
    fn rejects_odd_fanout_before_writing() {
        let mut out = Vec::new();
        let result = IndexBuilder::new()
            .fanout(5)
            .write_to(&mut out, 2, entries(2));

        assert!(result.is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn build_publishes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("segment.bt");

        IndexBuilder::new()
            .fanout(8)
            .build_from_slice(&path, &entries(50))
            .unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(IndexHeader::from_bytes(&bytes[..HEADER_SIZE]).unwrap().key_count(), 50);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn failed_build_leaves_existing_file_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("segment.bt");
        std::fs::write(&path, b"previous").unwrap();

        let unsorted = vec![Entry::new(2, 0, 0), Entry::new(1, 0, 0)];
        let result = IndexBuilder::new().fanout(4).build_from_slice(&path, &unsorted);

        assert!(result.is_err());
        assert_eq!(std::fs::read(&path).unwrap(), b"previous");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}

//! # Index Reader
//!
//! `BtIndex` serves point and ordinal lookups straight out of a memory-mapped
//! index file. Opening reads the 16-byte header and the preamble, re-derives
//! the plan from `(K, M)` and checks that the file size matches it exactly;
//! after that every node position is pure arithmetic.
//!
//! ## Queries
//!
//! - `lookup(bucket_hash, fingerprint)`: descends from the root, at each
//!   internal node taking the first child whose subtree maximum is `>=` the
//!   probe. The descent ends on the first leaf `>=` the probe, which is a hit
//!   only if both halves of the key match and it is not the sentinel.
//! - `ordinal_lookup(i)`: reads leaf `i` directly, no descent.
//! - `extract_offsets()`: one sequential pass over the node array.
//! - `rewrite_with_offsets(w, map)`: streams a copy of the file with every
//!   leaf offset replaced; keys, shape, header and preamble are copied
//!   verbatim, so an identity map reproduces the file byte for byte.
//!
//! Not-found is `Ok(None)`, so an entry stored at offset 0 is `Ok(Some(0))`.
//!
//! ## Concurrency
//!
//! No query mutates the mapping. `BtIndex` is `Send + Sync`; share it behind
//! an `Arc` and query from any number of threads. `close` takes `self`, so it
//! cannot race with in-flight borrows.
//!
//! ## Replacing an Index
//!
//! Files are never modified in place. `rewrite_to_path` writes a new file and
//! renames it into place; readers that still hold the old `BtIndex` keep
//! reading the old inode until they drop it.

use std::hash::BuildHasher;
use std::io::Write;
use std::path::Path;
use std::time::SystemTime;

use eyre::{ensure, Result, WrapErr};
use hashbrown::HashMap;
use zerocopy::IntoBytes;

use super::cursor::{Cursor, Frame};
use super::format::{
    expected_file_size, record_size, IndexHeader, InternalNode, LeafRecord, Preamble,
};
use super::key::IndexKey;
use super::plan::{plan, LevelPlan};
use super::traverse::traverse;
use super::writer::write_atomically;
use crate::config::{HEADER_SIZE, NODES_START};
use crate::storage::{AdviceGuard, MappedFile, ReadAdvice};

#[derive(Debug)]
pub struct BtIndex {
    mapped: MappedFile,
    plan: LevelPlan,
    base_data_id: u64,
    key_count: u64,
}

impl BtIndex {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mapped = MappedFile::open(path)?;

        let bytes = mapped.bytes();
        ensure!(
            bytes.len() >= NODES_START,
            "index file '{}' is too small: {} bytes",
            path.display(),
            bytes.len()
        );

        let header = IndexHeader::from_bytes(bytes)?;
        let base_data_id = header.base_data_id();
        let key_count = header.key_count();

        let preamble = Preamble::from_bytes(&bytes[HEADER_SIZE..])
            .wrap_err_with(|| format!("invalid node array in '{}'", path.display()))?;
        let fanout = preamble.fanout();

        let plan = plan(key_count, fanout)
            .wrap_err_with(|| format!("invalid layout parameters in '{}'", path.display()))?;

        let expected = expected_file_size(&plan).ok_or_else(|| {
            eyre::eyre!("layout for {} keys at fanout {} overflows", key_count, fanout)
        })?;
        ensure!(
            expected == mapped.size(),
            "index file '{}' is {} bytes, layout for {} keys at fanout {} needs {}",
            path.display(),
            mapped.size(),
            key_count,
            fanout,
            expected
        );

        log::debug!(
            "opened btree index '{}': keys={} fanout={} depth={}",
            path.display(),
            key_count,
            fanout,
            plan.depth()
        );

        Ok(Self {
            mapped,
            plan,
            base_data_id,
            key_count,
        })
    }

    pub fn size(&self) -> u64 {
        self.mapped.size()
    }

    pub fn mod_time(&self) -> SystemTime {
        self.mapped.mod_time()
    }

    pub fn file_path(&self) -> &Path {
        self.mapped.path()
    }

    pub fn file_name(&self) -> &str {
        self.mapped
            .path()
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.key_count == 0
    }

    pub fn key_count(&self) -> u64 {
        self.key_count
    }

    pub fn base_data_id(&self) -> u64 {
        self.base_data_id
    }

    /// Absolute identifier of `ordinal` in the external data store.
    pub fn data_id(&self, ordinal: u64) -> Option<u64> {
        if ordinal >= self.key_count {
            return None;
        }
        self.base_data_id.checked_add(ordinal)
    }

    pub fn fanout(&self) -> u64 {
        self.plan.fanout()
    }

    pub fn depth(&self) -> usize {
        self.plan.depth()
    }

    pub fn plan(&self) -> &LevelPlan {
        &self.plan
    }

    /// Post-order data index and byte position of node `(level, rank)`.
    fn locate(&self, level: usize, rank: u64) -> Result<(u64, usize)> {
        let mut data_index = 0u64;
        let mut position = NODES_START as u64;
        self.plan
            .for_each_preceding(level, rank, |lvl, count| {
                data_index += count;
                position += count * record_size(&self.plan, lvl) as u64;
            })
            .ok_or_else(|| eyre::eyre!("node ({}, {}) is outside the layout", level, rank))?;
        let position = usize::try_from(position)
            .map_err(|_| eyre::eyre!("node position {} exceeds address space", position))?;
        Ok((data_index, position))
    }

    fn leaf(&self, ordinal: u64) -> Result<&LeafRecord> {
        let (_, position) = self.locate(self.plan.depth(), ordinal)?;
        let bytes = self
            .mapped
            .slice(position, record_size(&self.plan, self.plan.depth()))?;
        LeafRecord::from_bytes(bytes)
    }

    fn internal(&self, position: usize) -> Result<InternalNode<'_>> {
        let bytes = self.mapped.slice(position, record_size(&self.plan, 0))?;
        InternalNode::from_bytes(bytes, self.plan.fanout())
    }

    /// Root-to-leaf path a probe for `key` takes. The last frame is the leaf
    /// reached; `sibling` on internal frames is the child that was taken.
    pub fn descend(&self, key: IndexKey) -> Result<Cursor> {
        let depth = self.plan.depth();
        let mut cursor = Cursor::new();
        let mut rank = 0u64;

        for level in 0..depth {
            let (data_index, position) = self.locate(level, rank)?;
            let node = self.internal(position)?;
            let (first_child, child_count) = self.plan.children(level, rank).ok_or_else(|| {
                eyre::eyre!("node ({}, {}) has no children in layout", level, rank)
            })?;
            ensure!(
                node.child_count() == child_count,
                "corrupt node ({}, {}) in '{}': stores {} children, layout has {}",
                level,
                rank,
                self.mapped.path().display(),
                node.child_count(),
                child_count
            );

            let mut frame = Frame::new(level, rank);
            frame.group = self.plan.group_of(level, rank).ok_or_else(|| {
                eyre::eyre!("node ({}, {}) has no group in layout", level, rank)
            })?;
            frame.data_index = data_index;

            match node.child_for(key) {
                Some(child) => {
                    frame.sibling = child as u64;
                    cursor.push(frame);
                    rank = first_child + child as u64;
                }
                None => {
                    cursor.push(frame);
                    return Ok(cursor);
                }
            }
        }

        let (data_index, _) = self.locate(depth, rank)?;
        let mut leaf = Frame::new(depth, rank);
        leaf.data_index = data_index;
        cursor.push(leaf);

        Ok(cursor)
    }

    /// Ordinal and offset of `key`, if present.
    pub fn find(&self, key: IndexKey) -> Result<Option<(u64, u64)>> {
        if self.is_empty() {
            return Ok(None);
        }

        let cursor = self.descend(key)?;
        let Some(frame) = cursor.top() else {
            return Ok(None);
        };
        if frame.level != self.plan.depth() || frame.rank >= self.key_count {
            return Ok(None);
        }

        let leaf = self.leaf(frame.rank)?;
        Ok((leaf.key() == key).then(|| (frame.rank, leaf.offset())))
    }

    pub fn lookup(&self, bucket_hash: u64, fingerprint: u64) -> Result<Option<u64>> {
        Ok(self
            .find(IndexKey::new(bucket_hash, fingerprint))?
            .map(|(_, offset)| offset))
    }

    pub fn ordinal_lookup(&self, ordinal: u64) -> Result<Option<u64>> {
        if ordinal >= self.key_count {
            return Ok(None);
        }
        Ok(Some(self.leaf(ordinal)?.offset()))
    }

    pub fn extract_offsets(&self) -> Result<HashMap<u64, u64>> {
        let depth = self.plan.depth();
        let mut offsets = HashMap::with_capacity(self.key_count as usize);
        let mut position = NODES_START;

        for placement in traverse(&self.plan)? {
            let size = record_size(&self.plan, placement.level);
            if placement.level == depth && placement.rank < self.key_count {
                let leaf = LeafRecord::from_bytes(self.mapped.slice(position, size)?)?;
                offsets.insert(placement.rank, leaf.offset());
            }
            position += size;
        }

        Ok(offsets)
    }

    /// Streams a copy of this index into `writer` with every leaf offset
    /// replaced by `offsets[ordinal]`. The mapping must cover exactly the
    /// ordinals `0..key_count`; it is checked before anything is written.
    pub fn rewrite_with_offsets<W, S>(&self, writer: &mut W, offsets: &HashMap<u64, u64, S>) -> Result<()>
    where
        W: Write,
        S: BuildHasher,
    {
        ensure!(
            offsets.len() as u64 == self.key_count,
            "offset mapping has {} entries, index has {} keys",
            offsets.len(),
            self.key_count
        );
        if let Some(missing) = (0..self.key_count).find(|ordinal| !offsets.contains_key(ordinal)) {
            eyre::bail!("offset mapping is missing ordinal {}", missing);
        }

        let depth = self.plan.depth();
        writer
            .write_all(self.mapped.slice(0, NODES_START)?)
            .wrap_err("failed to copy index header")?;

        let mut position = NODES_START;
        for placement in traverse(&self.plan)? {
            let size = record_size(&self.plan, placement.level);
            let bytes = self.mapped.slice(position, size)?;
            let written = if placement.level == depth && placement.rank < self.key_count {
                let offset = offsets[&placement.rank];
                let leaf = LeafRecord::from_bytes(bytes)?.with_offset(offset);
                writer.write_all(leaf.as_bytes())
            } else {
                writer.write_all(bytes)
            };
            written.wrap_err_with(|| {
                format!("failed to write node ({}, {})", placement.level, placement.rank)
            })?;
            position += size;
        }

        writer.flush().wrap_err("failed to flush rewritten index")?;

        log::debug!(
            "rewrote offsets of '{}': keys={}",
            self.mapped.path().display(),
            self.key_count
        );

        Ok(())
    }

    /// Writes the rewritten index to `path` through a temporary file and an
    /// atomic rename. `path` may be this index's own file.
    pub fn rewrite_to_path<P, S>(&self, path: P, offsets: &HashMap<u64, u64, S>) -> Result<()>
    where
        P: AsRef<Path>,
        S: BuildHasher,
    {
        write_atomically(path.as_ref(), |writer| {
            self.rewrite_with_offsets(writer, offsets)
        })
    }

    /// Random access advice: stops kernel read-ahead around probed nodes.
    pub fn disable_read_ahead(&self) -> Result<AdviceGuard<'_>> {
        self.mapped.scoped_advice(ReadAdvice::Random)
    }

    /// Sequential advice: aggressive read-ahead for full sweeps.
    pub fn enable_read_ahead(&self) -> Result<AdviceGuard<'_>> {
        self.mapped.scoped_advice(ReadAdvice::Sequential)
    }

    pub fn enable_madv_normal(&self) -> Result<AdviceGuard<'_>> {
        self.mapped.scoped_advice(ReadAdvice::Normal)
    }

    /// Asks the kernel to page the whole index in ahead of use.
    pub fn enable_will_need(&self) -> Result<AdviceGuard<'_>> {
        self.mapped.scoped_advice(ReadAdvice::WillNeed)
    }

    pub fn current_advice(&self) -> ReadAdvice {
        self.mapped.current_advice()
    }

    /// Unmaps the file and closes its handle. The handle is released even if
    /// an error is reported.
    pub fn close(self) -> Result<()> {
        self.mapped.close()
    }
}

//! # Index File Format
//!
//! Type-safe, zerocopy-based record definitions for the index file, plus the
//! arithmetic that turns a node's `(level, rank)` into a byte position.
//!
//! ## File Layout
//!
//! ```text
//! Offset  Size          Content
//! ------  ------------  ------------------------------------------------
//! 0       8             base data id            (u64, big-endian)
//! 8       8             key count K             (u64, big-endian)
//! 16      8             magic "BTIDX\0\0\0"
//! 24      4             format version          (u32, big-endian)
//! 28      4             fanout M                (u32, big-endian)
//! 32      ...           node records in post-order (Position Assigner order)
//! ```
//!
//! The first 16 bytes are the fixed header. The 16-byte preamble opens the
//! node array and makes it self-describing: `(K, M)` determine the whole
//! plan, hence every record's position.
//!
//! ## Records
//!
//! ```text
//! Leaf (24 bytes):
//! +----------------+----------------+----------------+
//! | bucket_hash    | fingerprint    | offset         |
//! +----------------+----------------+----------------+
//!
//! Internal (8 + 16*M bytes):
//! +----------------+---------------------------+-----+--------------+
//! | child_count    | max key of child 0 (16B)  | ... | unused slots |
//! +----------------+---------------------------+-----+--------------+
//! ```
//!
//! The leaf for ordinal `K` is the upper-fence sentinel: key
//! `(u64::MAX, u64::MAX)`, offset `u64::MAX`. Internal records store, per
//! child, the largest key in that child's subtree; unused slots are zero.
//!
//! ## Position Arithmetic
//!
//! A node's byte position is `NODES_START` plus, for every level, the number
//! of that level's nodes preceding it in post-order times the level's record
//! size. The counts come from `LevelPlan::for_each_preceding`.
//!
//! ## Endianness
//!
//! All multi-byte fields are big-endian, matching the fixed header. The
//! zerocopy `U32<BigEndian>`/`U64<BigEndian>` types are `Unaligned`, so
//! records are read straight out of the mapping at any offset.

use eyre::{ensure, Result};
use zerocopy::big_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::key::IndexKey;
use super::plan::LevelPlan;
use crate::config::{
    internal_record_size, FORMAT_VERSION, HEADER_SIZE, INDEX_MAGIC, INTERNAL_HEADER_SIZE,
    KEY_SIZE, LEAF_RECORD_SIZE, NODES_START, PREAMBLE_SIZE,
};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct IndexHeader {
    base_data_id: U64,
    key_count: U64,
}

const _: () = assert!(std::mem::size_of::<IndexHeader>() == HEADER_SIZE);

impl IndexHeader {
    pub fn new(base_data_id: u64, key_count: u64) -> Self {
        Self {
            base_data_id: U64::new(base_data_id),
            key_count: U64::new(key_count),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        ensure!(
            bytes.len() >= HEADER_SIZE,
            "buffer too small for IndexHeader: {} < {}",
            bytes.len(),
            HEADER_SIZE
        );

        Self::ref_from_bytes(&bytes[..HEADER_SIZE])
            .map_err(|_| eyre::eyre!("failed to parse IndexHeader"))
    }

    pub fn base_data_id(&self) -> u64 {
        self.base_data_id.get()
    }

    pub fn key_count(&self) -> u64 {
        self.key_count.get()
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct Preamble {
    magic: [u8; 8],
    version: U32,
    fanout: U32,
}

const _: () = assert!(std::mem::size_of::<Preamble>() == PREAMBLE_SIZE);

impl Preamble {
    pub fn new(fanout: u64) -> Result<Self> {
        let fanout = u32::try_from(fanout)
            .map_err(|_| eyre::eyre!("fanout {} does not fit the preamble", fanout))?;
        Ok(Self {
            magic: *INDEX_MAGIC,
            version: U32::new(FORMAT_VERSION),
            fanout: U32::new(fanout),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        ensure!(
            bytes.len() >= PREAMBLE_SIZE,
            "buffer too small for Preamble: {} < {}",
            bytes.len(),
            PREAMBLE_SIZE
        );

        let preamble = Self::ref_from_bytes(&bytes[..PREAMBLE_SIZE])
            .map_err(|_| eyre::eyre!("failed to parse Preamble"))?;

        ensure!(&preamble.magic == INDEX_MAGIC, "invalid magic bytes in index file");

        ensure!(
            preamble.version.get() == FORMAT_VERSION,
            "unsupported index format version: {} (expected {})",
            preamble.version.get(),
            FORMAT_VERSION
        );

        Ok(preamble)
    }

    pub fn version(&self) -> u32 {
        self.version.get()
    }

    pub fn fanout(&self) -> u64 {
        self.fanout.get() as u64
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct KeyRecord {
    bucket_hash: U64,
    fingerprint: U64,
}

const _: () = assert!(std::mem::size_of::<KeyRecord>() == KEY_SIZE);

impl KeyRecord {
    pub fn new(key: IndexKey) -> Self {
        Self {
            bucket_hash: U64::new(key.bucket_hash),
            fingerprint: U64::new(key.fingerprint),
        }
    }

    pub fn key(&self) -> IndexKey {
        IndexKey::new(self.bucket_hash.get(), self.fingerprint.get())
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct LeafRecord {
    key: KeyRecord,
    offset: U64,
}

const _: () = assert!(std::mem::size_of::<LeafRecord>() == LEAF_RECORD_SIZE);

impl LeafRecord {
    pub fn new(key: IndexKey, offset: u64) -> Self {
        Self {
            key: KeyRecord::new(key),
            offset: U64::new(offset),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        Self::ref_from_bytes(bytes).map_err(|_| {
            eyre::eyre!(
                "failed to parse LeafRecord from {} bytes (expected {})",
                bytes.len(),
                LEAF_RECORD_SIZE
            )
        })
    }

    pub fn key(&self) -> IndexKey {
        self.key.key()
    }

    pub fn offset(&self) -> u64 {
        self.offset.get()
    }

    pub fn with_offset(&self, offset: u64) -> Self {
        Self {
            key: self.key,
            offset: U64::new(offset),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct InternalHeader {
    child_count: U64,
}

const _: () = assert!(std::mem::size_of::<InternalHeader>() == INTERNAL_HEADER_SIZE);

/// Borrowed view of an internal record inside the mapping.
#[derive(Debug, Clone, Copy)]
pub struct InternalNode<'a> {
    maxima: &'a [KeyRecord],
}

impl<'a> InternalNode<'a> {
    pub fn from_bytes(bytes: &'a [u8], fanout: u64) -> Result<Self> {
        ensure!(
            bytes.len() == internal_record_size(fanout),
            "internal record is {} bytes, expected {} for fanout {}",
            bytes.len(),
            internal_record_size(fanout),
            fanout
        );

        let (header, slots) = bytes.split_at(INTERNAL_HEADER_SIZE);
        let header = InternalHeader::ref_from_bytes(header)
            .map_err(|_| eyre::eyre!("failed to parse InternalHeader"))?;
        let slots = <[KeyRecord]>::ref_from_bytes(slots)
            .map_err(|_| eyre::eyre!("failed to parse internal key slots"))?;

        let child_count = header.child_count.get();
        ensure!(
            child_count > 0 && child_count <= fanout,
            "internal record has {} children, fanout is {}",
            child_count,
            fanout
        );

        Ok(Self {
            maxima: &slots[..child_count as usize],
        })
    }

    pub fn child_count(&self) -> u64 {
        self.maxima.len() as u64
    }

    pub fn max_key(&self, child: usize) -> Option<IndexKey> {
        self.maxima.get(child).map(KeyRecord::key)
    }

    /// First child whose subtree maximum is `>= key`.
    pub fn child_for(&self, key: IndexKey) -> Option<usize> {
        let child = self.maxima.partition_point(|max| max.key() < key);
        (child < self.maxima.len()).then_some(child)
    }
}

/// Serializes an internal record into `buf`, padding unused slots with zeros.
pub fn encode_internal(buf: &mut Vec<u8>, maxima: &[IndexKey], fanout: u64) -> Result<()> {
    ensure!(
        !maxima.is_empty() && maxima.len() as u64 <= fanout,
        "cannot encode internal node with {} children at fanout {}",
        maxima.len(),
        fanout
    );

    buf.clear();
    let header = InternalHeader {
        child_count: U64::new(maxima.len() as u64),
    };
    buf.extend_from_slice(header.as_bytes());
    for key in maxima {
        buf.extend_from_slice(KeyRecord::new(*key).as_bytes());
    }
    buf.resize(internal_record_size(fanout), 0);
    Ok(())
}

pub fn record_size(plan: &LevelPlan, level: usize) -> usize {
    if level == plan.depth() {
        LEAF_RECORD_SIZE
    } else {
        internal_record_size(plan.fanout())
    }
}

/// Byte position of node `(level, rank)` in the index file.
pub fn node_position(plan: &LevelPlan, level: usize, rank: u64) -> Option<u64> {
    let mut position = NODES_START as u64;
    plan.for_each_preceding(level, rank, |lvl, count| {
        position += count * record_size(plan, lvl) as u64;
    })?;
    Some(position)
}

/// Exact size of a well-formed index file for `plan`.
pub fn expected_file_size(plan: &LevelPlan) -> Option<u64> {
    let leaves = plan
        .leaf_count()
        .checked_mul(LEAF_RECORD_SIZE as u64)?;
    let internals = plan
        .internal_nodes()
        .checked_mul(internal_record_size(plan.fanout()) as u64)?;
    (NODES_START as u64).checked_add(leaves)?.checked_add(internals)
}

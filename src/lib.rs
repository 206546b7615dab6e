//! # btindex - Static Memory-Mapped B-Tree Index
//!
//! btindex builds immutable B-tree files over sorted 128-bit keys and serves
//! lookups straight out of a memory mapping. It is meant for segment-style
//! storage: every data segment gets an index mapping `(bucket_hash,
//! fingerprint)` to a byte offset in the segment, the index is built once
//! when the segment is sealed, and it is replaced wholesale when offsets move.
//!
//! - **Zero-copy reads**: records are parsed in place from the mapping
//! - **Streaming builds**: memory use is bounded by tree depth, not key count
//! - **Pointer-free layout**: node positions are pure arithmetic on `(K, M)`
//!
//! ## Quick Start
//!
//! ```ignore
//! use btindex::{BtIndex, Entry, IndexBuilder};
//!
//! let entries = vec![Entry::new(1, 10, 0), Entry::new(2, 20, 512)];
//! IndexBuilder::new()
//!     .fanout(64)
//!     .base_data_id(1_000)
//!     .build_from_slice("segment.bt", &entries)?;
//!
//! let index = BtIndex::open("segment.bt")?;
//! assert_eq!(index.lookup(2, 20)?, Some(512));
//! assert_eq!(index.ordinal_lookup(0)?, Some(0));
//! ```
//!
//! ## File Layout
//!
//! ```text
//! +----------------+-------------------+------------------------------+
//! | header (16B)   | preamble (16B)    | node records, post-order     |
//! | base id, K     | magic, ver, M     | leaves 24B, internal 8+16M B |
//! +----------------+-------------------+------------------------------+
//! ```
//!
//! ## Module Overview
//!
//! - [`btree`]: layout planning, position assignment, builder and reader
//! - [`storage`]: read-only file mapping and access-pattern advice
//! - [`config`]: format constants and limits

pub mod btree;
pub mod config;
pub mod storage;

pub use btree::{plan, traverse, BtIndex, Cursor, Entry, IndexBuilder, IndexKey, LevelPlan};
pub use storage::{AdviceGuard, MappedFile, ReadAdvice};

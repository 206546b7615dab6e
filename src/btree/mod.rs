//! # Static B-Tree Index
//!
//! A read-only B-tree over sorted `(bucket_hash, fingerprint)` keys, built
//! once by streaming and served straight from a memory mapping. Nothing is
//! ever inserted or deleted after a build; an index is replaced by writing a
//! new file.
//!
//! ## Pipeline
//!
//! ```text
//!   (K, M)                 LevelPlan               Placement stream
//! ---------> plan() ---------------------> traverse() ------------------+
//!                                                                       |
//!   sorted entries ------------------------------------> IndexBuilder <-+
//!                                                           |
//!                                                           v
//!                                                      index file
//!                                                           |
//!                                         BtIndex::open <---+
//!                                  lookup / ordinal_lookup / rewrite
//! ```
//!
//! - `plan`: Layout Planner. Depth, per-level vertex budgets and the group
//!   descriptors that say how many children every internal node has.
//! - `traverse`: Position Assigner. Yields every node once, in post-order,
//!   with its linear data index.
//! - `IndexBuilder`: consumes the placements and the sorted entries and
//!   writes each record as soon as its position comes up.
//! - `BtIndex`: maps a finished file and answers queries.
//! - `Cursor`: per-level frame stack shared by the traversal and by lookups.
//!
//! ## Shape
//!
//! With fanout `M` (even, `>= 2`) and `K` keys the tree has `K + 1` leaves:
//! one per key plus a trailing sentinel that fences the key space. Depth `d`
//! is the smallest integer with `M^d >= K + 1`. Every internal node has
//! between `M/2` and `M` children; the root has between 2 and `M`.
//!
//! ```text
//! level 0:                     [root]
//! level 1:          [n0]        [n1]        [n2]
//! level d:     k0 k1 k2 k3 | k4 k5 k6 k7 | k8 k9 S
//! ```
//!
//! Internal nodes hold the maximum key of each child's subtree. A probe takes
//! the first child whose maximum is `>=` the probe, so it always lands on the
//! first leaf `>=` the probe; the sentinel guarantees such a leaf exists.
//!
//! ## Addressing
//!
//! Node `(level, rank)` has a fixed byte position derived from the plan
//! alone, so a reader never follows stored pointers. The same arithmetic
//! that gives positions also gives ordinal lookups in O(depth).

mod cursor;
mod format;
mod index;
mod key;
mod plan;
mod traverse;
mod writer;

pub use cursor::{Cursor, Frame};
pub use format::{
    encode_internal, expected_file_size, node_position, record_size, IndexHeader, InternalNode,
    KeyRecord, LeafRecord, Preamble,
};
pub use index::BtIndex;
pub use key::{Entry, IndexKey, SENTINEL_KEY};
pub use plan::{plan, Group, LevelGroups, LevelPlan};
pub use traverse::{traverse, Placement, Traversal};
pub use writer::IndexBuilder;

//! # Index Configuration Constants
//!
//! This module centralizes every constant that shapes the on-disk index format
//! and the in-memory navigation structures. Constants that depend on each other
//! are co-located so a change to one is made next to the values it constrains.
//!
//! ## Dependency Graph
//!
//! ```text
//! HEADER_SIZE (16 bytes, fixed by the file format)
//!       │
//!       └─> NODES_START (derived: HEADER_SIZE + PREAMBLE_SIZE)
//!
//! KEY_SIZE (16 bytes: bucket hash + fingerprint)
//!       │
//!       ├─> LEAF_RECORD_SIZE (derived: KEY_SIZE + OFFSET_SIZE)
//!       │
//!       └─> internal record size (INTERNAL_HEADER_SIZE + KEY_SIZE * fanout)
//!
//! MIN_FANOUT (2) <= DEFAULT_FANOUT (256) <= MAX_FANOUT (4096)
//!       │
//!       └─> MAX_TREE_DEPTH (16)
//!             Every cursor frame stack is stack-allocated up to this depth.
//!             With MIN_FANOUT = 2 a depth of 16 already covers 65535 keys;
//!             the default fanout covers far more than u64::MAX keys.
//! ```
//!
//! ## Critical Invariants
//!
//! Enforced by compile-time assertions:
//!
//! 1. `MIN_FANOUT <= DEFAULT_FANOUT <= MAX_FANOUT`, all even
//! 2. `LEAF_RECORD_SIZE == KEY_SIZE + OFFSET_SIZE`
//! 3. `NODES_START == HEADER_SIZE + PREAMBLE_SIZE`

// ============================================================================
// FILE LAYOUT CONSTANTS
// ============================================================================

/// Size of the fixed file header: base data id (u64 BE) + key count (u64 BE).
pub const HEADER_SIZE: usize = 16;

/// Size of the node array preamble that follows the header.
/// Holds the format magic, version and fanout.
pub const PREAMBLE_SIZE: usize = 16;

/// Byte offset of the first node record.
pub const NODES_START: usize = HEADER_SIZE + PREAMBLE_SIZE;

/// Magic bytes opening the node array preamble.
pub const INDEX_MAGIC: &[u8; 8] = b"BTIDX\x00\x00\x00";

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

const _: () = assert!(
    NODES_START == HEADER_SIZE + PREAMBLE_SIZE,
    "NODES_START derivation mismatch"
);

// ============================================================================
// RECORD LAYOUT CONSTANTS
// ============================================================================

/// Size of a serialized key: bucket hash (u64) + fingerprint (u64).
pub const KEY_SIZE: usize = 16;

/// Size of a stored external offset.
pub const OFFSET_SIZE: usize = 8;

/// Size of a leaf record: key followed by its external offset.
pub const LEAF_RECORD_SIZE: usize = KEY_SIZE + OFFSET_SIZE;

/// Size of the child count that opens every internal record.
pub const INTERNAL_HEADER_SIZE: usize = 8;

/// Offset stored in the upper-fence sentinel leaf.
pub const SENTINEL_OFFSET: u64 = u64::MAX;

const _: () = assert!(
    LEAF_RECORD_SIZE == KEY_SIZE + OFFSET_SIZE,
    "LEAF_RECORD_SIZE derivation mismatch"
);

// ============================================================================
// TREE SHAPE CONSTANTS
// ============================================================================

/// Smallest fanout accepted by the layout planner.
pub const MIN_FANOUT: u64 = 2;

/// Fanout used by `IndexBuilder` when none is configured.
pub const DEFAULT_FANOUT: u64 = 256;

/// Largest fanout accepted. Bounds the internal record size to ~64KB.
pub const MAX_FANOUT: u64 = 4096;

/// Inline capacity of navigation cursors and per-level scratch arrays.
/// Deeper trees still work, they just spill to the heap.
pub const MAX_TREE_DEPTH: usize = 16;

const _: () = assert!(MIN_FANOUT <= DEFAULT_FANOUT, "DEFAULT_FANOUT below MIN_FANOUT");
const _: () = assert!(DEFAULT_FANOUT <= MAX_FANOUT, "DEFAULT_FANOUT above MAX_FANOUT");
const _: () = assert!(
    MIN_FANOUT % 2 == 0 && DEFAULT_FANOUT % 2 == 0 && MAX_FANOUT % 2 == 0,
    "fanout limits must be even"
);

/// Size in bytes of an internal record for the given fanout.
pub const fn internal_record_size(fanout: u64) -> usize {
    INTERNAL_HEADER_SIZE + KEY_SIZE * fanout as usize
}

//! # Navigation Cursor
//!
//! A cursor is a stack of frames, one per tree level, describing a path
//! through the tree without pointers. Frames hold only integers:
//!
//! ```text
//! Frame {
//!     level,       // depth of the node, root = 0
//!     rank,        // position of the node within its level
//!     group,       // group descriptor the node (as a parent) belongs to
//!     sibling,     // child index: chosen child during descent,
//!                  // children placed so far during layout
//!     data_index,  // post-order position of the node in the file
//! }
//! ```
//!
//! The Position Assigner keeps one frame per internal level and advances
//! them like the digits of a mixed-radix counter. Lookups push one frame per
//! visited node, so after a descent the cursor spells out the root-to-leaf
//! path.
//!
//! Frames live inline up to `MAX_TREE_DEPTH` levels; building or walking a
//! cursor never allocates for realistic trees.

use smallvec::SmallVec;

use crate::config::MAX_TREE_DEPTH;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Frame {
    pub level: usize,
    pub rank: u64,
    pub group: usize,
    pub sibling: u64,
    pub data_index: u64,
}

impl Frame {
    pub fn new(level: usize, rank: u64) -> Self {
        Self {
            level,
            rank,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursor {
    frames: SmallVec<[Frame; MAX_TREE_DEPTH]>,
}

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// One fresh frame for each of `levels` levels, frame `i` at level `i`.
    pub fn with_levels(levels: usize) -> Self {
        Self {
            frames: (0..levels).map(|level| Frame::new(level, 0)).collect(),
        }
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    pub fn frame_mut(&mut self, index: usize) -> Option<&mut Frame> {
        self.frames.get_mut(index)
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn spilled(&self) -> bool {
        self.frames.spilled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_is_lifo() {
        let mut cursor = Cursor::new();
        cursor.push(Frame::new(0, 0));
        cursor.push(Frame::new(1, 3));

        assert_eq!(cursor.depth(), 2);
        assert_eq!(cursor.top().unwrap().rank, 3);
        assert_eq!(cursor.pop().unwrap().level, 1);
        assert_eq!(cursor.pop().unwrap().level, 0);
        assert!(cursor.pop().is_none());
        assert!(cursor.is_empty());
    }

    #[test]
    fn with_levels_numbers_frames() {
        let cursor = Cursor::with_levels(4);

        assert_eq!(cursor.depth(), 4);
        for (index, frame) in cursor.frames().iter().enumerate() {
            assert_eq!(frame.level, index);
            assert_eq!(frame.rank, 0);
            assert_eq!(frame.sibling, 0);
        }
    }

    #[test]
    fn frames_are_mutable_in_place() {
        let mut cursor = Cursor::with_levels(2);
        cursor.frame_mut(1).unwrap().sibling = 5;
        cursor.top_mut().unwrap().data_index = 9;

        assert_eq!(cursor.frame(1).unwrap().sibling, 5);
        assert_eq!(cursor.frame(1).unwrap().data_index, 9);
        assert!(cursor.frame(2).is_none());
    }

    #[test]
    fn realistic_depths_stay_inline() {
        let cursor = Cursor::with_levels(MAX_TREE_DEPTH);
        assert!(!cursor.spilled());

        let mut cursor = cursor;
        cursor.push(Frame::new(MAX_TREE_DEPTH, 0));
        assert!(cursor.spilled());

        cursor.clear();
        assert!(cursor.is_empty());
    }
}

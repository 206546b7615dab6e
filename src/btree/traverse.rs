//! # Position Assigner
//!
//! Walks a `LevelPlan` once and gives every node, on every level, its linear
//! data index: the order in which node records are written to the file.
//!
//! ## Order
//!
//! Nodes are placed in post-order. A parent is placed right after its last
//! child, so by the time a writer sees a parent every key of its subtree has
//! already gone by:
//!
//! ```text
//!                 root(9)
//!           /                \
//!        a(3)                h(8)
//!      /  |  \             /  |  \
//!    0    1    2         4    5  ... (leaves)
//! ```
//!
//! ## Mixed-Radix Counting
//!
//! One cursor frame per internal level acts as a digit. Each leaf placement
//! bumps the deepest digit (`sibling`). When it reaches the fanout of the
//! current group the parent is complete: the next placement is that parent,
//! its frame moves to the next parent (and the next group once the group's
//! parents run out), and the parent's own placement bumps the digit above.
//! That carry keeps rippling up only while digits overflow:
//!
//! ```text
//! leaf  leaf  leaf  -> parent -> (grandparent if that parent was its last) ...
//! ```
//!
//! Traversal ends when the root is placed. Work is O(total nodes) and the
//! only state is the frame stack, one frame per level, so arbitrarily large
//! indices can be laid out in constant memory.
//!
//! ## Boundary Information
//!
//! Each `Placement` carries `closes_parent`: true when the node is the last
//! child of its parent, i.e. the parent is the very next placement. Writers
//! use it to know when a buffered child run is complete.
//!
//! ## Failure Semantics
//!
//! `traverse` validates the plan first. A level without group descriptors or
//! with child totals that do not add up is a planner defect and is reported
//! as an error before any placement is produced.

use std::iter::FusedIterator;

use eyre::Result;

use super::cursor::Cursor;
use super::plan::LevelPlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub level: usize,
    pub rank: u64,
    pub data_index: u64,
    pub closes_parent: bool,
}

#[derive(Debug, Clone)]
pub struct Traversal<'a> {
    plan: &'a LevelPlan,
    cursor: Cursor,
    leaf_rank: u64,
    next_data_index: u64,
    carry: Option<usize>,
    done: bool,
}

/// Starts a position-assigning traversal over `plan`.
pub fn traverse(plan: &LevelPlan) -> Result<Traversal<'_>> {
    plan.validate()?;
    Ok(Traversal {
        plan,
        cursor: Cursor::with_levels(plan.depth()),
        leaf_rank: 0,
        next_data_index: 0,
        carry: None,
        done: false,
    })
}

fn group_end(plan: &LevelPlan, level: usize, group: usize) -> u64 {
    plan.groups(level)
        .iter()
        .take(group + 1)
        .map(|g| g.parents)
        .sum()
}

impl<'a> Traversal<'a> {
    pub fn plan(&self) -> &'a LevelPlan {
        self.plan
    }

    /// The per-level frames as they stand between placements.
    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn placed(&self) -> u64 {
        self.next_data_index
    }

    pub fn remaining(&self) -> u64 {
        self.plan.total_nodes() - self.next_data_index
    }
}

impl Iterator for Traversal<'_> {
    type Item = Placement;

    fn next(&mut self) -> Option<Placement> {
        if self.done {
            return None;
        }
        let plan = self.plan;

        let (level, rank) = match self.carry.take() {
            Some(level) => {
                let frame = self.cursor.frame_mut(level)?;
                let rank = frame.rank;
                frame.rank += 1;
                frame.sibling = 0;
                if frame.rank == group_end(plan, level, frame.group) {
                    frame.group += 1;
                }
                (level, rank)
            }
            None => {
                let rank = self.leaf_rank;
                self.leaf_rank += 1;
                (plan.depth(), rank)
            }
        };

        let data_index = self.next_data_index;
        self.next_data_index += 1;

        if level == 0 {
            self.done = true;
            return Some(Placement {
                level,
                rank,
                data_index,
                closes_parent: false,
            });
        }

        let parent_level = level - 1;
        let frame = self.cursor.frame_mut(parent_level)?;
        frame.sibling += 1;
        frame.data_index = data_index;
        let fanout = plan.groups(parent_level).get(frame.group)?.fanout;
        let closes_parent = frame.sibling == fanout;
        if closes_parent {
            self.carry = Some(parent_level);
        }

        Some(Placement {
            level,
            rank,
            data_index,
            closes_parent,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match usize::try_from(self.remaining()) {
            Ok(remaining) => (remaining, Some(remaining)),
            Err(_) => (usize::MAX, None),
        }
    }
}

impl FusedIterator for Traversal<'_> {}

//! # Layout Planner
//!
//! Computes the complete shape of a static B-tree from just two numbers: the
//! key count `K` and the maximum fanout `M`. Nothing else influences the
//! shape, so two builds over the same key count are bit-identical and a
//! reader can re-derive the whole layout from the file header.
//!
//! ## Levels
//!
//! Level 0 holds the single root, level `d` holds the `K + 1` leaf slots
//! (one per key plus the upper-fence sentinel). The depth is the smallest `d`
//! with `M^d >= K + 1`, computed with integer arithmetic:
//!
//! ```text
//! K = 1000, M = 8:   8^3 = 512 < 1001 <= 4096 = 8^4   =>  d = 4
//! ```
//!
//! ## Group Descriptors
//!
//! Each internal level is described by a short run-length list of groups
//! `(parents, fanout)`: `parents` consecutive nodes that each own `fanout`
//! children on the next level. Children are packed `M` per parent; the
//! remainder `left = children % M` is folded in front of the full run:
//!
//! ```text
//! left == 0        [(full, M)]
//! left >= m        [(1, left), (full, M)]
//! 0 < left < m     [(1, M - (m - left)), (1, m), (full - 1, M)]
//! ```
//!
//! In the last case one full parent lends `m - left` children to the short
//! one, so every non-root parent ends with between `m = M/2` and `M`
//! children. The root gets whatever node count the level below it produced,
//! which is always in `[2, M]` once `d >= 1`.
//!
//! ```text
//! K = 1000, M = 8, m = 4
//!
//! level 3: 1001 leaves  -> [(1,5), (1,4), (124,8)]   126 nodes
//! level 2:  126 nodes   -> [(1,6), (15,8)]            16 nodes
//! level 1:   16 nodes   -> [(2,8)]                     2 nodes
//! level 0:    2 nodes   -> [(1,2)]                     root
//! ```
//!
//! ## Vertex Budget
//!
//! The planner also reports the sizing bound `vx` per level:
//!
//! ```text
//! vx[0] = 1, vx[d] = K + 1
//! vx[i] = min(M^i, vx[i+1] / (m + m/2))      for d > i > 0
//! ```
//!
//! It under-provisions parents relative to the minimum fanout and bounds the
//! node count of each level from above.
//!
//! ## Arithmetic Navigation
//!
//! Because groups are contiguous, the parent of a node and the child range
//! of a node are found by walking a level's (at most three) groups, never by
//! following pointers. `for_each_preceding` builds on that to count, for
//! every level, how many nodes precede a given node in post-order, which is
//! all that is needed to turn `(level, rank)` into a file position.

use eyre::{bail, ensure, Result};
use smallvec::SmallVec;

use crate::config::{MAX_FANOUT, MIN_FANOUT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Group {
    pub parents: u64,
    pub fanout: u64,
}

impl Group {
    pub fn new(parents: u64, fanout: u64) -> Self {
        Self { parents, fanout }
    }

    pub fn children(&self) -> u64 {
        self.parents * self.fanout
    }
}

pub type LevelGroups = SmallVec<[Group; 3]>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelPlan {
    key_count: u64,
    fanout: u64,
    depth: usize,
    vertex_budget: Vec<u64>,
    groups: Vec<LevelGroups>,
    node_counts: Vec<u64>,
}

/// Plans the shape of a static B-tree over `key_count` keys with at most
/// `fanout` children per node.
pub fn plan(key_count: u64, fanout: u64) -> Result<LevelPlan> {
    ensure!(
        fanout >= MIN_FANOUT && fanout % 2 == 0,
        "fanout must be an even number >= {}, got {}",
        MIN_FANOUT,
        fanout
    );
    ensure!(
        fanout <= MAX_FANOUT,
        "fanout {} exceeds maximum {}",
        fanout,
        MAX_FANOUT
    );

    let leaves = key_count
        .checked_add(1)
        .ok_or_else(|| eyre::eyre!("key count {} too large", key_count))?;

    let depth = depth_for(leaves, fanout);
    let min_fanout = fanout / 2;

    let mut vertex_budget = vec![0u64; depth + 1];
    vertex_budget[0] = 1;
    vertex_budget[depth] = leaves;
    let divisor = min_fanout + (min_fanout >> 1);
    for level in (1..depth).rev() {
        let cap = fanout.saturating_pow(level as u32);
        vertex_budget[level] = cap.min(vertex_budget[level + 1] / divisor);
    }

    let mut groups = vec![LevelGroups::new(); depth];
    let mut children = leaves;
    for level in (1..depth).rev() {
        let level_groups = &mut groups[level];
        let mut full = children / fanout;
        let left = children % fanout;

        if left > 0 {
            if left < min_fanout {
                full = full.checked_sub(1).ok_or_else(|| {
                    eyre::eyre!(
                        "level {} has {} children, too few to rebalance with fanout {}",
                        level,
                        children,
                        fanout
                    )
                })?;
                level_groups.push(Group::new(1, fanout - (min_fanout - left)));
                level_groups.push(Group::new(1, min_fanout));
            } else {
                level_groups.push(Group::new(1, left));
            }
        }
        if full > 0 {
            level_groups.push(Group::new(full, fanout));
        }

        children = level_groups.iter().map(|g| g.parents).sum();
    }
    if depth > 0 {
        groups[0].push(Group::new(1, children));
    }

    let plan = LevelPlan::from_groups(key_count, fanout, vertex_budget, groups);

    log::debug!(
        "planned btree layout: keys={} fanout={} min_fanout={} depth={} nodes={}",
        key_count,
        fanout,
        min_fanout,
        depth,
        plan.total_nodes()
    );
    for (level, level_groups) in plan.groups.iter().enumerate() {
        log::trace!(
            "level {}: nodes={} budget={} groups={:?}",
            level,
            plan.node_counts[level],
            plan.vertex_budget[level],
            level_groups
        );
    }

    Ok(plan)
}

fn depth_for(leaves: u64, fanout: u64) -> usize {
    let mut depth = 0;
    let mut capacity: u64 = 1;
    while capacity < leaves {
        capacity = capacity.saturating_mul(fanout);
        depth += 1;
    }
    depth
}

impl LevelPlan {
    pub(crate) fn from_groups(
        key_count: u64,
        fanout: u64,
        vertex_budget: Vec<u64>,
        groups: Vec<LevelGroups>,
    ) -> Self {
        let depth = groups.len();
        let mut node_counts: Vec<u64> = groups
            .iter()
            .map(|level| level.iter().map(|g| g.parents).sum())
            .collect();
        node_counts.push(key_count.saturating_add(1));

        Self {
            key_count,
            fanout,
            depth,
            vertex_budget,
            groups,
            node_counts,
        }
    }

    /// Checks that the group descriptors describe a well-formed tree: one
    /// root, no empty level, and every level's child total matching the node
    /// count of the level below.
    pub fn validate(&self) -> Result<()> {
        if self.depth == 0 {
            ensure!(
                self.key_count == 0,
                "plan for {} keys has no internal levels",
                self.key_count
            );
            return Ok(());
        }

        for (level, level_groups) in self.groups.iter().enumerate() {
            if level_groups.is_empty() {
                bail!("invalid btree allocation markup: level {} has no groups", level);
            }
            let mut children: u64 = 0;
            for group in level_groups {
                ensure!(
                    group.parents > 0 && group.fanout > 0,
                    "invalid btree allocation markup: level {} has empty group {:?}",
                    level,
                    group
                );
                children = group
                    .parents
                    .checked_mul(group.fanout)
                    .and_then(|c| children.checked_add(c))
                    .ok_or_else(|| eyre::eyre!("level {} child count overflows", level))?;
            }
            ensure!(
                children == self.node_counts[level + 1],
                "invalid btree allocation markup: level {} owns {} children but level {} has {} nodes",
                level,
                children,
                level + 1,
                self.node_counts[level + 1]
            );
        }

        ensure!(
            self.node_counts[0] == 1,
            "invalid btree allocation markup: {} roots",
            self.node_counts[0]
        );

        Ok(())
    }

    pub fn key_count(&self) -> u64 {
        self.key_count
    }

    pub fn fanout(&self) -> u64 {
        self.fanout
    }

    pub fn min_fanout(&self) -> u64 {
        self.fanout / 2
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn leaf_count(&self) -> u64 {
        self.node_counts[self.depth]
    }

    pub fn vertex_budget(&self) -> &[u64] {
        &self.vertex_budget
    }

    pub fn groups(&self, level: usize) -> &[Group] {
        self.groups.get(level).map(|g| g.as_slice()).unwrap_or(&[])
    }

    pub fn node_count(&self, level: usize) -> u64 {
        self.node_counts.get(level).copied().unwrap_or(0)
    }

    pub fn node_counts(&self) -> &[u64] {
        &self.node_counts
    }

    pub fn internal_nodes(&self) -> u64 {
        self.node_counts[..self.depth].iter().sum()
    }

    pub fn total_nodes(&self) -> u64 {
        self.node_counts.iter().sum()
    }

    /// Index of the group at `level` that contains parent `rank`.
    pub fn group_of(&self, level: usize, rank: u64) -> Option<usize> {
        let mut end = 0u64;
        for (index, group) in self.groups.get(level)?.iter().enumerate() {
            end += group.parents;
            if rank < end {
                return Some(index);
            }
        }
        None
    }

    /// First child rank and child count of node `rank` at internal `level`.
    pub fn children(&self, level: usize, rank: u64) -> Option<(u64, u64)> {
        let mut first_parent = 0u64;
        let mut first_child = 0u64;
        for group in self.groups.get(level)? {
            if rank < first_parent + group.parents {
                let offset = rank - first_parent;
                return Some((first_child + offset * group.fanout, group.fanout));
            }
            first_parent += group.parents;
            first_child += group.children();
        }
        None
    }

    /// Parent rank and sibling index of node `rank` at `level >= 1`.
    pub fn parent(&self, level: usize, rank: u64) -> Option<(u64, u64)> {
        let parent_level = level.checked_sub(1)?;
        let mut first_parent = 0u64;
        let mut first_child = 0u64;
        for group in self.groups.get(parent_level)? {
            if rank < first_child + group.children() {
                let offset = rank - first_child;
                return Some((first_parent + offset / group.fanout, offset % group.fanout));
            }
            first_parent += group.parents;
            first_child += group.children();
        }
        None
    }

    /// Calls `f(level, count)` for every level with the number of nodes on
    /// that level that come before node `(level, rank)` in post-order.
    ///
    /// Returns `None` if the node does not exist.
    pub fn for_each_preceding(
        &self,
        level: usize,
        rank: u64,
        mut f: impl FnMut(usize, u64),
    ) -> Option<()> {
        if level > self.depth || rank >= self.node_counts[level] {
            return None;
        }

        let mut ancestor = rank;
        for upper in (0..level).rev() {
            let (parent, _) = self.parent(upper + 1, ancestor)?;
            f(upper, parent);
            ancestor = parent;
        }

        f(level, rank);

        let mut last = rank;
        for lower in level..self.depth {
            let (first, count) = self.children(lower, last)?;
            last = first + count - 1;
            f(lower + 1, last + 1);
        }

        Some(())
    }

    /// Post-order position of node `(level, rank)` among all nodes.
    pub fn data_index(&self, level: usize, rank: u64) -> Option<u64> {
        let mut index = 0u64;
        self.for_each_preceding(level, rank, |_, count| index += count)?;
        Some(index)
    }
}

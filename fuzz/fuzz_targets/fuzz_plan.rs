//! Fuzz testing for the layout planner and position assigner.
//!
//! Any accepted `(key_count, fanout)` must produce a plan whose traversal
//! places every node exactly once, in post-order, at the data index the
//! closed-form arithmetic predicts.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use btindex::btree::{plan, traverse};

#[derive(Debug, Arbitrary)]
struct PlanInput {
    key_count: u32,
    fanout: u16,
}

fuzz_target!(|input: PlanInput| {
    let key_count = u64::from(input.key_count % 200_000);
    let fanout = u64::from(input.fanout);

    let Ok(plan) = plan(key_count, fanout) else {
        assert!(fanout < 2 || fanout % 2 == 1 || fanout > btindex::config::MAX_FANOUT);
        return;
    };

    assert_eq!(plan.leaf_count(), key_count + 1);
    let depth = plan.depth();
    for level in 0..depth {
        let children: u64 = plan.groups(level).iter().map(|g| g.children()).sum();
        assert_eq!(children, plan.node_count(level + 1));
        for group in plan.groups(level) {
            if level == 0 {
                assert!(group.fanout >= 2 && group.fanout <= fanout);
            } else {
                assert!(group.fanout >= fanout / 2 && group.fanout <= fanout);
            }
        }
    }

    let traversal = traverse(&plan).expect("planner output must traverse");
    let mut next_rank = vec![0u64; depth + 1];
    let mut placed = 0u64;
    for placement in traversal {
        assert_eq!(placement.data_index, placed);
        assert_eq!(placement.rank, next_rank[placement.level]);
        assert_eq!(
            plan.data_index(placement.level, placement.rank),
            Some(placement.data_index)
        );
        next_rank[placement.level] += 1;
        placed += 1;
    }
    assert_eq!(placed, plan.total_nodes());
});

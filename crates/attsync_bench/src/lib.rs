//! Benchmark utilities.

#![warn(missing_docs)]

use attsync_core::{Fact, FactBuilder};

/// Generate `count` facts spread over `groups` (actor, context) groups.
pub fn generate_facts(prefix: &str, count: usize, groups: usize) -> Vec<Fact> {
    let groups = groups.max(1);
    (0..count)
        .map(|i| {
            FactBuilder::new()
                .id(format!("{prefix}-{i}"))
                .subject(format!("{prefix}-subject-{i}"))
                .predicate("observed")
                .actor(format!("actor-{}", i % groups))
                .context("bench")
                .timestamp(1_700_000_000_000 + i as i64)
                .source("bench")
                .build()
        })
        .collect()
}

/// Two fact sets sharing `shared` facts, each with `unique` facts of its own.
pub fn diverged_sets(shared: usize, unique: usize, groups: usize) -> (Vec<Fact>, Vec<Fact>) {
    let common = generate_facts("shared", shared, groups);
    let mut left = common.clone();
    left.extend(generate_facts("left", unique, groups));
    let mut right = common;
    right.extend(generate_facts("right", unique, groups));
    (left, right)
}

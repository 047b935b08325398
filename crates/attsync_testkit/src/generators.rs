//! Property-based test generators using proptest.
//!
//! Tags are drawn from small pools so generated facts collide on group keys
//! often enough to exercise divergent groups.

use attsync_core::{Fact, FactBuilder};
use proptest::prelude::*;

const ACTORS: &[&str] = &["alice", "bob", "carol", "ingest@cli"];
const CONTEXTS: &[&str] = &["ctx1", "ctx2", "team", "project-x"];
const SOURCES: &[&str] = &["cli", "api", "sync"];

/// Strategy for an actor tag.
pub fn actor_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(ACTORS).prop_map(str::to_string)
}

/// Strategy for a context tag.
pub fn context_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(CONTEXTS).prop_map(str::to_string)
}

/// Strategy for a fact.
///
/// Actors and contexts may be empty. The id is derived from the content hash,
/// so equal content always carries an equal id.
pub fn fact_strategy() -> impl Strategy<Value = Fact> {
    (
        "[a-z]{1,8}",
        "[a-z_]{1,8}",
        prop::collection::vec(actor_strategy(), 0..3),
        prop::collection::vec(context_strategy(), 0..3),
        0i64..4_000_000_000_000,
        prop::sample::select(SOURCES),
    )
        .prop_map(|(subject, predicate, actors, contexts, timestamp, source)| {
            let mut fact = FactBuilder::new()
                .subject(subject)
                .predicate(predicate)
                .actors(actors)
                .contexts(contexts)
                .timestamp(timestamp)
                .source(source)
                .build();
            fact.id = format!("AS-{}", fact.content_hash().short());
            fact
        })
}

/// Strategy for up to `max` facts.
pub fn fact_set_strategy(max: usize) -> impl Strategy<Value = Vec<Fact>> {
    prop::collection::vec(fact_strategy(), 0..max)
}

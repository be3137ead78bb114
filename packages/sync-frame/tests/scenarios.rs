//! Integration tests for the literal scenarios in the synchronization
//! engine's specification: simultaneous bootstrap, delete propagation,
//! last-writer-wins and manual conflict handling, and cursor persistence
//! across cycles.

use std::sync::Arc;

use serde_json::json;

use sync_frame::link_index::RunStatus;
use sync_frame::testing::InMemoryAdapter;
use sync_frame::{ConflictPolicy, Engine, IdentityMapper, JobConfig, MemoryLinkIndex, RetryConfig, SideConfig, ThrottleConfig};

fn generous_throttle() -> ThrottleConfig {
    ThrottleConfig {
        max_reqs: 1000,
        interval_sec: 1,
        batch_size: 10,
    }
}

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        backoff_sec: 0.01,
        disable_job_after: 3,
    }
}

fn job(adapter_a: Arc<InMemoryAdapter>, adapter_b: Arc<InMemoryAdapter>, policy: ConflictPolicy) -> JobConfig {
    let side_a = SideConfig::new("sideA", "t", adapter_a).with_throttle(generous_throttle());
    let side_b = SideConfig::new("sideB", "t", adapter_b).with_throttle(generous_throttle());
    JobConfig::new("job1", side_a, side_b, Arc::new(IdentityMapper), Arc::new(IdentityMapper))
        .with_retry(fast_retry())
        .with_conflict_policy(policy)
}

/// Scenario 2: simultaneous bootstrap. A has a1, B has b1; after one cycle
/// both sides hold {a1, b1} and exactly two links exist.
#[tokio::test]
async fn simultaneous_bootstrap_links_both_new_records() {
    let adapter_a = Arc::new(InMemoryAdapter::named("sideA"));
    let adapter_b = Arc::new(InMemoryAdapter::named("sideB"));
    adapter_a.seed_upsert("a1", json!({"updatedAt": 100}));
    adapter_b.seed_upsert("b1", json!({"updatedAt": 100}));

    let link_index = Arc::new(MemoryLinkIndex::new());
    let engine = Engine::new(
        job(adapter_a.clone(), adapter_b.clone(), ConflictPolicy::LastWriterWins),
        link_index.clone(),
    );

    let run = engine.run().await.unwrap();
    assert_eq!(run.status, RunStatus::Success);

    assert!(adapter_b.has_record("a1"));
    assert!(adapter_a.has_record("b1"));
    assert_eq!(adapter_a.record_count(), 2);
    assert_eq!(adapter_b.record_count(), 2);

    assert_eq!(run.summary["upsertsAtoB"], 1);
    assert_eq!(run.summary["upsertsBtoA"], 1);
}

/// Scenario 3: idempotence. Running the engine again immediately with no
/// external changes performs zero upserts/deletes in either direction, and
/// in particular does not echo B's own re-reported copy of a1 back onto A.
#[tokio::test]
async fn second_immediate_run_performs_zero_upserts() {
    let adapter_a = Arc::new(InMemoryAdapter::named("sideA"));
    let adapter_b = Arc::new(InMemoryAdapter::named("sideB"));
    adapter_a.seed_upsert("a1", json!({"updatedAt": 100}));
    adapter_a.seed_upsert("a2", json!({"updatedAt": 100}));

    let link_index = Arc::new(MemoryLinkIndex::new());
    let engine = Engine::new(
        job(adapter_a.clone(), adapter_b.clone(), ConflictPolicy::LastWriterWins),
        link_index.clone(),
    );

    let run1 = engine.run().await.unwrap();
    assert_eq!(run1.status, RunStatus::Success);
    assert_eq!(adapter_b.record_count(), 2);

    let run2 = engine.run().await.unwrap();
    assert_eq!(run2.status, RunStatus::Success);
    assert_eq!(run2.summary["upsertsAtoB"], 0);
    assert_eq!(run2.summary["upsertsBtoA"], 0);
    assert_eq!(run2.summary["deletesAtoB"], 0);
    assert_eq!(run2.summary["deletesBtoA"], 0);
    assert_eq!(adapter_b.record_count(), 2);
    assert_eq!(adapter_a.record_count(), 0);
}

/// Scenario 4: delete propagation. After a1 is linked to B, deleting a1 on
/// A removes the linked record on B in the next cycle.
#[tokio::test]
async fn delete_on_source_propagates_to_linked_destination() {
    let adapter_a = Arc::new(InMemoryAdapter::named("sideA"));
    let adapter_b = Arc::new(InMemoryAdapter::named("sideB"));
    adapter_a.seed_upsert("a1", json!({"updatedAt": 100}));

    let link_index = Arc::new(MemoryLinkIndex::new());
    let engine = Engine::new(
        job(adapter_a.clone(), adapter_b.clone(), ConflictPolicy::LastWriterWins),
        link_index.clone(),
    );

    engine.run().await.unwrap();
    assert!(adapter_b.has_record("a1"));

    adapter_a.seed_delete("a1");
    let run2 = engine.run().await.unwrap();

    assert_eq!(run2.status, RunStatus::Success);
    assert!(!adapter_b.has_record("a1"));
    assert_eq!(run2.summary["deletesAtoB"], 1);
}

/// Scenario 5: last-writer-wins conflict. A link a1<->b1 already exists;
/// both sides change their half of the pair in the same cycle, with B's
/// timestamp newer. The A→B propagation of a1 is skipped (destination
/// wins), while the reverse direction still pushes b1's payload to A.
#[tokio::test]
async fn last_writer_wins_conflict_drops_the_older_side() {
    let adapter_a = Arc::new(InMemoryAdapter::named("sideA"));
    let adapter_b = Arc::new(InMemoryAdapter::named("sideB"));
    let link_index = Arc::new(MemoryLinkIndex::new());

    // a1<->b1 is already linked from some earlier cycle.
    link_index
        .upsert_link(
            &sync_frame::RecordRef::new("sideA", "t", "a1"),
            &sync_frame::RecordRef::new("sideB", "t", "b1"),
        )
        .await
        .unwrap();

    // Both sides change their half of the linked pair in the same cycle,
    // with the destination (B) newer.
    adapter_a.seed_upsert("a1", json!({"updatedAt": 2000}));
    adapter_b.seed_upsert("b1", json!({"updatedAt": 3000}));

    let engine = Engine::new(
        job(adapter_a.clone(), adapter_b.clone(), ConflictPolicy::LastWriterWins),
        link_index.clone(),
    );
    let run = engine.run().await.unwrap();
    assert_eq!(run.status, RunStatus::Success);

    // B is newer: A's update to a1 is dropped.
    assert_eq!(run.summary["upsertsAtoB"], 0);
    // The reverse direction still propagates b1's newer payload to A, onto
    // the existing linked record (a1), not a freshly-created one.
    assert_eq!(run.summary["upsertsBtoA"], 1);
    assert!(!adapter_a.has_record("b1"));
    let a1_on_a = adapter_a.get_record("a1").unwrap();
    assert_eq!(a1_on_a.fields.get("updatedAt"), Some(&json!(3000)));
}

/// Scenario 6: manual conflict policy. The same dual-change setup records
/// a conflict instead of mutating either side.
#[tokio::test]
async fn manual_policy_records_conflict_and_skips_mutation() {
    let adapter_a = Arc::new(InMemoryAdapter::named("sideA"));
    let adapter_b = Arc::new(InMemoryAdapter::named("sideB"));
    let link_index = Arc::new(MemoryLinkIndex::new());

    link_index
        .upsert_link(
            &sync_frame::RecordRef::new("sideA", "t", "a1"),
            &sync_frame::RecordRef::new("sideB", "t", "b1"),
        )
        .await
        .unwrap();

    adapter_a.seed_upsert("a1", json!({"updatedAt": 2000}));
    adapter_b.seed_upsert("b1", json!({"updatedAt": 3000}));

    let engine = Engine::new(
        job(adapter_a.clone(), adapter_b.clone(), ConflictPolicy::Manual),
        link_index.clone(),
    );
    let run = engine.run().await.unwrap();
    assert_eq!(run.status, RunStatus::Success);

    let conflicts = link_index.get_conflicts("job1").await.unwrap();
    assert_eq!(conflicts.len(), 1);

    // Neither side's half of the conflicting pair was pushed this cycle.
    assert_eq!(run.summary["upsertsAtoB"], 0);
    assert_eq!(run.summary["upsertsBtoA"], 0);
    assert!(!adapter_b.has_record("a1"));
    assert!(!adapter_a.has_record("b1"));
}

/// Scenario 9: cursor persistence. The second cycle's `get_updates` call is
/// invoked with the cursor saved by the first, observable by spying on the
/// adapter's recorded calls.
#[tokio::test]
async fn second_cycle_pulls_with_the_cursor_saved_by_the_first() {
    let adapter_a = Arc::new(InMemoryAdapter::named("sideA"));
    let adapter_b = Arc::new(InMemoryAdapter::named("sideB"));
    adapter_a.seed_upsert("a1", json!({"updatedAt": 100}));

    let link_index = Arc::new(MemoryLinkIndex::new());
    let engine = Engine::new(
        job(adapter_a.clone(), adapter_b.clone(), ConflictPolicy::LastWriterWins),
        link_index.clone(),
    );

    engine.run().await.unwrap();
    let cursor_after_first = link_index.load_cursor("job1", "sideA", "t").await.unwrap();
    assert!(cursor_after_first.value.is_some());

    adapter_a.seed_upsert("a2", json!({"updatedAt": 200}));
    engine.run().await.unwrap();

    use sync_frame::testing::AdapterCall;
    let second_get_updates_cursor = adapter_a
        .calls()
        .iter()
        .filter_map(|c| match c {
            AdapterCall::GetUpdates { cursor } => Some(cursor.clone()),
            _ => None,
        })
        .nth(1)
        .flatten();

    assert_eq!(second_get_updates_cursor, cursor_after_first.value);
}

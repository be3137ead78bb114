//! Sync engine (C5): orchestrates one pull → transform → push → persist
//! cycle end to end, owning retry, batching, and failure accounting.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use crate::adapter::Adapter;
use crate::config::{ConflictPolicy, JobConfig, RetryConfig, Side};
use crate::error::{AdapterResult, EngineError, EngineResult};
use crate::link_index::{LinkIndex, RunStatus, RunSummary};
use crate::mapper::Mapper;
use crate::model::{ChangeSet, RecordRef};
use crate::throttler::Throttler;
use crate::transform::{self, Endpoint, PushedThisCycle, TransformOutcome};

/// Runs sync cycles for one job against one link index.
pub struct Engine {
    config: JobConfig,
    link_index: Arc<dyn LinkIndex>,
    throttle_a: Throttler,
    throttle_b: Throttler,
}

struct DirectionResult {
    retries: u32,
    upserts_pushed: usize,
    deletes_pushed: usize,
}

impl DirectionResult {
    fn records_pushed(&self) -> usize {
        self.upserts_pushed + self.deletes_pushed
    }
}

impl Engine {
    pub fn new(config: JobConfig, link_index: Arc<dyn LinkIndex>) -> Self {
        let throttle_a = Throttler::new(&config.side_a.throttle);
        let throttle_b = Throttler::new(&config.side_b.throttle);
        Self {
            config,
            link_index,
            throttle_a,
            throttle_b,
        }
    }

    fn throttler(&self, side: Side) -> &Throttler {
        match side {
            Side::A => &self.throttle_a,
            Side::B => &self.throttle_b,
        }
    }

    /// Run one cycle. Always returns `Ok` with exactly one [`RunSummary`]
    /// unless the link index itself becomes unavailable.
    #[tracing::instrument(skip(self), fields(job_id = %self.config.job_id))]
    pub async fn run(&self) -> EngineResult<RunSummary> {
        let started_at = Utc::now();
        let job_id = self.config.job_id.clone();

        tracing::info!("starting sync cycle");

        if self.link_index.is_job_disabled(&job_id).await? {
            let err = EngineError::JobDisabled;
            tracing::warn!(error = %err, "job is disabled, skipping cycle");
            return self
                .emit_run(started_at, RunStatus::Failed, json!({"reason": "job_disabled", "error": err.to_string()}))
                .await;
        }

        let side_a = self.config.side(Side::A);
        let side_b = self.config.side(Side::B);

        let cursor_a = self.link_index.load_cursor(&job_id, &side_a.adapter_name, &side_a.table).await?;
        let cursor_b = self.link_index.load_cursor(&job_id, &side_b.adapter_name, &side_b.table).await?;

        let (pull_a, pull_b) = tokio::join!(
            side_a.adapter.get_updates(&cursor_a),
            side_b.adapter.get_updates(&cursor_b),
        );

        let (changes_a, new_cursor_a) = match pull_a {
            Ok(v) => v,
            Err(source) => {
                return self
                    .fail(started_at, vec![Side::A], EngineError::Pull { side: Side::A, source })
                    .await;
            }
        };
        let (changes_b, new_cursor_b) = match pull_b {
            Ok(v) => v,
            Err(source) => {
                return self
                    .fail(started_at, vec![Side::B], EngineError::Pull { side: Side::B, source })
                    .await;
            }
        };

        let endpoint_a = Endpoint { adapter: &side_a.adapter_name, table: &side_a.table };
        let endpoint_b = Endpoint { adapter: &side_b.adapter_name, table: &side_b.table };

        let mut pushed_this_cycle = PushedThisCycle::new();

        let outcome_ab = transform::transform(
            &job_id,
            &endpoint_a,
            &endpoint_b,
            self.config.mapper(Side::A).as_ref(),
            &changes_a,
            &changes_b,
            self.link_index.as_ref(),
            self.config.conflict_policy,
            &mut pushed_this_cycle,
        )
        .await?;

        let outcome_ba = transform::transform(
            &job_id,
            &endpoint_b,
            &endpoint_a,
            self.config.mapper(Side::B).as_ref(),
            &changes_b,
            &changes_a,
            self.link_index.as_ref(),
            self.config.conflict_policy,
            &mut pushed_this_cycle,
        )
        .await?;

        let mut mapper_errors = Vec::new();
        mapper_errors.extend(outcome_ab.mapper_errors.iter().cloned());
        mapper_errors.extend(outcome_ba.mapper_errors.iter().cloned());

        let mut conflicts_recorded = 0usize;
        for conflict in outcome_ab.conflicts.iter().chain(outcome_ba.conflicts.iter()) {
            self.link_index.insert_conflict(conflict).await?;
            conflicts_recorded += 1;
        }

        let push_ab = match self.push_direction(Side::B, side_b.adapter.as_ref(), &self.config.retry, outcome_ab).await {
            Ok(r) => r,
            Err(err) => return self.fail(started_at, vec![Side::B], err).await,
        };
        let push_ba = match self.push_direction(Side::A, side_a.adapter.as_ref(), &self.config.retry, outcome_ba).await {
            Ok(r) => r,
            Err(err) => return self.fail(started_at, vec![Side::A], err).await,
        };

        self.link_index.save_cursor(&job_id, &side_a.adapter_name, &side_a.table, &new_cursor_a).await?;
        self.link_index.save_cursor(&job_id, &side_b.adapter_name, &side_b.table, &new_cursor_b).await?;
        self.link_index.reset_fail_count(&job_id, &side_a.adapter_name, &side_a.table).await?;
        self.link_index.reset_fail_count(&job_id, &side_b.adapter_name, &side_b.table).await?;

        let total_pushed = push_ab.records_pushed() + push_ba.records_pushed();
        let had_errors = !mapper_errors.is_empty();
        let status = if !had_errors {
            RunStatus::Success
        } else if total_pushed > 0 {
            RunStatus::Partial
        } else {
            RunStatus::Failed
        };

        let summary_json = json!({
            "upsertsAtoB": push_ab.upserts_pushed,
            "upsertsBtoA": push_ba.upserts_pushed,
            "deletesAtoB": push_ab.deletes_pushed,
            "deletesBtoA": push_ba.deletes_pushed,
            "retries": push_ab.retries + push_ba.retries,
            "conflicts": conflicts_recorded,
            "mapperErrors": mapper_errors,
        });

        tracing::info!(
            status = ?status,
            upserts_a_to_b = push_ab.upserts_pushed,
            upserts_b_to_a = push_ba.upserts_pushed,
            conflicts = conflicts_recorded,
            "sync cycle finished"
        );

        self.emit_run(started_at, status, summary_json).await
    }

    async fn push_direction(
        &self,
        dest_side: Side,
        dest_adapter: &dyn Adapter,
        retry: &RetryConfig,
        outcome: TransformOutcome,
    ) -> Result<DirectionResult, EngineError> {
        if outcome.mapped.is_empty() {
            return Ok(DirectionResult { retries: 0, upserts_pushed: 0, deletes_pushed: 0 });
        }

        let throttler = self.throttler(dest_side);
        let batch_size = self.config.side(dest_side).throttle.batch_size.max(1);
        let mut retries_total = 0u32;
        let mut upserts_pushed = 0usize;
        let mut deletes_pushed = 0usize;

        for batch in outcome.mapped.upserts.chunks(batch_size) {
            let chunk = ChangeSet { upserts: batch.to_vec(), deletes: vec![] };
            retries_total += apply_with_retry(dest_adapter, &chunk, throttler, retry)
                .await
                .map_err(|source| EngineError::Push { side: dest_side, source })?;
            upserts_pushed += batch.len();
        }

        for batch in outcome.mapped.deletes.chunks(batch_size) {
            let chunk = ChangeSet { upserts: vec![], deletes: batch.to_vec() };
            retries_total += apply_with_retry(dest_adapter, &chunk, throttler, retry)
                .await
                .map_err(|source| EngineError::Push { side: dest_side, source })?;
            deletes_pushed += batch.len();
        }

        let link_pairs: Vec<(RecordRef, RecordRef)> = outcome.link_map;
        for (src_ref, dest_ref) in &link_pairs {
            self.link_index.upsert_link(src_ref, dest_ref).await.map_err(EngineError::from)?;
        }

        Ok(DirectionResult {
            retries: retries_total,
            upserts_pushed,
            deletes_pushed,
        })
    }

    async fn fail(&self, started_at: chrono::DateTime<Utc>, sides: Vec<Side>, err: EngineError) -> EngineResult<RunSummary> {
        tracing::warn!(error = %err, sides = ?sides, "sync cycle failed");

        for side in &sides {
            let side_cfg = self.config.side(*side);
            let new_count = self
                .link_index
                .increment_fail_count(&self.config.job_id, &side_cfg.adapter_name, &side_cfg.table)
                .await?;
            if new_count >= self.config.retry.disable_job_after {
                tracing::warn!(side = ?side, fail_count = new_count, "disabling job after repeated failures");
                self.link_index.set_job_disabled(&self.config.job_id, Utc::now()).await?;
            }
        }

        self.emit_run(started_at, RunStatus::Failed, json!({"error": err.to_string()})).await
    }

    async fn emit_run(&self, started_at: chrono::DateTime<Utc>, status: RunStatus, summary: serde_json::Value) -> EngineResult<RunSummary> {
        let ended_at = Utc::now();
        let run = RunSummary::new(self.config.job_id.clone(), started_at, ended_at, status, summary);
        self.link_index.insert_run(&run).await?;
        Ok(run)
    }
}

async fn apply_with_retry(adapter: &dyn Adapter, batch: &ChangeSet, throttler: &Throttler, retry: &RetryConfig) -> AdapterResult<u32> {
    let mut retries = 0u32;
    for attempt in 1..=retry.max_attempts.max(1) {
        throttler.acquire().await;
        match adapter.apply_changes(batch).await {
            Ok(()) => return Ok(retries),
            Err(err) => {
                if attempt >= retry.max_attempts {
                    tracing::warn!(adapter = adapter.name(), attempt, error = %err, "retries exhausted");
                    return Err(err);
                }
                retries += 1;
                let wait_secs = retry.backoff_sec * 2f64.powi((attempt - 1) as i32);
                tracing::debug!(adapter = adapter.name(), attempt, wait_secs, error = %err, "apply_changes failed, backing off");
                tokio::time::sleep(Duration::from_secs_f64(wait_secs)).await;
            }
        }
    }
    unreachable!("max_attempts is at least 1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{JobConfig, SideConfig, ThrottleConfig};
    use crate::link_index::MemoryLinkIndex;
    use crate::mapper::IdentityMapper;
    use crate::testing::InMemoryAdapter;

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            backoff_sec: 0.01,
            disable_job_after: 3,
        }
    }

    fn job_with(adapter_a: Arc<InMemoryAdapter>, adapter_b: Arc<InMemoryAdapter>) -> JobConfig {
        let side_a = SideConfig::new("sideA", "t", adapter_a).with_throttle(ThrottleConfig {
            max_reqs: 1000,
            interval_sec: 1,
            batch_size: 10,
        });
        let side_b = SideConfig::new("sideB", "t", adapter_b).with_throttle(ThrottleConfig {
            max_reqs: 1000,
            interval_sec: 1,
            batch_size: 10,
        });
        JobConfig::new("job1", side_a, side_b, Arc::new(IdentityMapper), Arc::new(IdentityMapper)).with_retry(fast_retry())
    }

    #[tokio::test]
    async fn basic_a_to_b_sync() {
        let adapter_a = Arc::new(InMemoryAdapter::new());
        let adapter_b = Arc::new(InMemoryAdapter::new());
        adapter_a.seed_upsert("a1", serde_json::json!({"updatedAt": 100}));
        adapter_a.seed_upsert("a2", serde_json::json!({"updatedAt": 100}));

        let link_index = Arc::new(MemoryLinkIndex::new());
        let engine = Engine::new(job_with(adapter_a, adapter_b.clone()), link_index.clone());

        let run = engine.run().await.unwrap();
        assert_eq!(run.status, RunStatus::Success);
        assert_eq!(adapter_b.record_count(), 2);
    }

    #[tokio::test]
    async fn idempotent_second_run_pushes_nothing() {
        let adapter_a = Arc::new(InMemoryAdapter::new());
        let adapter_b = Arc::new(InMemoryAdapter::new());
        adapter_a.seed_upsert("a1", serde_json::json!({"updatedAt": 100}));

        let link_index = Arc::new(MemoryLinkIndex::new());
        let engine = Engine::new(job_with(adapter_a.clone(), adapter_b.clone()), link_index.clone());

        engine.run().await.unwrap();
        let run2 = engine.run().await.unwrap();

        assert_eq!(run2.status, RunStatus::Success);
        assert_eq!(run2.summary["upsertsAtoB"], 0);
        assert_eq!(run2.summary["upsertsBtoA"], 0);
        assert_eq!(adapter_b.record_count(), 1);
        // B's own echo of a1 back to us on the second pull must not be
        // pushed back onto A.
        assert_eq!(adapter_a.record_count(), 0);
    }

    #[tokio::test]
    async fn retry_then_success() {
        let adapter_a = Arc::new(InMemoryAdapter::new());
        let adapter_b = Arc::new(InMemoryAdapter::new());
        adapter_a.seed_upsert("a1", serde_json::json!({"updatedAt": 100}));
        adapter_b.fail_apply_changes_times(2);

        let link_index = Arc::new(MemoryLinkIndex::new());
        let engine = Engine::new(job_with(adapter_a, adapter_b.clone()), link_index.clone());

        let run = engine.run().await.unwrap();
        assert_eq!(run.status, RunStatus::Success);
        assert_eq!(adapter_b.record_count(), 1);
    }

    #[tokio::test]
    async fn auto_disable_after_repeated_failures() {
        let adapter_a = Arc::new(InMemoryAdapter::new());
        let adapter_b = Arc::new(InMemoryAdapter::new());
        adapter_a.seed_upsert("a1", serde_json::json!({"updatedAt": 100}));
        adapter_b.fail_apply_changes_always();

        let link_index = Arc::new(MemoryLinkIndex::new());
        let engine = Engine::new(job_with(adapter_a.clone(), adapter_b.clone()), link_index.clone());

        for _ in 0..3 {
            let run = engine.run().await.unwrap();
            assert_eq!(run.status, RunStatus::Failed);
        }

        assert!(link_index.is_job_disabled("job1").await.unwrap());

        let calls_before = adapter_a.get_updates_call_count();
        let run4 = engine.run().await.unwrap();
        assert_eq!(run4.status, RunStatus::Failed);
        assert_eq!(adapter_a.get_updates_call_count(), calls_before);
    }
}

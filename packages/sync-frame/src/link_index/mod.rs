//! Link index.
//!
//! The durable store of links, per-side cursors, fail counters, conflicts
//! and run logs. The contract below is semantic, not language-specific —
//! any implementation backing [`LinkIndex`] must provide the atomicity and
//! symmetry guarantees spelled out on each method.

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryLinkIndex;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteLinkIndex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::LinkIndexResult;
use crate::model::{Cursor, RecordRef};

/// A durable bidirectional binding between a source and destination record.
/// The underlying key is `(src.adapter, src.table, src.id,
/// dest.adapter, dest.table, dest.id)`; `upsert_link` is expected to be
/// one-to-one in practice in both directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub src: RecordRef,
    pub dest: RecordRef,
    pub last_sync_ts: DateTime<Utc>,
}

/// A conflict recorded under the `manual` policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub conflict_id: String,
    pub job_id: String,
    pub src: RecordRef,
    pub dest: RecordRef,
    pub src_payload: Value,
    pub dest_payload: Value,
    pub detected_at: DateTime<Utc>,
}

impl Conflict {
    pub fn new(job_id: impl Into<String>, src: RecordRef, dest: RecordRef, src_payload: Value, dest_payload: Value) -> Self {
        Self {
            conflict_id: Uuid::new_v4().to_string(),
            job_id: job_id.into(),
            src,
            dest,
            src_payload,
            dest_payload,
            detected_at: Utc::now(),
        }
    }
}

/// Outcome of one sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No errors recorded.
    Success,
    /// Some errors, but at least one direction made progress.
    Partial,
    /// Errors and zero progress.
    Failed,
}

/// Append-only record of one sync cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub job_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub status: RunStatus,
    pub summary: Value,
}

impl RunSummary {
    pub fn new(job_id: impl Into<String>, started_at: DateTime<Utc>, ended_at: DateTime<Utc>, status: RunStatus, summary: Value) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            job_id: job_id.into(),
            started_at,
            ended_at,
            status,
            summary,
        }
    }
}

/// Durable key-value store backing one or more sync jobs.
///
/// # Atomicity
///
/// `upsert_link` must be atomic with respect to concurrent readers: a
/// reader either sees the old binding or the new one, never a half-update.
/// The backing store is expected to be single-writer for v1; multi-writer
/// safety across processes is not required.
#[async_trait]
pub trait LinkIndex: Send + Sync {
    /// Atomically install or replace a bidirectional binding, breaking any
    /// previous binding that touched either `src` or `dest`.
    async fn upsert_link(&self, src: &RecordRef, dest: &RecordRef) -> LinkIndexResult<()>;

    /// Find the destination record linked to `src`, if any.
    async fn find_dest(&self, src: &RecordRef) -> LinkIndexResult<Option<RecordRef>>;

    /// Find the source record linked to `dest`, if any.
    async fn find_source(&self, dest: &RecordRef) -> LinkIndexResult<Option<RecordRef>>;

    /// Find `side`'s counterpart regardless of which half of the stored
    /// link it occupies. A sync direction can flip cycle to cycle (the
    /// side that first created a link isn't necessarily the side that
    /// next reports a change to it), so callers that only know "this
    /// side's ref" and want "the other side's ref" should use this
    /// instead of guessing `find_dest`/`find_source`.
    async fn find_counterpart(&self, side: &RecordRef) -> LinkIndexResult<Option<RecordRef>> {
        if let Some(dest) = self.find_dest(side).await? {
            return Ok(Some(dest));
        }
        self.find_source(side).await
    }

    /// Load the cursor for one side of a job. Returns `Cursor::initial()`
    /// if no cursor has been saved yet.
    async fn load_cursor(&self, job_id: &str, adapter: &str, table: &str) -> LinkIndexResult<Cursor>;

    /// Upsert the cursor token for one side of a job, overwriting any
    /// prior token.
    async fn save_cursor(&self, job_id: &str, adapter: &str, table: &str, cursor: &Cursor) -> LinkIndexResult<()>;

    async fn is_job_disabled(&self, job_id: &str) -> LinkIndexResult<bool>;

    async fn set_job_disabled(&self, job_id: &str, at: DateTime<Utc>) -> LinkIndexResult<()>;

    /// Increment the fail counter for one side of a job and return the new
    /// count.
    async fn increment_fail_count(&self, job_id: &str, adapter: &str, table: &str) -> LinkIndexResult<u32>;

    async fn reset_fail_count(&self, job_id: &str, adapter: &str, table: &str) -> LinkIndexResult<()>;

    async fn get_fail_count(&self, job_id: &str, adapter: &str, table: &str) -> LinkIndexResult<u32>;

    async fn insert_conflict(&self, conflict: &Conflict) -> LinkIndexResult<()>;

    async fn get_conflicts(&self, job_id: &str) -> LinkIndexResult<Vec<Conflict>>;

    /// Idempotent deletion of a resolved conflict.
    async fn resolve_conflict(&self, conflict_id: &str) -> LinkIndexResult<()>;

    async fn insert_run(&self, summary: &RunSummary) -> LinkIndexResult<()>;
}

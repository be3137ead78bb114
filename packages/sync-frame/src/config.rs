//! Configuration types describing a sync job.
//!
//! These are the in-memory boundary the host fills in once it has loaded
//! its own config file, expanded environment variables, and instantiated
//! adapter/mapper plugins — all of which are out of scope for this crate.
//! Parsing stops here; wiring continues here too.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::adapter::Adapter;
use crate::mapper::Mapper;

/// Which side of a job an operation concerns. Used for failure attribution
/// and logging, not as part of the link-index key: links are
/// keyed by adapter/table/id tuples, not by job or "A"/"B" labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

/// Conflict resolution policy for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictPolicy {
    /// Extract timestamps from both payloads; newer wins, ties favor the
    /// source side. Falls back to "source wins" when either side lacks an
    /// extractable timestamp.
    LastWriterWins,
    /// Record the conflict for operator resolution and skip the record.
    Manual,
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        ConflictPolicy::LastWriterWins
    }
}

/// Per-side rate limiting and batching configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Maximum number of requests allowed within `interval_sec`.
    pub max_reqs: u32,
    /// Width of the sliding window, in seconds.
    pub interval_sec: u64,
    /// Number of records per `apply_changes` call.
    pub batch_size: usize,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_reqs: 50,
            interval_sec: 60,
            batch_size: 10,
        }
    }
}

/// Retry and failure-accounting configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_sec: f64,
    pub disable_job_after: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_sec: 30.0,
            disable_job_after: 20,
        }
    }
}

/// One endpoint of a sync job: an adapter name, a table/collection name,
/// the adapter instance itself, and its throttle settings.
#[derive(Clone)]
pub struct SideConfig {
    pub adapter_name: String,
    pub table: String,
    pub adapter: Arc<dyn Adapter>,
    pub throttle: ThrottleConfig,
}

impl SideConfig {
    pub fn new(adapter_name: impl Into<String>, table: impl Into<String>, adapter: Arc<dyn Adapter>) -> Self {
        Self {
            adapter_name: adapter_name.into(),
            table: table.into(),
            adapter,
            throttle: ThrottleConfig::default(),
        }
    }

    pub fn with_throttle(mut self, throttle: ThrottleConfig) -> Self {
        self.throttle = throttle;
        self
    }
}

/// A complete sync job descriptor: two sides, both mappers, retry policy
/// and conflict policy. This is the host-provided configuration object
/// wired up once at startup.
#[derive(Clone)]
pub struct JobConfig {
    pub job_id: String,
    pub side_a: SideConfig,
    pub side_b: SideConfig,
    /// Maps records that changed on side A into side B's shape.
    pub mapper_a_to_b: Arc<dyn Mapper>,
    /// Maps records that changed on side B into side A's shape.
    pub mapper_b_to_a: Arc<dyn Mapper>,
    pub retry: RetryConfig,
    pub conflict_policy: ConflictPolicy,
}

impl JobConfig {
    pub fn new(
        job_id: impl Into<String>,
        side_a: SideConfig,
        side_b: SideConfig,
        mapper_a_to_b: Arc<dyn Mapper>,
        mapper_b_to_a: Arc<dyn Mapper>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            side_a,
            side_b,
            mapper_a_to_b,
            mapper_b_to_a,
            retry: RetryConfig::default(),
            conflict_policy: ConflictPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    pub fn side(&self, side: Side) -> &SideConfig {
        match side {
            Side::A => &self.side_a,
            Side::B => &self.side_b,
        }
    }

    pub fn mapper(&self, direction: Side) -> &Arc<dyn Mapper> {
        match direction {
            Side::A => &self.mapper_a_to_b,
            Side::B => &self.mapper_b_to_a,
        }
    }
}

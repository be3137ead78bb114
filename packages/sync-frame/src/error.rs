//! Typed errors for the synchronization engine.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.

use thiserror::Error;

use crate::config::Side;

/// Errors an adapter may raise from `get_updates` / `apply_changes`.
///
/// The engine treats all of these uniformly in v1: any adapter error is
/// retryable unless it surfaces through [`AdapterError::Validation`], which
/// the engine still retries but an adapter can use to signal "this will
/// never succeed" to its own callers.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Transport-level failure (network, timeout, DNS, connection reset).
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Authentication or authorization failure against the remote system.
    #[error("authentication error: {0}")]
    Auth(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The remote API rejected the request for rate-limit reasons.
    #[error("rate limit exceeded")]
    RateLimit,

    /// The payload was rejected by the remote system (bad field, schema).
    #[error("validation error: {0}")]
    Validation(String),

    /// Anything else the adapter wants to report.
    #[error("adapter error: {0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Per-record mapping failure. Always non-fatal: the record is skipped and
/// the error is recorded in the cycle's run summary.
#[derive(Debug, Error)]
pub enum MapperError {
    #[error("mapping failed for record {record_id}: {reason}")]
    Failed { record_id: String, reason: String },
}

/// Errors raised by a [`crate::link_index::LinkIndex`] implementation.
#[derive(Debug, Error)]
pub enum LinkIndexError {
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for LinkIndexError {
    fn from(err: sqlx::Error) -> Self {
        LinkIndexError::Storage(Box::new(err))
    }
}

/// Top-level error surfaced from one sync cycle.
///
/// Carries a [`Side`] tag set at the call site that produced it (a pull or
/// push call against a specific side's adapter), so the engine's failure
/// attribution is exact rather than the substring-matching heuristic
/// described in spec §4.5/§9; see DESIGN.md.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("job is disabled")]
    JobDisabled,

    #[error("pull failed on {side:?}: {source}")]
    Pull {
        side: Side,
        #[source]
        source: AdapterError,
    },

    #[error("push failed on {side:?}: {source}")]
    Push {
        side: Side,
        #[source]
        source: AdapterError,
    },

    #[error(transparent)]
    LinkIndex(#[from] LinkIndexError),
}

pub type AdapterResult<T> = std::result::Result<T, AdapterError>;
pub type MapperResult<T> = std::result::Result<T, MapperError>;
pub type LinkIndexResult<T> = std::result::Result<T, LinkIndexError>;
pub type EngineResult<T> = std::result::Result<T, EngineError>;

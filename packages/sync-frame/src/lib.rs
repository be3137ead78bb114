//! SyncFrame: a bidirectional, cursor-based synchronization engine.
//!
//! Keeps two remote record collections (e.g. an Airtable table and a
//! Webflow collection) eventually consistent under a common identity
//! mapping maintained by a durable link index. A sync job pairs two
//! [`adapter::Adapter`] instances — one per side — with a pair of
//! [`mapper::Mapper`]s describing how records translate between them, and
//! is driven one cycle at a time by [`engine::Engine::run`].
//!
//! Concrete adapters (Airtable, Webflow, ...), configuration file parsing,
//! plugin discovery, and the scheduler/CLI host are out of scope for this
//! crate; see `DESIGN.md` for the boundary.

pub mod adapter;
pub mod config;
pub mod conflict;
pub mod engine;
pub mod error;
pub mod link_index;
pub mod mapper;
pub mod model;
pub mod throttler;
pub mod transform;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use adapter::Adapter;
pub use config::{ConflictPolicy, JobConfig, RetryConfig, Side, SideConfig, ThrottleConfig};
pub use engine::Engine;
pub use error::{AdapterError, EngineError, LinkIndexError, MapperError};
pub use link_index::{Conflict, Link, LinkIndex, MemoryLinkIndex, RunStatus, RunSummary};
#[cfg(feature = "sqlite")]
pub use link_index::SqliteLinkIndex;
pub use mapper::{IdentityMapper, Mapper};
pub use model::{ChangeSet, Cursor, Record, RecordRef};

//! Persistence Boundary
//!
//! The store is an external collaborator from the pipeline's point of view:
//! the orchestrator and planner only see the [`DocumentStore`] trait. The
//! bundled [`SqliteStore`] implements it over a pooled SQLite database.

pub mod database;

use std::sync::Arc;

use uuid::Uuid;

use crate::types::{GeneratedArtifact, PendingItem, Result};

pub use database::{PoolConfig, SqliteStore};

/// Shared store handle used across concurrent workers
pub type SharedStore = Arc<dyn DocumentStore>;

/// Persistence operations the pipeline requires.
///
/// Implementations must serialize their own writes; callers assume each
/// method is individually atomic.
pub trait DocumentStore: Send + Sync {
    /// Bulk-replace semantics: delete every item in `scope`, then insert
    /// `items`. Returns the number of items inserted.
    fn replace_outline_items(&self, scope: &str, items: &[PendingItem]) -> Result<usize>;

    /// Items in `scope` still awaiting content, ordered
    fn pending_items(&self, scope: &str) -> Result<Vec<PendingItem>>;

    /// Append one accepted artifact
    fn insert_artifact(&self, artifact: &GeneratedArtifact) -> Result<()>;

    /// Append source-file references for an artifact
    fn append_source_refs(&self, document_id: Uuid, files: &[String]) -> Result<()>;

    /// Atomically flip an item's completion flag
    fn mark_completed(&self, item_id: Uuid) -> Result<()>;
}

//! Document store interface.
//!
//! The query engine only ever talks to this trait. The in-memory
//! implementation in [`memory`] is the reference backend and the test
//! double; a networked document-database client would implement the same
//! contract.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::query::SortDirection;

pub mod memory;

pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result ordering for a find.
#[derive(Debug, Clone, Default)]
pub enum SortOrder {
    /// Backend-natural order.
    #[default]
    Unspecified,
    Fields(Vec<(String, SortDirection)>),
    /// Text-match relevance, best first. Only meaningful with a `$text`
    /// query.
    TextScore,
}

#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Inclusion projection document (`{"field": 1}`), or None for full
    /// documents.
    pub projection: Option<Value>,
    pub sort: SortOrder,
    pub skip: u64,
    pub limit: Option<u64>,
}

/// One stage of an aggregation pipeline.
#[derive(Debug, Clone)]
pub enum PipelineStage {
    Match(Value),
    /// Bucket by a field's value; emits `{"key": <value>, "count": <n>}`
    /// rows.
    Group { by: String },
    Sort { field: String, descending: bool },
    Project(Value),
    Limit(u64),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(
        &self,
        collection: &str,
        query: &Value,
        options: FindOptions,
    ) -> Result<Vec<Value>, StoreError>;

    async fn count_documents(&self, collection: &str, query: &Value) -> Result<u64, StoreError>;

    async fn find_one_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Option<Value>, StoreError>;

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &[PipelineStage],
    ) -> Result<Vec<Value>, StoreError>;

    /// Inserts or replaces documents keyed by `_id` (falling back to `id`).
    /// Used by the snapshot loader and the out-of-band importer.
    async fn bulk_upsert(&self, collection: &str, docs: Vec<Value>) -> Result<u64, StoreError>;
}

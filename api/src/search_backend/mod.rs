//! External full-text search backend.
//!
//! When configured, relevance queries are delegated to a secondary search
//! index; the engine then re-fetches the ranked documents from the primary
//! store. The trait also carries the indexing operations used by the
//! out-of-band indexing pipeline.

use async_trait::async_trait;
use serde_json::Value;

mod http;

pub use http::HttpSearchBackend;

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub score: f64,
    /// Indexed source document. The engine re-fetches full documents from
    /// the primary store, so this is only a fallback payload.
    #[allow(dead_code)]
    pub source: Value,
}

#[derive(Debug, Clone)]
pub struct SearchResults {
    pub total: u64,
    pub hits: Vec<SearchHit>,
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Relevance-ranked search over one collection's index. `filter` is an
    /// optional structured clause combined so it restricts inclusion without
    /// affecting scores.
    async fn search(
        &self,
        collection: &str,
        query: &str,
        skip: u64,
        limit: u64,
        filter: Option<&Value>,
    ) -> anyhow::Result<SearchResults>;

    async fn index_document(&self, collection: &str, id: &str, doc: &Value) -> anyhow::Result<()>;

    async fn bulk_index(&self, collection: &str, docs: &[(String, Value)]) -> anyhow::Result<()>;

    async fn initialize_indices(&self, collections: &[&str]) -> anyhow::Result<()>;

    async fn delete_index(&self, collection: &str) -> anyhow::Result<()>;
}

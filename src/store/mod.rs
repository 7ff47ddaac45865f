//! Port to the external document store.
//!
//! The store owns durability, indexing and query execution. Components never
//! reach for a global connection: they receive an `Arc<dyn DocumentStore>` when
//! they are constructed.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::query::{Filter, Query};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;

/// A stored record: a JSON object carrying a string `id`.
pub type Document = Map<String, Value>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate value {value} for unique field `{field}`")]
    DuplicateKey { field: String, value: String },
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    #[error("store backend failure: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Raw `COUNT` / `AVG` over a numeric field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingStats {
    pub count: u64,
    pub average: Option<f64>,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Declares `field` unique within `collection`. Idempotent.
    async fn ensure_unique(&self, collection: &str, field: &str) -> Result<(), StoreError>;

    /// Persists a new document, assigning `id` and `__v` when absent.
    async fn insert(&self, collection: &str, document: Document) -> Result<Document, StoreError>;

    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError>;

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;

    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Shallow-merges `patch` into the document and returns the new version.
    async fn update_by_id(
        &self,
        collection: &str,
        id: &str,
        patch: Document,
    ) -> Result<Option<Document>, StoreError>;

    /// Removes the document and returns what was removed.
    async fn delete_by_id(&self, collection: &str, id: &str)
    -> Result<Option<Document>, StoreError>;

    /// Atomically applies `patch` to one document matching `filter`.
    /// Two concurrent callers racing on the same match never both succeed
    /// when the patch makes the filter stop matching.
    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: Document,
    ) -> Result<Option<Document>, StoreError>;

    async fn rating_stats(
        &self,
        collection: &str,
        filter: &Filter,
        field: &str,
    ) -> Result<RatingStats, StoreError>;
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub(crate) fn render_value(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => format!("\"{s}\""),
        Some(other) => other.to_string(),
        None => "null".to_string(),
    }
}

use async_trait::async_trait;

use crate::error::AppError;
use crate::store::Document;

/// Explicit mutation hooks. Each one receives the affected id and documents
/// as parameters; the factory captures the previous version before it mutates
/// anything, so after-hooks can still see what the write replaced.
#[async_trait]
pub trait ResourceHooks: Send + Sync {
    /// Runs after validation, before the document is inserted.
    async fn before_create(&self, _document: &Document) -> Result<(), AppError> {
        Ok(())
    }

    async fn after_create(&self, _created: &Document) -> Result<(), AppError> {
        Ok(())
    }

    async fn after_update(
        &self,
        _id: &str,
        _previous: &Document,
        _current: &Document,
    ) -> Result<(), AppError> {
        Ok(())
    }

    async fn after_delete(&self, _id: &str, _removed: &Document) -> Result<(), AppError> {
        Ok(())
    }
}

pub struct NoHooks;

impl ResourceHooks for NoHooks {}

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use super::{Document, DocumentStore, RatingStats, StoreError, new_id, render_value};
use crate::query::{Filter, ID_FIELD, METADATA_FIELD, Query, eval};

/// In-process store. Every operation runs under one lock, which gives
/// `find_one_and_update` its match-and-clear atomicity.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Collections>,
}

#[derive(Default)]
struct Collections {
    documents: HashMap<String, Vec<Document>>,
    unique: HashMap<String, BTreeSet<String>>,
}

impl Collections {
    fn check_unique(&self, collection: &str, candidate: &Document) -> Result<(), StoreError> {
        let Some(fields) = self.unique.get(collection) else {
            return Ok(());
        };
        let id = candidate.get(ID_FIELD);
        let others = self
            .documents
            .get(collection)
            .into_iter()
            .flatten()
            .filter(|doc| doc.get(ID_FIELD) != id);
        for other in others {
            for field in fields {
                let value = candidate.get(field).filter(|v| !v.is_null());
                if value.is_some() && other.get(field) == value {
                    return Err(StoreError::DuplicateKey {
                        field: field.clone(),
                        value: render_value(value),
                    });
                }
            }
        }
        Ok(())
    }

    fn position(&self, collection: &str, id: &str) -> Option<usize> {
        self.documents
            .get(collection)?
            .iter()
            .position(|doc| doc.get(ID_FIELD).and_then(Value::as_str) == Some(id))
    }

    fn patch_at(
        &mut self,
        collection: &str,
        index: usize,
        patch: Document,
    ) -> Result<Option<Document>, StoreError> {
        let Some(current) = self
            .documents
            .get(collection)
            .and_then(|docs| docs.get(index))
        else {
            return Ok(None);
        };
        let mut updated = current.clone();
        updated.extend(patch);
        self.check_unique(collection, &updated)?;
        if let Some(slot) = self
            .documents
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(index))
        {
            *slot = updated.clone();
        }
        Ok(Some(updated))
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Collections>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ensure_unique(&self, collection: &str, field: &str) -> Result<(), StoreError> {
        self.lock()?
            .unique
            .entry(collection.to_string())
            .or_default()
            .insert(field.to_string());
        Ok(())
    }

    async fn insert(
        &self,
        collection: &str,
        mut document: Document,
    ) -> Result<Document, StoreError> {
        if !document.get(ID_FIELD).is_some_and(Value::is_string) {
            document.insert(ID_FIELD.into(), Value::String(new_id()));
        }
        document
            .entry(METADATA_FIELD)
            .or_insert_with(|| Value::from(0));

        let mut inner = self.lock()?;
        if let Some(id) = document.get(ID_FIELD).and_then(Value::as_str) {
            if inner.position(collection, id).is_some() {
                return Err(StoreError::DuplicateKey {
                    field: ID_FIELD.into(),
                    value: format!("\"{id}\""),
                });
            }
        }
        inner.check_unique(collection, &document)?;
        inner
            .documents
            .entry(collection.to_string())
            .or_default()
            .push(document.clone());
        Ok(document)
    }

    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        let inner = self.lock()?;
        let mut hits: Vec<&Document> = inner
            .documents
            .get(collection)
            .into_iter()
            .flatten()
            .filter(|doc| eval::matches(doc, &query.filter))
            .collect();
        // stable sort keeps insertion order among equal keys
        hits.sort_by(|a, b| eval::compare(a, b, &query.sort));

        let (skip, limit) = match query.page {
            Some(page) => (
                usize::try_from(page.skip).unwrap_or(usize::MAX),
                usize::try_from(page.limit).unwrap_or(usize::MAX),
            ),
            None => (0, usize::MAX),
        };
        Ok(hits
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|doc| eval::project(doc.clone(), &query.projection))
            .collect())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let inner = self.lock()?;
        let count = inner
            .documents
            .get(collection)
            .into_iter()
            .flatten()
            .filter(|doc| eval::matches(doc, filter))
            .count();
        Ok(count as u64)
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .position(collection, id)
            .and_then(|index| inner.documents.get(collection)?.get(index).cloned()))
    }

    async fn update_by_id(
        &self,
        collection: &str,
        id: &str,
        patch: Document,
    ) -> Result<Option<Document>, StoreError> {
        let mut inner = self.lock()?;
        match inner.position(collection, id) {
            Some(index) => inner.patch_at(collection, index, patch),
            None => Ok(None),
        }
    }

    async fn delete_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        let mut inner = self.lock()?;
        let Some(index) = inner.position(collection, id) else {
            return Ok(None);
        };
        Ok(inner
            .documents
            .get_mut(collection)
            .map(|docs| docs.remove(index)))
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: Document,
    ) -> Result<Option<Document>, StoreError> {
        let mut inner = self.lock()?;
        let index = inner
            .documents
            .get(collection)
            .and_then(|docs| docs.iter().position(|doc| eval::matches(doc, filter)));
        match index {
            Some(index) => inner.patch_at(collection, index, patch),
            None => Ok(None),
        }
    }

    async fn rating_stats(
        &self,
        collection: &str,
        filter: &Filter,
        field: &str,
    ) -> Result<RatingStats, StoreError> {
        let inner = self.lock()?;
        let ratings: Vec<f64> = inner
            .documents
            .get(collection)
            .into_iter()
            .flatten()
            .filter(|doc| eval::matches(doc, filter))
            .filter_map(|doc| eval::lookup(doc, field).and_then(Value::as_f64))
            .collect();
        let count = ratings.len() as u64;
        let average = (count > 0).then(|| ratings.iter().sum::<f64>() / ratings.len() as f64);
        Ok(RatingStats { count, average })
    }
}

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::hooks::{NoHooks, ResourceHooks};
use super::validation;
use super::{Populate, Reference, ResourceKind, Scope, Stage};
use crate::error::AppError;
use crate::query::{
    Filter, ID_FIELD, METADATA_FIELD, Page, Predicate, Query, QueryDescription, QueryFeatures,
};
use crate::store::{Document, DocumentStore};

#[derive(Debug)]
pub struct Listing {
    pub items: Vec<Document>,
    /// Number of returned items, not the total number of matches.
    pub results: usize,
}

/// The five generic operations, bound to one [`ResourceKind`].
#[derive(Clone)]
pub struct ResourceService {
    store: Arc<dyn DocumentStore>,
    kind: &'static ResourceKind,
    hooks: Arc<dyn ResourceHooks>,
    max_page_size: Option<u64>,
}

impl ResourceService {
    pub fn new(store: Arc<dyn DocumentStore>, kind: &'static ResourceKind) -> Self {
        Self {
            store,
            kind,
            hooks: Arc::new(NoHooks),
            max_page_size: None,
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ResourceHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Caller-side cap on `limit`; the query builder itself has none.
    pub fn with_max_page_size(mut self, max_page_size: Option<u64>) -> Self {
        self.max_page_size = max_page_size;
        self
    }

    pub async fn list(
        &self,
        description: &QueryDescription,
        scope_filter: Option<Filter>,
        scope: Scope,
    ) -> Result<Listing, AppError> {
        let base = self
            .kind
            .scope_filter(scope)
            .merge(scope_filter.unwrap_or_default());
        let mut query = QueryFeatures::new(Query::scoped(base), description)
            .with_default_sort(self.kind.default_sort)
            .filter()
            .sort()
            .limit_fields()
            .paginate()
            .into_query();
        if let (Some(max), Some(page)) = (self.max_page_size, query.page) {
            if page.limit > max {
                query.page = Some(Page::new(page.skip / page.limit + 1, max));
            }
        }

        let documents = self.store.find(self.kind.collection, &query).await?;
        let mut items = Vec::with_capacity(documents.len());
        for document in documents {
            let mut document = self.present(document);
            self.populate(&mut document, self.kind.auto_populate).await?;
            items.push(document);
        }
        Ok(Listing {
            results: items.len(),
            items,
        })
    }

    /// Unpaginated read used by the reporting endpoints.
    pub async fn find_all(&self, filter: Filter, scope: Scope) -> Result<Vec<Document>, AppError> {
        let query = Query::scoped(self.kind.scope_filter(scope).merge(filter));
        let documents = self.store.find(self.kind.collection, &query).await?;
        Ok(documents.into_iter().map(|d| self.present(d)).collect())
    }

    pub async fn get_one(
        &self,
        id: &str,
        populate: &[Populate],
        scope: Scope,
    ) -> Result<Document, AppError> {
        let mut document = self.present(self.fetch(id, scope).await?);
        self.populate(&mut document, self.kind.auto_populate).await?;
        self.populate(&mut document, populate).await?;
        Ok(document)
    }

    pub async fn create(&self, payload: Document) -> Result<Document, AppError> {
        self.create_with(payload, |_| Ok(())).await
    }

    /// Like [`create`](Self::create), with `finish` run on the validated
    /// payload before it is persisted (e.g. to replace a password with its hash).
    pub async fn create_with<F>(
        &self,
        mut payload: Document,
        finish: F,
    ) -> Result<Document, AppError>
    where
        F: FnOnce(&mut Document) -> Result<(), AppError> + Send,
    {
        payload.remove(ID_FIELD);
        payload.remove(METADATA_FIELD);
        (self.kind.prepare)(&mut payload, Stage::Create);
        validation::validate(self.kind.rules, &payload, None).map_err(AppError::ValidationFailed)?;
        finish(&mut payload)?;

        self.hooks.before_create(&payload).await?;
        let created = self.store.insert(self.kind.collection, payload).await?;
        debug!(collection = self.kind.collection, id = ?created.get(ID_FIELD), "document created");
        self.hooks.after_create(&created).await?;
        Ok(self.present(created))
    }

    pub async fn update(
        &self,
        id: &str,
        mut patch: Document,
        scope: Scope,
    ) -> Result<Document, AppError> {
        for field in [ID_FIELD, METADATA_FIELD].iter().chain(self.kind.read_only) {
            patch.remove(*field);
        }
        (self.kind.prepare)(&mut patch, Stage::Update);

        // captured before the write; the hooks need the replaced version
        let previous = self.fetch(id, scope).await?;
        let mut merged = previous.clone();
        merged.extend(patch.clone());
        validation::validate(self.kind.rules, &merged, Some(&patch))
            .map_err(AppError::ValidationFailed)?;

        let current = self
            .store
            .update_by_id(self.kind.collection, id, patch)
            .await?
            .ok_or_else(|| self.not_found(id))?;
        debug!(collection = self.kind.collection, id, "document updated");
        self.hooks.after_update(id, &previous, &current).await?;
        Ok(self.present(current))
    }

    /// Removes the document, or flips its soft-delete flag when the kind has one.
    pub async fn delete(&self, id: &str, scope: Scope) -> Result<(), AppError> {
        let previous = self.fetch(id, scope).await?;
        match self.kind.soft_delete {
            Some(flag) => {
                let patch = Document::from_iter([(flag.to_string(), Value::Bool(false))]);
                self.store
                    .update_by_id(self.kind.collection, id, patch)
                    .await?
                    .ok_or_else(|| self.not_found(id))?;
            }
            None => {
                self.store
                    .delete_by_id(self.kind.collection, id)
                    .await?
                    .ok_or_else(|| self.not_found(id))?;
            }
        }
        debug!(collection = self.kind.collection, id, "document deleted");
        self.hooks.after_delete(id, &previous).await
    }

    /// Strips hidden and internal fields and adds the kind's virtual fields.
    pub fn present(&self, mut document: Document) -> Document {
        document.remove(METADATA_FIELD);
        for field in self.kind.hidden_fields {
            document.remove(*field);
        }
        (self.kind.decorate)(&mut document);
        document
    }

    async fn fetch(&self, id: &str, scope: Scope) -> Result<Document, AppError> {
        let filter = self.kind.scope_filter(scope);
        self.store
            .find_by_id(self.kind.collection, id)
            .await?
            .filter(|document| crate::query::eval::matches(document, &filter))
            .ok_or_else(|| self.not_found(id))
    }

    fn not_found(&self, id: &str) -> AppError {
        AppError::NotFound(format!("No {} found with ID {id}", self.kind.singular))
    }

    async fn populate(
        &self,
        document: &mut Document,
        populate: &[Populate],
    ) -> Result<(), AppError> {
        for item in populate {
            match item {
                Populate::Reference(reference) => {
                    expand_reference(self.store.as_ref(), document, reference).await?;
                }
                Populate::Virtual(virtual_field) => {
                    let Some(id) = document.get(ID_FIELD).cloned() else {
                        continue;
                    };
                    let filter = Filter::new().and(Predicate::eq(virtual_field.foreign_field, id));
                    let children = self
                        .store
                        .find(virtual_field.collection, &Query::scoped(filter))
                        .await?;
                    let mut expanded = Vec::with_capacity(children.len());
                    for mut child in children {
                        for reference in virtual_field.references {
                            expand_reference(self.store.as_ref(), &mut child, reference).await?;
                        }
                        expanded.push(Value::Object(child));
                    }
                    document.insert(virtual_field.field.to_string(), Value::Array(expanded));
                }
            }
        }
        Ok(())
    }
}

async fn expand_reference(
    store: &dyn DocumentStore,
    document: &mut Document,
    reference: &Reference,
) -> Result<(), AppError> {
    let Some(id) = document.get(reference.field).and_then(Value::as_str) else {
        return Ok(());
    };
    let expanded = store
        .find_by_id(reference.collection, id)
        .await?
        .map(|referenced| {
            referenced
                .into_iter()
                .filter(|(key, _)| key == ID_FIELD || reference.select.contains(&key.as_str()))
                .collect::<Document>()
        });
    document.insert(
        reference.field.to_string(),
        expanded.map(Value::Object).unwrap_or(Value::Null),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{tour, user};
    use crate::store::MemoryStore;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap_or_default()
    }

    fn tour_payload(name: &str, price: u64) -> Document {
        doc(json!({
            "name": name,
            "duration": 5,
            "maxGroupSize": 10,
            "difficulty": "easy",
            "price": price,
            "summary": "Breathtaking hike",
            "imageCover": "cover.jpg"
        }))
    }

    async fn tours() -> ResourceService {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        store.ensure_unique("tours", "name").await.unwrap();
        ResourceService::new(store, &tour::TOURS)
    }

    #[tokio::test]
    async fn create_derives_slug_and_rating_defaults() {
        let service = tours().await;
        let created = service.create(tour_payload("The Forest Hiker", 397)).await.unwrap();

        assert_eq!(created["slug"], json!("the-forest-hiker"));
        assert_eq!(created["ratingsQuantity"], json!(0));
        assert_eq!(created["ratingsAverage"], json!(4.5));
        assert!(created.get("__v").is_none());
    }

    #[tokio::test]
    async fn create_reports_every_invalid_field() {
        let service = tours().await;
        let err = service.create(doc(json!({"name": "short"}))).await.unwrap_err();
        let AppError::ValidationFailed(errors) = err else {
            panic!("expected validation failure, got {err:?}");
        };
        assert!(errors.iter().any(|e| e.field == "name"));
        assert!(errors.iter().any(|e| e.field == "price"));
        assert!(errors.iter().any(|e| e.field == "duration"));
    }

    #[tokio::test]
    async fn duplicate_names_surface_as_duplicate_key() {
        let service = tours().await;
        service.create(tour_payload("The Sea Explorer", 497)).await.unwrap();
        let err = service.create(tour_payload("The Sea Explorer", 500)).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateKey { .. }));
    }

    #[tokio::test]
    async fn secret_tours_are_hidden_unless_scope_is_all() {
        let service = tours().await;
        let mut payload = tour_payload("The Secret Valley", 900);
        payload.insert("secretTour".into(), json!(true));
        let secret = service.create(payload).await.unwrap();
        service.create(tour_payload("The Open Meadows", 100)).await.unwrap();
        let id = secret["id"].as_str().unwrap();

        let visible = service.list(&QueryDescription::new(), None, Scope::Visible).await.unwrap();
        assert_eq!(visible.results, 1);
        assert!(matches!(
            service.get_one(id, &[], Scope::Visible).await,
            Err(AppError::NotFound(_))
        ));

        let all = service.list(&QueryDescription::new(), None, Scope::All).await.unwrap();
        assert_eq!(all.results, 2);
        assert!(service.get_one(id, &[], Scope::All).await.is_ok());
    }

    #[tokio::test]
    async fn update_revalidates_and_rederives_slug() {
        let service = tours().await;
        let created = service.create(tour_payload("The Park Camper", 1497)).await.unwrap();
        let id = created["id"].as_str().unwrap();

        let updated = service
            .update(
                id,
                doc(json!({"name": "The Snow Adventurer", "slug": "nope"})),
                Scope::Visible,
            )
            .await
            .unwrap();
        assert_eq!(updated["slug"], json!("the-snow-adventurer"));

        let err = service
            .update(id, doc(json!({"priceDiscount": 2000})), Scope::Visible)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn lowering_price_below_discount_is_rejected() {
        let service = tours().await;
        let mut payload = tour_payload("The Northern Lights", 100);
        payload.insert("priceDiscount".into(), json!(80));
        let created = service.create(payload).await.unwrap();
        let id = created["id"].as_str().unwrap();

        let err = service
            .update(id, doc(json!({"price": 50})), Scope::Visible)
            .await
            .unwrap_err();
        let AppError::ValidationFailed(errors) = err else {
            panic!("expected validation failure, got {err:?}");
        };
        assert_eq!(errors[0].field, "priceDiscount");

        let stored = service.get_one(id, &[], Scope::Visible).await.unwrap();
        assert_eq!(stored["price"], json!(100));
        assert_eq!(stored["priceDiscount"], json!(80));
    }

    #[tokio::test]
    async fn missing_ids_are_not_found() {
        let service = tours().await;
        assert!(matches!(
            service.update("missing", Document::new(), Scope::Visible).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            service.delete("missing", Scope::Visible).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn page_size_cap_applies_when_configured() {
        let service = tours().await.with_max_page_size(Some(2));
        let names = ["The City Wanderer", "The Star Gazer", "The Wine Taster"];
        for (i, name) in names.iter().enumerate() {
            service.create(tour_payload(name, 100 * (i as u64 + 1))).await.unwrap();
        }
        let description: QueryDescription = [("limit", "50")].into_iter().collect();
        let listing = service.list(&description, None, Scope::Visible).await.unwrap();
        assert_eq!(listing.results, 2);
    }

    #[tokio::test]
    async fn identity_delete_is_soft() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let users = ResourceService::new(store.clone(), &user::USERS);
        let created = users
            .create_with(
                doc(json!({
                    "name": "Leo",
                    "email": "LEO@Example.com",
                    "password": "pass1234",
                    "passwordConfirm": "pass1234"
                })),
                |payload| {
                    payload.remove("passwordConfirm");
                    Ok(())
                },
            )
            .await
            .unwrap();
        assert_eq!(created["email"], json!("leo@example.com"));
        assert!(created.get("password").is_none());
        let id = created["id"].as_str().unwrap();

        users.delete(id, Scope::Visible).await.unwrap();

        let stored = store.find_by_id("users", id).await.unwrap().unwrap();
        assert_eq!(stored["active"], json!(false));
        assert!(matches!(users.get_one(id, &[], Scope::Visible).await, Err(AppError::NotFound(_))));
        assert!(users.get_one(id, &[], Scope::All).await.is_ok());

        let patch = doc(json!({"name": "Leo Again"}));
        assert!(matches!(
            users.update(id, patch.clone(), Scope::Visible).await,
            Err(AppError::NotFound(_))
        ));
        let updated = users.update(id, patch, Scope::All).await.unwrap();
        assert_eq!(updated["name"], json!("Leo Again"));
        assert!(matches!(users.delete(id, Scope::Visible).await, Err(AppError::NotFound(_))));
        users.delete(id, Scope::All).await.unwrap();
    }
}

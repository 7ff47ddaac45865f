//! Aggregate Consistency Engine.
//!
//! Keeps a tour's `ratingsQuantity` / `ratingsAverage` equal to the count and
//! mean of its reviews. Every recompute reads the full current review set and
//! writes totals, never increments. Recomputes for the same tour are not
//! serialised: two concurrent review writes may each recompute from a set that
//! lacks the other's write, leaving a short window of stale statistics that
//! closes once the last recompute lands. That window is accepted.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::models::{review, tour};
use crate::query::{Filter, Predicate};
use crate::resource::{ResourceHooks, Scope};
use crate::store::{Document, DocumentStore, RatingStats};

/// Average reported while a tour has no reviews.
pub const DEFAULT_AVERAGE: f64 = 4.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    pub ratings_quantity: u64,
    pub ratings_average: f64,
}

impl RatingSummary {
    /// Zero reviews reset to the baseline; averages keep one decimal.
    pub fn from_stats(stats: RatingStats) -> Self {
        match stats.average {
            Some(average) if stats.count > 0 => Self {
                ratings_quantity: stats.count,
                ratings_average: (average * 10.0).round() / 10.0,
            },
            _ => Self {
                ratings_quantity: 0,
                ratings_average: DEFAULT_AVERAGE,
            },
        }
    }
}

#[derive(Clone)]
pub struct RatingAggregator {
    store: Arc<dyn DocumentStore>,
}

impl RatingAggregator {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Recomputes and persists the summary for `tour_id`. Idempotent.
    pub async fn recompute(&self, tour_id: &str) -> Result<RatingSummary, AppError> {
        let filter = Filter::new().and(Predicate::eq(review::TOUR_FIELD, tour_id));
        let stats = self
            .store
            .rating_stats(review::REVIEWS.collection, &filter, review::RATING_FIELD)
            .await?;
        let summary = RatingSummary::from_stats(stats);

        let patch = match json!(summary) {
            Value::Object(patch) => patch,
            _ => Document::new(),
        };
        let written = self
            .store
            .update_by_id(tour::TOURS.collection, tour_id, patch)
            .await?;
        if written.is_none() {
            warn!(tour_id, "rating summary computed for a tour that no longer exists");
        } else {
            debug!(
                tour_id,
                quantity = summary.ratings_quantity,
                average = summary.ratings_average,
                "ratings recomputed"
            );
        }
        Ok(summary)
    }
}

fn tour_of(document: &Document) -> Option<&str> {
    document.get(review::TOUR_FIELD).and_then(Value::as_str)
}

#[async_trait]
impl ResourceHooks for RatingAggregator {
    /// Reviews may only point at a visible tour.
    async fn before_create(&self, document: &Document) -> Result<(), AppError> {
        let Some(tour_id) = tour_of(document) else {
            return Err(AppError::BadRequest("Review must belong to a tour.".into()));
        };
        let visible = tour::TOURS.scope_filter(Scope::Visible);
        match self.store.find_by_id(tour::TOURS.collection, tour_id).await? {
            Some(found) if crate::query::eval::matches(&found, &visible) => Ok(()),
            _ => Err(AppError::NotFound(format!("No tour found with ID {tour_id}"))),
        }
    }

    async fn after_create(&self, created: &Document) -> Result<(), AppError> {
        if let Some(tour_id) = tour_of(created) {
            self.recompute(tour_id).await?;
        }
        Ok(())
    }

    async fn after_update(
        &self,
        _id: &str,
        previous: &Document,
        current: &Document,
    ) -> Result<(), AppError> {
        let before = tour_of(previous);
        let after = tour_of(current);
        if let Some(tour_id) = before {
            self.recompute(tour_id).await?;
        }
        if let Some(tour_id) = after.filter(|t| Some(*t) != before) {
            self.recompute(tour_id).await?;
        }
        Ok(())
    }

    async fn after_delete(&self, _id: &str, removed: &Document) -> Result<(), AppError> {
        if let Some(tour_id) = tour_of(removed) {
            self.recompute(tour_id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceService;
    use crate::store::MemoryStore;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap_or_default()
    }

    struct Fixture {
        store: Arc<dyn DocumentStore>,
        tours: ResourceService,
        reviews: ResourceService,
        aggregator: RatingAggregator,
    }

    fn fixture() -> Fixture {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let aggregator = RatingAggregator::new(store.clone());
        Fixture {
            tours: ResourceService::new(store.clone(), &tour::TOURS),
            reviews: ResourceService::new(store.clone(), &review::REVIEWS)
                .with_hooks(Arc::new(aggregator.clone())),
            store,
            aggregator,
        }
    }

    async fn create_tour(tours: &ResourceService, name: &str) -> String {
        let created = tours
            .create(doc(json!({
                "name": name,
                "duration": 3,
                "maxGroupSize": 8,
                "difficulty": "medium",
                "price": 100,
                "summary": "Exploring the coast",
                "imageCover": "cover.jpg"
            })))
            .await
            .unwrap();
        created["id"].as_str().unwrap().to_string()
    }

    async fn create_review(reviews: &ResourceService, tour_id: &str, rating: u8) -> String {
        let created = reviews
            .create(doc(json!({
                "review": "Great",
                "rating": rating,
                "tour": tour_id,
                "user": "someone"
            })))
            .await
            .unwrap();
        created["id"].as_str().unwrap().to_string()
    }

    async fn summary_of(store: &Arc<dyn DocumentStore>, tour_id: &str) -> (Value, Value) {
        let stored = store.find_by_id("tours", tour_id).await.unwrap().unwrap();
        (stored["ratingsQuantity"].clone(), stored["ratingsAverage"].clone())
    }

    #[tokio::test]
    async fn creating_and_deleting_reviews_keeps_summary_consistent() {
        let f = fixture();
        let tour_id = create_tour(&f.tours, "The Sea Explorer").await;
        assert_eq!(summary_of(&f.store, &tour_id).await, (json!(0), json!(4.5)));

        let five = create_review(&f.reviews, &tour_id, 5).await;
        create_review(&f.reviews, &tour_id, 3).await;
        assert_eq!(summary_of(&f.store, &tour_id).await, (json!(2), json!(4.0)));

        f.reviews.delete(&five, Scope::Visible).await.unwrap();
        assert_eq!(summary_of(&f.store, &tour_id).await, (json!(1), json!(3.0)));
    }

    #[tokio::test]
    async fn deleting_last_review_resets_to_baseline() {
        let f = fixture();
        let tour_id = create_tour(&f.tours, "The Lonely Trail").await;
        let only = create_review(&f.reviews, &tour_id, 2).await;

        f.reviews.delete(&only, Scope::Visible).await.unwrap();
        assert_eq!(summary_of(&f.store, &tour_id).await, (json!(0), json!(4.5)));
    }

    #[tokio::test]
    async fn update_recomputes_owning_tour() {
        let f = fixture();
        let tour_id = create_tour(&f.tours, "The First Journey").await;
        let review_id = create_review(&f.reviews, &tour_id, 4).await;

        f.reviews
            .update(&review_id, doc(json!({"rating": 2})), Scope::Visible)
            .await
            .unwrap();

        assert_eq!(summary_of(&f.store, &tour_id).await, (json!(1), json!(2.0)));
    }

    #[tokio::test]
    async fn update_cannot_move_a_review_to_another_tour() {
        let f = fixture();
        let first = create_tour(&f.tours, "The First Journey").await;
        let second = create_tour(&f.tours, "The Second Journey").await;
        let review_id = create_review(&f.reviews, &first, 4).await;

        for target in [json!(second), json!("no-such-tour"), json!(12345)] {
            let updated = f
                .reviews
                .update(&review_id, doc(json!({"tour": target, "rating": 3})), Scope::Visible)
                .await
                .unwrap();
            assert_eq!(updated["tour"], json!(first));
        }

        let stored = f.store.find_by_id("reviews", &review_id).await.unwrap().unwrap();
        assert_eq!(stored["tour"], json!(first));
        assert_eq!(summary_of(&f.store, &first).await, (json!(1), json!(3.0)));
        assert_eq!(summary_of(&f.store, &second).await, (json!(0), json!(4.5)));
    }

    #[tokio::test]
    async fn non_text_tour_references_fail_validation() {
        let f = fixture();
        let err = f
            .reviews
            .create(doc(json!({"review": "?", "rating": 3, "tour": 12345, "user": "u"})))
            .await
            .unwrap_err();
        let AppError::ValidationFailed(errors) = err else {
            panic!("expected validation failure, got {err:?}");
        };
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "tour");
        assert_eq!(f.store.count("reviews", &Filter::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn recompute_is_idempotent() {
        let f = fixture();
        let tour_id = create_tour(&f.tours, "The Wine Taster").await;
        for rating in [5, 4, 4] {
            create_review(&f.reviews, &tour_id, rating).await;
        }
        let first = f.aggregator.recompute(&tour_id).await.unwrap();
        let stored = summary_of(&f.store, &tour_id).await;
        let second = f.aggregator.recompute(&tour_id).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(stored, summary_of(&f.store, &tour_id).await);
        assert_eq!(first.ratings_average, 4.3);
    }

    #[tokio::test]
    async fn reviews_for_unknown_tours_are_rejected() {
        let f = fixture();
        let err = f
            .reviews
            .create(doc(json!({"review": "?", "rating": 3, "tour": "nope", "user": "u"})))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}

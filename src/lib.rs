use std::sync::Arc;

use config::Config;
use mail::ResetMailer;
use models::{review::REVIEWS, tour::TOURS, user::USERS};
use ratings::RatingAggregator;
use resource::ResourceService;
use store::{DocumentStore, StoreError};

pub mod auth;
pub mod config;
pub mod error;
pub mod mail;
pub mod middleware;
pub mod models;
pub mod query;
pub mod ratings;
pub mod resource;
pub mod result;
pub mod router;
pub mod routes;
pub mod store;
pub mod utils;

pub use router::build_router;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn DocumentStore>,
    pub credentials: auth::CredentialService,
    pub guard: auth::AccessGuard,
    pub tours: ResourceService,
    pub reviews: ResourceService,
    pub users: ResourceService,
    pub mailer: Arc<dyn ResetMailer>,
}

impl AppState {
    /// Wires the services onto `store` and declares the unique indexes.
    pub async fn new(
        config: Config,
        store: Arc<dyn DocumentStore>,
        mailer: Arc<dyn ResetMailer>,
    ) -> Result<Self, StoreError> {
        for kind in [&TOURS, &REVIEWS, &USERS] {
            for field in kind.unique_fields {
                store.ensure_unique(kind.collection, field).await?;
            }
        }

        let credentials = auth::CredentialService::new(store.clone(), &config);
        let guard = auth::AccessGuard::new(credentials.clone(), store.clone());
        let resource = |kind| {
            ResourceService::new(store.clone(), kind).with_max_page_size(config.max_page_size)
        };

        Ok(Self {
            tours: resource(&TOURS),
            reviews: resource(&REVIEWS).with_hooks(Arc::new(RatingAggregator::new(store.clone()))),
            users: resource(&USERS),
            credentials,
            guard,
            mailer,
            store,
            config: Arc::new(config),
        })
    }
}

use std::sync::Arc;

use axum::http::HeaderMap;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::{Authorization, HeaderMapExt};
use tracing::debug;

use super::CredentialService;
use crate::error::AppError;
use crate::models::user::USERS;
use crate::models::{Identity, Role};
use crate::store::DocumentStore;

/// Resolves a bearer credential to a live identity and checks roles.
#[derive(Clone)]
pub struct AccessGuard {
    credentials: CredentialService,
    store: Arc<dyn DocumentStore>,
}

impl AccessGuard {
    pub fn new(credentials: CredentialService, store: Arc<dyn DocumentStore>) -> Self {
        Self { credentials, store }
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, AppError> {
        let token = bearer_token(headers).ok_or_else(|| {
            AppError::Unauthorized("You are not logged in! Please log in to get access.".into())
        })?;
        let claims = self.credentials.verify(&token)?;

        let identity = self
            .store
            .find_by_id(USERS.collection, &claims.sub)
            .await?
            .map(Identity::from_document)
            .transpose()?
            .filter(|identity| identity.active)
            .ok_or_else(|| {
                AppError::Unauthorized("The user belonging to this token no longer exists.".into())
            })?;

        if CredentialService::is_stale(&identity, claims.iat) {
            debug!(user = %identity.id, "stale credential");
            return Err(AppError::Unauthorized(
                "User recently changed password! Please log in again.".into(),
            ));
        }
        Ok(identity)
    }
}

pub fn authorize(identity: &Identity, allowed: &[Role]) -> Result<(), AppError> {
    if allowed.contains(&identity.role) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::{Document, MemoryStore};
    use axum::http::header::AUTHORIZATION;
    use chrono::{Duration, Utc};
    use rstest::rstest;
    use serde_json::json;

    async fn setup(
        role: &str,
    ) -> (AccessGuard, CredentialService, Arc<dyn DocumentStore>, Identity) {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let mut config = Config::with_secret("guard-secret");
        config.bcrypt_cost = 4;
        let credentials = CredentialService::new(store.clone(), &config);
        let document: Document = json!({
            "name": "Leo",
            "email": "leo@example.com",
            "role": role,
            "active": true,
            "password": credentials.hash_password("pass1234").unwrap(),
        })
        .as_object()
        .cloned()
        .unwrap();
        let stored = store.insert("users", document).await.unwrap();
        let identity = Identity::from_document(stored).unwrap();
        let guard = AccessGuard::new(credentials.clone(), store.clone());
        (guard, credentials, store, identity)
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, format!("Bearer {token}").parse().unwrap());
        headers
    }

    #[tokio::test]
    async fn missing_header_is_rejected() {
        let (guard, ..) = setup("user").await;
        let err = guard.authenticate(&HeaderMap::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "You are not logged in! Please log in to get access.");
    }

    #[tokio::test]
    async fn valid_credential_resolves_identity() {
        let (guard, credentials, _, identity) = setup("user").await;
        let token = credentials.issue(&identity.id).unwrap();
        let resolved = guard.authenticate(&bearer(&token)).await.unwrap();
        assert_eq!(resolved.id, identity.id);
        assert_eq!(resolved.email, "leo@example.com");
    }

    #[tokio::test]
    async fn deactivated_user_is_rejected() {
        let (guard, credentials, store, identity) = setup("user").await;
        let token = credentials.issue(&identity.id).unwrap();
        let patch = json!({ "active": false }).as_object().cloned().unwrap();
        store.update_by_id("users", &identity.id, patch).await.unwrap();

        let err = guard.authenticate(&bearer(&token)).await.unwrap_err();
        assert_eq!(err.to_string(), "The user belonging to this token no longer exists.");
    }

    #[tokio::test]
    async fn credential_from_before_password_change_is_rejected() {
        let (guard, credentials, _, identity) = setup("user").await;
        let token = credentials
            .issue_at(&identity.id, Utc::now() - Duration::hours(1))
            .unwrap();
        credentials
            .update_password(&identity, "pass1234", "changed123", "changed123")
            .await
            .unwrap();

        let err = guard.authenticate(&bearer(&token)).await.unwrap_err();
        assert_eq!(err.to_string(), "User recently changed password! Please log in again.");
    }

    #[tokio::test]
    async fn expired_credential_is_rejected() {
        let (guard, credentials, _, identity) = setup("user").await;
        let token = credentials
            .issue_at(&identity.id, Utc::now() - Duration::days(365))
            .unwrap();
        assert!(matches!(
            guard.authenticate(&bearer(&token)).await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[rstest]
    #[case("admin", &[Role::Admin, Role::LeadGuide], true)]
    #[case("lead-guide", &[Role::Admin, Role::LeadGuide], true)]
    #[case("guide", &[Role::Admin, Role::LeadGuide], false)]
    #[case("user", &[Role::User], true)]
    #[case("user", &[], false)]
    #[tokio::test]
    async fn authorize_checks_role_membership(
        #[case] role: &str,
        #[case] allowed: &[Role],
        #[case] permitted: bool,
    ) {
        let (_, _, _, identity) = setup(role).await;
        let outcome = authorize(&identity, allowed);
        assert_eq!(outcome.is_ok(), permitted);
        if !permitted {
            assert!(matches!(outcome, Err(AppError::Forbidden)));
        }
    }
}

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::models::user::{
    EMAIL, PASSWORD, PASSWORD_CHANGED_AT, PASSWORD_CONFIRM, RESET_EXPIRES, RESET_TOKEN, USERS,
};
use crate::models::Identity;
use crate::query::{Comparison, Page, Predicate, Query};
use crate::resource::{Scope, validation};
use crate::store::{Document, DocumentStore};
use crate::utils::{hash_password, random_token, sha256_hex, verify_password};

/// Lifetime of a password-reset token.
pub const RESET_TOKEN_TTL_MINUTES: i64 = 10;
/// Subtracted from `passwordChangedAt` so a credential issued right after a
/// password change is not mistaken for a stale one.
const CHANGE_SKEW_SECS: i64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // identity id
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies stateless bearer credentials and runs the
/// password-reset handshake.
#[derive(Clone)]
pub struct CredentialService {
    store: Arc<dyn DocumentStore>,
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    bcrypt_cost: u32,
}

impl CredentialService {
    pub fn new(store: Arc<dyn DocumentStore>, config: &Config) -> Self {
        Self {
            store,
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            ttl: Duration::seconds(i64::try_from(config.jwt_expiration_secs).unwrap_or(i64::MAX)),
            bcrypt_cost: config.bcrypt_cost,
        }
    }

    pub fn issue(&self, identity_id: &str) -> Result<String, AppError> {
        self.issue_at(identity_id, Utc::now())
    }

    pub fn issue_at(
        &self,
        identity_id: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<String, AppError> {
        let expires_at = issued_at
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let claims = Claims {
            sub: identity_id.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("failed to sign credential: {e}")))
    }

    /// Authenticates the token itself: signature and expiry only.
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => {
                    AppError::Unauthorized("Your token has expired! Please log in again.".into())
                }
                _ => AppError::Unauthorized("Invalid token. Please log in again!".into()),
            })
    }

    /// A credential issued before the latest password change is stale even
    /// when its signature and expiry check out.
    pub fn is_stale(identity: &Identity, issued_at: i64) -> bool {
        identity
            .password_changed_at
            .is_some_and(|changed| changed.timestamp() > issued_at)
    }

    pub fn hash_password(&self, password: &str) -> Result<String, AppError> {
        hash_password(password, self.bcrypt_cost)
            .map_err(|e| AppError::Internal(format!("failed to hash password: {e}")))
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, AppError> {
        let filter = USERS
            .scope_filter(Scope::Visible)
            .and(Predicate::eq(EMAIL, email.trim().to_lowercase()));
        let query = Query::scoped(filter).paginate(Page::new(1, 1));
        self.store
            .find(USERS.collection, &query)
            .await?
            .into_iter()
            .next()
            .map(Identity::from_document)
            .transpose()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, AppError> {
        let identity = self.find_by_email(email).await?;
        match identity {
            Some(identity)
                if verify_password(password, &identity.password_hash).unwrap_or(false) =>
            {
                Ok(identity)
            }
            _ => {
                debug!("login rejected");
                Err(AppError::Unauthorized("Incorrect email or password".into()))
            }
        }
    }

    /// Stores a fresh reset digest (replacing any earlier one) and returns the
    /// plaintext, which is never persisted.
    pub async fn create_reset_token(&self, identity: &Identity) -> Result<String, AppError> {
        let token = random_token();
        let expires = Utc::now() + Duration::minutes(RESET_TOKEN_TTL_MINUTES);
        let patch = document(json!({
            RESET_TOKEN: sha256_hex(&token),
            RESET_EXPIRES: expires.timestamp_millis(),
        }));
        self.store
            .update_by_id(USERS.collection, &identity.id, patch)
            .await?
            .ok_or_else(|| AppError::NotFound("There is no user with that email address.".into()))?;
        Ok(token)
    }

    pub async fn clear_reset_token(&self, identity: &Identity) -> Result<(), AppError> {
        let patch = document(json!({ RESET_TOKEN: null, RESET_EXPIRES: null }));
        self.store
            .update_by_id(USERS.collection, &identity.id, patch)
            .await?;
        Ok(())
    }

    /// Single use: the digest match and the clearing happen in one
    /// conditional store update, so a replayed token finds nothing.
    pub async fn consume_reset_token(
        &self,
        plaintext: &str,
        password: &str,
        password_confirm: &str,
    ) -> Result<Identity, AppError> {
        validate_new_password(password, password_confirm)?;
        let filter = USERS
            .scope_filter(Scope::Visible)
            .and(Predicate::eq(RESET_TOKEN, sha256_hex(plaintext)))
            .and(Predicate::new(
                RESET_EXPIRES,
                Comparison::Gt,
                Utc::now().timestamp_millis(),
            ));
        let patch = document(json!({
            PASSWORD: self.hash_password(password)?,
            PASSWORD_CHANGED_AT: changed_at_now(),
            RESET_TOKEN: null,
            RESET_EXPIRES: null,
        }));

        let updated = self
            .store
            .find_one_and_update(USERS.collection, &filter, patch)
            .await?
            .ok_or_else(|| {
                warn!("reset token rejected");
                AppError::TokenInvalidOrExpired
            })?;
        Identity::from_document(updated)
    }

    pub async fn update_password(
        &self,
        identity: &Identity,
        current: &str,
        password: &str,
        password_confirm: &str,
    ) -> Result<Identity, AppError> {
        if !verify_password(current, &identity.password_hash).unwrap_or(false) {
            return Err(AppError::Unauthorized("Your current password is wrong.".into()));
        }
        validate_new_password(password, password_confirm)?;
        let patch = document(json!({
            PASSWORD: self.hash_password(password)?,
            PASSWORD_CHANGED_AT: changed_at_now(),
        }));
        let updated = self
            .store
            .update_by_id(USERS.collection, &identity.id, patch)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No user found with ID {}", identity.id)))?;
        Identity::from_document(updated)
    }
}

fn changed_at_now() -> i64 {
    (Utc::now() - Duration::seconds(CHANGE_SKEW_SECS)).timestamp_millis()
}

fn document(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

/// Runs the user table's password rules on just the two password fields.
fn validate_new_password(password: &str, password_confirm: &str) -> Result<(), AppError> {
    let candidate = document(json!({ PASSWORD: password, PASSWORD_CONFIRM: password_confirm }));
    validation::validate(USERS.rules, &candidate, Some(&candidate))
        .map_err(AppError::ValidationFailed)
}

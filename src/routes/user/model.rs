use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::user::{EMAIL, PASSWORD, PASSWORD_CONFIRM};
use crate::result::Status;
use crate::store::Document;

/// Fields a caller may set on their own account at signup.
pub const SIGNUP_FIELDS: &[&str] = &["name", EMAIL, "photo", PASSWORD, PASSWORD_CONFIRM];
/// Fields `update-me` accepts; everything else is silently dropped.
pub const SELF_EDITABLE_FIELDS: &[&str] = &["name", EMAIL];

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    #[serde(default)]
    pub password_current: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: String,
}

#[derive(Debug, Serialize)]
pub struct UserData {
    pub user: Document,
}

/// `{status, token, data: {user}}`, sent whenever a credential is issued.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub status: Status,
    pub token: String,
    pub data: UserData,
}

impl AuthResponse {
    pub fn new(token: String, user: Document) -> Self {
        Self {
            status: Status::Success,
            token,
            data: UserData { user },
        }
    }
}

/// Copies the listed fields out of `payload`.
pub fn pick(payload: &Document, allowed: &[&str]) -> Document {
    payload
        .iter()
        .filter(|(key, _)| allowed.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

pub fn touches_password(payload: &Document) -> bool {
    [PASSWORD, PASSWORD_CONFIRM]
        .iter()
        .any(|field| payload.get(*field).is_some_and(|v| !v.is_null() && v != &Value::from("")))
}

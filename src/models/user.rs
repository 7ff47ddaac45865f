use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::query::{Filter, Predicate};
use crate::resource::{FieldRule, ResourceKind, Rule, Stage, no_decorate};
use crate::store::Document;

pub const EMAIL: &str = "email";
pub const ROLE: &str = "role";
pub const ACTIVE: &str = "active";
pub const PASSWORD: &str = "password";
pub const PASSWORD_CONFIRM: &str = "passwordConfirm";
pub const PASSWORD_CHANGED_AT: &str = "passwordChangedAt";
pub const RESET_TOKEN: &str = "passwordResetToken";
pub const RESET_EXPIRES: &str = "passwordResetExpires";

pub const ROLES: &[&str] = &["user", "guide", "lead-guide", "admin"];

const RULES: &[FieldRule] = &[
    FieldRule::new("name", Rule::Required, "Please tell us your name!"),
    FieldRule::new(EMAIL, Rule::Required, "Please provide your email"),
    FieldRule::new(EMAIL, Rule::Email, "Please provide a valid email"),
    FieldRule::new(ROLE, Rule::OneOf(ROLES), "Role is either: user, guide, lead-guide, admin"),
    FieldRule::new(PASSWORD, Rule::Required, "Please provide a password"),
    FieldRule::new(PASSWORD, Rule::MinLength(8), "A password must have at least 8 characters"),
    FieldRule::new(PASSWORD_CONFIRM, Rule::Required, "Please confirm your password"),
    FieldRule::new(PASSWORD_CONFIRM, Rule::MatchesField(PASSWORD), "Passwords are not the same!"),
];

const SECRETS: &[&str] = &[PASSWORD, PASSWORD_CONFIRM, RESET_TOKEN, RESET_EXPIRES, ACTIVE];

pub static USERS: ResourceKind = ResourceKind {
    collection: "users",
    singular: "user",
    rules: RULES,
    unique_fields: &[EMAIL],
    hidden_fields: SECRETS,
    read_only: &[
        PASSWORD,
        PASSWORD_CONFIRM,
        PASSWORD_CHANGED_AT,
        RESET_TOKEN,
        RESET_EXPIRES,
        ACTIVE,
    ],
    default_sort: "name",
    soft_delete: Some(ACTIVE),
    auto_populate: &[],
    visibility,
    prepare,
    decorate: no_decorate,
};

fn visibility() -> Filter {
    Filter::new().and(Predicate::ne(ACTIVE, false))
}

fn prepare(document: &mut Document, stage: Stage) {
    if let Some(email) = document.get(EMAIL).and_then(Value::as_str) {
        let normalized = email.trim().to_lowercase();
        document.insert(EMAIL.into(), Value::String(normalized));
    }
    if stage == Stage::Create {
        document.entry(ROLE).or_insert(Value::String(Role::User.as_str().into()));
        document.insert(ACTIVE.into(), Value::Bool(true));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    #[default]
    User,
    Guide,
    LeadGuide,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Guide => "guide",
            Role::LeadGuide => "lead-guide",
            Role::Admin => "admin",
        }
    }
}

/// Typed view of a stored user document, including the secret fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(rename = "password", default)]
    pub password_hash: String,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub password_changed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub password_reset_token: Option<String>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub password_reset_expires: Option<DateTime<Utc>>,
    #[serde(default = "active_by_default")]
    pub active: bool,
}

fn active_by_default() -> bool {
    true
}

impl Identity {
    pub fn from_document(document: Document) -> Result<Self, AppError> {
        serde_json::from_value(Value::Object(document))
            .map_err(|e| AppError::Internal(format!("malformed user document: {e}")))
    }
}

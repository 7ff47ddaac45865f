//! Resource descriptors for tours, reviews and user accounts.

pub mod review;
pub mod tour;
pub mod user;

pub use user::{Identity, Role};

use chrono::{SecondsFormat, Utc};
use serde_json::Value;

/// Creation timestamps use one fixed RFC 3339 shape so they sort as text.
pub(crate) fn now_stamp() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
}

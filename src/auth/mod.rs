//! Stateless credentials, password reset and access control.

mod credential;
mod guard;

pub use credential::{Claims, CredentialService, RESET_TOKEN_TTL_MINUTES};
pub use guard::{AccessGuard, authorize};

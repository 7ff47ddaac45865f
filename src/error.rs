use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::mail::MailError;
use crate::resource::FieldError;
use crate::result::ApiResult;
use crate::store::StoreError;

const GENERIC_MESSAGE: &str = "Something went wrong!";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),
    /// Missing, invalid, expired or stale credential.
    #[error("{0}")]
    Unauthorized(String),
    #[error("You do not have permission to perform this action")]
    Forbidden,
    #[error("Invalid input data. {}", joined(.0))]
    ValidationFailed(Vec<FieldError>),
    #[error("Token is invalid or has expired")]
    TokenInvalidOrExpired,
    #[error("Duplicate field value: {value}. Please use another value!")]
    DuplicateKey { field: String, value: String },
    #[error("{0}")]
    BadRequest(String),
    #[error("There was an error sending the email. Try again later!")]
    Mail(#[source] MailError),
    #[error(transparent)]
    Store(StoreError),
    #[error("{0}")]
    Internal(String),
}

fn joined(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join(". ")
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateKey { field, value } => AppError::DuplicateKey { field, value },
            other => AppError::Store(other),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::ValidationFailed(_)
            | AppError::TokenInvalidOrExpired
            | AppError::DuplicateKey { .. }
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Mail(_) | AppError::Store(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = if status.is_server_error() {
            error!(error = ?self, "request failed");
            let message = match &self {
                AppError::Mail(_) => self.to_string(),
                _ => GENERIC_MESSAGE.to_string(),
            };
            ApiResult::<()>::error(message)
        } else {
            ApiResult::<()>::fail(self.to_string())
        };

        (status, Json(body)).into_response()
    }
}

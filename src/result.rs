use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    /// Client-side problem (4xx).
    Fail,
    /// Server-side problem (5xx).
    Error,
}

/// Uniform response envelope for every resource operation.
#[derive(Debug, Serialize)]
pub struct ApiResult<T: Serialize> {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResult<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: Status::Success,
            results: None,
            data: Some(data),
            message: None,
        }
    }

    /// `results` is the number of returned items.
    pub fn listing(results: usize, data: T) -> Self {
        Self {
            results: Some(results),
            ..Self::success(data)
        }
    }

    /// Success carrying only a message, e.g. "Token sent to email!".
    pub fn notice(message: impl Into<String>) -> Self {
        Self::message_only(Status::Success, message)
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::message_only(Status::Fail, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::message_only(Status::Error, message)
    }

    fn message_only(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            results: None,
            data: None,
            message: Some(message.into()),
        }
    }
}

//! Out-of-band delivery of password-reset links.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("mail webhook rejected the message with status {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait ResetMailer: Send + Sync {
    async fn deliver(&self, to: &str, reset_url: &str) -> Result<(), MailError>;
}

/// Development mailer: records the recipient only. The link carries the
/// plaintext token and is logged at debug level only when `reveal_links` is set.
pub struct LogMailer {
    reveal_links: bool,
}

impl LogMailer {
    pub fn new(reveal_links: bool) -> Self {
        Self { reveal_links }
    }
}

#[async_trait]
impl ResetMailer for LogMailer {
    async fn deliver(&self, to: &str, reset_url: &str) -> Result<(), MailError> {
        info!(to, "password reset link issued");
        if self.reveal_links {
            debug!(to, reset_url, "password reset link");
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct OutgoingMail<'a> {
    to: &'a str,
    subject: &'a str,
    text: String,
}

/// Hands the message to an HTTP mail relay.
pub struct WebhookMailer {
    client: reqwest::Client,
    endpoint: String,
}

impl WebhookMailer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl ResetMailer for WebhookMailer {
    async fn deliver(&self, to: &str, reset_url: &str) -> Result<(), MailError> {
        let mail = OutgoingMail {
            to,
            subject: "Your password reset token (valid for 10 min)",
            text: format!(
                "Forgot your password? Submit a PATCH request with your new password and \
                 passwordConfirm to: {reset_url}.\n\
                 If you didn't forget your password, please ignore this email!"
            ),
        };
        let response = self.client.post(&self.endpoint).json(&mail).send().await?;
        if !response.status().is_success() {
            return Err(MailError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

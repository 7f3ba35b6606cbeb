//! Outbound mail.
//!
//! Delivery goes through the [`Mailer`] trait. The default [`LogMailer`]
//! writes each message to the log; a real transport can be plugged in without
//! touching callers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, instrument};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

impl From<MailError> for crate::errors::ServiceError {
    fn from(err: MailError) -> Self {
        crate::errors::ServiceError::MailError(err.to_string())
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutboundEmail) -> Result<(), MailError>;
}

fn check_recipient(email: &OutboundEmail) -> Result<(), MailError> {
    if validator::validate_email(email.to.as_str()) {
        Ok(())
    } else {
        Err(MailError::InvalidRecipient(email.to.clone()))
    }
}

/// Logs messages instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    #[instrument(skip(self, email), fields(to = %email.to))]
    async fn send(&self, email: OutboundEmail) -> Result<(), MailError> {
        check_recipient(&email)?;
        info!(from = %email.from, subject = %email.subject, "mail dispatched");
        Ok(())
    }
}

/// Keeps every message in memory; used by tests and the CLI dry runs.
#[derive(Debug, Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<OutboundEmail>>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutboundEmail) -> Result<(), MailError> {
        check_recipient(&email)?;
        self.sent.lock().await.push(email);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(to: &str) -> OutboundEmail {
        OutboundEmail {
            from: "no-reply@example.com".into(),
            to: to.into(),
            subject: "Hello".into(),
            body: "Body".into(),
        }
    }

    #[tokio::test]
    async fn recording_mailer_keeps_messages() {
        let mailer = RecordingMailer::new();
        mailer.send(message("ops@example.com")).await.unwrap();
        assert_eq!(mailer.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn invalid_recipient_is_rejected() {
        assert!(matches!(
            LogMailer.send(message("not-an-address")).await,
            Err(MailError::InvalidRecipient(_))
        ));
    }
}

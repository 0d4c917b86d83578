//! Messaging transports used to reach users.
//!
//! Alerts and command replies both go through [`MessageTransport`]. Delivery
//! is best-effort everywhere: callers log a [`TransportError`] and move on.

pub mod telegram;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

pub use telegram::TelegramTransport;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Messaging API rejected the request: {0}")]
    Rejected(String),

    #[error("Invalid destination: {0}")]
    InvalidDestination(String),
}

#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send_message(&self, destination: &str, text: &str) -> Result<(), TransportError>;
}

/// Transport that only writes messages to the log. Used when no bot token is configured.
#[derive(Debug, Default)]
pub struct LogTransport;

#[async_trait]
impl MessageTransport for LogTransport {
    async fn send_message(&self, destination: &str, text: &str) -> Result<(), TransportError> {
        info!(target: "upbeat::outbox", destination, "{text}");
        Ok(())
    }
}

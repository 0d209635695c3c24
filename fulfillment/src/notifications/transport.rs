//! Channel transports

use super::templates::RenderedMessage;
use crate::utils::CallError;
use async_trait::async_trait;
use shared::models::Channel;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("transport unreachable: {0}")]
    Unavailable(String),

    #[error("transport timed out after {0:?}")]
    Timeout(Duration),

    #[error("recipient rejected: {0}")]
    Rejected(String),
}

impl CallError for TransportError {
    fn timed_out(after: Duration) -> Self {
        TransportError::Timeout(after)
    }

    fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Rejected(_))
    }
}

/// Delivery sink for one channel (email, SMS or push)
#[async_trait]
pub trait Transport: Send + Sync {
    /// `recipient` is the channel endpoint: address, phone number or device token
    async fn send(&self, recipient: &str, message: &RenderedMessage) -> Result<(), TransportError>;
}

/// Writes messages to the log instead of delivering them
#[derive(Debug, Clone, Copy)]
pub struct LogTransport {
    channel: Channel,
}

impl LogTransport {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl Transport for LogTransport {
    async fn send(&self, recipient: &str, message: &RenderedMessage) -> Result<(), TransportError> {
        tracing::info!(
            channel = %self.channel,
            recipient,
            subject = message.subject.as_deref().unwrap_or(""),
            "Notification sent"
        );
        Ok(())
    }
}

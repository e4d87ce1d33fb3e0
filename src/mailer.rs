//! Mailer trait and delivery result types.
//!
//! # Why `async_trait`?
//!
//! The [`Transport`](crate::Transport) selects its mailer at runtime by name
//! (`mail`, `smtp`, `logger`, ...), so mailers are stored as
//! `Arc<dyn Mailer>`. Native async traits are not object-safe; the
//! `async_trait` macro boxes futures, which costs one allocation per
//! delivery. Delivery is I/O-bound, so that cost does not show.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::OutboxError;
use crate::message::Message;

/// Result of a successful delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryResult {
    /// Message ID assigned by the backend
    pub message_id: String,
}

impl DeliveryResult {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
        }
    }
}

/// Trait for delivery backends.
///
/// ```ignore
/// use outbox::{Mailer, Message};
/// use outbox::providers::LoggerMailer;
///
/// let mailer = LoggerMailer::new();
/// let result = mailer.deliver(&Message::new().to("a@example.com")).await?;
/// println!("Sent with ID: {}", result.message_id);
/// ```
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send a single message.
    async fn deliver(&self, message: &Message) -> Result<DeliveryResult, OutboxError>;

    /// Get the provider name (for logging/debugging).
    fn provider_name(&self) -> &'static str {
        "unknown"
    }

    /// Validate configuration.
    ///
    /// Called when the transport selects this mailer.
    fn validate_config(&self) -> Result<(), OutboxError> {
        Ok(())
    }
}

/// Extension trait for optional mailer operations.
pub trait MailerExt: Mailer {
    /// Validate a message before sending.
    fn validate(&self, message: &Message) -> Result<(), OutboxError> {
        if message.from.is_none() {
            return Err(OutboxError::MissingField("from"));
        }
        if message.to.is_empty() {
            return Err(OutboxError::MissingField("to"));
        }
        Ok(())
    }
}

impl<T: Mailer + ?Sized> MailerExt for T {}

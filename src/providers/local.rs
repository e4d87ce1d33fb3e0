//! Local mailer for development and testing.
//!
//! Captures delivered messages in memory for programmatic assertions.
//!
//! ```rust,ignore
//! use outbox::providers::LocalMailer;
//! use outbox::testing::*;
//!
//! #[tokio::test]
//! async fn test_sends_welcome_email() {
//!     let mailer = LocalMailer::new();
//!     let mut outbox = Outbox::builder("users")
//!         .transport(Transport::new(renderer).mailer("mail", mailer.clone()))
//!         .build();
//!
//!     outbox.send(EmailRecord::new().to("user@example.com"), Status::Pending).await?;
//!
//!     assert_email_sent(&mailer);
//!     assert_email_to(&mailer, "user@example.com");
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::OutboxError;
use crate::mailer::{DeliveryResult, Mailer};
use crate::message::Message;

/// A message captured by [`LocalMailer`].
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub id: String,
    pub message: Message,
    pub sent_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inbox {
    messages: RwLock<Vec<SentMessage>>,
    fail_with: RwLock<Option<String>>,
    fail_for: RwLock<HashMap<String, String>>,
}

/// Local mailer that keeps messages in memory.
///
/// Clones share the same inbox and failure settings.
#[derive(Clone, Default)]
pub struct LocalMailer {
    inbox: Arc<Inbox>,
}

impl LocalMailer {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Failure Simulation (for testing)
    // =========================================================================

    /// Make every delivery fail with `message`.
    pub fn set_failure(&self, message: impl Into<String>) {
        *self.inbox.fail_with.write() = Some(message.into());
    }

    /// Make deliveries to `recipient` fail with `message`.
    pub fn fail_for(&self, recipient: &str, message: impl Into<String>) {
        self.inbox
            .fail_for
            .write()
            .insert(recipient.to_ascii_lowercase(), message.into());
    }

    /// Clear all simulated failures.
    pub fn clear_failure(&self) {
        *self.inbox.fail_with.write() = None;
        self.inbox.fail_for.write().clear();
    }

    fn simulated_failure(&self, message: &Message) -> Option<String> {
        if let Some(reason) = self.inbox.fail_with.read().clone() {
            return Some(reason);
        }
        let fail_for = self.inbox.fail_for.read();
        message
            .to
            .iter()
            .find_map(|addr| fail_for.get(&addr.email.to_ascii_lowercase()).cloned())
    }

    // =========================================================================
    // Message Access (for testing assertions)
    // =========================================================================

    /// All captured messages, newest first.
    pub fn emails(&self) -> Vec<SentMessage> {
        self.inbox.messages.read().iter().rev().cloned().collect()
    }

    pub fn last_message(&self) -> Option<SentMessage> {
        self.inbox.messages.read().last().cloned()
    }

    pub fn email_count(&self) -> usize {
        self.inbox.messages.read().len()
    }

    pub fn has_emails(&self) -> bool {
        self.email_count() > 0
    }

    pub fn clear(&self) {
        self.inbox.messages.write().clear();
    }

    /// Remove and return all captured messages, newest first.
    pub fn flush(&self) -> Vec<SentMessage> {
        let mut drained: Vec<_> = self.inbox.messages.write().drain(..).collect();
        drained.reverse();
        drained
    }

    // =========================================================================
    // Query Helpers (for testing)
    // =========================================================================

    /// Check if a message was sent to a specific address.
    pub fn sent_to(&self, email: &str) -> bool {
        self.inbox.messages.read().iter().any(|sent| {
            sent.message
                .to
                .iter()
                .any(|addr| addr.email.eq_ignore_ascii_case(email))
        })
    }

    pub fn sent_with_subject(&self, subject: &str) -> bool {
        self.inbox
            .messages
            .read()
            .iter()
            .any(|sent| sent.message.subject == subject)
    }

    pub fn sent_with_subject_containing(&self, text: &str) -> bool {
        self.inbox
            .messages
            .read()
            .iter()
            .any(|sent| sent.message.subject.contains(text))
    }

    /// Find messages matching a predicate, newest first.
    pub fn find_emails<F>(&self, predicate: F) -> Vec<SentMessage>
    where
        F: Fn(&Message) -> bool,
    {
        self.emails()
            .into_iter()
            .filter(|sent| predicate(&sent.message))
            .collect()
    }
}

#[async_trait]
impl Mailer for LocalMailer {
    async fn deliver(&self, message: &Message) -> Result<DeliveryResult, OutboxError> {
        if let Some(reason) = self.simulated_failure(message) {
            return Err(OutboxError::SendError(reason));
        }

        let id = Uuid::new_v4().to_string();
        self.inbox.messages.write().push(SentMessage {
            id: id.clone(),
            message: message.clone(),
            sent_at: Utc::now(),
        });
        Ok(DeliveryResult::new(id))
    }

    fn provider_name(&self) -> &'static str {
        "local"
    }
}

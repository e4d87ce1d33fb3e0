//! Delivery that writes messages to the log instead of sending them.
//!
//! Selected with `delivery: "logger"`. Records still go through the whole
//! dispatch pipeline and end up `sent`, which makes this the delivery of
//! choice for staging setups.

use async_trait::async_trait;

use crate::address::Address;
use crate::error::OutboxError;
use crate::mailer::{DeliveryResult, Mailer};
use crate::message::Message;

/// How much of a message is logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogDetail {
    /// Recipients and subject.
    #[default]
    Summary,
    /// Every address, the headers and, at debug level, the bodies.
    Full,
}

/// Mailer that emits a tracing event per message.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggerMailer {
    detail: LogDetail,
}

impl LoggerMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn full() -> Self {
        Self::with_detail(LogDetail::Full)
    }

    pub fn with_detail(detail: LogDetail) -> Self {
        Self { detail }
    }

    pub fn detail(&self) -> LogDetail {
        self.detail
    }
}

fn mailboxes(addresses: &[Address]) -> Vec<String> {
    addresses.iter().map(Address::formatted).collect()
}

#[async_trait]
impl Mailer for LoggerMailer {
    async fn deliver(&self, message: &Message) -> Result<DeliveryResult, OutboxError> {
        let message_id = format!("logged-{}", uuid::Uuid::new_v4());

        match self.detail {
            LogDetail::Summary => tracing::info!(
                message_id = %message_id,
                to = ?mailboxes(&message.to),
                subject = %message.subject,
                "Email logged"
            ),
            LogDetail::Full => {
                tracing::info!(
                    message_id = %message_id,
                    from = ?message.from.as_ref().map(Address::formatted),
                    reply_to = ?message.reply_to.as_ref().map(Address::formatted),
                    to = ?mailboxes(&message.to),
                    cc = ?mailboxes(&message.cc),
                    bcc = ?mailboxes(&message.bcc),
                    subject = %message.subject,
                    charset = %message.charset,
                    headers = ?message.headers,
                    "Email logged"
                );
                if let Some(text) = &message.text_body {
                    tracing::debug!(message_id = %message_id, body = %text, "Text body");
                }
                if let Some(html) = &message.html_body {
                    tracing::debug!(message_id = %message_id, body = %html, "HTML body");
                }
            }
        }

        Ok(DeliveryResult::new(message_id))
    }

    fn provider_name(&self) -> &'static str {
        "logger"
    }
}

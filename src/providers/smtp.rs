//! SMTP and sendmail providers using lettre.
//!
//! # Example
//!
//! ```rust,ignore
//! use outbox::providers::SmtpMailer;
//!
//! // With authentication
//! let mailer = SmtpMailer::new("smtp.example.com", 587)
//!     .credentials("username", "password")
//!     .build();
//!
//! // From outbox settings
//! let mailer = SmtpMailer::from_config(&settings.config);
//! ```

use async_trait::async_trait;
use lettre::{
    message::{
        header::{ContentType, HeaderName, HeaderValue},
        Mailbox, MessageBuilder, MultiPart, SinglePart,
    },
    transport::smtp::authentication::Credentials,
    AsyncSendmailTransport, AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
};
use std::time::Duration;

use crate::address::Address;
use crate::error::OutboxError;
use crate::mailer::{DeliveryResult, Mailer};
use crate::message::Message;
use crate::settings::TransportConfig;

/// SMTP delivery backend.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Create a new SMTP mailer builder with TLS (STARTTLS).
    pub fn new(host: &str, port: u16) -> SmtpBuilder {
        SmtpBuilder {
            host: host.to_string(),
            port,
            timeout: None,
            credentials: None,
            tls: TlsMode::StartTls,
        }
    }

    /// Create a new SMTP mailer for localhost (no TLS, no auth).
    pub fn localhost() -> Self {
        Self::new("localhost", 25).no_tls().build()
    }

    /// Build from the `config` block of outbox settings.
    ///
    /// Port 465 uses implicit TLS, `localhost` and port 25 connect in
    /// plain text, anything else upgrades with STARTTLS.
    pub fn from_config(config: &TransportConfig) -> Self {
        let tls = match config.port {
            465 => TlsMode::Tls,
            25 => TlsMode::None,
            _ if config.host == "localhost" => TlsMode::None,
            _ => TlsMode::StartTls,
        };

        let mut builder = Self::new(&config.host, config.port)
            .tls(tls)
            .timeout(Duration::from_secs(config.timeout));
        if config.has_credentials() {
            builder = builder.credentials(&config.username, &config.password);
        }
        builder.build()
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn deliver(&self, message: &Message) -> Result<DeliveryResult, OutboxError> {
        let built = build_message(message)?;

        let response = self
            .transport
            .send(built)
            .await
            .map_err(|e| OutboxError::TransportFailed(e.to_string()))?;

        let message_id = response
            .message()
            .next()
            .and_then(|m| m.lines().next())
            .map(|s| s.to_string())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Ok(DeliveryResult::new(message_id))
    }

    fn provider_name(&self) -> &'static str {
        "smtp"
    }
}

/// Delivery through the local `sendmail` binary.
pub struct SendmailMailer {
    transport: AsyncSendmailTransport<Tokio1Executor>,
}

impl SendmailMailer {
    pub fn new() -> Self {
        Self {
            transport: AsyncSendmailTransport::<Tokio1Executor>::new(),
        }
    }

    /// Use a sendmail binary at a custom path.
    pub fn with_command(command: impl Into<std::ffi::OsString>) -> Self {
        Self {
            transport: AsyncSendmailTransport::<Tokio1Executor>::new_with_command(command),
        }
    }
}

impl Default for SendmailMailer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mailer for SendmailMailer {
    async fn deliver(&self, message: &Message) -> Result<DeliveryResult, OutboxError> {
        let built = build_message(message)?;

        self.transport
            .send(built)
            .await
            .map_err(|e| OutboxError::TransportFailed(e.to_string()))?;

        Ok(DeliveryResult::new(uuid::Uuid::new_v4().to_string()))
    }

    fn provider_name(&self) -> &'static str {
        "mail"
    }
}

/// TLS mode for SMTP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// No TLS (only for localhost relays)
    None,
    /// STARTTLS - upgrade to TLS after connecting (port 587)
    StartTls,
    /// Implicit TLS - connect with TLS from start (port 465)
    Tls,
}

/// Builder for SmtpMailer.
pub struct SmtpBuilder {
    host: String,
    port: u16,
    timeout: Option<Duration>,
    credentials: Option<Credentials>,
    tls: TlsMode,
}

impl SmtpBuilder {
    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some(Credentials::new(username.to_string(), password.to_string()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn tls(mut self, mode: TlsMode) -> Self {
        self.tls = mode;
        self
    }

    pub fn no_tls(mut self) -> Self {
        self.tls = TlsMode::None;
        self
    }

    pub fn build(self) -> SmtpMailer {
        let dangerous = || AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.host);
        let builder = match self.tls {
            TlsMode::None => dangerous(),
            TlsMode::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
                    .unwrap_or_else(|_| dangerous())
            }
            TlsMode::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&self.host)
                .unwrap_or_else(|_| dangerous()),
        };

        let mut builder = builder.port(self.port).timeout(self.timeout);
        if let Some(creds) = self.credentials {
            builder = builder.credentials(creds);
        }

        SmtpMailer {
            transport: builder.build(),
        }
    }
}

/// Build a lettre message from a rendered [`Message`].
fn build_message(message: &Message) -> Result<lettre::Message, OutboxError> {
    let from = message
        .from
        .as_ref()
        .ok_or(OutboxError::MissingField("from"))?;

    if message.to.is_empty() {
        return Err(OutboxError::MissingField("to"));
    }

    let mut builder = lettre::Message::builder()
        .from(address_to_mailbox(from)?)
        .subject(&message.subject);

    if let Some(sender) = &message.sender {
        builder = builder.sender(address_to_mailbox(sender)?);
    }
    for to in &message.to {
        builder = builder.to(address_to_mailbox(to)?);
    }
    for cc in &message.cc {
        builder = builder.cc(address_to_mailbox(cc)?);
    }
    for bcc in &message.bcc {
        builder = builder.bcc(address_to_mailbox(bcc)?);
    }
    if let Some(reply_to) = &message.reply_to {
        builder = builder.reply_to(address_to_mailbox(reply_to)?);
    }

    builder = with_headers(builder, message)?;

    let charset = if message.charset.is_empty() {
        "utf-8"
    } else {
        message.charset.as_str()
    };
    let text_type = content_type("text/plain", charset)?;
    let html_type = content_type("text/html", charset)?;

    let built = match (&message.html_body, &message.text_body) {
        (Some(html), Some(text)) => builder.multipart(
            MultiPart::alternative()
                .singlepart(SinglePart::builder().header(text_type).body(text.clone()))
                .singlepart(SinglePart::builder().header(html_type).body(html.clone())),
        )?,
        (Some(html), None) => builder.header(html_type).body(html.clone())?,
        (None, Some(text)) => builder.header(text_type).body(text.clone())?,
        (None, None) => builder.header(text_type).body(String::new())?,
    };

    Ok(built)
}

fn with_headers(mut builder: MessageBuilder, message: &Message) -> Result<MessageBuilder, OutboxError> {
    for (name, value) in &message.headers {
        let name = HeaderName::new_from_ascii(name.clone())
            .map_err(|_| OutboxError::Configuration(format!("Invalid header name: {name}")))?;
        builder = builder.raw_header(HeaderValue::new(name, value.clone()));
    }
    Ok(builder)
}

fn content_type(mime: &str, charset: &str) -> Result<ContentType, OutboxError> {
    ContentType::parse(&format!("{mime}; charset={charset}"))
        .map_err(|e| OutboxError::Configuration(format!("Invalid charset {charset}: {e}")))
}

/// Convert our Address to lettre's Mailbox.
fn address_to_mailbox(addr: &Address) -> Result<Mailbox, OutboxError> {
    let email = addr.to_ascii()?.parse()?;
    Ok(Mailbox::new(addr.name.clone(), email))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> Message {
        Message::new()
            .from(Address::with_name("Example", "system@example.com"))
            .to("user@example.com")
            .subject("Welcome")
            .header("X-Mailer", "Outbox Mailer")
    }

    #[test]
    fn test_build_message_with_both_parts() {
        let mut message = message().text_body("Hi").html_body("<p>Hi</p>");
        message.charset = "iso-8859-1".to_string();

        let formatted = String::from_utf8(build_message(&message).unwrap().formatted()).unwrap();
        assert!(formatted.contains("X-Mailer: Outbox Mailer"));
        assert!(formatted.contains("multipart/alternative"));
        assert!(formatted.contains("charset=iso-8859-1"));
    }

    #[test]
    fn test_build_message_requires_recipient() {
        let message = Message::new().from("system@example.com");
        assert!(matches!(
            build_message(&message),
            Err(OutboxError::MissingField("to"))
        ));
    }

    #[test]
    fn test_invalid_header_name() {
        let message = message().header("Bad:Header", "x");
        assert!(matches!(
            build_message(&message),
            Err(OutboxError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_from_config_builds() {
        let mailer = SmtpMailer::from_config(&TransportConfig::default());
        assert_eq!(mailer.provider_name(), "smtp");
    }
}

//! The transport: composes one message at a time and hands it to a mailer.
//!
//! An [`Outbox`](crate::Outbox) owns exactly one `Transport`. Every direct
//! dispatch resets it, configures the delivery backend from settings, sets
//! the message fields, and calls [`Transport::send`]. Deferred dispatches
//! skip composition and hand a [`DeferredRequest`] to the configured
//! [`DeferredDispatcher`].

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use crate::address::Address;
use crate::error::OutboxError;
use crate::mailer::{DeliveryResult, Mailer, MailerExt};
use crate::message::Message;
use crate::record::{EmailRecord, SendAs};
use crate::settings::TransportConfig;
use crate::template::{RenderRequest, RenderVars, TemplateRenderer};

/// The send-relevant fields of a record, as handed to a deferred dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferredRequest {
    pub template: Option<String>,
    pub layout: Option<String>,
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub reply_to: Option<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub send_as: Option<SendAs>,
    pub subject: String,
    pub data: BTreeMap<String, serde_json::Value>,
}

impl From<&EmailRecord> for DeferredRequest {
    fn from(record: &EmailRecord) -> Self {
        Self {
            template: record.template.clone(),
            layout: record.layout.clone(),
            from: record.from.clone(),
            to: record.to.clone(),
            reply_to: record.reply_to.clone(),
            cc: record.cc.clone().unwrap_or_default(),
            bcc: record.bcc.clone().unwrap_or_default(),
            send_as: record.send_as,
            subject: record.subject.clone(),
            data: record.data.clone(),
        }
    }
}

/// Receives deferred send requests.
///
/// Whether a request is delivered later, retried, or dropped is up to the
/// implementation. Returning `Ok` means the hand-off was accepted.
#[async_trait]
pub trait DeferredDispatcher: Send + Sync {
    async fn dispatch(&self, request: DeferredRequest) -> Result<(), OutboxError>;
}

/// A [`DeferredDispatcher`] that queues requests in memory for the
/// integrator to pick up.
#[derive(Debug, Default)]
pub struct QueueDispatcher {
    queue: Mutex<VecDeque<DeferredRequest>>,
}

impl QueueDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Remove and return the oldest queued request.
    pub fn pop(&self) -> Option<DeferredRequest> {
        self.queue.lock().pop_front()
    }

    /// Remove and return every queued request, oldest first.
    pub fn drain(&self) -> Vec<DeferredRequest> {
        self.queue.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

#[async_trait]
impl DeferredDispatcher for QueueDispatcher {
    async fn dispatch(&self, request: DeferredRequest) -> Result<(), OutboxError> {
        self.queue.lock().push_back(request);
        Ok(())
    }
}

#[async_trait]
impl<D: DeferredDispatcher + ?Sized> DeferredDispatcher for Arc<D> {
    async fn dispatch(&self, request: DeferredRequest) -> Result<(), OutboxError> {
        (**self).dispatch(request).await
    }
}

/// Builds a mailer from the transport configuration.
pub type MailerFactory =
    Arc<dyn Fn(&TransportConfig) -> Result<Arc<dyn Mailer>, OutboxError> + Send + Sync>;

/// Message composer and delivery front for one outbox.
pub struct Transport {
    renderer: Arc<dyn TemplateRenderer>,
    mailers: HashMap<String, Arc<dyn Mailer>>,
    factories: HashMap<String, MailerFactory>,
    deferred: Option<Arc<dyn DeferredDispatcher>>,

    active: Option<Arc<dyn Mailer>>,
    charset: String,
    headers: HashMap<String, String>,
    layout: Option<String>,
    template: Option<String>,
    from: Option<Address>,
    sender: Option<Address>,
    to: Option<Address>,
    reply_to: Option<Address>,
    cc: Vec<Address>,
    bcc: Vec<Address>,
    subject: String,
    format: SendAs,
    vars: RenderVars,

    last_error: Option<OutboxError>,
    last_delivery: Option<DeliveryResult>,
}

impl Transport {
    /// Create a transport rendering with `renderer`.
    ///
    /// The `logger` backend is always available; register others with
    /// [`Transport::mailer`] or [`Transport::factory`].
    pub fn new(renderer: impl TemplateRenderer + 'static) -> Self {
        Self::with_renderer(Arc::new(renderer))
    }

    pub fn with_renderer(renderer: Arc<dyn TemplateRenderer>) -> Self {
        let mut transport = Self {
            renderer,
            mailers: HashMap::new(),
            factories: HashMap::new(),
            deferred: None,
            active: None,
            charset: "utf-8".to_string(),
            headers: HashMap::new(),
            layout: None,
            template: None,
            from: None,
            sender: None,
            to: None,
            reply_to: None,
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: String::new(),
            format: SendAs::Both,
            vars: RenderVars::default(),
            last_error: None,
            last_delivery: None,
        };
        transport.register_builtin_factories();
        transport
    }

    fn register_builtin_factories(&mut self) {
        self.factories.insert(
            "logger".to_string(),
            Arc::new(|_: &TransportConfig| {
                Ok(Arc::new(crate::providers::LoggerMailer::new()) as Arc<dyn Mailer>)
            }),
        );

        #[cfg(feature = "smtp")]
        {
            self.factories.insert(
                "smtp".to_string(),
                Arc::new(|config: &TransportConfig| {
                    Ok(Arc::new(crate::providers::SmtpMailer::from_config(config)) as Arc<dyn Mailer>)
                }),
            );
            self.factories.insert(
                "mail".to_string(),
                Arc::new(|config: &TransportConfig| {
                    let mailer = match &config.command {
                        Some(command) => crate::providers::SendmailMailer::with_command(command),
                        None => crate::providers::SendmailMailer::new(),
                    };
                    Ok(Arc::new(mailer) as Arc<dyn Mailer>)
                }),
            );
        }
    }

    /// Register a ready mailer under a delivery name.
    ///
    /// A registered mailer takes precedence over a factory of the same name.
    pub fn mailer(mut self, name: impl Into<String>, mailer: impl Mailer + 'static) -> Self {
        self.mailers.insert(name.into(), Arc::new(mailer));
        self
    }

    /// Register a shared mailer under a delivery name.
    pub fn mailer_arc(mut self, name: impl Into<String>, mailer: Arc<dyn Mailer>) -> Self {
        self.mailers.insert(name.into(), mailer);
        self
    }

    /// Register a factory that builds a mailer from the transport configuration.
    pub fn factory<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&TransportConfig) -> Result<Arc<dyn Mailer>, OutboxError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Set the dispatcher used by deferred sends.
    pub fn deferred(mut self, dispatcher: impl DeferredDispatcher + 'static) -> Self {
        self.deferred = Some(Arc::new(dispatcher));
        self
    }

    // =========================================================================
    // Composition
    // =========================================================================

    /// Clear all message state. Registered mailers and the dispatcher stay.
    pub fn reset(&mut self) {
        self.active = None;
        self.charset = "utf-8".to_string();
        self.headers.clear();
        self.layout = None;
        self.template = None;
        self.from = None;
        self.sender = None;
        self.to = None;
        self.reply_to = None;
        self.cc.clear();
        self.bcc.clear();
        self.subject.clear();
        self.format = SendAs::Both;
        self.vars = RenderVars::default();
        self.last_error = None;
        self.last_delivery = None;
    }

    /// Select the delivery backend by name and apply its configuration.
    pub fn configure(&mut self, delivery: &str, config: &TransportConfig) -> Result<(), OutboxError> {
        let mailer = match self.mailers.get(delivery) {
            Some(mailer) => Arc::clone(mailer),
            None => {
                let factory = self.factories.get(delivery).ok_or_else(|| {
                    OutboxError::Configuration(format!("Unknown delivery transport: {delivery}"))
                })?;
                factory(config)?
            }
        };
        mailer.validate_config()?;

        tracing::debug!(
            delivery = delivery,
            provider = mailer.provider_name(),
            host = %config.host,
            port = config.port,
            "Transport configured"
        );
        self.active = Some(mailer);
        Ok(())
    }

    pub fn set_charset(&mut self, charset: impl Into<String>) {
        self.charset = charset.into();
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    pub fn set_layout(&mut self, layout: impl Into<String>) {
        self.layout = Some(layout.into());
    }

    pub fn set_template(&mut self, template: impl Into<String>) {
        self.template = Some(template.into());
    }

    pub fn set_from(&mut self, from: Address) {
        self.from = Some(from);
    }

    pub fn set_sender(&mut self, sender: Address) {
        self.sender = Some(sender);
    }

    pub fn set_to(&mut self, to: Address) {
        self.to = Some(to);
    }

    pub fn set_reply_to(&mut self, reply_to: Address) {
        self.reply_to = Some(reply_to);
    }

    pub fn set_cc(&mut self, cc: Vec<Address>) {
        self.cc = cc;
    }

    pub fn set_bcc(&mut self, bcc: Vec<Address>) {
        self.bcc = bcc;
    }

    pub fn set_subject(&mut self, subject: impl Into<String>) {
        self.subject = subject.into();
    }

    pub fn set_format(&mut self, format: SendAs) {
        self.format = format;
    }

    pub fn set_vars(&mut self, vars: RenderVars) {
        self.vars = vars;
    }

    // =========================================================================
    // Delivery
    // =========================================================================

    /// Render and deliver the composed message.
    ///
    /// Returns whether the mailer accepted it. On failure the cause is kept
    /// in [`Transport::last_error`].
    pub async fn send(&mut self) -> bool {
        match self.try_send().await {
            Ok(result) => {
                tracing::info!(message_id = %result.message_id, "Email delivered");
                self.last_delivery = Some(result);
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Email delivery failed");
                self.last_error = Some(e);
                false
            }
        }
    }

    async fn try_send(&self) -> Result<DeliveryResult, OutboxError> {
        let mailer = self
            .active
            .as_ref()
            .ok_or_else(|| OutboxError::Configuration("No delivery transport configured".into()))?;

        let message = self.compose()?;
        mailer.validate(&message)?;
        mailer.deliver(&message).await
    }

    /// Build the message, rendering bodies if a template is set.
    pub fn compose(&self) -> Result<Message, OutboxError> {
        let mut message = Message {
            from: self.from.clone(),
            sender: self.sender.clone(),
            to: self.to.iter().cloned().collect(),
            cc: self.cc.clone(),
            bcc: self.bcc.clone(),
            reply_to: self.reply_to.clone(),
            subject: self.subject.clone(),
            charset: self.charset.clone(),
            headers: self.headers.clone(),
            ..Message::default()
        };

        if let Some(template) = &self.template {
            let rendered = self.renderer.render(&RenderRequest {
                template,
                layout: self.layout.as_deref(),
                format: self.format,
                vars: &self.vars,
            })?;
            message.text_body = rendered.text;
            message.html_body = rendered.html;
        } else if self.format.wants_text() {
            message.text_body = Some(String::new());
        }

        Ok(message)
    }

    /// Hand `request` to the deferred dispatcher.
    ///
    /// Returns whether the hand-off was accepted.
    pub async fn deferred_send(&mut self, request: DeferredRequest) -> bool {
        self.subject = request.subject.clone();
        let Some(dispatcher) = self.deferred.as_ref() else {
            let e = OutboxError::Configuration("No deferred dispatcher configured".into());
            tracing::error!(error = %e, "Deferred dispatch failed");
            self.last_error = Some(e);
            return false;
        };

        match dispatcher.dispatch(request).await {
            Ok(()) => {
                tracing::info!(subject = %self.subject, "Email handed to deferred dispatcher");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Deferred dispatch failed");
                self.last_error = Some(e);
                false
            }
        }
    }

    /// Subject of the last composed or handed-off message.
    pub fn last_subject(&self) -> &str {
        &self.subject
    }

    /// Why the last send failed, if it did.
    pub fn last_error(&self) -> Option<&OutboxError> {
        self.last_error.as_ref()
    }

    pub fn last_delivery(&self) -> Option<&DeliveryResult> {
        self.last_delivery.as_ref()
    }

    /// Name of the active backend, if one is configured.
    pub fn provider_name(&self) -> Option<&'static str> {
        self.active.as_ref().map(|m| m.provider_name())
    }
}

#[cfg(all(test, feature = "local"))]
mod tests {
    use super::*;
    use crate::providers::LocalMailer;
    use crate::template::Rendered;

    fn echo_renderer(request: &RenderRequest<'_>) -> Result<Rendered, OutboxError> {
        Ok(Rendered {
            text: request.format.wants_text().then(|| format!("text:{}", request.template)),
            html: request.format.wants_html().then(|| format!("html:{}", request.template)),
        })
    }

    fn composed(transport: &mut Transport) {
        transport.set_template("users/welcome");
        transport.set_from(Address::new("system@example.com"));
        transport.set_to(Address::new("user@example.com"));
        transport.set_subject("Welcome");
    }

    #[tokio::test]
    async fn test_send_renders_and_delivers() {
        let local = LocalMailer::new();
        let mut transport = Transport::new(echo_renderer).mailer("local", local.clone());

        transport.configure("local", &TransportConfig::default()).unwrap();
        composed(&mut transport);
        transport.set_format(SendAs::Html);
        transport.set_header("X-Mailer", "Outbox Mailer");

        assert!(transport.send().await);
        let sent = local.last_message().unwrap();
        assert_eq!(sent.message.html_body.as_deref(), Some("html:users/welcome"));
        assert!(sent.message.text_body.is_none());
        assert_eq!(sent.message.headers["X-Mailer"], "Outbox Mailer");
        assert_eq!(transport.last_subject(), "Welcome");
    }

    #[tokio::test]
    async fn test_unknown_delivery_is_a_configuration_error() {
        let mut transport = Transport::new(echo_renderer);
        let result = transport.configure("carrier-pigeon", &TransportConfig::default());
        assert!(matches!(result, Err(OutboxError::Configuration(_))));
    }

    #[test]
    fn test_builtin_deliveries() {
        let mut transport = Transport::new(echo_renderer);

        transport.configure("logger", &TransportConfig::default()).unwrap();
        assert_eq!(transport.provider_name(), Some("logger"));

        #[cfg(feature = "smtp")]
        {
            transport.configure("mail", &TransportConfig::default()).unwrap();
            assert_eq!(transport.provider_name(), Some("mail"));
            transport.configure("smtp", &TransportConfig::default()).unwrap();
            assert_eq!(transport.provider_name(), Some("smtp"));
        }
    }

    #[tokio::test]
    async fn test_send_without_backend_fails() {
        let mut transport = Transport::new(echo_renderer);
        composed(&mut transport);

        assert!(!transport.send().await);
        assert!(matches!(
            transport.last_error(),
            Some(OutboxError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_reset_clears_message_state() {
        let local = LocalMailer::new();
        let mut transport = Transport::new(echo_renderer).mailer("local", local);
        transport.configure("local", &TransportConfig::default()).unwrap();
        composed(&mut transport);

        transport.reset();
        assert_eq!(transport.last_subject(), "");
        assert!(transport.provider_name().is_none());
        assert!(transport.compose().unwrap().to.is_empty());
    }

    #[tokio::test]
    async fn test_deferred_send_queues_request() {
        let queue = QueueDispatcher::shared();
        let mut transport = Transport::new(echo_renderer).deferred(Arc::clone(&queue));

        let record = EmailRecord::new().to("user@example.com").subject("Later");
        assert!(transport.deferred_send(DeferredRequest::from(&record)).await);

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop().unwrap().subject, "Later");
        assert_eq!(transport.last_subject(), "Later");
    }

    #[tokio::test]
    async fn test_deferred_send_without_dispatcher_fails() {
        let mut transport = Transport::new(echo_renderer);
        assert!(!transport.deferred_send(DeferredRequest::from(&EmailRecord::new())).await);
    }
}

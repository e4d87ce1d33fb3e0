//! # Outbox
//!
//! Store, queue, and deliver email records in Rust.
//!
//! An [`Outbox`] manages one type of email record. It fills in defaults,
//! persists records through a [`RecordStore`], dispatches them through its
//! own [`Transport`] and keeps the outcome on the record.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use outbox::prelude::*;
//! use outbox::providers::LocalMailer;
//!
//! let mailer = LocalMailer::new();
//! let renderer = TeraRenderer::from_glob("templates/emails/**/*")?;
//!
//! let mut outbox = Outbox::builder("users", Transport::new(renderer).mailer("mail", mailer))
//!     .store(MemoryStore::new())
//!     .build();
//!
//! let outcome = outbox
//!     .send(
//!         EmailRecord::new()
//!             .to("user@example.com")
//!             .template("users/welcome")
//!             .assign("name", "Alice"),
//!         Status::Pending,
//!     )
//!     .await?;
//!
//! assert!(outcome.is_sent());
//! ```
//!
//! ## Queueing
//!
//! With `auto_send` off, or with a `send_date`, records are only stored.
//! Drain them later:
//!
//! ```rust,ignore
//! let report = outbox.drain(Status::Pending, 100).await?;
//! println!("sent {}, failed {}", report.sent.len(), report.failed.len());
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `EMAIL_PROVIDER` | Delivery name: `mail`, `smtp`, `logger`, or one you registered |
//! | `EMAIL_SEND_AS` | `text`, `html` or `both` |
//! | `SMTP_HOST` | SMTP server host |
//! | `SMTP_PORT` | SMTP server port (default: 25) |
//! | `SMTP_TIMEOUT` | SMTP timeout in seconds (default: 30) |
//! | `SMTP_USERNAME` | SMTP username |
//! | `SMTP_PASSWORD` | SMTP password |
//! | `SENDMAIL_PATH` | Sendmail binary for the `mail` delivery (default: system sendmail) |
//! | `OUTBOX_HOST` | Host used for default sender addresses |
//! | `OUTBOX_APP_NAME` | Fallback sender domain |
//!
//! ## Feature Flags
//!
//! - `smtp` - SMTP and sendmail delivery via lettre (default; the default
//!   `mail` delivery needs it)
//! - `templates` - Tera template renderer (default)
//! - `local` - LocalMailer and assertion helpers for testing
//! - `metrics` - Prometheus-style metrics (counters/histograms)
//!
//! ## Metrics
//!
//! Enable `features = ["metrics"]` to emit:
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `outbox_dispatch_total` | Counter | record_type, status | Dispatch attempts by outcome |
//! | `outbox_dispatch_duration_seconds` | Histogram | record_type | Dispatch duration |
//!
//! Install a recorder (e.g., `metrics-exporter-prometheus`) in your app to collect them.

/// The version of the outbox crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

mod address;
mod error;
mod hook;
mod mailer;
mod message;
mod outbox;
mod record;
mod template;
mod transport;

pub mod codec;
pub mod defaults;
pub mod dispatch;
pub mod providers;
pub mod purge;
pub mod queue;
pub mod resend;
pub mod settings;
pub mod store;
pub mod subject;

#[cfg(feature = "local")]
pub mod testing;

// Re-exports
pub use address::{Address, ToAddress};
pub use defaults::{apply_defaults, Environment, StaticEnvironment};
pub use dispatch::{Outcome, Target};
pub use error::{ErrorLog, OutboxError};
pub use hook::{BeforeSend, BeforeSendExt, Chain, RequireRecipient};
pub use mailer::{DeliveryResult, Mailer, MailerExt};
pub use message::Message;
pub use outbox::{Outbox, OutboxBuilder};
pub use purge::Purge;
pub use queue::DrainReport;
pub use record::{EmailRecord, RecordId, SendAs, Status};
pub use settings::{DispatchMode, Settings, SettingsRegistry, TransportConfig};
pub use store::{Conditions, Criteria, MemoryStore, RecordStore, Row, SaveOptions};
pub use subject::{IdentityCatalog, SubjectCatalog, SubjectTable};
pub use template::{RenderRequest, RenderVars, Rendered, TemplateRenderer};
pub use transport::{DeferredDispatcher, DeferredRequest, MailerFactory, QueueDispatcher, Transport};

#[cfg(feature = "templates")]
pub use template::TeraRenderer;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::Address;
    pub use crate::BeforeSend;
    pub use crate::Conditions;
    pub use crate::Criteria;
    pub use crate::EmailRecord;
    pub use crate::MemoryStore;
    pub use crate::Outbox;
    pub use crate::OutboxError;
    pub use crate::Outcome;
    pub use crate::Purge;
    pub use crate::RecordStore;
    pub use crate::StaticEnvironment;
    pub use crate::Status;
    pub use crate::ToAddress;
    pub use crate::Transport;

    #[cfg(feature = "templates")]
    pub use crate::TeraRenderer;
}

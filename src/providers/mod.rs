//! Delivery backends.
//!
//! Each provider implements the [`Mailer`](crate::Mailer) trait. The
//! [`Transport`](crate::Transport) picks one by the `delivery` setting.
//!
//! ## Available Providers
//!
//! | Provider | Delivery name | Feature Flag | Description |
//! |----------|---------------|-------------|-------------|
//! | [`SmtpMailer`] | `smtp` | `smtp` | SMTP via lettre |
//! | [`SendmailMailer`] | `mail` | `smtp` | Local sendmail binary via lettre |
//! | [`LocalMailer`] | (register) | `local` | In-memory capture for dev/testing |
//! | [`LoggerMailer`] | `logger` | (none) | Logs messages without sending |

#[cfg(feature = "smtp")]
mod smtp;
#[cfg(feature = "smtp")]
pub use smtp::{SendmailMailer, SmtpBuilder, SmtpMailer, TlsMode};

#[cfg(feature = "local")]
mod local;
#[cfg(feature = "local")]
pub use local::{LocalMailer, SentMessage};

mod logger;
pub use logger::{LogDetail, LoggerMailer};

//! Per-record-type settings and the override merge that produces them.
//!
//! Settings are resolved from a fixed default set plus an override map:
//!
//! ```
//! use outbox::settings::{resolve, DispatchMode};
//! use serde_json::json;
//!
//! let settings = resolve("newsletter", &json!({
//!     "delivery": "smtp",
//!     "config": { "host": "smtp.example.com", "port": 587 },
//!     "dispatch_mode": "deferred",
//! }));
//!
//! assert_eq!(settings.delivery, "smtp");
//! assert_eq!(settings.config.host, "smtp.example.com");
//! assert_eq!(settings.config.timeout, 30); // default kept
//! assert_eq!(settings.dispatch_mode, DispatchMode::Deferred);
//! ```
//!
//! ## Environment Variables
//!
//! [`Settings::from_env`] reads:
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `EMAIL_PROVIDER` | Delivery transport name (`mail`, `smtp`, `logger`, `local`, ...) |
//! | `EMAIL_SEND_AS` | `text`, `html` or `both` |
//! | `SMTP_HOST` | SMTP server host |
//! | `SMTP_PORT` | SMTP server port |
//! | `SMTP_TIMEOUT` | Timeout in seconds |
//! | `SMTP_USERNAME` | SMTP username |
//! | `SMTP_PASSWORD` | SMTP password |
//! | `SENDMAIL_PATH` | Sendmail binary for the `mail` delivery |

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use crate::address::Address;
use crate::record::SendAs;

/// How a dispatch reaches its transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Render and deliver inline.
    #[default]
    Direct,
    /// Hand the send-relevant fields to a [`DeferredDispatcher`](crate::DeferredDispatcher).
    Deferred,
}

/// Connection options for the delivery transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
    /// Seconds.
    pub timeout: u64,
    pub username: String,
    pub password: String,
    /// Sendmail binary used by the `mail` delivery. `None` uses the
    /// system default.
    pub command: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 25,
            timeout: 30,
            username: String::new(),
            password: String::new(),
            command: None,
        }
    }
}

impl TransportConfig {
    /// Whether credentials are configured.
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty()
    }
}

/// Resolved settings for one record type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Dispatch as soon as a pending record is stored.
    pub auto_send: bool,
    pub charset: String,
    /// Name of the delivery transport.
    pub delivery: String,
    pub send_as: SendAs,
    pub config: TransportConfig,
    /// Value of the `X-Mailer` header.
    pub x_mailer: String,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub dispatch_mode: DispatchMode,
    /// Unrecognized keys, kept as given.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_send: true,
            charset: "utf-8".to_string(),
            delivery: "mail".to_string(),
            send_as: SendAs::Both,
            config: TransportConfig::default(),
            x_mailer: "Outbox Mailer".to_string(),
            cc: Vec::new(),
            bcc: Vec::new(),
            dispatch_mode: DispatchMode::Direct,
            extra: Map::new(),
        }
    }
}

impl Settings {
    /// Defaults overlaid with values from environment variables.
    pub fn from_env() -> Self {
        let mut overrides = Map::new();
        let mut config = Map::new();

        if let Ok(provider) = env::var("EMAIL_PROVIDER") {
            overrides.insert("delivery".into(), Value::String(provider.to_lowercase()));
        }
        if let Ok(send_as) = env::var("EMAIL_SEND_AS") {
            overrides.insert("send_as".into(), Value::String(send_as.to_lowercase()));
        }
        if let Ok(host) = env::var("SMTP_HOST") {
            config.insert("host".into(), Value::String(host));
        }
        if let Some(port) = env::var("SMTP_PORT").ok().and_then(|p| p.parse::<u16>().ok()) {
            config.insert("port".into(), Value::from(port));
        }
        if let Some(timeout) = env::var("SMTP_TIMEOUT").ok().and_then(|t| t.parse::<u64>().ok()) {
            config.insert("timeout".into(), Value::from(timeout));
        }
        if let Ok(username) = env::var("SMTP_USERNAME") {
            config.insert("username".into(), Value::String(username));
        }
        if let Ok(password) = env::var("SMTP_PASSWORD") {
            config.insert("password".into(), Value::String(password));
        }
        if let Ok(command) = env::var("SENDMAIL_PATH") {
            config.insert("command".into(), Value::String(command));
        }
        if !config.is_empty() {
            overrides.insert("config".into(), Value::Object(config));
        }

        resolve("default", &Value::Object(overrides))
    }

    fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }
}

/// Recursively merge `overrides` onto `base`. Override wins, field by field.
pub fn merge(base: &mut Value, overrides: &Value) {
    match (base, overrides) {
        (Value::Object(base), Value::Object(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge(existing, value)
                    }
                    _ => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overrides) => *base = overrides.clone(),
    }
}

/// Merge `overrides` onto the default settings for `record_type`.
///
/// Non-object overrides are ignored. An override whose value does not fit
/// its field falls back to the defaults for the whole set, with a warning.
pub fn resolve(record_type: &str, overrides: &Value) -> Settings {
    resolve_onto(&Settings::default(), record_type, overrides)
}

/// Merge `overrides` onto an existing settings set.
pub fn resolve_onto(base: &Settings, record_type: &str, overrides: &Value) -> Settings {
    if !overrides.is_object() {
        return base.clone();
    }

    let mut merged = base.to_value();
    merge(&mut merged, overrides);

    match serde_json::from_value(merged) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!(
                record_type = record_type,
                error = %e,
                "Ignoring settings overrides that do not fit the settings schema"
            );
            base.clone()
        }
    }
}

/// Resolved settings keyed by record type.
#[derive(Debug, Default)]
pub struct SettingsRegistry {
    settings: RwLock<HashMap<String, Arc<Settings>>>,
}

impl SettingsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve and store the settings for `record_type`, replacing any earlier set.
    pub fn configure(&self, record_type: impl Into<String>, overrides: &Value) -> Arc<Settings> {
        let record_type = record_type.into();
        let settings = Arc::new(resolve(&record_type, overrides));
        self.settings
            .write()
            .insert(record_type, Arc::clone(&settings));
        settings
    }

    /// Settings for `record_type`, or the defaults if it was never configured.
    pub fn get(&self, record_type: &str) -> Arc<Settings> {
        self.settings
            .read()
            .get(record_type)
            .cloned()
            .unwrap_or_default()
    }

    pub fn contains(&self, record_type: &str) -> bool {
        self.settings.read().contains_key(record_type)
    }
}

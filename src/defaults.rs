//! Default values for records that are missing required fields.
//!
//! The sender domain comes from the current request host, falling back to
//! the application name. Explicit values on the record always win.

use std::env;
use std::net::IpAddr;

use crate::address::Address;
use crate::record::EmailRecord;
use crate::settings::Settings;

/// Default layout name.
pub const DEFAULT_LAYOUT: &str = "default";

/// Default record type.
pub const DEFAULT_KIND: &str = "normal";

/// Facts about the surrounding application and the current request.
pub trait Environment: Send + Sync {
    /// Host of the request being served, if any (may include a port).
    fn request_host(&self) -> Option<String>;

    /// Application name, used as the sender domain outside a request.
    fn app_name(&self) -> String;

    /// Address of the client that triggered the current request.
    fn client_ip(&self) -> Option<IpAddr> {
        None
    }
}

/// An [`Environment`] with fixed values.
///
/// ```
/// use outbox::{Environment, StaticEnvironment};
///
/// let env = StaticEnvironment::new("shop").host("www.example.com");
/// assert_eq!(env.request_host().as_deref(), Some("www.example.com"));
/// assert_eq!(env.app_name(), "shop");
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticEnvironment {
    host: Option<String>,
    app_name: String,
    client_ip: Option<IpAddr>,
}

impl StaticEnvironment {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            ..Self::default()
        }
    }

    /// Read `OUTBOX_HOST` and `OUTBOX_APP_NAME` (default `app`).
    pub fn from_env() -> Self {
        Self {
            host: env::var("OUTBOX_HOST").ok().filter(|h| !h.is_empty()),
            app_name: env::var("OUTBOX_APP_NAME").unwrap_or_else(|_| "app".to_string()),
            client_ip: None,
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }
}

impl Environment for StaticEnvironment {
    fn request_host(&self) -> Option<String> {
        self.host.clone()
    }

    fn app_name(&self) -> String {
        self.app_name.clone()
    }

    fn client_ip(&self) -> Option<IpAddr> {
        self.client_ip
    }
}

/// Domain used for default sender addresses.
///
/// The request host with any port stripped, converted to ASCII and
/// lowercased; the application name when there is no usable host.
pub fn sender_domain(env: &dyn Environment) -> String {
    env.request_host()
        .as_deref()
        .map(strip_port)
        .filter(|host| !host.is_empty())
        .map(|host| idna::domain_to_ascii(host).unwrap_or_else(|_| host.to_lowercase()))
        .unwrap_or_else(|| env.app_name())
}

fn strip_port(host: &str) -> &str {
    let host = host.trim().trim_start_matches('/');
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Fill every unset field of `record` with its default.
///
/// Present values are never replaced; an explicitly empty `cc` or `bcc`
/// counts as present. The send date is left as is: no send date means
/// deliver immediately.
pub fn apply_defaults(record: &mut EmailRecord, settings: &Settings, env: &dyn Environment) {
    let domain = sender_domain(env);

    if record.layout.is_none() {
        record.layout = Some(DEFAULT_LAYOUT.to_string());
    }
    if record.reply_to.is_none() {
        record.reply_to = Some(Address::new(format!("noreply@{domain}")));
    }
    if record.from.is_none() {
        record.from = Some(Address::with_name(
            domain.clone(),
            format!("system@{domain}"),
        ));
    }
    if record.cc.is_none() {
        record.cc = Some(settings.cc.clone());
    }
    if record.bcc.is_none() {
        record.bcc = Some(settings.bcc.clone());
    }
    if record.send_as.is_none() {
        record.send_as = Some(settings.send_as);
    }
    if record.kind.is_none() {
        record.kind = Some(DEFAULT_KIND.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SendAs;

    fn env() -> StaticEnvironment {
        StaticEnvironment::new("shop").host("example.com")
    }

    #[test]
    fn test_sender_domain() {
        assert_eq!(sender_domain(&env()), "example.com");
        assert_eq!(
            sender_domain(&StaticEnvironment::new("shop").host("Example.COM:8080")),
            "example.com"
        );
        assert_eq!(sender_domain(&StaticEnvironment::new("shop")), "shop");
        assert_eq!(sender_domain(&StaticEnvironment::new("shop").host("")), "shop");
    }

    #[test]
    fn test_sender_domain_idn() {
        let env = StaticEnvironment::new("shop").host("müller.de");
        assert_eq!(sender_domain(&env), "xn--mller-kva.de");
    }

    #[test]
    fn test_fills_missing_fields() {
        let mut settings = Settings::default();
        settings.bcc = vec![Address::new("audit@example.com")];
        settings.send_as = SendAs::Html;

        let mut record = EmailRecord::new().to("user@example.com");
        apply_defaults(&mut record, &settings, &env());

        assert_eq!(record.layout.as_deref(), Some("default"));
        assert_eq!(record.reply_to.unwrap().email, "noreply@example.com");
        let from = record.from.unwrap();
        assert_eq!(from.formatted(), "example.com <system@example.com>");
        assert_eq!(record.bcc.unwrap()[0].email, "audit@example.com");
        assert_eq!(record.cc, Some(Vec::new()));
        assert_eq!(record.send_as, Some(SendAs::Html));
        assert_eq!(record.kind.as_deref(), Some("normal"));
        assert!(record.send_date.is_none());
    }

    #[test]
    fn test_never_overwrites_present_fields() {
        let mut settings = Settings::default();
        settings.cc = vec![Address::new("default-cc@example.com")];

        let original = EmailRecord::new()
            .from("Me <me@example.org>")
            .reply_to("replies@example.org")
            .cc("explicit@example.org")
            .layout("plain")
            .send_as(SendAs::Text)
            .kind("private")
            .send_date(chrono::Utc::now());

        let mut record = original.clone();
        apply_defaults(&mut record, &settings, &env());
        assert_eq!(record.cc, original.cc);
        assert_eq!(record.bcc, Some(Vec::new()));
        record.bcc = None;
        assert_eq!(record, original);
    }

    #[test]
    fn test_explicitly_empty_copies_are_kept() {
        let mut settings = Settings::default();
        settings.cc = vec![Address::new("default-cc@example.com")];
        settings.bcc = vec![Address::new("audit@example.com")];

        let mut record = EmailRecord::new().to("user@example.com").without_cc().without_bcc();
        apply_defaults(&mut record, &settings, &env());

        assert_eq!(record.cc, Some(Vec::new()));
        assert_eq!(record.bcc, Some(Vec::new()));
    }
}

//! The persisted email record and its status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use crate::address::{Address, ToAddress};

/// Identity of a persisted record.
pub type RecordId = u64;

/// Delivery status of a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Status {
    /// Not yet attempted.
    #[default]
    Pending,
    /// Delivered. Only a forced send may deliver it again.
    Sent,
    /// Rejected before reaching a transport.
    DataProblem,
    /// A transport attempt was made and failed.
    SendError,
}

impl Status {
    /// The stored string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::DataProblem => "dataProblem",
            Self::SendError => "sendError",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which bodies to render and send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendAs {
    Text,
    Html,
    /// Multipart alternative with both bodies.
    #[default]
    Both,
}

impl SendAs {
    pub fn wants_text(&self) -> bool {
        matches!(self, Self::Text | Self::Both)
    }

    pub fn wants_html(&self) -> bool {
        matches!(self, Self::Html | Self::Both)
    }
}

/// One email send intent.
///
/// Records are built with the builder methods, persisted through a
/// [`RecordStore`](crate::RecordStore) and dispatched by an
/// [`Outbox`](crate::Outbox):
///
/// ```
/// use outbox::EmailRecord;
///
/// let record = EmailRecord::new()
///     .to("user@example.com")
///     .template("users/welcome")
///     .assign("name", "Alice");
///
/// assert!(record.id.is_none());
/// assert!(record.subject.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailRecord {
    pub id: Option<RecordId>,
    /// Free-form classification such as `normal` or `newsletter_copy`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub subject: String,
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub reply_to: Option<Address>,
    /// `None` takes the configured default; an empty list means no copies.
    pub cc: Option<Vec<Address>>,
    pub bcc: Option<Vec<Address>>,
    pub template: Option<String>,
    pub layout: Option<String>,
    pub send_as: Option<SendAs>,
    /// Template variables.
    #[serde(default)]
    pub data: BTreeMap<String, serde_json::Value>,
    /// Delivery is deferred while this lies in the future.
    pub send_date: Option<DateTime<Utc>>,
    /// The record this one was resent from.
    pub chain_id: Option<RecordId>,
    pub ip: Option<IpAddr>,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

impl EmailRecord {
    /// Create a new, unsaved, pending record.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: RecordId) -> Self {
        self.id = Some(id);
        self
    }

    /// Set the record type.
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn from(mut self, addr: impl ToAddress) -> Self {
        self.from = Some(addr.to_address());
        self
    }

    pub fn to(mut self, addr: impl ToAddress) -> Self {
        self.to = Some(addr.to_address());
        self
    }

    pub fn reply_to(mut self, addr: impl ToAddress) -> Self {
        self.reply_to = Some(addr.to_address());
        self
    }

    /// Add a CC recipient.
    pub fn cc(mut self, addr: impl ToAddress) -> Self {
        self.cc.get_or_insert_with(Vec::new).push(addr.to_address());
        self
    }

    /// Add a BCC recipient.
    pub fn bcc(mut self, addr: impl ToAddress) -> Self {
        self.bcc.get_or_insert_with(Vec::new).push(addr.to_address());
        self
    }

    /// Send no CC copies, even if the settings configure some.
    pub fn without_cc(mut self) -> Self {
        self.cc = Some(Vec::new());
        self
    }

    /// Send no BCC copies, even if the settings configure some.
    pub fn without_bcc(mut self) -> Self {
        self.bcc = Some(Vec::new());
        self
    }

    /// Set the template name, e.g. `users/welcome`.
    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn layout(mut self, layout: impl Into<String>) -> Self {
        self.layout = Some(layout.into());
        self
    }

    pub fn send_as(mut self, send_as: SendAs) -> Self {
        self.send_as = Some(send_as);
        self
    }

    /// Store a template variable.
    pub fn assign(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn send_date(mut self, at: DateTime<Utc>) -> Self {
        self.send_date = Some(at);
        self
    }

    /// Whether the send date (if any) has been reached at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.send_date.map_or(true, |at| at <= now)
    }

    /// Copy of this record ready to be delivered again.
    ///
    /// Identity and timestamps are dropped, the status is reset to pending
    /// and `chain_id` points at the original.
    pub fn chained_copy(&self) -> Self {
        Self {
            id: None,
            created: None,
            modified: None,
            status: Status::Pending,
            chain_id: self.id,
            ..self.clone()
        }
    }
}

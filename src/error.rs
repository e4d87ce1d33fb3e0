//! Error types for outbox.

use thiserror::Error;

use crate::record::RecordId;

/// Errors that can occur while queueing, dispatching or purging email records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutboxError {
    /// Dispatch was requested without a record or an id.
    #[error("No record or id given to dispatch")]
    NoTarget,

    /// The store has no record with this id.
    #[error("Record not found: {0}")]
    RecordNotFound(RecordId),

    /// The before-send hook rejected the record.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// The transport attempted delivery and failed.
    #[error("Transport failed: {0}")]
    TransportFailed(String),

    /// The record was already sent and `force` was not given.
    #[error("Email already sent")]
    AlreadySent(Option<RecordId>),

    /// Writing to the store failed.
    #[error("Persist failed: {0}")]
    PersistFailed(String),

    /// A purge resolved to an empty condition set and was refused.
    #[error("Refusing to purge with an empty condition set")]
    EmptyPurgeConditions,

    /// A stored value could not be encoded or decoded.
    #[error("Codec error: {0}")]
    Codec(String),

    /// Store backend error.
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration error (unknown transport, invalid value, etc.)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(String),

    /// Invalid email address format.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Missing required field (e.g., to address).
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Error sending the message.
    #[error("Send error: {0}")]
    SendError(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for OutboxError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

#[cfg(feature = "templates")]
impl From<tera::Error> for OutboxError {
    fn from(err: tera::Error) -> Self {
        use std::error::Error as _;

        // Tera wraps the interesting part in the source chain.
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::Template(message)
    }
}

#[cfg(feature = "smtp")]
impl From<lettre::error::Error> for OutboxError {
    fn from(err: lettre::error::Error) -> Self {
        Self::SendError(err.to_string())
    }
}

#[cfg(feature = "smtp")]
impl From<lettre::address::AddressError> for OutboxError {
    fn from(err: lettre::address::AddressError) -> Self {
        Self::InvalidAddress(err.to_string())
    }
}

/// Errors accumulated by an [`Outbox`](crate::Outbox) over its lifetime.
///
/// Guard trips, bookkeeping write failures and per-record queue failures are
/// recorded here instead of being returned, so a batch keeps going.
#[derive(Debug, Clone, Default)]
pub struct ErrorLog {
    entries: Vec<OutboxError>,
}

impl ErrorLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an error.
    pub fn push(&mut self, error: OutboxError) {
        self.entries.push(error);
    }

    /// All recorded errors, oldest first.
    pub fn entries(&self) -> &[OutboxError] {
        &self.entries
    }

    /// Remove and return all recorded errors.
    pub fn take(&mut self) -> Vec<OutboxError> {
        std::mem::take(&mut self.entries)
    }

    /// Whether any error of this shape was recorded.
    pub fn contains(&self, predicate: impl Fn(&OutboxError) -> bool) -> bool {
        self.entries.iter().any(predicate)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_log_take_drains() {
        let mut log = ErrorLog::new();
        log.push(OutboxError::AlreadySent(Some(3)));
        log.push(OutboxError::PersistFailed("disk full".into()));

        assert_eq!(log.len(), 2);
        assert!(log.contains(|e| matches!(e, OutboxError::AlreadySent(Some(3)))));

        let taken = log.take();
        assert_eq!(taken.len(), 2);
        assert!(log.is_empty());
    }

    #[test]
    fn test_already_sent_message() {
        assert_eq!(OutboxError::AlreadySent(None).to_string(), "Email already sent");
    }
}

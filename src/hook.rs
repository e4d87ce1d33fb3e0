//! Before-send hooks for validating or adjusting records before dispatch.
//!
//! A hook runs after defaults are applied and before the transport is
//! touched. Returning an error marks the record `dataProblem` and stops the
//! dispatch.
//!
//! # Example
//!
//! ```rust,ignore
//! use outbox::{BeforeSendExt, EmailRecord, OutboxError, RequireRecipient};
//!
//! let hook = RequireRecipient.and_then(|record: &mut EmailRecord| {
//!     if record.template.is_none() {
//!         return Err(OutboxError::ValidationFailed("template is required".into()));
//!     }
//!     Ok(())
//! });
//! ```

use crate::address::Address;
use crate::error::OutboxError;
use crate::record::EmailRecord;

/// A check or adjustment applied to every record before dispatch.
///
/// For simple cases, use a closure:
///
/// ```rust,ignore
/// outbox_builder.hook(|record: &mut EmailRecord| {
///     record.data.insert("brand".into(), "acme".into());
///     Ok(())
/// })
/// ```
///
/// For reusable logic, implement the trait on a struct:
///
/// ```rust,ignore
/// struct AllowedDomains(Vec<String>);
///
/// impl BeforeSend for AllowedDomains {
///     fn before_send(&self, record: &mut EmailRecord) -> Result<(), OutboxError> {
///         // ...
///     }
/// }
/// ```
pub trait BeforeSend: Send + Sync {
    /// Return `Err(...)` to refuse the record.
    fn before_send(&self, record: &mut EmailRecord) -> Result<(), OutboxError>;
}

/// Blanket implementation for closures.
impl<F> BeforeSend for F
where
    F: Fn(&mut EmailRecord) -> Result<(), OutboxError> + Send + Sync,
{
    fn before_send(&self, record: &mut EmailRecord) -> Result<(), OutboxError> {
        (self)(record)
    }
}

/// The default hook: a record needs a valid recipient.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireRecipient;

impl BeforeSend for RequireRecipient {
    fn before_send(&self, record: &mut EmailRecord) -> Result<(), OutboxError> {
        let to = record
            .to
            .as_ref()
            .filter(|to| !to.email.is_empty())
            .ok_or(OutboxError::MissingField("to"))?;

        Address::parse(&to.email)
            .map(|_| ())
            .map_err(|e| OutboxError::ValidationFailed(e.to_string()))
    }
}

/// Two hooks run in order. Created by [`BeforeSendExt::and_then`].
#[derive(Debug, Clone)]
pub struct Chain<A, B> {
    first: A,
    second: B,
}

impl<A: BeforeSend, B: BeforeSend> BeforeSend for Chain<A, B> {
    fn before_send(&self, record: &mut EmailRecord) -> Result<(), OutboxError> {
        self.first.before_send(record)?;
        self.second.before_send(record)
    }
}

/// Extension trait for chaining hooks.
pub trait BeforeSendExt: BeforeSend + Sized {
    /// Run `next` after this hook if this one accepts the record.
    fn and_then<B: BeforeSend>(self, next: B) -> Chain<Self, B> {
        Chain {
            first: self,
            second: next,
        }
    }
}

impl<H: BeforeSend + Sized> BeforeSendExt for H {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_recipient() {
        let hook = RequireRecipient;

        assert!(hook
            .before_send(&mut EmailRecord::new().to("user@example.com"))
            .is_ok());
        assert!(matches!(
            hook.before_send(&mut EmailRecord::new()),
            Err(OutboxError::MissingField("to"))
        ));
        assert!(matches!(
            hook.before_send(&mut EmailRecord::new().to("not-an-email")),
            Err(OutboxError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_chain_stops_at_first_rejection() {
        let hook = RequireRecipient.and_then(|record: &mut EmailRecord| {
            record.subject = "touched".into();
            Ok(())
        });

        let mut missing = EmailRecord::new();
        assert!(hook.before_send(&mut missing).is_err());
        assert_eq!(missing.subject, "");

        let mut valid = EmailRecord::new().to("user@example.com");
        hook.before_send(&mut valid).unwrap();
        assert_eq!(valid.subject, "touched");
    }
}

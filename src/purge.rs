//! Bulk deletion of processed records.

use chrono::NaiveDate;

use crate::error::OutboxError;
use crate::outbox::Outbox;
use crate::record::Status;
use crate::store::Conditions;

/// Record type purged by default.
pub const DEFAULT_PURGE_KIND: &str = "newsletter_copy";

/// Which records to purge.
#[derive(Debug, Clone, PartialEq)]
pub enum Purge {
    /// Exactly these conditions.
    Conditions(Conditions),
    /// Records of a type and status, optionally sent before a date.
    Filter {
        kind: Option<String>,
        status: Option<Status>,
        /// Only records with a send date before this day.
        before: Option<NaiveDate>,
        extra: Conditions,
    },
}

impl Purge {
    /// Sent records of `kind`.
    ///
    /// ```
    /// use outbox::purge::Purge;
    ///
    /// let conditions = Purge::kind("private").conditions();
    /// assert_eq!(conditions.len(), 2);
    /// ```
    pub fn kind(kind: impl Into<String>) -> Self {
        Self::Filter {
            kind: Some(kind.into()),
            status: Some(Status::Sent),
            before: None,
            extra: Conditions::new(),
        }
    }

    /// Narrow a filter to one status. No effect on raw conditions.
    pub fn status(mut self, new_status: Status) -> Self {
        if let Self::Filter { status, .. } = &mut self {
            *status = Some(new_status);
        }
        self
    }

    /// Narrow a filter to records sent before `date`.
    pub fn before(mut self, date: NaiveDate) -> Self {
        if let Self::Filter { before, .. } = &mut self {
            *before = Some(date);
        }
        self
    }

    /// Resolve to the conditions handed to the store.
    pub fn conditions(&self) -> Conditions {
        match self {
            Self::Conditions(conditions) => conditions.clone(),
            Self::Filter {
                kind,
                status,
                before,
                extra,
            } => {
                let mut conditions = Conditions::new();
                if let Some(kind) = kind {
                    conditions = conditions.eq("type", kind.as_str());
                }
                if let Some(status) = status {
                    conditions = conditions.eq("status", status.as_str());
                }
                if let Some(before) = before {
                    conditions = conditions.lt("send_date", before.format("%Y-%m-%d").to_string());
                }
                conditions.extend(extra.clone())
            }
        }
    }
}

impl Default for Purge {
    fn default() -> Self {
        Self::Filter {
            kind: Some(DEFAULT_PURGE_KIND.to_string()),
            status: Some(Status::Sent),
            before: None,
            extra: Conditions::new(),
        }
    }
}

impl Outbox {
    /// Delete the records `purge` selects.
    ///
    /// Returns whether the delete ran. An empty condition set is refused:
    /// nothing is deleted and the refusal is recorded in the error log.
    pub fn purge(&mut self, purge: Purge) -> Result<bool, OutboxError> {
        let conditions = purge.conditions();
        if conditions.is_empty() {
            tracing::warn!(record_type = %self.record_type, "Refusing to purge without conditions");
            self.errors.push(OutboxError::EmptyPurgeConditions);
            return Ok(false);
        }

        let store = self.require_store()?;
        match store.delete_all(&conditions) {
            Ok(deleted) => {
                tracing::info!(record_type = %self.record_type, deleted = deleted, "Records purged");
                Ok(true)
            }
            Err(e) => {
                tracing::error!(record_type = %self.record_type, error = %e, "Purge failed");
                self.errors.push(e);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Op;

    #[test]
    fn test_kind_selects_sent_records_of_that_kind() {
        let purge = Purge::kind("private");
        assert_eq!(
            purge,
            Purge::Filter {
                kind: Some("private".to_string()),
                status: Some(Status::Sent),
                before: None,
                extra: Conditions::new(),
            }
        );
        assert_eq!(
            purge.conditions(),
            Conditions::new().eq("type", "private").eq("status", "sent")
        );
    }

    #[test]
    fn test_default_filter() {
        let conditions = Purge::default().conditions();
        let columns: Vec<_> = conditions.iter().map(|c| c.column.as_str()).collect();
        assert_eq!(columns, ["type", "status"]);
    }

    #[test]
    fn test_before_date() {
        let date = NaiveDate::from_ymd_opt(2008, 1, 1).unwrap();
        let conditions = Purge::kind("normal").before(date).conditions();

        let send_date = conditions.iter().find(|c| c.column == "send_date").unwrap();
        assert_eq!(send_date.op, Op::Lt);
        assert_eq!(send_date.value, "2008-01-01");
    }

    #[test]
    fn test_raw_conditions_used_as_is() {
        let purge = Purge::Conditions(Conditions::new().eq("type", "private"));
        assert_eq!(purge.clone().status(Status::Sent).conditions().len(), 1);
        assert!(Purge::Conditions(Conditions::new()).conditions().is_empty());
    }
}

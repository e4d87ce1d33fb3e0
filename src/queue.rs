//! Draining stored records through the dispatch engine.

use serde_json::{json, Value};

use crate::codec;
use crate::dispatch::{Outcome, Target};
use crate::error::OutboxError;
use crate::outbox::Outbox;
use crate::record::{RecordId, Status};
use crate::store::{Conditions, Criteria};

/// What a queue run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainReport {
    /// Records delivered, in processing order.
    pub sent: Vec<RecordId>,
    /// Records the engine attempted and did not deliver.
    pub failed: Vec<(RecordId, Outcome)>,
    /// Records that could not be attempted at all.
    pub errors: Vec<(RecordId, OutboxError)>,
}

impl DrainReport {
    /// Number of records looked at.
    pub fn processed(&self) -> usize {
        self.sent.len() + self.failed.len() + self.errors.len()
    }
}

impl Outbox {
    /// Dispatch every stored record with `status`, at most `limit` of them
    /// (0 for no limit).
    ///
    /// Turns auto-send on for this outbox. One record failing never stops
    /// the run: its failure is logged and the next record is processed.
    pub async fn drain(&mut self, status: Status, limit: usize) -> Result<DrainReport, OutboxError> {
        let store = self.require_store()?;
        self.settings.auto_send = true;

        let criteria = Criteria::new(Conditions::new().eq("status", status.as_str())).limit(limit);
        let rows = store.find(&criteria)?;
        tracing::info!(
            record_type = %self.record_type,
            status = %status,
            count = rows.len(),
            "Draining queue"
        );

        let mut report = DrainReport::default();
        for row in rows {
            let Some(id) = row.get("id").and_then(Value::as_u64) else {
                tracing::warn!("Skipping stored row without id");
                continue;
            };

            let mut record = match codec::decode_row(row) {
                Ok(record) => record,
                Err(e) => {
                    tracing::error!(id = id, error = %e, "Cannot decode queued record");
                    self.errors.push(e.clone());
                    report.errors.push((id, e));
                    continue;
                }
            };

            match self.attempt_send(Some(Target::Record(&mut record)), false).await {
                Ok(outcome) if outcome.is_sent() => {
                    self.mark_sent(id);
                    report.sent.push(id);
                }
                Ok(outcome) => {
                    tracing::warn!(id = id, outcome = %outcome, "Queued record not sent");
                    report.failed.push((id, outcome));
                }
                Err(e) => {
                    tracing::error!(id = id, error = %e, "Queued record failed");
                    self.errors.push(e.clone());
                    report.errors.push((id, e));
                }
            }
        }

        tracing::info!(
            record_type = %self.record_type,
            sent = report.sent.len(),
            failed = report.failed.len() + report.errors.len(),
            "Queue drained"
        );
        Ok(report)
    }

    /// Dispatch one stored record by id.
    ///
    /// Turns auto-send on for this outbox.
    pub async fn send_pending(&mut self, id: RecordId) -> Result<Outcome, OutboxError> {
        self.settings.auto_send = true;

        let outcome = self.attempt_send(Some(Target::Id(id)), false).await?;
        if outcome.is_sent() {
            self.mark_sent(id);
        }
        Ok(outcome)
    }

    fn mark_sent(&mut self, id: RecordId) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        match store.save_field(id, "status", json!(Status::Sent.as_str())) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(id = id, "Sent record vanished before status update");
                self.errors.push(OutboxError::RecordNotFound(id));
            }
            Err(e) => {
                tracing::error!(id = id, error = %e, "Failed to mark record sent");
                self.errors.push(OutboxError::PersistFailed(e.to_string()));
            }
        }
    }
}

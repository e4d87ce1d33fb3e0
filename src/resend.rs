//! Resending stored records.
//!
//! A record that was already delivered is never sent twice in place.
//! Resending it creates a fresh pending copy whose `chain_id` points back
//! at the original.

use crate::dispatch::Outcome;
use crate::error::OutboxError;
use crate::outbox::Outbox;
use crate::record::{RecordId, Status};

impl Outbox {
    /// Send the record with this id again.
    ///
    /// A `sent` record is copied into a new chained record. Any other
    /// record is sent as it is.
    pub async fn resend(&mut self, id: RecordId) -> Result<Outcome, OutboxError> {
        let original = self.load(id)?.ok_or(OutboxError::RecordNotFound(id))?;

        let record = if original.status == Status::Sent {
            tracing::info!(record_type = %self.record_type, chain_id = id, "Resending as new record");
            original.chained_copy()
        } else {
            original
        };

        self.send(record, Status::Pending).await
    }
}

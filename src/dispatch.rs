//! The dispatch engine: one attempt to deliver one record.
//!
//! [`Outbox::attempt_send`] resolves its target, fills defaults, runs the
//! before-send hook, guards against double delivery and hands the record
//! to the transport. The outcome is written back to the store (subject and
//! status only) and to the in-memory record.
//!
//! ```text
//! pending ──hook fails──▶ dataProblem
//!    │
//!    ├──transport fails──▶ sendError
//!    └──transport ok─────▶ sent ──(force)──▶ sent
//! ```

use serde_json::{json, Map, Value};
use std::fmt;
#[cfg(feature = "metrics")]
use std::time::Instant;
use tracing::Instrument;

use crate::defaults::apply_defaults;
use crate::error::OutboxError;
use crate::outbox::Outbox;
use crate::record::{EmailRecord, RecordId, Status};
use crate::settings::DispatchMode;
use crate::store::SaveOptions;
use crate::subject::default_subject;
use crate::template::RenderVars;
use crate::transport::DeferredRequest;

/// What to dispatch.
#[derive(Debug)]
pub enum Target<'a> {
    /// A record in memory. It is updated with the outcome.
    Record(&'a mut EmailRecord),
    /// A stored record, loaded by id.
    Id(RecordId),
}

impl Target<'_> {
    fn id(&self) -> Option<RecordId> {
        match self {
            Self::Record(record) => record.id,
            Self::Id(id) => Some(*id),
        }
    }
}

/// Result of a dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The transport accepted the message.
    Sent,
    /// Stored but not dispatched yet, with the status it was stored under.
    Queued(Status),
    /// The before-send hook refused the record.
    DataProblem,
    /// The transport attempted delivery and failed.
    SendError,
    /// Refused because the record was already sent.
    AlreadySent,
}

impl Outcome {
    /// The record status this outcome leaves behind.
    pub fn status(&self) -> Status {
        match self {
            Self::Sent | Self::AlreadySent => Status::Sent,
            Self::Queued(status) => *status,
            Self::DataProblem => Status::DataProblem,
            Self::SendError => Status::SendError,
        }
    }

    /// True only if this attempt delivered the message.
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }

    /// True if the record was delivered or stored for later.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Sent | Self::Queued(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Queued(_) => "queued",
            Self::DataProblem => "dataProblem",
            Self::SendError => "sendError",
            Self::AlreadySent => "alreadySent",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Outbox {
    /// Try to deliver one record.
    ///
    /// A record that is already `sent` is only delivered again with
    /// `force`. Hard failures (no target, unknown id, unreadable store) are
    /// returned as errors; everything else is an [`Outcome`].
    pub async fn attempt_send(
        &mut self,
        target: Option<Target<'_>>,
        force: bool,
    ) -> Result<Outcome, OutboxError> {
        let target = target.ok_or(OutboxError::NoTarget)?;

        let span = tracing::info_span!(
            "outbox.dispatch",
            record_type = %self.record_type,
            id = ?target.id(),
            force = force,
        );

        #[cfg(feature = "metrics")]
        let start = Instant::now();

        let result = self.dispatch(target, force).instrument(span).await;

        #[cfg(feature = "metrics")]
        {
            let duration = start.elapsed().as_secs_f64();
            let status = match &result {
                Ok(outcome) => outcome.as_str(),
                Err(_) => "error",
            };
            metrics::counter!(
                "outbox_dispatch_total",
                "record_type" => self.record_type.clone(),
                "status" => status
            )
            .increment(1);
            metrics::histogram!(
                "outbox_dispatch_duration_seconds",
                "record_type" => self.record_type.clone()
            )
            .record(duration);
        }

        result
    }

    async fn dispatch(&mut self, target: Target<'_>, force: bool) -> Result<Outcome, OutboxError> {
        let mut loaded;
        let record: &mut EmailRecord = match target {
            Target::Record(record) => record,
            Target::Id(id) => {
                loaded = self.load(id)?.ok_or(OutboxError::RecordNotFound(id))?;
                &mut loaded
            }
        };

        if record.subject.is_empty() {
            if let Some(template) = &record.template {
                record.subject = default_subject(template, self.catalog.as_ref());
            }
        }

        record
            .data
            .insert("id".to_string(), record.id.map_or(Value::Null, Value::from));

        apply_defaults(record, &self.settings, self.env.as_ref());

        if let Err(e) = self.hook.before_send(record) {
            tracing::warn!(error = %e, "Record refused before send");
            self.mark_data_problem(record);
            return Ok(Outcome::DataProblem);
        }

        if record.status == Status::Sent && !force {
            tracing::warn!("Email already sent");
            self.errors.push(OutboxError::AlreadySent(record.id));
            return Ok(Outcome::AlreadySent);
        }

        let delivered = match self.settings.dispatch_mode {
            DispatchMode::Deferred => {
                self.transport
                    .deferred_send(DeferredRequest::from(&*record))
                    .await
            }
            DispatchMode::Direct => self.direct_send(record).await?,
        };

        let (status, outcome) = if delivered {
            (Status::Sent, Outcome::Sent)
        } else {
            tracing::error!(
                error = ?self.transport.last_error().map(ToString::to_string),
                "Dispatch failed"
            );
            (Status::SendError, Outcome::SendError)
        };

        self.record_outcome(record, status);
        Ok(outcome)
    }

    async fn direct_send(&mut self, record: &EmailRecord) -> Result<bool, OutboxError> {
        let settings = &self.settings;
        let transport = &mut self.transport;

        transport.reset();
        if let Some(layout) = &record.layout {
            transport.set_layout(layout.as_str());
        }
        if let Err(e) = transport.configure(&settings.delivery, &settings.config) {
            tracing::error!(delivery = %settings.delivery, error = %e, "Transport configuration failed");
        }
        transport.set_charset(settings.charset.as_str());
        if !settings.x_mailer.is_empty() {
            transport.set_header("X-Mailer", settings.x_mailer.as_str());
        }

        if let Some(template) = record.template.as_ref().filter(|t| !t.is_empty()) {
            transport.set_template(template.as_str());
        }
        if let Some(from) = &record.from {
            transport.set_from(from.clone());
        }
        if let Some(to) = &record.to {
            transport.set_to(to.clone());
        }
        if let Some(reply_to) = &record.reply_to {
            transport.set_reply_to(reply_to.clone());
        }
        if let Some(cc) = record.cc.as_ref().filter(|cc| !cc.is_empty()) {
            transport.set_cc(cc.clone());
        }
        if let Some(bcc) = record.bcc.as_ref().filter(|bcc| !bcc.is_empty()) {
            transport.set_bcc(bcc.clone());
        }
        if !record.subject.is_empty() {
            transport.set_subject(record.subject.as_str());
        }
        transport.set_format(record.send_as.unwrap_or(settings.send_as));

        let data: Map<String, Value> = record
            .data
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        transport.set_vars(RenderVars {
            data: Value::Object(data),
            email_data: serde_json::to_value(record)?,
            is_email: true,
        });

        Ok(transport.send().await)
    }

    fn mark_data_problem(&mut self, record: &mut EmailRecord) {
        record.status = Status::DataProblem;

        let (Some(id), Some(store)) = (record.id, self.store.as_ref()) else {
            return;
        };
        if let Err(e) = store.save_field(id, "status", json!(Status::DataProblem.as_str())) {
            tracing::error!(id = id, error = %e, "Failed to record data problem");
            self.errors.push(OutboxError::PersistFailed(e.to_string()));
        }
    }

    fn record_outcome(&mut self, record: &mut EmailRecord, status: Status) {
        let subject = self.transport.last_subject().to_string();
        if !subject.is_empty() {
            record.subject = subject;
        }
        record.status = status;

        let (Some(id), Some(store)) = (record.id, self.store.as_ref()) else {
            return;
        };

        let mut row = Map::new();
        row.insert("subject".into(), Value::String(record.subject.clone()));
        row.insert("status".into(), Value::String(status.as_str().to_string()));

        match store.save(Some(id), row, &SaveOptions::bookkeeping()) {
            Ok(_) => tracing::debug!(id = id, status = %status, "Outcome recorded"),
            Err(e) => {
                tracing::error!(id = id, error = %e, "Failed to record outcome");
                self.errors.push(OutboxError::PersistFailed(e.to_string()));
            }
        }
    }
}

//! The per-record-type outbox: storage, defaults and dispatch in one place.
//!
//! An [`Outbox`] is built for one record type. It owns its
//! [`Transport`], optionally writes through a [`RecordStore`] and keeps an
//! [`ErrorLog`] of everything that went wrong without aborting a call.
//!
//! ```rust,ignore
//! use outbox::prelude::*;
//!
//! let store = MemoryStore::shared();
//! let mut outbox = Outbox::builder("newsletter", Transport::new(renderer).mailer("mail", mailer))
//!     .store_arc(store.clone())
//!     .environment(StaticEnvironment::new("shop").host("example.com"))
//!     .build();
//!
//! let outcome = outbox
//!     .send(EmailRecord::new().to("user@example.com").template("newsletters/weekly"), Status::Pending)
//!     .await?;
//! assert!(outcome.is_sent());
//! ```
//!
//! Operations live next to the concern they implement:
//! [`dispatch`](crate::dispatch) (`attempt_send`), [`queue`](crate::queue)
//! (`drain`, `send_pending`), [`resend`](crate::resend) and
//! [`purge`](crate::purge).

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

use crate::codec;
use crate::defaults::{apply_defaults, Environment, StaticEnvironment};
use crate::dispatch::{Outcome, Target};
use crate::error::{ErrorLog, OutboxError};
use crate::hook::{BeforeSend, RequireRecipient};
use crate::record::{EmailRecord, RecordId, Status};
use crate::settings::{resolve_onto, Settings, SettingsRegistry};
use crate::store::{Criteria, RecordStore, SaveOptions};
use crate::subject::{default_subject, IdentityCatalog, SubjectCatalog};
use crate::transport::Transport;

/// Dispatch engine for one record type.
pub struct Outbox {
    pub(crate) record_type: String,
    pub(crate) settings: Settings,
    pub(crate) store: Option<Arc<dyn RecordStore>>,
    pub(crate) transport: Transport,
    pub(crate) env: Arc<dyn Environment>,
    pub(crate) catalog: Arc<dyn SubjectCatalog>,
    pub(crate) hook: Arc<dyn BeforeSend>,
    pub(crate) errors: ErrorLog,
}

impl Outbox {
    /// Start building an outbox for `record_type` that delivers through
    /// `transport`.
    pub fn builder(record_type: impl Into<String>, transport: Transport) -> OutboxBuilder {
        OutboxBuilder::new(record_type, transport)
    }

    pub fn record_type(&self) -> &str {
        &self.record_type
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Whether records are persisted.
    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    /// Errors recorded so far, oldest first.
    pub fn errors(&self) -> &[OutboxError] {
        self.errors.entries()
    }

    /// Remove and return the recorded errors.
    pub fn take_errors(&mut self) -> Vec<OutboxError> {
        self.errors.take()
    }

    pub(crate) fn require_store(&self) -> Result<Arc<dyn RecordStore>, OutboxError> {
        self.store
            .clone()
            .ok_or_else(|| OutboxError::Store("no record store attached".into()))
    }

    // =========================================================================
    // Read paths
    // =========================================================================

    /// Records matching `criteria`, decoded.
    pub fn find(&self, criteria: &Criteria) -> Result<Vec<EmailRecord>, OutboxError> {
        self.require_store()?
            .find(criteria)?
            .into_iter()
            .map(codec::decode_row)
            .collect()
    }

    /// The record with this id, decoded.
    pub fn load(&self, id: RecordId) -> Result<Option<EmailRecord>, OutboxError> {
        self.require_store()?
            .load(id)?
            .map(codec::decode_row)
            .transpose()
    }

    // =========================================================================
    // Write paths
    // =========================================================================

    /// Persist `record`, creating it when it has no id.
    ///
    /// Defaults are applied and timestamps stamped. After an update of a
    /// pending record that is due, the record is dispatched when auto-send
    /// is on.
    pub async fn save(&mut self, record: &mut EmailRecord) -> Result<RecordId, OutboxError> {
        let created = record.id.is_none();
        let id = self.persist(record)?;

        if !created
            && self.settings.auto_send
            && record.status == Status::Pending
            && record.is_due(Utc::now())
        {
            let outcome = self
                .attempt_send(Some(Target::Record(&mut *record)), false)
                .await?;
            tracing::debug!(id = id, outcome = %outcome, "Dispatched after update");
        }
        Ok(id)
    }

    /// Store-side half of [`Outbox::save`], without the dispatch.
    pub(crate) fn persist(&mut self, record: &mut EmailRecord) -> Result<RecordId, OutboxError> {
        let store = self.require_store()?;

        apply_defaults(record, &self.settings, self.env.as_ref());
        let now = Utc::now();
        if record.id.is_none() {
            record.ip = record.ip.or_else(|| self.env.client_ip());
            record.created = Some(now);
        }
        record.modified = Some(now);

        let row = codec::encode_record(record)?;
        let id = store.save(record.id, row, &SaveOptions::default())?;
        record.id = Some(id);
        Ok(id)
    }

    /// Store and, when appropriate, immediately dispatch a record.
    ///
    /// With a store attached the record is written first (created, or
    /// updated when it already has an id) with `status`. It is dispatched
    /// right away when auto-send is on, `status` is pending and it has no
    /// send date. Otherwise it waits for [`Outbox::drain`] and
    /// [`Outcome::Queued`] is returned.
    pub async fn send(&mut self, mut record: EmailRecord, status: Status) -> Result<Outcome, OutboxError> {
        let mut stored = false;

        if self.store.is_some() {
            if record.subject.is_empty() {
                if let Some(template) = &record.template {
                    record.subject = default_subject(template, self.catalog.as_ref());
                }
            }
            record.status = status;

            match self.persist(&mut record) {
                Ok(id) => {
                    tracing::debug!(record_type = %self.record_type, id = id, "Record stored");
                    stored = true;
                }
                Err(e) => {
                    tracing::error!(record_type = %self.record_type, error = %e, "Failed to store record");
                    self.errors.push(OutboxError::PersistFailed(e.to_string()));
                }
            }
        } else {
            record.status = status;
        }

        if self.settings.auto_send && status == Status::Pending && record.send_date.is_none() {
            return self.attempt_send(Some(Target::Record(&mut record)), false).await;
        }

        if stored {
            Ok(Outcome::Queued(status))
        } else {
            Err(OutboxError::PersistFailed(format!(
                "{} record neither stored nor dispatched",
                self.record_type
            )))
        }
    }
}

/// Builder for [`Outbox`].
pub struct OutboxBuilder {
    record_type: String,
    settings: Settings,
    store: Option<Arc<dyn RecordStore>>,
    transport: Transport,
    env: Arc<dyn Environment>,
    catalog: Arc<dyn SubjectCatalog>,
    hook: Arc<dyn BeforeSend>,
}

impl OutboxBuilder {
    pub fn new(record_type: impl Into<String>, transport: Transport) -> Self {
        Self {
            record_type: record_type.into(),
            settings: Settings::default(),
            store: None,
            transport,
            env: Arc::new(StaticEnvironment::from_env()),
            catalog: Arc::new(IdentityCatalog),
            hook: Arc::new(RequireRecipient),
        }
    }

    /// Use fully resolved settings.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Start from the settings `registry` holds for this record type, or
    /// the defaults if the type was never configured there. Later
    /// [`overrides`](Self::overrides) apply on top.
    pub fn registry(mut self, registry: &SettingsRegistry) -> Self {
        self.settings = Settings::clone(&registry.get(&self.record_type));
        self
    }

    /// Merge an override map onto the current settings.
    pub fn overrides(mut self, overrides: &Value) -> Self {
        self.settings = resolve_onto(&self.settings, &self.record_type, overrides);
        self
    }

    /// Persist records in `store`. Without a store the outbox is tableless.
    pub fn store(mut self, store: impl RecordStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn store_arc(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn environment(mut self, env: impl Environment + 'static) -> Self {
        self.env = Arc::new(env);
        self
    }

    pub fn catalog(mut self, catalog: impl SubjectCatalog + 'static) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    /// Replace the before-send hook. The default requires a valid recipient.
    pub fn hook(mut self, hook: impl BeforeSend + 'static) -> Self {
        self.hook = Arc::new(hook);
        self
    }

    pub fn build(self) -> Outbox {
        tracing::debug!(
            record_type = %self.record_type,
            delivery = %self.settings.delivery,
            tableless = self.store.is_none(),
            "Outbox configured"
        );
        Outbox {
            record_type: self.record_type,
            settings: self.settings,
            store: self.store,
            transport: self.transport,
            env: self.env,
            catalog: self.catalog,
            hook: self.hook,
            errors: ErrorLog::new(),
        }
    }
}

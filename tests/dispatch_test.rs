//! Dispatch engine tests: single sends through an outbox.

#![cfg(feature = "local")]

use serde_json::json;
use std::sync::Arc;

use outbox::providers::LocalMailer;
use outbox::testing::*;
use outbox::{
    Conditions, Criteria, EmailRecord, MemoryStore, Outbox, OutboxError, Outcome, QueueDispatcher,
    RecordId, RecordStore, RenderRequest, Rendered, Row, SaveOptions, SettingsRegistry,
    StaticEnvironment, Status, Target, Transport,
};

// ============================================================================
// Helpers
// ============================================================================

fn renderer(request: &RenderRequest<'_>) -> Result<Rendered, OutboxError> {
    Ok(Rendered {
        text: Some(format!("{} for record {}", request.template, request.vars.data["id"])),
        html: None,
    })
}

fn transport(mailer: &LocalMailer) -> Transport {
    Transport::new(renderer).mailer("mail", mailer.clone())
}

fn env() -> StaticEnvironment {
    StaticEnvironment::new("shop").host("example.com")
}

fn stored_outbox(store: Arc<MemoryStore>, mailer: &LocalMailer) -> Outbox {
    Outbox::builder("users", transport(mailer))
        .store_arc(store)
        .environment(env())
        .build()
}

fn welcome() -> EmailRecord {
    EmailRecord::new()
        .to("user@example.com")
        .template("users/welcome")
        .assign("name", "Alice")
}

/// Store that refuses partial (bookkeeping) writes.
struct BookkeepingFails {
    inner: MemoryStore,
}

impl RecordStore for BookkeepingFails {
    fn find(&self, criteria: &Criteria) -> Result<Vec<Row>, OutboxError> {
        self.inner.find(criteria)
    }

    fn load(&self, id: RecordId) -> Result<Option<Row>, OutboxError> {
        self.inner.load(id)
    }

    fn save(
        &self,
        id: Option<RecordId>,
        row: Row,
        options: &SaveOptions,
    ) -> Result<RecordId, OutboxError> {
        if options.fields.is_some() {
            return Err(OutboxError::Store("disk full".into()));
        }
        self.inner.save(id, row, options)
    }

    fn save_field(
        &self,
        id: RecordId,
        column: &str,
        value: serde_json::Value,
    ) -> Result<bool, OutboxError> {
        self.inner.save_field(id, column, value)
    }

    fn delete_all(&self, conditions: &Conditions) -> Result<usize, OutboxError> {
        self.inner.delete_all(conditions)
    }
}

// ============================================================================
// Tableless
// ============================================================================

#[tokio::test]
async fn tableless_send_delivers_once() {
    let mailer = LocalMailer::new();
    let mut outbox = Outbox::builder("contact", transport(&mailer))
        .environment(env())
        .build();

    let outcome = outbox.send(welcome(), Status::Pending).await.unwrap();

    assert!(outcome.is_sent());
    assert!(!outbox.has_store());
    assert_email_count(&mailer, 1);
    assert_email_to(&mailer, "user@example.com");
    assert_email_from(&mailer, "system@example.com");
    assert_email_text_contains(&mailer, "users/welcome for record null");
    assert!(outbox.errors().is_empty());
}

#[tokio::test]
async fn tableless_send_with_auto_send_off_fails() {
    let mailer = LocalMailer::new();
    let mut outbox = Outbox::builder("contact", transport(&mailer))
        .overrides(&json!({"auto_send": false}))
        .build();

    let result = outbox.send(welcome(), Status::Pending).await;

    assert!(matches!(result, Err(OutboxError::PersistFailed(_))));
    assert_no_emails_sent(&mailer);
}

// ============================================================================
// Table-backed
// ============================================================================

#[tokio::test]
async fn stored_pending_record_becomes_sent() {
    let store = MemoryStore::shared();
    let mailer = LocalMailer::new();
    let mut outbox = stored_outbox(store.clone(), &mailer);

    let outcome = outbox.send(welcome(), Status::Pending).await.unwrap();

    assert_eq!(outcome, Outcome::Sent);
    assert_eq!(store.count(), 1);
    assert_record_status(&outbox, 1, Status::Sent);

    let record = outbox.load(1).unwrap().unwrap();
    assert_eq!(record.subject, "Users Welcome");
    assert_email_subject(&mailer, "Users Welcome");
    assert_email_text_contains(&mailer, "for record 1");
    assert_email_header(&mailer, "X-Mailer", "Outbox Mailer");
}

#[tokio::test]
async fn logger_delivery_marks_records_sent() {
    let registry = SettingsRegistry::new();
    registry.configure("users", &json!({"delivery": "logger"}));

    let mut outbox = Outbox::builder("users", Transport::new(renderer))
        .registry(&registry)
        .store(MemoryStore::new())
        .environment(env())
        .build();

    let outcome = outbox.send(welcome(), Status::Pending).await.unwrap();

    assert_eq!(outcome, Outcome::Sent);
    assert_eq!(outbox.transport().provider_name(), Some("logger"));
    let delivery = outbox.transport().last_delivery().unwrap();
    assert!(delivery.message_id.starts_with("logged-"));
    assert_record_status(&outbox, 1, Status::Sent);
    assert!(outbox.errors().is_empty());
}

#[tokio::test]
async fn already_sent_is_refused_without_force() {
    let store = MemoryStore::shared();
    let mailer = LocalMailer::new();
    let mut outbox = stored_outbox(store, &mailer);

    outbox.send(welcome(), Status::Pending).await.unwrap();
    assert_email_count(&mailer, 1);

    let outcome = outbox.attempt_send(Some(Target::Id(1)), false).await.unwrap();
    assert_eq!(outcome, Outcome::AlreadySent);
    assert!(!outcome.is_sent());
    assert_email_count(&mailer, 1);
    assert_record_status(&outbox, 1, Status::Sent);
    assert_error_logged(&outbox, |e| *e == OutboxError::AlreadySent(Some(1)));

    let outcome = outbox.attempt_send(Some(Target::Id(1)), true).await.unwrap();
    assert_eq!(outcome, Outcome::Sent);
    assert_email_count(&mailer, 2);
}

#[tokio::test]
async fn rejected_record_is_marked_data_problem() {
    let store = MemoryStore::shared();
    let mailer = LocalMailer::new();
    let mut outbox = stored_outbox(store, &mailer);

    let mut record = EmailRecord::new().template("users/welcome");
    let id = outbox.save(&mut record).await.unwrap();

    let outcome = outbox.attempt_send(Some(Target::Id(id)), false).await.unwrap();

    assert_eq!(outcome, Outcome::DataProblem);
    assert_record_status(&outbox, id, Status::DataProblem);
    assert_no_emails_sent(&mailer);
}

#[tokio::test]
async fn custom_hook_can_reject() {
    let mailer = LocalMailer::new();
    let mut outbox = Outbox::builder("contact", transport(&mailer))
        .hook(|record: &mut EmailRecord| {
            if record.data.contains_key("name") {
                Ok(())
            } else {
                Err(OutboxError::ValidationFailed("name is required".into()))
            }
        })
        .build();

    let mut record = EmailRecord::new().to("user@example.com");
    let outcome = outbox
        .attempt_send(Some(Target::Record(&mut record)), false)
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::DataProblem);
    assert_eq!(record.status, Status::DataProblem);
}

#[tokio::test]
async fn transport_failure_is_send_error() {
    let store = MemoryStore::shared();
    let mailer = LocalMailer::new();
    mailer.set_failure("connection refused");
    let mut outbox = stored_outbox(store, &mailer);

    let outcome = outbox.send(welcome(), Status::Pending).await.unwrap();

    assert_eq!(outcome, Outcome::SendError);
    assert_record_status(&outbox, 1, Status::SendError);
    assert!(matches!(
        outbox.transport().last_error(),
        Some(OutboxError::SendError(_))
    ));
}

#[tokio::test]
async fn failed_bookkeeping_write_is_logged() {
    let mailer = LocalMailer::new();
    let mut outbox = Outbox::builder("users", transport(&mailer))
        .store(BookkeepingFails {
            inner: MemoryStore::new(),
        })
        .build();

    let outcome = outbox.send(welcome(), Status::Pending).await.unwrap();

    assert!(outcome.is_sent());
    assert_email_count(&mailer, 1);
    assert_error_logged(&outbox, |e| matches!(e, OutboxError::PersistFailed(_)));
    // Status stays as it was stored.
    assert_record_status(&outbox, 1, Status::Pending);
}

fn code_renderer(request: &RenderRequest<'_>) -> Result<Rendered, OutboxError> {
    Ok(Rendered {
        text: Some(format!("code={}", request.vars.data["code"])),
        html: None,
    })
}

#[tokio::test]
async fn payload_strings_that_look_encoded_are_delivered_verbatim() {
    let store = MemoryStore::shared();
    let mailer = LocalMailer::new();
    let mut outbox = Outbox::builder(
        "users",
        Transport::new(code_renderer).mailer("mail", mailer.clone()),
    )
    .store_arc(store)
    .environment(env())
    .build();

    let mut record = EmailRecord::new()
        .to("user@example.com")
        .template("users/code")
        .assign("code", "a:[1]");
    let outcome = outbox
        .attempt_send(Some(Target::Record(&mut record)), false)
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Sent);
    assert_eq!(record.data["code"], json!("a:[1]"));
    assert_email_text_contains(&mailer, r#"code="a:[1]""#);

    outbox.send(record, Status::Pending).await.unwrap();
    let stored = outbox.load(1).unwrap().unwrap();
    assert_eq!(stored.data["code"], json!("a:[1]"));

    let outcome = outbox.attempt_send(Some(Target::Id(1)), true).await.unwrap();
    assert_eq!(outcome, Outcome::Sent);
    assert_email_text_contains(&mailer, r#"code="a:[1]""#);
    assert_eq!(mailer.email_count(), 3);
}

// ============================================================================
// Deferred mode
// ============================================================================

#[tokio::test]
async fn deferred_mode_hands_off_without_delivering() {
    let store = MemoryStore::shared();
    let mailer = LocalMailer::new();
    let queue = QueueDispatcher::shared();
    let mut outbox = Outbox::builder("users", transport(&mailer).deferred(Arc::clone(&queue)))
        .store_arc(store)
        .environment(env())
        .overrides(&json!({"dispatch_mode": "deferred"}))
        .build();

    let outcome = outbox.send(welcome(), Status::Pending).await.unwrap();

    assert_eq!(outcome, Outcome::Sent);
    assert_no_emails_sent(&mailer);
    assert_record_status(&outbox, 1, Status::Sent);

    let request = queue.pop().unwrap();
    assert_eq!(request.to.unwrap().email, "user@example.com");
    assert_eq!(request.subject, "Users Welcome");
    assert_eq!(request.template.as_deref(), Some("users/welcome"));
    assert_eq!(request.data["id"], json!(1));
    assert!(queue.is_empty());
}

#[tokio::test]
async fn deferred_mode_without_dispatcher_is_send_error() {
    let mailer = LocalMailer::new();
    let mut outbox = Outbox::builder("users", transport(&mailer))
        .overrides(&json!({"dispatch_mode": "deferred"}))
        .build();

    let outcome = outbox.send(welcome(), Status::Pending).await.unwrap();
    assert_eq!(outcome, Outcome::SendError);
}

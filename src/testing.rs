//! Assertion helpers for tests that send through an outbox.
//!
//! Message assertions work on a [`LocalMailer`]; record assertions work on
//! the [`Outbox`] itself.
//!
//! # Example
//!
//! ```rust,ignore
//! use outbox::providers::LocalMailer;
//! use outbox::testing::*;
//!
//! #[tokio::test]
//! async fn test_welcome_flow() {
//!     let mailer = LocalMailer::new();
//!     let mut outbox = /* ... built with mailer.clone() ... */;
//!
//!     let outcome = outbox.send(record, Status::Pending).await.unwrap();
//!
//!     assert_email_to(&mailer, "user@example.com");
//!     assert_email_subject_matches(&mailer, r"^Welcome");
//!     assert_record_status(&outbox, 1, Status::Sent);
//! }
//! ```

use regex::Regex;

use crate::error::OutboxError;
use crate::message::Message;
use crate::outbox::Outbox;
use crate::providers::{LocalMailer, SentMessage};
use crate::record::{RecordId, Status};

// ============================================================================
// Helper Functions
// ============================================================================

/// Format a list of messages for error messages.
fn format_summary(sent: &[SentMessage]) -> String {
    if sent.is_empty() {
        return "  (no emails sent)".to_string();
    }

    sent.iter()
        .enumerate()
        .map(|(i, sent)| {
            let m = &sent.message;
            let to = m
                .to
                .iter()
                .map(|a| a.email.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            let from = m
                .from
                .as_ref()
                .map(|a| a.email.as_str())
                .unwrap_or("<none>");
            format!("  {}. To: [{}], From: {}, Subject: \"{}\"", i + 1, to, from, m.subject)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn last_sent(mailer: &LocalMailer) -> SentMessage {
    mailer
        .last_message()
        .expect("Expected at least one email to be sent, but none were sent")
}

fn excerpt(body: &str) -> &str {
    let end = body
        .char_indices()
        .nth(500)
        .map_or(body.len(), |(i, _)| i);
    &body[..end]
}

// ============================================================================
// Message Assertions
// ============================================================================

/// Assert that at least one email was sent.
///
/// # Panics
///
/// Panics if no emails were sent.
pub fn assert_email_sent(mailer: &LocalMailer) {
    assert!(
        mailer.has_emails(),
        "Expected at least one email to be sent, but none were sent"
    );
}

/// Assert that no emails were sent.
///
/// # Panics
///
/// Panics if any email was sent.
pub fn assert_no_emails_sent(mailer: &LocalMailer) {
    let sent = mailer.emails();
    assert!(
        sent.is_empty(),
        "Expected no emails to be sent, but {} were sent.\n\nEmails sent:\n{}",
        sent.len(),
        format_summary(&sent)
    );
}

/// Assert that exactly N emails were sent.
///
/// # Panics
///
/// Panics if the count doesn't match.
pub fn assert_email_count(mailer: &LocalMailer, expected: usize) {
    let actual = mailer.email_count();
    assert!(
        actual == expected,
        "Expected {} email(s) to be sent, but {} were sent.\n\nEmails sent:\n{}",
        expected,
        actual,
        format_summary(&mailer.emails())
    );
}

/// Assert that an email was sent to a specific address.
pub fn assert_email_to(mailer: &LocalMailer, email: &str) {
    assert!(
        mailer.sent_to(email),
        "Expected an email to be sent to '{}'.\n\nEmails sent:\n{}",
        email,
        format_summary(&mailer.emails())
    );
}

/// Assert that no email was sent to a specific address.
pub fn assert_no_emails_to(mailer: &LocalMailer, email: &str) {
    let sent = mailer.emails();
    let found = sent.iter().find(|sent| {
        sent.message
            .to
            .iter()
            .any(|a| a.email.eq_ignore_ascii_case(email))
    });

    if let Some(found) = found {
        panic!(
            "Expected no email to be sent to '{}', but found one.\n\nMatching email:\n  Subject: \"{}\"\n\nAll emails:\n{}",
            email,
            found.message.subject,
            format_summary(&sent)
        );
    }
}

/// Assert that an email with the exact subject was sent.
pub fn assert_email_subject(mailer: &LocalMailer, subject: &str) {
    assert!(
        mailer.sent_with_subject(subject),
        "Expected an email with subject '{}'.\n\nEmails sent:\n{}",
        subject,
        format_summary(&mailer.emails())
    );
}

/// Assert that an email matching a predicate was sent.
pub fn assert_email_matches<F>(mailer: &LocalMailer, predicate: F)
where
    F: Fn(&Message) -> bool,
{
    assert!(
        !mailer.find_emails(predicate).is_empty(),
        "Expected an email matching the predicate, but none was found.\n\nEmails sent:\n{}",
        format_summary(&mailer.emails())
    );
}

/// Assert the last email was sent from a specific address.
pub fn assert_email_from(mailer: &LocalMailer, from_email: &str) {
    let last = last_sent(mailer);
    let actual = last
        .message
        .from
        .as_ref()
        .map(|a| a.email.as_str())
        .unwrap_or("<none>");

    assert!(
        actual.eq_ignore_ascii_case(from_email),
        "Expected last email from '{}', but was from '{}'",
        from_email,
        actual
    );
}

/// Assert the last email carries a header with this value.
pub fn assert_email_header(mailer: &LocalMailer, name: &str, value: &str) {
    let last = last_sent(mailer);
    let actual = last.message.headers.get(name).map(String::as_str);

    assert!(
        actual == Some(value),
        "Expected header '{}: {}', but found {:?}.\n\nLast email:\n{}",
        name,
        value,
        actual,
        format_summary(&[last.clone()])
    );
}

/// Assert the last email has text body containing text.
pub fn assert_email_text_contains(mailer: &LocalMailer, text: &str) {
    let last = last_sent(mailer);
    let body = last.message.text_body.as_deref().unwrap_or("");

    assert!(
        body.contains(text),
        "Expected text body to contain '{}', but it didn't.\n\nText body (first 500 chars):\n{}",
        text,
        excerpt(body)
    );
}

/// Assert the last email has HTML body containing text.
pub fn assert_email_html_contains(mailer: &LocalMailer, text: &str) {
    let last = last_sent(mailer);
    let html = last.message.html_body.as_deref().unwrap_or("");

    assert!(
        html.contains(text),
        "Expected HTML body to contain '{}', but it didn't.\n\nHTML body (first 500 chars):\n{}",
        text,
        excerpt(html)
    );
}

// ============================================================================
// Regex Matching
// ============================================================================

/// Assert the last email subject matches a regex pattern.
///
/// # Panics
///
/// Panics if no email was sent, the pattern is invalid or the subject
/// doesn't match.
pub fn assert_email_subject_matches(mailer: &LocalMailer, pattern: &str) {
    let last = last_sent(mailer);
    let re = Regex::new(pattern).expect("Invalid regex pattern");

    assert!(
        re.is_match(&last.message.subject),
        "Expected subject to match pattern '{}', but was '{}'",
        pattern,
        last.message.subject
    );
}

/// Assert the last email text body matches a regex pattern.
pub fn assert_email_text_matches(mailer: &LocalMailer, pattern: &str) {
    let last = last_sent(mailer);
    let text = last.message.text_body.as_deref().unwrap_or("");
    let re = Regex::new(pattern).expect("Invalid regex pattern");

    assert!(
        re.is_match(text),
        "Expected text body to match pattern '{}', but it didn't.\n\nText body (first 500 chars):\n{}",
        pattern,
        excerpt(text)
    );
}

/// Assert the last email HTML body matches a regex pattern.
pub fn assert_email_html_matches(mailer: &LocalMailer, pattern: &str) {
    let last = last_sent(mailer);
    let html = last.message.html_body.as_deref().unwrap_or("");
    let re = Regex::new(pattern).expect("Invalid regex pattern");

    assert!(
        re.is_match(html),
        "Expected HTML body to match pattern '{}', but it didn't.\n\nHTML body (first 500 chars):\n{}",
        pattern,
        excerpt(html)
    );
}

// ============================================================================
// Record Assertions
// ============================================================================

/// Assert the stored record `id` has `status`.
///
/// # Panics
///
/// Panics if the outbox has no store, the record is missing or its status
/// differs.
pub fn assert_record_status(outbox: &Outbox, id: RecordId, status: Status) {
    let record = outbox
        .load(id)
        .expect("Expected a readable record store")
        .unwrap_or_else(|| panic!("Expected record {} to exist", id));

    assert!(
        record.status == status,
        "Expected record {} to be '{}', but it is '{}'",
        id,
        status,
        record.status
    );
}

/// Assert the outbox recorded an error matching `predicate`.
pub fn assert_error_logged<F>(outbox: &Outbox, predicate: F)
where
    F: Fn(&OutboxError) -> bool,
{
    assert!(
        outbox.errors().iter().any(predicate),
        "Expected a matching error in the outbox log, but found: {:?}",
        outbox.errors()
    );
}

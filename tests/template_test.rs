//! Rendering through Tera templates end to end.

#![cfg(all(feature = "templates", feature = "local"))]

use outbox::providers::LocalMailer;
use outbox::testing::*;
use outbox::{
    EmailRecord, MemoryStore, Outbox, Outcome, SendAs, StaticEnvironment, Status, TeraRenderer,
    Transport,
};

fn renderer() -> TeraRenderer {
    TeraRenderer::from_raw([
        (
            "users/welcome.txt",
            "Hello {{ data.name }}, your reference is {{ data.id }}.",
        ),
        (
            "users/welcome.html",
            "<p>Hello {{ data.name }}</p>{% if is_email %}<p>{{ email_data.subject }}</p>{% endif %}",
        ),
        ("layouts/default.html", "<html><body>{{ content | safe }}</body></html>"),
        ("layouts/plain.txt", "{{ content | safe }}\n-- \nThe Shop"),
    ])
    .unwrap()
}

fn outbox(mailer: &LocalMailer) -> Outbox {
    Outbox::builder(
        "users",
        Transport::new(renderer()).mailer("mail", mailer.clone()),
    )
    .store(MemoryStore::new())
    .environment(StaticEnvironment::new("shop").host("shop.example.com"))
    .build()
}

#[tokio::test]
async fn renders_both_bodies_inside_the_default_layout() {
    let mailer = LocalMailer::new();
    let mut outbox = outbox(&mailer);

    let record = EmailRecord::new()
        .to("alice@example.com")
        .template("users/welcome")
        .send_as(SendAs::Both)
        .assign("name", "Alice");
    let outcome = outbox.send(record, Status::Pending).await.unwrap();

    assert_eq!(outcome, Outcome::Sent);
    assert_email_text_contains(&mailer, "Hello Alice, your reference is 1.");
    assert_email_html_contains(&mailer, "<html><body><p>Hello Alice</p>");
    assert_email_html_contains(&mailer, "<p>Users Welcome</p>");
    assert_email_from(&mailer, "system@shop.example.com");
}

#[tokio::test]
async fn custom_layout_wraps_text_only() {
    let mailer = LocalMailer::new();
    let mut outbox = outbox(&mailer);

    let record = EmailRecord::new()
        .to("bob@example.com")
        .template("users/welcome")
        .layout("plain")
        .send_as(SendAs::Text)
        .assign("name", "Bob");
    outbox.send(record, Status::Pending).await.unwrap();

    assert_email_text_matches(&mailer, r"(?s)^Hello Bob.*The Shop$");
    assert_email_matches(&mailer, |m| m.html_body.is_none());
}

#[tokio::test]
async fn missing_template_is_a_send_error() {
    let mailer = LocalMailer::new();
    let mut outbox = outbox(&mailer);

    let record = EmailRecord::new()
        .to("carol@example.com")
        .template("users/missing");
    let outcome = outbox.send(record, Status::Pending).await.unwrap();

    assert_eq!(outcome, Outcome::SendError);
    assert_no_emails_sent(&mailer);
    assert_record_status(&outbox, 1, Status::SendError);
}

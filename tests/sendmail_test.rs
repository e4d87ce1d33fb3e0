//! Delivery through the default `mail` transport.

#![cfg(all(unix, feature = "smtp"))]

use serde_json::json;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use outbox::{
    EmailRecord, Outbox, OutboxError, Outcome, RenderRequest, Rendered, StaticEnvironment, Status,
    Transport,
};

fn renderer(_: &RenderRequest<'_>) -> Result<Rendered, OutboxError> {
    Ok(Rendered {
        text: Some("Welcome aboard".into()),
        html: None,
    })
}

/// A sendmail stand-in that copies the message into `sink`.
fn fake_sendmail(sink: &PathBuf) -> PathBuf {
    let script = std::env::temp_dir().join(format!("outbox-sendmail-{}.sh", uuid::Uuid::new_v4()));
    fs::write(&script, format!("#!/bin/sh\ncat > '{}'\n", sink.display())).unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    script
}

#[tokio::test]
async fn default_settings_deliver_through_sendmail() {
    let sink = std::env::temp_dir().join(format!("outbox-sink-{}.eml", uuid::Uuid::new_v4()));
    let script = fake_sendmail(&sink);

    let mut outbox = Outbox::builder("contact", Transport::new(renderer))
        .environment(StaticEnvironment::new("shop").host("example.com"))
        .overrides(&json!({"config": {"command": script.display().to_string()}}))
        .build();
    assert_eq!(outbox.settings().delivery, "mail");

    let record = EmailRecord::new()
        .to("user@example.com")
        .subject("Welcome")
        .template("contact/welcome");
    let outcome = outbox.send(record, Status::Pending).await.unwrap();

    assert_eq!(outcome, Outcome::Sent);
    assert_eq!(outbox.transport().provider_name(), Some("mail"));

    let delivered = fs::read_to_string(&sink).unwrap();
    assert!(delivered.contains("Subject: Welcome"));
    assert!(delivered.contains("user@example.com"));
    assert!(delivered.contains("Welcome aboard"));

    let _ = fs::remove_file(&script);
    let _ = fs::remove_file(&sink);
}

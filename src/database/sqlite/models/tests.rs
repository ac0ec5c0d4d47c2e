use chrono::Utc;

use super::*;

#[test]
fn email_status_display() {
    assert_eq!(EmailStatus::Pending.to_string(), "Pending");
    assert_eq!(EmailStatus::Indexed.to_string(), "Indexed");
    assert_eq!(EmailStatus::Failed.to_string(), "Failed");
}

#[test]
fn email_status_db_values() {
    assert_eq!(EmailStatus::Pending.as_db_str(), "pending");
    assert_eq!(EmailStatus::Indexed.as_db_str(), "indexed");
    assert_eq!(EmailStatus::Failed.as_db_str(), "failed");
}

#[test]
fn email_status_predicates() {
    let email = EmailMessage {
        id: 1,
        gmail_id: "abc123".to_string(),
        sender: "news@example.com".to_string(),
        subject: "Weekly digest".to_string(),
        received_date: Utc::now().naive_utc(),
        body: "cleaned text".to_string(),
        status: EmailStatus::Indexed,
        error_message: None,
        chunk_count: 3,
        fetched_date: Utc::now().naive_utc(),
    };

    assert!(email.is_indexed());
    assert!(!email.is_pending());
    assert!(!email.is_failed());

    let failed = EmailMessage {
        status: EmailStatus::Failed,
        error_message: Some("embedding request failed".to_string()),
        ..email
    };

    assert!(failed.is_failed());
    assert!(!failed.is_indexed());
}

#[test]
fn empty_update_has_no_fields() {
    let update = EmailUpdate::default();
    assert!(update.status.is_none());
    assert!(update.error_message.is_none());
    assert!(update.chunk_count.is_none());
}

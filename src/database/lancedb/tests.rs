use super::*;

#[test]
fn embedding_record_structure() {
    let metadata = EmailChunkMetadata {
        email_id: "42".to_string(),
        sender: "news@example.com".to_string(),
        subject: "Weekly digest".to_string(),
        received_date: "2026-08-20T09:30:00+00:00".to_string(),
        content: "This is test content for the chunk".to_string(),
        token_count: 25,
        chunk_index: 0,
        created_at: "2026-08-21T00:00:00+00:00".to_string(),
    };

    let record = EmbeddingRecord {
        id: "embedding_123".to_string(),
        vector: vec![0.1, 0.2, 0.3],
        metadata,
    };

    assert_eq!(record.id, "embedding_123");
    assert_eq!(record.vector.len(), 3);
    assert_eq!(record.metadata.email_id, "42");
    assert_eq!(record.metadata.token_count, 25);
}

#[test]
fn chunk_metadata_serialization() {
    let metadata = EmailChunkMetadata {
        email_id: "7".to_string(),
        sender: "digest@example.org".to_string(),
        subject: "Test".to_string(),
        received_date: "2026-08-20T09:30:00+00:00".to_string(),
        content: "Test content".to_string(),
        token_count: 10,
        chunk_index: 5,
        created_at: "2026-08-21T00:00:00+00:00".to_string(),
    };

    let json = serde_json::to_string(&metadata).expect("can serialize json");
    let deserialized: EmailChunkMetadata = serde_json::from_str(&json).expect("can parse json");

    assert_eq!(metadata.email_id, deserialized.email_id);
    assert_eq!(metadata.received_date, deserialized.received_date);
}

use super::*;
use tempfile::TempDir;

fn create_test_config() -> (Config, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config::defaults_in(temp_dir.path());
    config.gemini.embedding_dimension = 5;
    (config, temp_dir)
}

fn create_test_embedding_record(id: &str, received_date: &str) -> EmbeddingRecord {
    // Consistent dimensions across tests, with slight per-id variation
    let mut test_vector = vec![0.1, 0.2, 0.3, 0.4, 0.5];
    let id_num: f32 = id.parse().unwrap_or(1.0);
    for (i, val) in test_vector.iter_mut().enumerate() {
        *val += id_num.mul_add(0.01, i as f32 * 0.001);
    }

    EmbeddingRecord {
        id: format!("embedding_{}", id),
        vector: test_vector,
        metadata: EmailChunkMetadata {
            email_id: id.to_string(),
            sender: "news@example.com".to_string(),
            subject: "Test digest".to_string(),
            received_date: received_date.to_string(),
            content: format!("This is test content for chunk {}", id),
            token_count: 25,
            chunk_index: 0,
            created_at: "2026-08-21T00:00:00+00:00".to_string(),
        },
    }
}

#[tokio::test]
async fn vector_store_initialization() {
    let (config, _temp_dir) = create_test_config();

    let result = VectorStore::new(&config).await;
    assert!(
        result.is_ok(),
        "Failed to initialize VectorStore: {:?}",
        result.err()
    );

    let store = result.expect("should get result successfully");
    assert_eq!(store.table_name, "embeddings");
    assert_eq!(store.vector_dimension, Some(5));
}

#[tokio::test]
async fn store_single_embedding() {
    let (config, _temp_dir) = create_test_config();
    let mut store = VectorStore::new(&config)
        .await
        .expect("should create vector store");

    let record = create_test_embedding_record("1", "2026-08-20T09:30:00+00:00");
    let result = store.store_embedding(record).await;

    assert!(
        result.is_ok(),
        "Failed to store embedding: {:?}",
        result.err()
    );

    let count = store
        .count_embeddings()
        .await
        .expect("should count embeddings successfully");
    assert_eq!(count, 1);
}

#[tokio::test]
async fn store_batch_embeddings() {
    let (config, _temp_dir) = create_test_config();
    let mut store = VectorStore::new(&config)
        .await
        .expect("should create vector store");

    let records = vec![
        create_test_embedding_record("1", "2026-08-20T09:30:00+00:00"),
        create_test_embedding_record("2", "2026-08-19T10:00:00+00:00"),
        create_test_embedding_record("3", "2026-08-01T08:00:00+00:00"),
    ];

    let result = store.store_embeddings_batch(records).await;
    assert!(
        result.is_ok(),
        "Failed to store embeddings batch: {:?}",
        result.err()
    );

    let count = store
        .count_embeddings()
        .await
        .expect("should count embeddings successfully");
    assert_eq!(count, 3);
}

#[tokio::test]
async fn search_similar_embeddings() {
    let (config, _temp_dir) = create_test_config();
    let mut store = VectorStore::new(&config)
        .await
        .expect("should create vector store");

    let records = vec![
        create_test_embedding_record("1", "2026-08-20T09:30:00+00:00"),
        create_test_embedding_record("2", "2026-08-19T10:00:00+00:00"),
        create_test_embedding_record("3", "2026-08-01T08:00:00+00:00"),
    ];

    store
        .store_embeddings_batch(records)
        .await
        .expect("should store embeddings successfully");

    let query_vector = vec![0.1, 0.2, 0.3, 0.4, 0.5];
    let results = store
        .search_similar(&query_vector, 10, None)
        .await
        .expect("search should succeed");

    assert!(!results.is_empty(), "Should find similar embeddings");
    assert!(results.len() <= 3, "Should not return more than stored");

    for result in &results {
        assert!(!result.chunk_metadata.email_id.is_empty());
        assert!(!result.chunk_metadata.content.is_empty());
        assert!(result.similarity_score >= 0.0 && result.similarity_score <= 1.0);
    }
}

#[tokio::test]
async fn search_with_date_filter() {
    let (config, _temp_dir) = create_test_config();
    let mut store = VectorStore::new(&config)
        .await
        .expect("should create vector store");

    let records = vec![
        create_test_embedding_record("1", "2026-08-20T09:30:00+00:00"),
        create_test_embedding_record("2", "2026-08-19T10:00:00+00:00"),
        create_test_embedding_record("3", "2026-08-01T08:00:00+00:00"),
    ];

    store
        .store_embeddings_batch(records)
        .await
        .expect("should store embeddings successfully");

    let query_vector = vec![0.1, 0.2, 0.3, 0.4, 0.5];
    let results = store
        .search_similar(&query_vector, 10, Some("2026-08-15T00:00:00+00:00"))
        .await
        .expect("search should succeed");

    assert_eq!(results.len(), 2, "Only recent chunks should match");
    for result in &results {
        assert!(result.chunk_metadata.received_date.as_str() >= "2026-08-15T00:00:00+00:00");
    }
}

#[tokio::test]
async fn delete_email_embeddings() {
    let (config, _temp_dir) = create_test_config();
    let mut store = VectorStore::new(&config)
        .await
        .expect("should create vector store");

    let records = vec![
        create_test_embedding_record("1", "2026-08-20T09:30:00+00:00"),
        create_test_embedding_record("2", "2026-08-19T10:00:00+00:00"),
    ];

    store
        .store_embeddings_batch(records)
        .await
        .expect("should store embeddings successfully");

    store
        .delete_email_embeddings("1")
        .await
        .expect("delete should succeed");

    let query_vector = vec![0.1, 0.2, 0.3, 0.4, 0.5];
    let remaining = store
        .search_similar(&query_vector, 10, None)
        .await
        .expect("search should succeed");

    for result in &remaining {
        assert_eq!(result.chunk_metadata.email_id, "2");
    }
}

#[tokio::test]
async fn empty_batch_handling() {
    let (config, _temp_dir) = create_test_config();
    let mut store = VectorStore::new(&config)
        .await
        .expect("should create vector store");

    let result = store.store_embeddings_batch(vec![]).await;
    assert!(result.is_ok(), "Should handle empty batch gracefully");

    let count = store
        .count_embeddings()
        .await
        .expect("should count embeddings successfully");
    assert_eq!(count, 0);
}

#[tokio::test]
async fn optimize_database() {
    let (config, _temp_dir) = create_test_config();
    let mut store = VectorStore::new(&config)
        .await
        .expect("should create vector store");

    let record = create_test_embedding_record("1", "2026-08-20T09:30:00+00:00");
    store
        .store_embedding(record)
        .await
        .expect("should store embedding successfully");

    let result = store.optimize().await;
    assert!(
        result.is_ok(),
        "Failed to optimize database: {:?}",
        result.err()
    );
}

#[tokio::test]
async fn integrity_check_passes_on_fresh_store() {
    let (config, _temp_dir) = create_test_config();
    let store = VectorStore::new(&config)
        .await
        .expect("should create vector store");

    let healthy = store
        .validate_integrity()
        .await
        .expect("integrity check should run");
    assert!(healthy);
}

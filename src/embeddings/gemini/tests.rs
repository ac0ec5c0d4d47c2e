use super::*;
use crate::config::Config;
use serial_test::serial;
use tempfile::TempDir;

fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::load(dir.path()).expect("load should succeed");
    config.gemini.api_key_env = "MAILGIST_GEMINI_TEST_KEY".to_string();
    config
}

#[test]
#[serial]
fn client_configuration() {
    let dir = TempDir::new().expect("tempdir");
    let mut config = test_config(&dir);
    config.gemini.model = "test-model".to_string();
    config.gemini.embedding_model = "test-embed".to_string();
    config.gemini.batch_size = 32;

    // SAFETY: test is serialized, no concurrent env access
    unsafe {
        std::env::set_var("MAILGIST_GEMINI_TEST_KEY", "fake-key");
    }

    let client = GeminiClient::new(&config).expect("Failed to create client");

    assert_eq!(client.model, "test-model");
    assert_eq!(client.embedding_model, "test-embed");
    assert_eq!(client.batch_size, 32);
    assert_eq!(client.api_key, "fake-key");
    assert_eq!(client.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
    assert_eq!(
        client.base_url.host_str(),
        Some("generativelanguage.googleapis.com")
    );

    // SAFETY: test is serialized, no concurrent env access
    unsafe {
        std::env::remove_var("MAILGIST_GEMINI_TEST_KEY");
    }
}

#[test]
#[serial]
fn client_requires_api_key() {
    let dir = TempDir::new().expect("tempdir");
    let config = test_config(&dir);

    // SAFETY: test is serialized, no concurrent env access
    unsafe {
        std::env::remove_var("MAILGIST_GEMINI_TEST_KEY");
    }

    assert!(GeminiClient::new(&config).is_err());
}

#[test]
#[serial]
fn client_builder_methods() {
    let dir = TempDir::new().expect("tempdir");
    let config = test_config(&dir);

    // SAFETY: test is serialized, no concurrent env access
    unsafe {
        std::env::set_var("MAILGIST_GEMINI_TEST_KEY", "fake-key");
    }

    let base = Url::parse("http://localhost:9999/v1beta/").expect("valid url");
    let client = GeminiClient::new(&config)
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5)
        .with_base_url(base.clone());

    assert_eq!(client.retry_attempts, 5);
    assert_eq!(client.base_url, base);

    // SAFETY: test is serialized, no concurrent env access
    unsafe {
        std::env::remove_var("MAILGIST_GEMINI_TEST_KEY");
    }
}

#[test]
fn model_url_layout() {
    let base = Url::parse("http://localhost:9999/v1beta/").expect("valid url");
    let url = base
        .join("models/text-embedding-004:batchEmbedContents")
        .expect("joinable");
    assert_eq!(
        url.as_str(),
        "http://localhost:9999/v1beta/models/text-embedding-004:batchEmbedContents"
    );
}

#[test]
fn model_names_match_with_prefix() {
    assert!(model_name_matches(
        "models/gemini-2.0-flash",
        "gemini-2.0-flash"
    ));
    assert!(model_name_matches("gemini-2.0-flash", "gemini-2.0-flash"));
    assert!(!model_name_matches(
        "models/gemini-1.5-pro",
        "gemini-2.0-flash"
    ));
}

#[test]
fn embedding_result_structure() {
    let result = EmbeddingResult {
        text: "test text".to_string(),
        embedding: vec![0.1, 0.2, 0.3, 0.4, 0.5],
        token_count: 10,
        chunk_index: Some(0),
    };

    assert_eq!(result.text, "test text");
    assert_eq!(result.embedding.len(), 5);
    assert_eq!(result.token_count, 10);
    assert_eq!(result.chunk_index, Some(0));
}

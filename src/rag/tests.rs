use super::*;
use crate::database::lancedb::EmailChunkMetadata;
use serial_test::serial;
use tempfile::TempDir;

fn search_result(content: &str, similarity: f32) -> SearchResult {
    SearchResult {
        chunk_metadata: EmailChunkMetadata {
            email_id: "1".to_string(),
            sender: "news@example.com".to_string(),
            subject: "Kernel methods".to_string(),
            received_date: "2026-08-20T09:30:00+00:00".to_string(),
            content: content.to_string(),
            token_count: 12,
            chunk_index: 0,
            created_at: "2026-08-21T00:00:00+00:00".to_string(),
        },
        similarity_score: similarity,
        distance: 1.0 - similarity,
    }
}

#[test]
fn question_prompt_includes_question_and_documents() {
    let results = vec![
        search_result("The kernel trick maps data implicitly.", 0.9),
        search_result("SVMs rely on kernels for nonlinearity.", 0.8),
    ];

    let prompt = build_question_prompt("What is the kernel trick?", &results);

    assert!(prompt.starts_with("Question: What is the kernel trick?"));
    assert!(prompt.contains("The kernel trick maps data implicitly."));
    assert!(prompt.contains("SVMs rely on kernels for nonlinearity."));
}

#[test]
fn question_prompt_with_no_documents() {
    let prompt = build_question_prompt("What is a transformer?", &[]);
    assert!(prompt.contains("Question: What is a transformer?"));
    assert!(prompt.contains("Retrieved documents:"));
}

#[test]
fn source_ref_carries_metadata() {
    let result = search_result("content", 0.75);
    let source = source_ref(&result);

    assert_eq!(source.sender, "news@example.com");
    assert_eq!(source.subject, "Kernel methods");
    assert!((source.similarity - 0.75).abs() < f32::EPSILON);
}

#[test]
fn options_from_config_use_configured_top_k() {
    let dir = TempDir::new().expect("tempdir");
    let config = Config::defaults_in(dir.path());

    let options = GenerationOptions::from_config(&config);
    assert_eq!(options.top_k, 2);
    assert!(!options.count_tokens);
    assert!(options.temperature.is_none());
    assert!(options.max_output_tokens.is_none());
}

#[tokio::test]
#[serial]
async fn summarize_empty_window_skips_the_model() {
    let dir = TempDir::new().expect("tempdir");
    let mut config = Config::defaults_in(dir.path());
    config.gemini.api_key_env = "MAILGIST_GEMINI_TEST_KEY".to_string();

    // SAFETY: test is serialized, no concurrent env access
    unsafe {
        std::env::set_var("MAILGIST_GEMINI_TEST_KEY", "fake-key");
    }

    let gemini = GeminiClient::new(&config).expect("client should build");
    let database = Database::initialize_from_config_dir(dir.path())
        .await
        .expect("database should initialize");

    let result = summarize_window(
        &config,
        &gemini,
        &database,
        7,
        GenerationOptions::from_config(&config),
    )
    .await
    .expect("summarize should succeed without emails");

    assert!(result.answer.contains("no emails to summarize"));
    assert!(result.sources.is_empty());
    assert!(result.prompt_tokens.is_none());

    // SAFETY: test is serialized, no concurrent env access
    unsafe {
        std::env::remove_var("MAILGIST_GEMINI_TEST_KEY");
    }
}

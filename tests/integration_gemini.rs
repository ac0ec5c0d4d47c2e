#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Integration tests for the Gemini client, run against a mocked API
// Run with: cargo test --test integration_gemini

use mailgist::config::Config;
use mailgist::embeddings::chunking::EmailChunk;
use mailgist::embeddings::gemini::{GeminiClient, GenerationRequest};
use serde_json::json;
use serial_test::serial;
use url::Url;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY_ENV: &str = "MAILGIST_GEMINI_IT_KEY";

fn set_test_key() {
    // SAFETY: tests are serialized, no concurrent env access
    unsafe {
        std::env::set_var(API_KEY_ENV, "it-fake-key");
    }
}

fn clear_test_key() {
    // SAFETY: tests are serialized, no concurrent env access
    unsafe {
        std::env::remove_var(API_KEY_ENV);
    }
}

fn test_config() -> Config {
    let mut config = Config::defaults_in(std::env::temp_dir());
    config.gemini.api_key_env = API_KEY_ENV.to_string();
    config
}

fn client_for(server: &MockServer) -> GeminiClient {
    let base = Url::parse(&format!("{}/", server.uri())).expect("mock server URI should parse");
    GeminiClient::new(&test_config())
        .expect("client should build")
        .with_base_url(base)
        .with_retry_attempts(2)
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn health_check_passes_when_both_models_are_listed() {
    set_test_key();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/models"))
        .and(header("x-goog-api-key", "it-fake-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                {"name": "models/gemini-2.0-flash", "displayName": "Gemini 2.0 Flash"},
                {"name": "models/text-embedding-004", "displayName": "Text Embedding 004"}
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .expect("task should join");

    assert!(result.is_ok(), "health check should pass: {:?}", result);
    clear_test_key();
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn health_check_fails_when_a_model_is_missing() {
    set_test_key();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                {"name": "models/gemini-2.0-flash", "displayName": "Gemini 2.0 Flash"}
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .expect("task should join");

    let error = result.expect_err("missing embedding model should fail the check");
    assert!(format!("{:#}", error).contains("text-embedding-004"));
    clear_test_key();
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn generates_a_single_embedding() {
    set_test_key();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/text-embedding-004:embedContent"))
        .and(body_partial_json(json!({
            "content": {"parts": [{"text": "support vector machines"}]}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embedding": {"values": [0.1, 0.2, 0.3]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result =
        tokio::task::spawn_blocking(move || client.generate_embedding("support vector machines"))
            .await
            .expect("task should join")
            .expect("embedding should succeed");

    assert_eq!(result.embedding, vec![0.1, 0.2, 0.3]);
    assert_eq!(result.text, "support vector machines");
    assert!(result.token_count > 0);
    assert_eq!(result.chunk_index, None);
    clear_test_key();
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn chunk_embeddings_go_through_one_batch_request() {
    set_test_key();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/text-embedding-004:batchEmbedContents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [
                {"values": [1.0, 0.0]},
                {"values": [0.0, 1.0]}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let chunks = vec![
        EmailChunk {
            content: "First half of the newsletter.".to_string(),
            chunk_index: 0,
            token_count: 7,
        },
        EmailChunk {
            content: "Second half of the newsletter.".to_string(),
            chunk_index: 1,
            token_count: 9,
        },
    ];

    let client = client_for(&server);
    let results = tokio::task::spawn_blocking(move || client.generate_chunk_embeddings(&chunks))
        .await
        .expect("task should join")
        .expect("batch embedding should succeed");

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].embedding, vec![1.0, 0.0]);
    assert_eq!(results[0].chunk_index, Some(0));
    assert_eq!(results[0].token_count, 7);
    assert_eq!(results[1].embedding, vec![0.0, 1.0]);
    assert_eq!(results[1].chunk_index, Some(1));
    assert_eq!(results[1].token_count, 9);
    clear_test_key();
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn generates_content_and_joins_candidate_parts() {
    set_test_key();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-2.0-flash:generateContent"))
        .and(body_partial_json(json!({
            "generationConfig": {"temperature": 0.5, "maxOutputTokens": 500}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {
                    "parts": [
                        {"text": "The kernel trick maps inputs "},
                        {"text": "into a higher-dimensional space."}
                    ]
                }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = GenerationRequest {
        prompt: "What is the kernel trick?".to_string(),
        system_prompt: "You are a helpful assistant.".to_string(),
        temperature: 0.5,
        max_output_tokens: 500,
    };

    let client = client_for(&server);
    let answer = tokio::task::spawn_blocking(move || client.generate_content(&request))
        .await
        .expect("task should join")
        .expect("generation should succeed");

    assert_eq!(
        answer,
        "The kernel trick maps inputs into a higher-dimensional space."
    );
    clear_test_key();
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn empty_candidates_are_an_error() {
    set_test_key();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-2.0-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": []
        })))
        .mount(&server)
        .await;

    let request = GenerationRequest {
        prompt: "Anything".to_string(),
        system_prompt: String::new(),
        temperature: 0.1,
        max_output_tokens: 100,
    };

    let client = client_for(&server);
    let result = tokio::task::spawn_blocking(move || client.generate_content(&request))
        .await
        .expect("task should join");

    assert!(result.is_err(), "empty candidates should not look like success");
    clear_test_key();
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn counts_prompt_tokens() {
    set_test_key();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-2.0-flash:countTokens"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalTokens": 42
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let count = tokio::task::spawn_blocking(move || client.count_tokens("How long is this?"))
        .await
        .expect("task should join")
        .expect("count should succeed");

    assert_eq!(count, 42);
    clear_test_key();
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn retries_when_the_api_throttles() {
    set_test_key();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "models/gemini-2.0-flash"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let models = tokio::task::spawn_blocking(move || client.list_models())
        .await
        .expect("task should join")
        .expect("listing should succeed after the throttle clears");

    assert_eq!(models.len(), 1);
    clear_test_key();
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn client_errors_are_not_retried() {
    set_test_key();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/text-embedding-004:embedContent"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = tokio::task::spawn_blocking(move || client.generate_embedding("bad request"))
        .await
        .expect("task should join");

    let error = result.expect_err("a 400 should fail without retrying");
    assert!(format!("{:#}", error).contains("400"));
    clear_test_key();
}

use super::*;
use serial_test::serial;
use tempfile::TempDir;

async fn spawn_test_server() -> (TempDir, SocketAddr) {
    let dir = TempDir::new().expect("tempdir");
    let mut config = Config::defaults_in(dir.path());
    config.gemini.api_key_env = "MAILGIST_GEMINI_TEST_KEY".to_string();

    let indexer = Indexer::new(config.clone())
        .await
        .expect("indexer should build");
    let state = Arc::new(AppState {
        config,
        indexer: Mutex::new(indexer),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("should bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        axum::serve(listener, router(state))
            .await
            .expect("server should run");
    });

    (dir, addr)
}

fn get_json(addr: SocketAddr, path: &str) -> (u16, serde_json::Value) {
    let url = format!("http://{}{}", addr, path);
    match ureq::get(&url).call() {
        Ok(mut resp) => {
            let body = resp.body_mut().read_to_string().expect("response body");
            (200, serde_json::from_str(&body).expect("json body"))
        }
        Err(ureq::Error::StatusCode(code)) => (code, serde_json::Value::Null),
        Err(e) => panic!("request failed: {}", e),
    }
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn health_and_status_endpoints() {
    // SAFETY: test is serialized, no concurrent env access
    unsafe {
        std::env::set_var("MAILGIST_GEMINI_TEST_KEY", "fake-key");
    }

    let (_dir, addr) = spawn_test_server().await;

    let (code, health) = tokio::task::spawn_blocking(move || get_json(addr, "/health"))
        .await
        .expect("task should join");
    assert_eq!(code, 200);
    assert_eq!(health["status"], "ok");

    let (code, status) = tokio::task::spawn_blocking(move || get_json(addr, "/api/status"))
        .await
        .expect("task should join");
    assert_eq!(code, 200);
    assert_eq!(status["emails"]["total"], 0);
    assert_eq!(status["embeddings"], 0);
    assert_eq!(status["vector_store_healthy"], true);

    // SAFETY: test is serialized, no concurrent env access
    unsafe {
        std::env::remove_var("MAILGIST_GEMINI_TEST_KEY");
    }
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn index_page_is_served() {
    // SAFETY: test is serialized, no concurrent env access
    unsafe {
        std::env::set_var("MAILGIST_GEMINI_TEST_KEY", "fake-key");
    }

    let (_dir, addr) = spawn_test_server().await;

    let body = tokio::task::spawn_blocking(move || {
        let url = format!("http://{}/", addr);
        ureq::get(&url)
            .call()
            .expect("request should succeed")
            .body_mut()
            .read_to_string()
            .expect("response body")
    })
    .await
    .expect("task should join");

    assert!(body.contains("Talk with your mail"));
    assert!(body.contains("/api/ask"));

    // SAFETY: test is serialized, no concurrent env access
    unsafe {
        std::env::remove_var("MAILGIST_GEMINI_TEST_KEY");
    }
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn empty_question_is_rejected() {
    // SAFETY: test is serialized, no concurrent env access
    unsafe {
        std::env::set_var("MAILGIST_GEMINI_TEST_KEY", "fake-key");
    }

    let (_dir, addr) = spawn_test_server().await;

    let code = tokio::task::spawn_blocking(move || {
        let url = format!("http://{}/api/ask", addr);
        match ureq::post(&url)
            .header("Content-Type", "application/json")
            .send(r#"{"question": "  "}"#)
        {
            Ok(_) => 200u16,
            Err(ureq::Error::StatusCode(code)) => code,
            Err(e) => panic!("request failed: {}", e),
        }
    })
    .await
    .expect("task should join");

    // Validation failures are the caller's fault, not the pipeline's
    assert_eq!(code, 400);

    // SAFETY: test is serialized, no concurrent env access
    unsafe {
        std::env::remove_var("MAILGIST_GEMINI_TEST_KEY");
    }
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn refresh_without_gmail_authorization_fails_fast() {
    // SAFETY: test is serialized, no concurrent env access
    unsafe {
        std::env::set_var("MAILGIST_GEMINI_TEST_KEY", "fake-key");
    }

    let (_dir, addr) = spawn_test_server().await;

    // No credentials.json or token.json exists, so the handler must answer
    // with an error instead of waiting for an interactive consent flow
    let code = tokio::task::spawn_blocking(move || {
        let url = format!("http://{}/api/refresh", addr);
        match ureq::post(&url).send_empty() {
            Ok(_) => 200u16,
            Err(ureq::Error::StatusCode(code)) => code,
            Err(e) => panic!("request failed: {}", e),
        }
    })
    .await
    .expect("task should join");

    assert_eq!(code, 500);

    // SAFETY: test is serialized, no concurrent env access
    unsafe {
        std::env::remove_var("MAILGIST_GEMINI_TEST_KEY");
    }
}

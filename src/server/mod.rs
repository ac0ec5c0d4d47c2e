// Web server module
// Serves the single-page UI and the JSON API over the RAG pipeline

#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::gmail::{GmailAuthenticator, GmailClient};
use crate::indexer::Indexer;
use crate::rag::{self, GenerationOptions};

const INDEX_HTML: &str = include_str!("index.html");

/// Shared server state. The indexer is behind a mutex so a refresh cannot
/// race a concurrent query against the vector store.
pub struct AppState {
    pub config: Config,
    pub indexer: Mutex<Indexer>,
}

/// Error wrapper that turns failures into JSON error responses. Pipeline
/// failures map to 500; request validation failures map to 400.
pub struct ApiError {
    status: StatusCode,
    error: anyhow::Error,
}

impl ApiError {
    fn bad_request(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: anyhow::anyhow!("{}", message),
        }
    }
}

impl IntoResponse for ApiError {
    #[inline]
    fn into_response(self) -> Response {
        error!("Request failed: {:#}", self.error);
        (
            self.status,
            Json(json!({ "error": format!("{:#}", self.error) })),
        )
            .into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    #[inline]
    fn from(err: E) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: err.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    pub top_k: Option<usize>,
    pub count_tokens: Option<bool>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
pub struct SummarizeRequest {
    pub days: Option<u32>,
    pub count_tokens: Option<bool>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

/// Build the application router.
#[inline]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_page))
        .route("/health", get(health))
        .route("/api/status", get(get_status))
        .route("/api/ask", post(ask))
        .route("/api/summarize", post(summarize))
        .route("/api/refresh", post(refresh))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
#[inline]
pub async fn serve(config: Config, port_override: Option<u16>) -> Result<()> {
    let host = config.server.host.clone();
    let port = port_override.unwrap_or(config.server.port);

    let indexer = Indexer::new(config.clone()).await?;
    let state = Arc::new(AppState {
        config,
        indexer: Mutex::new(indexer),
    });

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("Invalid server address")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Serving on http://{}", addr);

    axum::serve(listener, router(state))
        .await
        .context("Server error")?;

    Ok(())
}

async fn index_page() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn get_status(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let indexer = state.indexer.lock().await;

    let stats = indexer.database().mailbox_stats().await?;
    let embeddings = indexer.vector_store().count_embeddings().await?;
    let vector_store_healthy = indexer.vector_store().validate_integrity().await?;

    Ok(Json(json!({
        "emails": {
            "total": stats.total,
            "pending": stats.pending,
            "indexed": stats.indexed,
            "failed": stats.failed,
            "newest_received": stats.newest_received,
            "oldest_received": stats.oldest_received,
        },
        "embeddings": embeddings,
        "vector_store_healthy": vector_store_healthy,
        "model": state.config.gemini.model,
        "embedding_model": state.config.gemini.embedding_model,
    })))
}

async fn ask(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.question.trim().is_empty() {
        return Err(ApiError::bad_request("Question must not be empty"));
    }

    let options = GenerationOptions {
        top_k: request.top_k.unwrap_or(state.config.rag.top_k),
        count_tokens: request.count_tokens.unwrap_or(false),
        temperature: request.temperature,
        max_output_tokens: request.max_output_tokens,
    };

    let indexer = state.indexer.lock().await;
    let answer = rag::answer_question(
        &state.config,
        indexer.gemini(),
        indexer.vector_store(),
        &request.question,
        options,
    )
    .await?;

    Ok(Json(serde_json::to_value(answer)?))
}

async fn summarize(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SummarizeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let days = request
        .days
        .unwrap_or(state.config.rag.summary_window_days as u32);

    let options = GenerationOptions {
        top_k: state.config.rag.top_k,
        count_tokens: request.count_tokens.unwrap_or(false),
        temperature: request.temperature,
        max_output_tokens: request.max_output_tokens,
    };

    let indexer = state.indexer.lock().await;
    let answer = rag::summarize_window(
        &state.config,
        indexer.gemini(),
        indexer.database(),
        days,
        options,
    )
    .await?;

    Ok(Json(serde_json::to_value(answer)?))
}

async fn refresh(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    // The consent flow is interactive and belongs to the CLI, not a request
    // handler; only a cached (or refreshable) token is acceptable here
    let authenticator = GmailAuthenticator::new(&state.config)?;
    let access_token = authenticator.cached_access_token()?;
    let gmail = GmailClient::new(access_token)?;

    let mut indexer = state.indexer.lock().await;
    let stats = indexer.sync_mailbox(&gmail).await?;

    Ok(Json(json!({
        "listed": stats.listed,
        "fetched": stats.fetched,
        "skipped": stats.skipped,
        "indexed": stats.indexed,
        "failed": stats.failed,
        "chunks": stats.chunks,
    })))
}

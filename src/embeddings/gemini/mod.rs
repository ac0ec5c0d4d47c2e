#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::Config;
use crate::embeddings::chunking::EmailChunk;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/";
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Client for the hosted Gemini API. One client covers both embedding
/// generation and text generation; everything goes over plain REST.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    base_url: Url,
    api_key: String,
    model: String,
    embedding_model: String,
    batch_size: u32,
    agent: ureq::Agent,
    retry_attempts: u32,
}

/// A generation request: the user prompt plus the knobs the UI exposes.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system_prompt: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingResult {
    pub text: String,
    pub embedding: Vec<f32>,
    pub token_count: usize,
    pub chunk_index: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
struct EmbedContentRequest {
    content: RequestContent,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchEmbedEntry {
    model: String,
    content: RequestContent,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<BatchEmbedEntry>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
    system_instruction: RequestContent,
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Serialize)]
struct CountTokensRequest {
    contents: Vec<RequestContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CountTokensResponse {
    total_tokens: usize,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl GeminiClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let base_url =
            Url::parse(GEMINI_API_BASE).context("Failed to parse Gemini API base URL")?;

        let api_key = config
            .gemini
            .api_key()
            .context("Gemini API key is not available")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            api_key,
            model: config.gemini.model.clone(),
            embedding_model: config.gemini.embedding_model.clone(),
            batch_size: config.gemini.batch_size,
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    /// Point the client at a different API base. Used by tests.
    #[inline]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Check API reachability and verify both configured models exist
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check for Gemini API");

        let models = self.list_models().context("Failed to list models")?;

        for wanted in [&self.model, &self.embedding_model] {
            if !models.iter().any(|m| model_name_matches(&m.name, wanted)) {
                let available: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
                warn!("Model {} not found. Available: {:?}", wanted, available);
                return Err(anyhow::anyhow!(
                    "Model '{}' is not available from the Gemini API",
                    wanted
                ));
            }
        }

        info!(
            "Health check passed for Gemini API (model {}, embedding model {})",
            self.model, self.embedding_model
        );
        Ok(())
    }

    /// List the models the API key can access
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self.base_url.join("models").context("Failed to build models URL")?;

        debug!("Fetching available models from {}", url);

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .get(url.as_str())
                    .header("x-goog-api-key", &self.api_key)
                    .call()
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to fetch models")?;

        let models_response: ModelsResponse =
            serde_json::from_str(&response_text).context("Failed to parse models response")?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    /// Generate an embedding for a single text input
    #[inline]
    pub fn generate_embedding(&self, text: &str) -> Result<EmbeddingResult> {
        debug!("Generating embedding for text (length: {})", text.len());

        let request = EmbedContentRequest {
            content: text_content(text),
        };

        let url = self
            .model_url(&self.embedding_model, "embedContent")
            .context("Failed to build embedding URL")?;

        let request_json =
            serde_json::to_string(&request).context("Failed to serialize embedding request")?;

        let response_text = self
            .post_with_retry(&url, &request_json)
            .context("Failed to generate embedding")?;

        let embed_response: EmbedContentResponse =
            serde_json::from_str(&response_text).context("Failed to parse embedding response")?;

        let result = EmbeddingResult {
            text: text.to_string(),
            embedding: embed_response.embedding.values,
            token_count: crate::embeddings::chunking::estimate_token_count(text),
            chunk_index: None,
        };

        debug!(
            "Generated embedding with {} dimensions",
            result.embedding.len()
        );

        Ok(result)
    }

    /// Generate embeddings for multiple texts using batch requests
    #[inline]
    pub fn generate_embeddings_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingResult>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());

        // Process in batches to stay under the API's per-request limit
        for chunk in texts.chunks(self.batch_size as usize) {
            let batch_results = self
                .generate_embeddings_single_batch(chunk)
                .with_context(|| format!("Failed to process batch of {} texts", chunk.len()))?;

            results.extend(batch_results);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }

    /// Generate embeddings for chunked email content
    #[inline]
    pub fn generate_chunk_embeddings(&self, chunks: &[EmailChunk]) -> Result<Vec<EmbeddingResult>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} email chunks", chunks.len());

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let mut results = self.generate_embeddings_batch(&texts)?;

        for (result, chunk) in results.iter_mut().zip(chunks.iter()) {
            result.chunk_index = Some(chunk.chunk_index);
            result.token_count = chunk.token_count;
        }

        Ok(results)
    }

    /// Run a generation request and return the response text
    #[inline]
    pub fn generate_content(&self, request: &GenerationRequest) -> Result<String> {
        debug!(
            "Generating content (prompt length: {}, temperature: {})",
            request.prompt.len(),
            request.temperature
        );

        let body = GenerateContentRequest {
            contents: vec![text_content(&request.prompt)],
            system_instruction: text_content(&request.system_prompt),
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
            },
        };

        let url = self
            .model_url(&self.model, "generateContent")
            .context("Failed to build generation URL")?;

        let request_json =
            serde_json::to_string(&body).context("Failed to serialize generation request")?;

        let response_text = self
            .post_with_retry(&url, &request_json)
            .context("Failed to generate content")?;

        let response: GenerateContentResponse =
            serde_json::from_str(&response_text).context("Failed to parse generation response")?;

        let text = response
            .candidates
            .unwrap_or_default()
            .into_iter()
            .filter_map(|c| c.content)
            .filter_map(|c| c.parts)
            .flatten()
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(anyhow::anyhow!(
                "Gemini API returned no candidate text for the request"
            ));
        }

        debug!("Generated {} chars of content", text.len());
        Ok(text)
    }

    /// Count tokens for a prompt against the configured generation model
    #[inline]
    pub fn count_tokens(&self, text: &str) -> Result<usize> {
        let body = CountTokensRequest {
            contents: vec![text_content(text)],
        };

        let url = self
            .model_url(&self.model, "countTokens")
            .context("Failed to build countTokens URL")?;

        let request_json =
            serde_json::to_string(&body).context("Failed to serialize countTokens request")?;

        let response_text = self
            .post_with_retry(&url, &request_json)
            .context("Failed to count tokens")?;

        let response: CountTokensResponse =
            serde_json::from_str(&response_text).context("Failed to parse countTokens response")?;

        Ok(response.total_tokens)
    }

    fn generate_embeddings_single_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingResult>> {
        if texts.len() == 1 {
            let result = self.generate_embedding(&texts[0])?;
            return Ok(vec![result]);
        }

        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| BatchEmbedEntry {
                    model: format!("models/{}", self.embedding_model),
                    content: text_content(text),
                })
                .collect(),
        };

        let url = self
            .model_url(&self.embedding_model, "batchEmbedContents")
            .context("Failed to build batch embedding URL")?;

        let request_json = serde_json::to_string(&request)
            .context("Failed to serialize batch embedding request")?;

        let response_text = self
            .post_with_retry(&url, &request_json)
            .context("Failed to generate batch embeddings")?;

        let batch_response: BatchEmbedResponse = serde_json::from_str(&response_text)
            .context("Failed to parse batch embedding response")?;

        if batch_response.embeddings.len() != texts.len() {
            return Err(anyhow::anyhow!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                batch_response.embeddings.len()
            ));
        }

        let results = texts
            .iter()
            .zip(batch_response.embeddings)
            .map(|(text, embedding)| EmbeddingResult {
                text: text.clone(),
                embedding: embedding.values,
                token_count: crate::embeddings::chunking::estimate_token_count(text),
                chunk_index: None,
            })
            .collect();

        Ok(results)
    }

    fn model_url(&self, model: &str, action: &str) -> Result<Url> {
        self.base_url
            .join(&format!("models/{}:{}", model, action))
            .context("Failed to build model URL")
    }

    fn post_with_retry(&self, url: &Url, request_json: &str) -> Result<String> {
        self.make_request_with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .header("x-goog-api-key", &self.api_key)
                .send(request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            // 429 means the hosted API is overloaded or
                            // throttling us; back off and try again
                            if *status >= 500 || *status == 429 {
                                warn!(
                                    "Retryable API error (status {}), attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                warn!("Client error (status {}), not retrying", status);
                                return Err(anyhow::anyhow!("Client error: HTTP {}", status));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            false
                        }
                    };

                    if !should_retry {
                        return Err(anyhow::anyhow!("Non-retryable error: {}", error));
                    }

                    last_error = Some(anyhow::anyhow!("Request error: {}", error));

                    if attempt < self.retry_attempts {
                        let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                        let delay = Duration::from_millis(delay_ms);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
    }
}

fn text_content(text: &str) -> RequestContent {
    RequestContent {
        parts: vec![ContentPart {
            text: text.to_string(),
        }],
    }
}

/// The models endpoint reports names like `models/gemini-2.0-flash`.
fn model_name_matches(reported: &str, configured: &str) -> bool {
    reported == configured || reported.strip_prefix("models/") == Some(configured)
}

#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use itertools::Itertools;
use tracing::{debug, info};

use crate::config::Config;
use crate::database::lancedb::{SearchResult, VectorStore};
use crate::database::sqlite::Database;
use crate::embeddings::gemini::{GeminiClient, GenerationRequest};

/// System prompt for question answering over retrieved email chunks.
const ANSWER_SYSTEM_PROMPT: &str = "You are a machine learning expert with 10 years of \
experience. Answer the question precisely, based primarily on the provided documents. If the \
documents do not contain the needed information, state clearly that you are answering from \
your built-in knowledge instead. Your audience is STEM students who want to become data \
scientists, so break difficult topics down into smaller ones. Some documents may be in Polish \
and some in English; always answer in English.";

/// System prompt for summarizing a window of emails.
const SUMMARY_SYSTEM_PROMPT: &str = "You are a machine learning expert with 10 years of \
experience. Summarize the provided documents, doing your best to extract their essence. Your \
audience is STEM students who want to become data scientists. Propose up to 5 topics worth \
exploring further (fewer is fine), citing the email subject for each so the reader can deepen \
their knowledge; if none of the topics seem important, just summarize the text. Some documents \
may be in Polish and some in English; always produce English text.";

/// Knobs the caller can turn per request.
#[derive(Debug, Clone, Copy)]
pub struct GenerationOptions {
    /// How many chunks to retrieve for context
    pub top_k: usize,
    /// Whether to report the prompt's token count alongside the answer
    pub count_tokens: bool,
    /// Overrides the configured sampling temperature when set
    pub temperature: Option<f32>,
    /// Overrides the configured output token cap when set
    pub max_output_tokens: Option<u32>,
}

impl GenerationOptions {
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_k: config.rag.top_k,
            count_tokens: false,
            temperature: None,
            max_output_tokens: None,
        }
    }
}

/// Where an answer's context came from.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SourceRef {
    pub sender: String,
    pub subject: String,
    pub received_date: String,
    pub similarity: f32,
}

/// A generated answer plus the retrieval evidence behind it.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RagAnswer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub prompt_tokens: Option<usize>,
}

/// Answer a question against the indexed mailbox: embed the question,
/// retrieve the closest chunks, and generate with them as context.
#[inline]
pub async fn answer_question(
    config: &Config,
    gemini: &GeminiClient,
    vector_store: &VectorStore,
    question: &str,
    options: GenerationOptions,
) -> Result<RagAnswer> {
    info!("Answering question (top_k: {})", options.top_k);

    let query_embedding = gemini
        .generate_embedding(question)
        .context("Failed to embed question")?;

    let results = vector_store
        .search_similar(&query_embedding.embedding, options.top_k, None)
        .await?;

    debug!("Retrieved {} chunks for question", results.len());

    let prompt = build_question_prompt(question, &results);

    let prompt_tokens = if options.count_tokens {
        Some(gemini.count_tokens(&prompt)?)
    } else {
        None
    };

    let answer = gemini.generate_content(&GenerationRequest {
        prompt,
        system_prompt: ANSWER_SYSTEM_PROMPT.to_string(),
        temperature: options.temperature.unwrap_or(config.gemini.temperature),
        max_output_tokens: options
            .max_output_tokens
            .unwrap_or(config.gemini.max_output_tokens),
    })?;

    Ok(RagAnswer {
        answer,
        sources: results.iter().map(source_ref).collect(),
        prompt_tokens,
    })
}

/// Summarize every stored email received within the last `window_days`.
/// Returns a canned message instead of calling the model when the window
/// is empty.
#[inline]
pub async fn summarize_window(
    config: &Config,
    gemini: &GeminiClient,
    database: &Database,
    window_days: u32,
    options: GenerationOptions,
) -> Result<RagAnswer> {
    info!("Summarizing emails from the last {} days", window_days);

    let cutoff = (Utc::now() - ChronoDuration::days(i64::from(window_days))).naive_utc();
    let emails = database.list_emails_since(cutoff).await?;

    if emails.is_empty() {
        return Ok(RagAnswer {
            answer: "You have no emails to summarize in this window. Fetch some first."
                .to_string(),
            sources: Vec::new(),
            prompt_tokens: None,
        });
    }

    debug!("Summarizing {} emails", emails.len());

    let documents = emails
        .iter()
        .map(|email| format!("Subject: {}\nFrom: {}\n{}", email.subject, email.sender, email.body))
        .join("\n\n");
    let prompt = format!("Summarize documents:\n{}", documents);

    let prompt_tokens = if options.count_tokens {
        Some(gemini.count_tokens(&prompt)?)
    } else {
        None
    };

    let answer = gemini.generate_content(&GenerationRequest {
        prompt,
        system_prompt: SUMMARY_SYSTEM_PROMPT.to_string(),
        temperature: options.temperature.unwrap_or(config.gemini.temperature),
        max_output_tokens: options
            .max_output_tokens
            .unwrap_or(config.gemini.max_output_tokens),
    })?;

    let sources = emails
        .iter()
        .map(|email| SourceRef {
            sender: email.sender.clone(),
            subject: email.subject.clone(),
            received_date: email.received_date.and_utc().to_rfc3339(),
            similarity: 1.0,
        })
        .collect();

    Ok(RagAnswer {
        answer,
        sources,
        prompt_tokens,
    })
}

fn build_question_prompt(question: &str, results: &[SearchResult]) -> String {
    let documents = results
        .iter()
        .map(|result| result.chunk_metadata.content.as_str())
        .join("\n");

    format!(
        "Question: {}\nRetrieved documents:\n{}",
        question, documents
    )
}

fn source_ref(result: &SearchResult) -> SourceRef {
    SourceRef {
        sender: result.chunk_metadata.sender.clone(),
        subject: result.chunk_metadata.subject.clone(),
        received_date: result.chunk_metadata.received_date.clone(),
        similarity: result.similarity_score,
    }
}

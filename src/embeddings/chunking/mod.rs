#[cfg(test)]
mod tests;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A piece of a cleaned email body, sized for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailChunk {
    /// The chunk text
    pub content: String,
    /// The index of this chunk within the email
    pub chunk_index: usize,
    /// Estimated token count
    pub token_count: usize,
}

/// Configuration for email body chunking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in tokens
    pub target_chunk_size: usize,
    /// Maximum chunk size in tokens before forced splitting
    pub max_chunk_size: usize,
    /// Minimum chunk size in tokens (smaller chunks will be merged)
    pub min_chunk_size: usize,
    /// Overlap size in tokens between adjacent chunks
    pub overlap_size: usize,
    /// Whether to break at sentence boundaries when possible
    pub sentence_boundary_splitting: bool,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            target_chunk_size: 650,
            max_chunk_size: 1000,
            min_chunk_size: 100,
            overlap_size: 50,
            sentence_boundary_splitting: true,
        }
    }
}

/// Chunk a cleaned email body into embedding-ready pieces
#[inline]
pub fn chunk_email_body(body: &str, config: &ChunkingConfig) -> Result<Vec<EmailChunk>> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    let token_count = estimate_token_count(body);

    // Most newsletters fit a single chunk after cleanup
    let chunks = if token_count <= config.target_chunk_size {
        vec![EmailChunk {
            content: body.trim().to_string(),
            chunk_index: 0,
            token_count,
        }]
    } else {
        split_by_semantics(body, config)?
            .into_iter()
            .filter(|split| !split.trim().is_empty())
            .enumerate()
            .map(|(chunk_index, content)| {
                let token_count = estimate_token_count(&content);
                EmailChunk {
                    content,
                    chunk_index,
                    token_count,
                }
            })
            .collect()
    };

    let processed = post_process_chunks(chunks, config)?;

    debug!(
        "Chunked email body into {} chunks (avg {} tokens)",
        processed.len(),
        processed.iter().map(|c| c.token_count).sum::<usize>() / processed.len().max(1)
    );

    Ok(processed)
}

/// Split content using semantic boundaries (paragraphs, then sentences)
fn split_by_semantics(content: &str, config: &ChunkingConfig) -> Result<Vec<String>> {
    let mut splits = Vec::new();
    let mut current_split = String::new();
    let mut current_token_count = 0;

    let paragraphs = content.split("\n\n").collect::<Vec<_>>();

    for paragraph in paragraphs {
        if paragraph.trim().is_empty() {
            continue;
        }

        let paragraph_tokens = estimate_token_count(paragraph);

        // If this paragraph alone exceeds max size, split it further
        if paragraph_tokens > config.max_chunk_size {
            let sub_splits = if config.sentence_boundary_splitting {
                split_by_sentences(paragraph, config)?
            } else {
                split_by_words(paragraph, config)?
            };

            for sub_split in sub_splits {
                if current_token_count + estimate_token_count(&sub_split)
                    > config.target_chunk_size
                    && !current_split.trim().is_empty()
                {
                    splits.push(current_split.trim().to_string());
                    current_split.clear();
                    current_token_count = 0;
                }
                current_split.push_str(&sub_split);
                current_split.push_str("\n\n");
                current_token_count += estimate_token_count(&sub_split);
            }
        } else {
            if current_token_count + paragraph_tokens > config.target_chunk_size
                && !current_split.trim().is_empty()
            {
                splits.push(current_split.trim().to_string());
                current_split.clear();
                current_token_count = 0;
            }

            current_split.push_str(paragraph);
            current_split.push_str("\n\n");
            current_token_count += paragraph_tokens;
        }
    }

    if !current_split.trim().is_empty() {
        splits.push(current_split.trim().to_string());
    }

    Ok(splits)
}

/// Split text by sentences
fn split_by_sentences(text: &str, config: &ChunkingConfig) -> Result<Vec<String>> {
    let mut splits = Vec::new();
    let mut current_split = String::new();
    let mut current_token_count = 0;

    // Simple sentence boundary detection
    let sentences = text
        .split(['.', '!', '?'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    for (i, sentence) in sentences.iter().enumerate() {
        let sentence_with_punct = if i < sentences.len() - 1 {
            format!("{}. ", sentence)
        } else {
            (*sentence).to_string()
        };

        let sentence_tokens = estimate_token_count(&sentence_with_punct);

        if current_token_count + sentence_tokens > config.target_chunk_size
            && !current_split.trim().is_empty()
        {
            splits.push(current_split.trim().to_string());
            current_split.clear();
            current_token_count = 0;
        }

        current_split.push_str(&sentence_with_punct);
        current_token_count += sentence_tokens;
    }

    if !current_split.trim().is_empty() {
        splits.push(current_split.trim().to_string());
    }

    Ok(splits)
}

/// Split text by words as a last resort
fn split_by_words(text: &str, config: &ChunkingConfig) -> Result<Vec<String>> {
    let mut splits = Vec::new();
    let mut current_split = String::new();
    let mut current_token_count = 0;

    let words = text.split_whitespace().collect::<Vec<_>>();

    for word in words {
        let word_with_space = format!("{} ", word);
        let word_tokens = estimate_token_count(&word_with_space);

        if current_token_count + word_tokens > config.target_chunk_size
            && !current_split.trim().is_empty()
        {
            splits.push(current_split.trim().to_string());
            current_split.clear();
            current_token_count = 0;
        }

        current_split.push_str(&word_with_space);
        current_token_count += word_tokens;
    }

    if !current_split.trim().is_empty() {
        splits.push(current_split.trim().to_string());
    }

    Ok(splits)
}

/// Post-process chunks to merge small ones and add overlap
fn post_process_chunks(
    chunks: Vec<EmailChunk>,
    config: &ChunkingConfig,
) -> Result<Vec<EmailChunk>> {
    if chunks.is_empty() {
        return Ok(chunks);
    }

    let mut processed = Vec::new();
    let mut pending_merge: Option<EmailChunk> = None;

    for chunk in chunks {
        if let Some(mut pending) = pending_merge.take() {
            if chunk.token_count < config.min_chunk_size
                && pending.token_count + chunk.token_count <= config.max_chunk_size
            {
                pending.content.push_str("\n\n");
                pending.content.push_str(&chunk.content);
                pending.token_count += chunk.token_count;
                pending_merge = Some(pending);
                continue;
            } else {
                processed.push(pending);
            }
        }

        if chunk.token_count < config.min_chunk_size {
            pending_merge = Some(chunk);
        } else {
            processed.push(chunk);
        }
    }

    if let Some(pending) = pending_merge {
        processed.push(pending);
    }

    if config.overlap_size > 0 {
        processed = add_overlap(processed, config)?;
    }

    // Re-index chunks
    for (i, chunk) in processed.iter_mut().enumerate() {
        chunk.chunk_index = i;
    }

    Ok(processed)
}

/// Add overlap between adjacent chunks
fn add_overlap(mut chunks: Vec<EmailChunk>, config: &ChunkingConfig) -> Result<Vec<EmailChunk>> {
    let mut i = 1;
    while i < chunks.len() {
        let (left, right) = chunks.split_at_mut(i);
        let prev_chunk = &left[i - 1];
        let curr_chunk = &mut right[0];

        let overlap_text = extract_overlap_text(&prev_chunk.content, config.overlap_size);
        if !overlap_text.is_empty() {
            curr_chunk.content = format!("{}\n\n{}", overlap_text, curr_chunk.content);
            curr_chunk.token_count += estimate_token_count(&overlap_text);
        }
        i += 1;
    }

    Ok(chunks)
}

/// Extract overlap text from the end of a chunk
fn extract_overlap_text(content: &str, overlap_tokens: usize) -> String {
    let words: Vec<&str> = content.split_whitespace().collect();
    let word_count = (overlap_tokens as f64 * 0.75) as usize; // Rough word-to-token ratio

    if words.len() <= word_count {
        return String::new();
    }

    words[words.len() - word_count.min(words.len())..].join(" ")
}

/// Estimate token count using a simple heuristic
/// This is a rough approximation - actual tokenization would be more accurate
#[inline]
pub fn estimate_token_count(text: &str) -> usize {
    // Rough heuristic: 1 token ≈ 0.75 words for English text
    // Add extra tokens for punctuation and special characters
    let word_count = text.split_whitespace().count();
    let punct_count = text.chars().filter(|c| c.is_ascii_punctuation()).count();

    (punct_count as f64).mul_add(0.1, word_count as f64 / 0.75) as usize
}

/// Prefix a chunk with its email context so retrieval hits carry provenance
#[inline]
pub fn create_contextual_chunk(
    content: &str,
    subject: &str,
    sender: &str,
    chunk_index: usize,
) -> EmailChunk {
    let contextual_content = format!("Subject: {}\nFrom: {}\n\n{}", subject, sender, content);
    let token_count = estimate_token_count(&contextual_content);

    EmailChunk {
        content: contextual_content,
        chunk_index,
        token_count,
    }
}

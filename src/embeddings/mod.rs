// Embeddings module
// Content chunking plus the hosted Gemini client used for embeddings and generation

pub mod chunking;
pub mod gemini;

pub use chunking::{
    ChunkingConfig, EmailChunk, chunk_email_body, create_contextual_chunk, estimate_token_count,
};
pub use gemini::{EmbeddingResult, GeminiClient, GenerationRequest};

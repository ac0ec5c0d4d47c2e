// LanceDB vector database module
// Handles vector storage and similarity search for email chunk embeddings

#[cfg(test)]
mod tests;

pub mod vector_store;

pub use vector_store::{SearchResult, VectorStore};

use serde::{Deserialize, Serialize};

/// Embedding record stored in LanceDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Unique identifier for this embedding
    pub id: String,
    /// The vector embedding
    pub vector: Vec<f32>,
    /// Metadata about the chunk this embedding represents
    pub metadata: EmailChunkMetadata,
}

/// Metadata for an email chunk stored alongside its embedding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailChunkMetadata {
    /// ID of the email row in SQLite
    pub email_id: String,
    /// Sender address from the From header
    pub sender: String,
    /// Subject line of the email
    pub subject: String,
    /// When the email was received, RFC 3339. Lexicographic order matches
    /// chronological order, which lets date filters run as string compares.
    pub received_date: String,
    /// The actual text content of the chunk
    pub content: String,
    /// Token count of the chunk
    pub token_count: u32,
    /// Index of this chunk within the email (for ordering)
    pub chunk_index: u32,
    /// Timestamp when this embedding was created
    pub created_at: String,
}

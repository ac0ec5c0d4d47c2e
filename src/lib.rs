use thiserror::Error;

pub type Result<T> = std::result::Result<T, MailError>;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Gmail error: {0}")]
    Gmail(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod cleaner;
pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod gmail;
pub mod indexer;
pub mod rag;
pub mod server;

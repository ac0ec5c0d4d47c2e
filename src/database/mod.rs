// Database module
// Dual store: SQLite for email metadata, LanceDB for chunk embeddings

pub mod lancedb;
pub mod sqlite;

pub use lancedb::*;
pub use sqlite::*;

#[cfg(test)]
mod tests;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

/// A fetched email as stored in SQLite. The cleaned body lives here; the
/// chunk embeddings live in LanceDB keyed by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct EmailMessage {
    pub id: i64,
    pub gmail_id: String,
    pub sender: String,
    pub subject: String,
    pub received_date: NaiveDateTime,
    pub body: String,
    pub status: EmailStatus,
    pub error_message: Option<String>,
    pub chunk_count: i64,
    pub fetched_date: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum EmailStatus {
    Pending,
    Indexed,
    Failed,
}

impl std::fmt::Display for EmailStatus {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            EmailStatus::Pending => write!(f, "Pending"),
            EmailStatus::Indexed => write!(f, "Indexed"),
            EmailStatus::Failed => write!(f, "Failed"),
        }
    }
}

impl EmailStatus {
    /// The TEXT value stored in SQLite.
    #[inline]
    pub fn as_db_str(self) -> &'static str {
        match self {
            EmailStatus::Pending => "pending",
            EmailStatus::Indexed => "indexed",
            EmailStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEmailMessage {
    pub gmail_id: String,
    pub sender: String,
    pub subject: String,
    pub received_date: NaiveDateTime,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EmailUpdate {
    pub status: Option<EmailStatus>,
    pub error_message: Option<String>,
    pub chunk_count: Option<i64>,
}

/// Aggregate counts for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxStats {
    pub total: i64,
    pub pending: i64,
    pub indexed: i64,
    pub failed: i64,
    pub total_chunks: i64,
    pub newest_received: Option<NaiveDateTime>,
    pub oldest_received: Option<NaiveDateTime>,
}

impl EmailMessage {
    #[inline]
    pub fn is_indexed(&self) -> bool {
        self.status == EmailStatus::Indexed
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.status == EmailStatus::Pending
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.status == EmailStatus::Failed
    }
}

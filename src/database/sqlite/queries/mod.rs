
use super::models::*;
use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;

const EMAIL_COLUMNS: &str = "id, gmail_id, sender, subject, received_date, body, \
                             status, error_message, chunk_count, fetched_date";

pub struct EmailQueries;

impl EmailQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_email: NewEmailMessage) -> Result<EmailMessage> {
        let now = Utc::now().naive_utc();
        let id = sqlx::query(
            r#"
            INSERT INTO emails (gmail_id, sender, subject, received_date, body, status, fetched_date)
            VALUES (?, ?, ?, ?, ?, 'pending', ?)
            "#,
        )
        .bind(&new_email.gmail_id)
        .bind(&new_email.sender)
        .bind(&new_email.subject)
        .bind(new_email.received_date)
        .bind(&new_email.body)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to insert email")?
        .last_insert_rowid();

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve inserted email"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<EmailMessage>> {
        let result = sqlx::query_as::<_, EmailMessage>(&format!(
            "SELECT {EMAIL_COLUMNS} FROM emails WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get email by id")?;

        Ok(result)
    }

    /// Lookup by Gmail's message id. Used to skip messages already fetched.
    #[inline]
    pub async fn get_by_gmail_id(
        pool: &SqlitePool,
        gmail_id: &str,
    ) -> Result<Option<EmailMessage>> {
        let result = sqlx::query_as::<_, EmailMessage>(&format!(
            "SELECT {EMAIL_COLUMNS} FROM emails WHERE gmail_id = ?"
        ))
        .bind(gmail_id)
        .fetch_optional(pool)
        .await
        .context("Failed to get email by gmail id")?;

        Ok(result)
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<EmailMessage>> {
        let emails = sqlx::query_as::<_, EmailMessage>(&format!(
            "SELECT {EMAIL_COLUMNS} FROM emails ORDER BY received_date DESC"
        ))
        .fetch_all(pool)
        .await
        .context("Failed to list emails")?;

        Ok(emails)
    }

    /// Emails received on or after the cutoff, newest first.
    #[inline]
    pub async fn list_since(pool: &SqlitePool, cutoff: NaiveDateTime) -> Result<Vec<EmailMessage>> {
        let emails = sqlx::query_as::<_, EmailMessage>(&format!(
            "SELECT {EMAIL_COLUMNS} FROM emails WHERE received_date >= ? ORDER BY received_date DESC"
        ))
        .bind(cutoff)
        .fetch_all(pool)
        .await
        .context("Failed to list emails since cutoff")?;

        Ok(emails)
    }

    #[inline]
    pub async fn list_by_status(
        pool: &SqlitePool,
        status: EmailStatus,
    ) -> Result<Vec<EmailMessage>> {
        let emails = sqlx::query_as::<_, EmailMessage>(&format!(
            "SELECT {EMAIL_COLUMNS} FROM emails WHERE status = ? ORDER BY received_date ASC"
        ))
        .bind(status.as_db_str())
        .fetch_all(pool)
        .await
        .context("Failed to list emails by status")?;

        Ok(emails)
    }

    #[inline]
    pub async fn update(
        pool: &SqlitePool,
        id: i64,
        update: EmailUpdate,
    ) -> Result<Option<EmailMessage>> {
        let mut query_parts = Vec::new();
        let mut query_values = Vec::new();

        if let Some(status) = update.status {
            query_parts.push("status = ?");
            query_values.push(status.as_db_str().to_string());
        }

        if let Some(error) = update.error_message {
            query_parts.push("error_message = ?");
            query_values.push(error);
        }

        if let Some(chunk_count) = update.chunk_count {
            query_parts.push("chunk_count = ?");
            query_values.push(chunk_count.to_string());
        }

        if query_parts.is_empty() {
            return Self::get_by_id(pool, id).await;
        }

        let query_str = format!("UPDATE emails SET {} WHERE id = ?", query_parts.join(", "));

        let mut query = sqlx::query(&query_str);
        for value in query_values {
            query = query.bind(value);
        }
        query = query.bind(id);

        query
            .execute(pool)
            .await
            .context("Failed to update email")?;

        Self::get_by_id(pool, id).await
    }

    #[inline]
    pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM emails WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to delete email")?;

        Ok(result.rows_affected() > 0)
    }

    #[inline]
    pub async fn get_stats(pool: &SqlitePool) -> Result<MailboxStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) as total,
                COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0) as pending,
                COALESCE(SUM(CASE WHEN status = 'indexed' THEN 1 ELSE 0 END), 0) as indexed,
                COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0) as failed,
                COALESCE(SUM(chunk_count), 0) as total_chunks,
                MAX(received_date) as newest_received,
                MIN(received_date) as oldest_received
            FROM emails
            "#,
        )
        .fetch_one(pool)
        .await
        .context("Failed to get mailbox statistics")?;

        let stats = MailboxStats {
            total: row.try_get("total")?,
            pending: row.try_get("pending")?,
            indexed: row.try_get("indexed")?,
            failed: row.try_get("failed")?,
            total_chunks: row.try_get("total_chunks")?,
            newest_received: row.try_get("newest_received")?,
            oldest_received: row.try_get("oldest_received")?,
        };

        debug!(
            "Mailbox stats: {} total, {} indexed, {} pending, {} failed",
            stats.total, stats.indexed, stats.pending, stats.failed
        );
        Ok(stats)
    }
}

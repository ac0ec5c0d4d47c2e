use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::database::sqlite::models::{
    EmailMessage, EmailStatus, EmailUpdate, MailboxStats, NewEmailMessage,
};
use crate::database::sqlite::queries::EmailQueries;


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

/// Connection pool over the SQLite metadata store.
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_url: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_url)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    #[inline]
    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        let db_path = config_dir.join("metadata.db");
        let db_url = db_path.to_string_lossy();

        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(db_url.as_ref()).await
    }

    #[inline]
    pub async fn insert_email(&self, email: NewEmailMessage) -> Result<EmailMessage> {
        EmailQueries::create(&self.pool, email).await
    }

    #[inline]
    pub async fn get_email_by_gmail_id(&self, gmail_id: &str) -> Result<Option<EmailMessage>> {
        EmailQueries::get_by_gmail_id(&self.pool, gmail_id).await
    }

    #[inline]
    pub async fn update_email(&self, id: i64, update: EmailUpdate) -> Result<Option<EmailMessage>> {
        EmailQueries::update(&self.pool, id, update).await
    }

    #[inline]
    pub async fn list_emails(&self) -> Result<Vec<EmailMessage>> {
        EmailQueries::list_all(&self.pool).await
    }

    #[inline]
    pub async fn list_emails_since(&self, cutoff: NaiveDateTime) -> Result<Vec<EmailMessage>> {
        EmailQueries::list_since(&self.pool, cutoff).await
    }

    #[inline]
    pub async fn list_emails_by_status(&self, status: EmailStatus) -> Result<Vec<EmailMessage>> {
        EmailQueries::list_by_status(&self.pool, status).await
    }

    #[inline]
    pub async fn mailbox_stats(&self) -> Result<MailboxStats> {
        EmailQueries::get_stats(&self.pool).await
    }

    /// Optimize database performance by running VACUUM and ANALYZE
    #[inline]
    pub async fn optimize(&self) -> Result<()> {
        info!("Optimizing database performance");

        // Run VACUUM to reclaim space and defragment
        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .context("Failed to vacuum database")?;

        // Run ANALYZE to update table statistics for better query planning
        sqlx::query("ANALYZE")
            .execute(&self.pool)
            .await
            .context("Failed to analyze database")?;

        debug!("Database optimization completed");
        Ok(())
    }
}


use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cleaner::{clean_email_text, html_to_text};
use crate::config::Config;
use crate::database::lancedb::{EmailChunkMetadata, EmbeddingRecord, VectorStore};
use crate::database::sqlite::Database;
use crate::database::sqlite::models::{EmailMessage, EmailStatus, EmailUpdate, NewEmailMessage};
use crate::embeddings::chunking::{chunk_email_body, create_contextual_chunk};
use crate::embeddings::gemini::GeminiClient;
use crate::gmail::{FetchedEmail, GmailClient, build_query};

/// Outcome of one mailbox sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Message ids returned by the search query
    pub listed: usize,
    /// Messages already in the store, not fetched again
    pub skipped: usize,
    /// Messages fetched and stored
    pub fetched: usize,
    /// Messages whose chunks were embedded and stored
    pub indexed: usize,
    /// Messages that errored; recorded as failed and left for a retry
    pub failed: usize,
    /// Total chunks written to the vector store
    pub chunks: usize,
}

/// Drives the fetch-clean-chunk-embed pipeline and keeps the two stores
/// consistent with each other.
pub struct Indexer {
    config: Config,
    database: Database,
    vector_store: VectorStore,
    gemini: GeminiClient,
}

impl Indexer {
    #[inline]
    pub async fn new(config: Config) -> Result<Self> {
        let database = Database::new(config.database_path()).await?;
        let vector_store = VectorStore::new(&config).await?;
        let gemini = GeminiClient::new(&config)?;

        Ok(Self::from_parts(config, database, vector_store, gemini))
    }

    /// Assemble from already-built components. Used by the server state and
    /// by tests.
    #[inline]
    pub fn from_parts(
        config: Config,
        database: Database,
        vector_store: VectorStore,
        gemini: GeminiClient,
    ) -> Self {
        Self {
            config,
            database,
            vector_store,
            gemini,
        }
    }

    #[inline]
    pub fn database(&self) -> &Database {
        &self.database
    }

    #[inline]
    pub fn vector_store(&self) -> &VectorStore {
        &self.vector_store
    }

    #[inline]
    pub fn gemini(&self) -> &GeminiClient {
        &self.gemini
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fetch new messages matching the configured senders and window, then
    /// index each one. A failure on one message marks it failed and moves on
    /// rather than aborting the run.
    #[inline]
    pub async fn sync_mailbox(&mut self, gmail: &GmailClient) -> Result<SyncStats> {
        let query = build_query(
            &self.config.gmail.senders,
            self.config.gmail.fetch_window_days,
        );
        info!("Syncing mailbox with query: {}", query);

        let ids = gmail.list_message_ids(&query, self.config.gmail.max_results)?;

        let mut stats = SyncStats {
            listed: ids.len(),
            ..SyncStats::default()
        };

        let progress = ProgressBar::new(ids.len() as u64);
        progress.set_style(
            ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} {msg}")
                .context("Invalid progress bar template")?,
        );

        for gmail_id in ids {
            progress.set_message(gmail_id.clone());

            if self
                .database
                .get_email_by_gmail_id(&gmail_id)
                .await?
                .is_some()
            {
                debug!("Skipping already-fetched message {}", gmail_id);
                stats.skipped += 1;
                progress.inc(1);
                continue;
            }

            match self.fetch_and_index(gmail, &gmail_id).await {
                Ok(Some(chunk_count)) => {
                    stats.fetched += 1;
                    stats.indexed += 1;
                    stats.chunks += chunk_count;
                }
                Ok(None) => {
                    // Stored but nothing worth embedding
                    stats.fetched += 1;
                }
                Err(e) => {
                    warn!("Failed to index message {}: {:#}", gmail_id, e);
                    stats.failed += 1;
                }
            }

            progress.inc(1);
        }

        progress.finish_and_clear();
        info!(
            "Sync complete: {} listed, {} fetched, {} skipped, {} indexed, {} failed, {} chunks",
            stats.listed, stats.fetched, stats.skipped, stats.indexed, stats.failed, stats.chunks
        );

        Ok(stats)
    }

    /// Retry emails that were fetched but never successfully indexed.
    #[inline]
    pub async fn reindex_pending(&mut self) -> Result<SyncStats> {
        let mut pending = self
            .database
            .list_emails_by_status(EmailStatus::Pending)
            .await?;
        pending.extend(
            self.database
                .list_emails_by_status(EmailStatus::Failed)
                .await?,
        );

        let mut stats = SyncStats {
            listed: pending.len(),
            ..SyncStats::default()
        };

        for email in pending {
            match self.index_email(&email).await {
                Ok(chunk_count) => {
                    stats.indexed += 1;
                    stats.chunks += chunk_count;
                }
                Err(e) => {
                    warn!("Reindex failed for email {}: {:#}", email.id, e);
                    stats.failed += 1;
                }
            }
        }

        Ok(stats)
    }

    async fn fetch_and_index(
        &mut self,
        gmail: &GmailClient,
        gmail_id: &str,
    ) -> Result<Option<usize>> {
        let fetched = gmail.get_message(gmail_id)?;

        let Some(body) = clean_fetched_body(&fetched) else {
            debug!("Message {} has no usable body, skipping", gmail_id);
            return Ok(None);
        };

        let email = self
            .database
            .insert_email(NewEmailMessage {
                gmail_id: fetched.gmail_id.clone(),
                sender: fetched.sender.clone(),
                subject: fetched.subject.clone(),
                received_date: fetched.received_date,
                body,
            })
            .await?;

        let chunk_count = match self.index_email(&email).await {
            Ok(count) => count,
            Err(e) => {
                self.database
                    .update_email(
                        email.id,
                        EmailUpdate {
                            status: Some(EmailStatus::Failed),
                            error_message: Some(format!("{:#}", e)),
                            chunk_count: None,
                        },
                    )
                    .await?;
                return Err(e);
            }
        };

        Ok(Some(chunk_count))
    }

    /// Chunk, embed, and store one email's body. Clears any stale vectors
    /// first so a retry cannot leave duplicates behind.
    async fn index_email(&mut self, email: &EmailMessage) -> Result<usize> {
        self.vector_store
            .delete_email_embeddings(&email.id.to_string())
            .await?;

        let chunks = chunk_email_body(&email.body, &self.config.chunking)?;
        if chunks.is_empty() {
            self.database
                .update_email(
                    email.id,
                    EmailUpdate {
                        status: Some(EmailStatus::Indexed),
                        error_message: None,
                        chunk_count: Some(0),
                    },
                )
                .await?;
            return Ok(0);
        }

        // Embed the chunk with its subject and sender prefixed, so retrieval
        // can match on who sent it and what it was about
        let contextual: Vec<_> = chunks
            .iter()
            .map(|chunk| {
                create_contextual_chunk(
                    &chunk.content,
                    &email.subject,
                    &email.sender,
                    chunk.chunk_index,
                )
            })
            .collect();

        let embeddings = self.gemini.generate_chunk_embeddings(&contextual)?;

        let received_date = DateTime::<Utc>::from_naive_utc_and_offset(email.received_date, Utc);
        let now = Utc::now().to_rfc3339();

        let records: Vec<EmbeddingRecord> = embeddings
            .into_iter()
            .zip(chunks.iter())
            .map(|(result, chunk)| EmbeddingRecord {
                id: Uuid::new_v4().to_string(),
                vector: result.embedding,
                metadata: EmailChunkMetadata {
                    email_id: email.id.to_string(),
                    sender: email.sender.clone(),
                    subject: email.subject.clone(),
                    received_date: received_date.to_rfc3339(),
                    content: chunk.content.clone(),
                    token_count: chunk.token_count as u32,
                    chunk_index: chunk.chunk_index as u32,
                    created_at: now.clone(),
                },
            })
            .collect();

        let chunk_count = records.len();
        self.vector_store.store_embeddings_batch(records).await?;

        self.database
            .update_email(
                email.id,
                EmailUpdate {
                    status: Some(EmailStatus::Indexed),
                    error_message: None,
                    chunk_count: Some(chunk_count as i64),
                },
            )
            .await?;

        debug!("Indexed email {} into {} chunks", email.id, chunk_count);
        Ok(chunk_count)
    }
}

/// Prefer the HTML part and reduce it to text; fall back to cleaning the
/// plain-text part. Returns None when neither yields anything.
fn clean_fetched_body(fetched: &FetchedEmail) -> Option<String> {
    let cleaned = match (&fetched.html_body, &fetched.text_body) {
        (Some(html), _) => html_to_text(html),
        (None, Some(text)) => clean_email_text(text),
        (None, None) => return None,
    };

    if cleaned.trim().is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

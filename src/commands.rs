use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::database::sqlite::Database;
use crate::database::sqlite::models::EmailStatus;
use crate::gmail::{GmailAuthenticator, GmailClient};
use crate::indexer::Indexer;
use crate::rag::{self, GenerationOptions};
use crate::server;

/// Fetch new emails from Gmail and index them.
#[inline]
pub async fn fetch_emails(days: Option<u32>, max_results: Option<u32>) -> Result<()> {
    let mut config = Config::load_default()?;
    if let Some(days) = days {
        config.gmail.fetch_window_days = i64::from(days);
    }
    if let Some(max) = max_results {
        config.gmail.max_results = max;
    }
    config.validate().context("Invalid configuration")?;

    if config.gmail.senders.is_empty() {
        println!("No senders configured. Run 'mailgist config' to add some first.");
        return Ok(());
    }

    info!(
        "Fetching mail from {} senders over the last {} days",
        config.gmail.senders.len(),
        config.gmail.fetch_window_days
    );

    let authenticator = GmailAuthenticator::new(&config)?;
    let access_token = authenticator
        .access_token()
        .context("Gmail authorization failed")?;
    let gmail = GmailClient::new(access_token)?;

    let mut indexer = Indexer::new(config).await?;
    let stats = indexer.sync_mailbox(&gmail).await?;

    println!("Fetch completed!");
    println!("  Messages matching query: {}", stats.listed);
    println!("  Newly fetched: {}", stats.fetched);
    println!("  Already stored: {}", stats.skipped);
    println!("  Indexed: {} ({} chunks)", stats.indexed, stats.chunks);
    if stats.failed > 0 {
        println!("  ⚠️  Failed: {} (retried on the next fetch)", stats.failed);
    }

    Ok(())
}

/// Answer a question against the indexed mailbox.
#[inline]
pub async fn ask_question(question: String, top_k: Option<usize>, count_tokens: bool) -> Result<()> {
    let config = Config::load_default()?;

    let indexer = Indexer::new(config.clone()).await?;

    let options = GenerationOptions {
        top_k: top_k.unwrap_or(config.rag.top_k),
        count_tokens,
        temperature: None,
        max_output_tokens: None,
    };

    let answer = rag::answer_question(
        &config,
        indexer.gemini(),
        indexer.vector_store(),
        &question,
        options,
    )
    .await?;

    if let Some(tokens) = answer.prompt_tokens {
        println!("Number of input tokens: {}", tokens);
        println!();
    }

    println!("{}", answer.answer);

    if !answer.sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &answer.sources {
            println!(
                "  {} - {} (similarity {:.2})",
                source.sender, source.subject, source.similarity
            );
        }
    }

    Ok(())
}

/// Summarize the emails received in the last N days.
#[inline]
pub async fn summarize_emails(days: Option<u32>, count_tokens: bool) -> Result<()> {
    let config = Config::load_default()?;
    let days = days.unwrap_or(config.rag.summary_window_days as u32);

    let indexer = Indexer::new(config.clone()).await?;

    let mut options = GenerationOptions::from_config(&config);
    options.count_tokens = count_tokens;

    let answer =
        rag::summarize_window(&config, indexer.gemini(), indexer.database(), days, options)
            .await?;

    if let Some(tokens) = answer.prompt_tokens {
        println!("Number of input tokens: {}", tokens);
        println!();
    }

    println!("{}", answer.answer);

    Ok(())
}

/// List all stored emails with their indexing state.
#[inline]
pub async fn list_emails() -> Result<()> {
    let config = Config::load_default()?;
    let database = Database::new(config.database_path())
        .await
        .context("Failed to initialize database")?;

    let emails = database.list_emails().await?;

    if emails.is_empty() {
        println!("No emails stored yet.");
        println!("Use 'mailgist fetch' to pull some in.");
        return Ok(());
    }

    println!("Stored Emails ({} total):", emails.len());
    println!();

    for email in &emails {
        println!("✉️  {} (ID: {})", email.subject, email.id);
        println!("   From: {}", email.sender);
        println!(
            "   Received: {}",
            email.received_date.format("%Y-%m-%d %H:%M:%S")
        );
        println!("   Status: {}", email.status);
        if email.chunk_count > 0 {
            println!("   Chunks: {}", email.chunk_count);
        }
        if let Some(error) = &email.error_message {
            println!("   ⚠️  Error: {}", error);
        }
        println!();
    }

    let indexed = emails.iter().filter(|e| e.is_indexed()).count();
    let pending = emails.iter().filter(|e| e.is_pending()).count();
    let failed = emails.iter().filter(|e| e.is_failed()).count();

    println!("Summary:");
    println!("  Total: {}", emails.len());
    println!("  Indexed: {}", indexed);
    println!("  Pending: {}", pending);
    println!("  Failed: {}", failed);

    Ok(())
}

/// Show the state of both stores and the configured models.
#[inline]
pub async fn show_status() -> Result<()> {
    let config = Config::load_default()?;

    println!("Configuration:");
    println!("  Config dir: {}", config.get_base_dir().display());
    println!("  Generation model: {}", config.gemini.model);
    println!("  Embedding model: {}", config.gemini.embedding_model);
    println!("  Senders: {}", config.gmail.senders.join(", "));
    println!();

    match GmailAuthenticator::new(&config) {
        Ok(authenticator) => {
            if authenticator.has_cached_token() {
                println!("Gmail: token cached ✅");
            } else {
                println!("Gmail: not authorized yet (run 'mailgist fetch')");
            }
        }
        Err(e) => println!("Gmail: credentials missing ({})", e),
    }
    println!();

    let indexer = Indexer::new(config).await?;

    let stats = indexer.database().mailbox_stats().await?;
    println!("Metadata store:");
    println!("  Emails: {}", stats.total);
    println!("  Indexed: {}", stats.indexed);
    println!("  Pending: {}", stats.pending);
    println!("  Failed: {}", stats.failed);
    if let Some(newest) = stats.newest_received {
        println!("  Newest: {}", newest.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(oldest) = stats.oldest_received {
        println!("  Oldest: {}", oldest.format("%Y-%m-%d %H:%M:%S"));
    }
    println!();

    let embeddings = indexer.vector_store().count_embeddings().await?;
    let healthy = indexer.vector_store().validate_integrity().await?;
    println!("Vector store:");
    println!("  Embeddings: {}", embeddings);
    println!("  Integrity: {}", if healthy { "ok ✅" } else { "CORRUPTED ⚠️" });

    match indexer.gemini().health_check() {
        Ok(()) => println!("Gemini API: reachable ✅"),
        Err(e) => println!("Gemini API: unreachable ({})", e),
    }

    Ok(())
}

/// Retry indexing for emails that are stored but not yet embedded.
#[inline]
pub async fn reindex_emails() -> Result<()> {
    let config = Config::load_default()?;

    let mut indexer = Indexer::new(config).await?;

    let pending = indexer
        .database()
        .list_emails_by_status(EmailStatus::Pending)
        .await?
        .len();
    let failed = indexer
        .database()
        .list_emails_by_status(EmailStatus::Failed)
        .await?
        .len();

    if pending + failed == 0 {
        println!("Nothing to reindex.");
        return Ok(());
    }

    println!("Reindexing {} emails ({} failed)...", pending + failed, failed);

    let stats = indexer.reindex_pending().await?;

    println!("Reindex completed!");
    println!("  Indexed: {} ({} chunks)", stats.indexed, stats.chunks);
    if stats.failed > 0 {
        println!("  ⚠️  Still failing: {}", stats.failed);
    }

    Ok(())
}

/// Start the web UI and JSON API.
#[inline]
pub async fn serve_web(port: Option<u16>) -> Result<()> {
    let config = Config::load_default()?;
    config.validate().context("Invalid configuration")?;

    server::serve(config, port).await
}

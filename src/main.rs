use clap::{Parser, Subcommand};
use mailgist::Result;
use mailgist::commands::{
    ask_question, fetch_emails, list_emails, reindex_emails, serve_web, show_status,
    summarize_emails,
};
use mailgist::config::{run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "mailgist")]
#[command(about = "Fetch newsletters from Gmail, index them locally, and talk to them with Gemini")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure senders, models, and generation settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Fetch new emails from Gmail and index them
    Fetch {
        /// How many days back to search (overrides the configured window)
        #[arg(long)]
        days: Option<u32>,
        /// Maximum number of messages to fetch
        #[arg(long)]
        max_results: Option<u32>,
    },
    /// Ask a question against the indexed mailbox
    Ask {
        /// The question to answer
        question: String,
        /// How many retrieved chunks to use as context
        #[arg(long)]
        top_k: Option<usize>,
        /// Report the prompt's token count
        #[arg(long)]
        count_tokens: bool,
    },
    /// Summarize the emails received in the last N days
    Summarize {
        /// How many days back to summarize
        #[arg(long)]
        days: Option<u32>,
        /// Report the prompt's token count
        #[arg(long)]
        count_tokens: bool,
    },
    /// List stored emails and their indexing state
    List,
    /// Retry indexing for emails that failed or never got embedded
    Reindex,
    /// Show the state of the stores and the configured models
    Status,
    /// Start the web UI and JSON API
    Serve {
        /// Port to listen on (overrides the configured port)
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Fetch { days, max_results } => {
            fetch_emails(days, max_results).await?;
        }
        Commands::Ask {
            question,
            top_k,
            count_tokens,
        } => {
            ask_question(question, top_k, count_tokens).await?;
        }
        Commands::Summarize { days, count_tokens } => {
            summarize_emails(days, count_tokens).await?;
        }
        Commands::List => {
            list_emails().await?;
        }
        Commands::Reindex => {
            reindex_emails().await?;
        }
        Commands::Status => {
            show_status().await?;
        }
        Commands::Serve { port } => {
            serve_web(port).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["mailgist", "list"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            matches!(parsed.command, Commands::List);
        }
    }

    #[test]
    fn ask_command_with_question() {
        let cli = Cli::try_parse_from(["mailgist", "ask", "What is the kernel trick?"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ask {
                question,
                top_k,
                count_tokens,
            } = parsed.command
            {
                assert_eq!(question, "What is the kernel trick?");
                assert_eq!(top_k, None);
                assert!(!count_tokens);
            }
        }
    }

    #[test]
    fn ask_command_with_options() {
        let cli = Cli::try_parse_from([
            "mailgist",
            "ask",
            "What is attention?",
            "--top-k",
            "5",
            "--count-tokens",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ask {
                top_k,
                count_tokens,
                ..
            } = parsed.command
            {
                assert_eq!(top_k, Some(5));
                assert!(count_tokens);
            }
        }
    }

    #[test]
    fn fetch_command_with_window() {
        let cli = Cli::try_parse_from(["mailgist", "fetch", "--days", "14"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Fetch { days, max_results } = parsed.command {
                assert_eq!(days, Some(14));
                assert_eq!(max_results, None);
            }
        }
    }

    #[test]
    fn serve_command_with_port() {
        let cli = Cli::try_parse_from(["mailgist", "serve", "--port", "9000"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Serve { port } = parsed.command {
                assert_eq!(port, Some(9000));
            }
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["mailgist", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["mailgist", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["mailgist", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}

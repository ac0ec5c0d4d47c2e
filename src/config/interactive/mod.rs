#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input};

use super::{Config, GeminiConfig, GmailConfig, get_config_dir};

#[inline]
pub fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("🔧 Mailgist Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config()?;

    eprintln!("{}", style("Gmail Settings").bold().yellow());
    eprintln!("Which senders to watch and how much mail to pull per fetch.");
    eprintln!();
    configure_gmail(&mut config.gmail)?;

    eprintln!();
    eprintln!("{}", style("Gemini Settings").bold().yellow());
    eprintln!("Hosted model used for embeddings and answers.");
    eprintln!();
    configure_gemini(&mut config.gemini)?;

    eprintln!();
    match config.gemini.api_key() {
        Ok(_) => eprintln!(
            "{}",
            style(format!("✓ {} is set", config.gemini.api_key_env)).green()
        ),
        Err(_) => eprintln!(
            "{}",
            style(format!(
                "⚠ Warning: {} is not set; API calls will fail until it is",
                config.gemini.api_key_env
            ))
            .yellow()
        ),
    }

    if !config.credentials_path().exists() {
        eprintln!(
            "{}",
            style(format!(
                "⚠ Warning: no OAuth client secrets at {}",
                config.credentials_path().display()
            ))
            .yellow()
        );
        eprintln!("Download credentials.json from the Google Cloud console before fetching.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config() -> Result<()> {
    let config_dir = get_config_dir()?;
    let config = Config::load(&config_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Gmail Settings:").bold().yellow());
    if config.gmail.senders.is_empty() {
        eprintln!("  Senders: {}", style("none configured").red());
    } else {
        eprintln!(
            "  Senders: {}",
            style(config.gmail.senders.join(", ")).cyan()
        );
    }
    eprintln!(
        "  Max results: {}",
        style(config.gmail.max_results).cyan()
    );
    eprintln!(
        "  Fetch window: {} days",
        style(config.gmail.fetch_window_days).cyan()
    );
    eprintln!(
        "  Credentials: {}",
        style(config.credentials_path().display()).cyan()
    );
    eprintln!("  Token cache: {}", style(config.token_path().display()).cyan());

    eprintln!();
    eprintln!("{}", style("Gemini Settings:").bold().yellow());
    eprintln!("  Model: {}", style(&config.gemini.model).cyan());
    eprintln!(
        "  Embedding model: {}",
        style(&config.gemini.embedding_model).cyan()
    );
    eprintln!(
        "  Temperature: {}",
        style(config.gemini.temperature).cyan()
    );
    eprintln!(
        "  Max output tokens: {}",
        style(config.gemini.max_output_tokens).cyan()
    );
    eprintln!(
        "  API key env: {}",
        style(&config.gemini.api_key_env).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Server Settings:").bold().yellow());
    eprintln!(
        "  Listen: {}:{}",
        style(&config.server.host).cyan(),
        style(config.server.port).cyan()
    );
    eprintln!(
        "  RAG top_k: {}",
        style(config.rag.top_k).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config() -> Result<Config> {
    let config_dir = get_config_dir()?;
    Config::load(&config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No readable configuration found. Using defaults.").yellow()
            );
            Ok(Config::defaults_in(&config_dir))
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_gmail(gmail: &mut GmailConfig) -> Result<()> {
    let senders_raw: String = Input::new()
        .with_prompt("Watched senders (comma-separated email addresses)")
        .default(gmail.senders.join(","))
        .allow_empty(true)
        .interact_text()?;

    let senders: Vec<String> = senders_raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let max_results: u32 = Input::new()
        .with_prompt("Max messages per fetch")
        .default(gmail.max_results)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 || *input > 500 {
                Err("Must be between 1 and 500")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let window: i64 = Input::new()
        .with_prompt("Fetch window in days")
        .default(gmail.fetch_window_days)
        .validate_with(|input: &i64| -> Result<(), &str> {
            if !(0..=365).contains(input) {
                Err("Must be between 0 and 365")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    gmail.set_senders(senders)?;
    gmail.set_max_results(max_results)?;
    gmail.set_fetch_window_days(window)?;

    Ok(())
}

fn configure_gemini(gemini: &mut GeminiConfig) -> Result<()> {
    let model: String = Input::new()
        .with_prompt("Generation model")
        .default(gemini.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let embedding_model: String = Input::new()
        .with_prompt("Embedding model")
        .default(gemini.embedding_model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let temperature: f32 = Input::new()
        .with_prompt("Temperature")
        .default(gemini.temperature)
        .validate_with(|input: &f32| -> Result<(), &str> {
            if !(0.0..=2.0).contains(input) {
                Err("Must be between 0.0 and 2.0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let max_output_tokens: u32 = Input::new()
        .with_prompt("Max output tokens")
        .default(gemini.max_output_tokens)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 || *input > 10000 {
                Err("Must be between 1 and 10000")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    gemini.set_model(model)?;
    gemini.set_embedding_model(embedding_model)?;
    gemini.set_temperature(temperature)?;
    gemini.set_max_output_tokens(max_output_tokens)?;

    Ok(())
}


use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::embeddings::chunking::ChunkingConfig;

pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 768;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub gmail: GmailConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Gmail fetch settings: which senders to watch and how far back to look.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GmailConfig {
    /// Sender addresses whose mail gets indexed (newsletters, digests).
    pub senders: Vec<String>,
    pub max_results: u32,
    pub fetch_window_days: i64,
    /// OAuth client secrets file, relative to the config dir unless absolute.
    pub credentials_file: String,
    /// Cached OAuth tokens, relative to the config dir unless absolute.
    pub token_file: String,
    /// Loopback port for the OAuth consent redirect.
    pub redirect_port: u16,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            senders: Vec::new(),
            max_results: 100,
            fetch_window_days: 7,
            credentials_file: "credentials.json".to_string(),
            token_file: "token.json".to_string(),
            redirect_port: 42813,
        }
    }
}

/// Hosted Gemini API settings. The API key itself is never written to the
/// config file; it is read from the environment variable named here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeminiConfig {
    pub model: String,
    pub embedding_model: String,
    pub embedding_dimension: u32,
    pub batch_size: u32,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub api_key_env: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            embedding_model: "text-embedding-004".to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            batch_size: 16,
            temperature: 0.1,
            max_output_tokens: 2000,
            api_key_env: "GEMINI_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8675,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// How many retrieved chunks go into the answer prompt.
    pub top_k: usize,
    pub summary_window_days: i64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: 2,
            summary_window_days: 7,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid sender address: {0} (cannot be empty or contain spaces)")]
    InvalidSender(String),
    #[error("Invalid max results: {0} (must be between 1 and 500)")]
    InvalidMaxResults(u32),
    #[error("Invalid fetch window: {0} days (must be between 0 and 365)")]
    InvalidFetchWindow(i64),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid temperature: {0} (must be between 0.0 and 2.0)")]
    InvalidTemperature(f32),
    #[error("Invalid max output tokens: {0} (must be between 1 and 10000)")]
    InvalidMaxOutputTokens(u32),
    #[error("Invalid batch size: {0} (must be between 1 and 100)")]
    InvalidBatchSize(u32),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid API key environment variable name: {0}")]
    InvalidApiKeyEnv(String),
    #[error("Invalid port: {0} (must be nonzero)")]
    InvalidPort(u16),
    #[error("Invalid top_k: {0} (must be between 1 and 10)")]
    InvalidTopK(usize),
    #[error("Invalid target chunk size: {0} (must be between 100 and 2048)")]
    InvalidTargetChunkSize(usize),
    #[error("Invalid max chunk size: {0} (must be between 200 and 4096)")]
    InvalidMaxChunkSize(usize),
    #[error("Invalid min chunk size: {0} (must be between 50 and 1024)")]
    InvalidMinChunkSize(usize),
    #[error("Invalid overlap size: {0} (must be between 0 and 512)")]
    InvalidOverlapSize(usize),
    #[error("Max chunk size ({0}) must be greater than target chunk size ({1})")]
    MaxChunkSizeTooSmall(usize, usize),
    #[error("Target chunk size ({0}) must be greater than min chunk size ({1})")]
    TargetChunkSizeTooSmall(usize, usize),
    #[error("Environment variable {0} is not set")]
    MissingApiKey(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Load config from `<config_dir>/config.toml`, falling back to defaults
    /// when the file does not exist yet.
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self::defaults_in(config_dir));
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    /// Default configuration rooted at the given config directory.
    #[inline]
    pub fn defaults_in<P: AsRef<Path>>(config_dir: P) -> Self {
        Self {
            gmail: GmailConfig::default(),
            gemini: GeminiConfig::default(),
            chunking: ChunkingConfig::default(),
            server: ServerConfig::default(),
            rag: RagConfig::default(),
            base_dir: config_dir.as_ref().to_path_buf(),
        }
    }

    /// Load from the default user config directory.
    #[inline]
    pub fn load_default() -> Result<Self> {
        let config_dir = super::get_config_dir()?;
        Self::load(config_dir)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gmail.validate()?;
        self.gemini.validate()?;
        self.validate_server_config()?;
        self.validate_rag_config()?;
        self.validate_chunking_config()?;
        Ok(())
    }

    fn validate_server_config(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort(self.server.port));
        }
        Ok(())
    }

    fn validate_rag_config(&self) -> Result<(), ConfigError> {
        if !(1..=10).contains(&self.rag.top_k) {
            return Err(ConfigError::InvalidTopK(self.rag.top_k));
        }
        if !(0..=365).contains(&self.rag.summary_window_days) {
            return Err(ConfigError::InvalidFetchWindow(
                self.rag.summary_window_days,
            ));
        }
        Ok(())
    }

    fn validate_chunking_config(&self) -> Result<(), ConfigError> {
        let config = &self.chunking;

        if !(100..=2048).contains(&config.target_chunk_size) {
            return Err(ConfigError::InvalidTargetChunkSize(
                config.target_chunk_size,
            ));
        }

        if !(200..=4096).contains(&config.max_chunk_size) {
            return Err(ConfigError::InvalidMaxChunkSize(config.max_chunk_size));
        }

        if !(50..=1024).contains(&config.min_chunk_size) {
            return Err(ConfigError::InvalidMinChunkSize(config.min_chunk_size));
        }

        if config.overlap_size > 512 {
            return Err(ConfigError::InvalidOverlapSize(config.overlap_size));
        }

        if config.max_chunk_size <= config.target_chunk_size {
            return Err(ConfigError::MaxChunkSizeTooSmall(
                config.max_chunk_size,
                config.target_chunk_size,
            ));
        }

        if config.target_chunk_size <= config.min_chunk_size {
            return Err(ConfigError::TargetChunkSizeTooSmall(
                config.target_chunk_size,
                config.min_chunk_size,
            ));
        }

        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Get the path for the SQLite database
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.get_base_dir().join("metadata.db")
    }

    /// Get the path for the vector database directory
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.get_base_dir().join("vectors")
    }

    /// Get the path to the Google OAuth client secrets file
    #[inline]
    pub fn credentials_path(&self) -> PathBuf {
        self.resolve_path(&self.gmail.credentials_file)
    }

    /// Get the path to the cached OAuth token file
    #[inline]
    pub fn token_path(&self) -> PathBuf {
        self.resolve_path(&self.gmail.token_file)
    }

    fn resolve_path(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.get_base_dir().join(path)
        }
    }
}

impl GmailConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for sender in &self.senders {
            if sender.trim().is_empty() || sender.contains(char::is_whitespace) {
                return Err(ConfigError::InvalidSender(sender.clone()));
            }
        }

        if self.max_results == 0 || self.max_results > 500 {
            return Err(ConfigError::InvalidMaxResults(self.max_results));
        }

        if !(0..=365).contains(&self.fetch_window_days) {
            return Err(ConfigError::InvalidFetchWindow(self.fetch_window_days));
        }

        if self.redirect_port == 0 {
            return Err(ConfigError::InvalidPort(self.redirect_port));
        }

        Ok(())
    }

    pub fn set_senders(&mut self, senders: Vec<String>) -> Result<(), ConfigError> {
        for sender in &senders {
            if sender.trim().is_empty() || sender.contains(char::is_whitespace) {
                return Err(ConfigError::InvalidSender(sender.clone()));
            }
        }
        self.senders = senders;
        Ok(())
    }

    pub fn set_max_results(&mut self, max_results: u32) -> Result<(), ConfigError> {
        if max_results == 0 || max_results > 500 {
            return Err(ConfigError::InvalidMaxResults(max_results));
        }
        self.max_results = max_results;
        Ok(())
    }

    pub fn set_fetch_window_days(&mut self, days: i64) -> Result<(), ConfigError> {
        if !(0..=365).contains(&days) {
            return Err(ConfigError::InvalidFetchWindow(days));
        }
        self.fetch_window_days = days;
        Ok(())
    }
}

impl GeminiConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }

        if self.max_output_tokens == 0 || self.max_output_tokens > 10000 {
            return Err(ConfigError::InvalidMaxOutputTokens(self.max_output_tokens));
        }

        if self.batch_size == 0 || self.batch_size > 100 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(64..=4096).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        if self.api_key_env.trim().is_empty() || self.api_key_env.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidApiKeyEnv(self.api_key_env.clone()));
        }

        Ok(())
    }

    /// Read the API key from the configured environment variable.
    #[inline]
    pub fn api_key(&self) -> Result<String, ConfigError> {
        std::env::var(&self.api_key_env)
            .map_err(|_| ConfigError::MissingApiKey(self.api_key_env.clone()))
    }

    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }

    pub fn set_embedding_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.embedding_model = model;
        Ok(())
    }

    pub fn set_temperature(&mut self, temperature: f32) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::InvalidTemperature(temperature));
        }
        self.temperature = temperature;
        Ok(())
    }

    pub fn set_max_output_tokens(&mut self, tokens: u32) -> Result<(), ConfigError> {
        if tokens == 0 || tokens > 10000 {
            return Err(ConfigError::InvalidMaxOutputTokens(tokens));
        }
        self.max_output_tokens = tokens;
        Ok(())
    }

    pub fn set_batch_size(&mut self, batch_size: u32) -> Result<(), ConfigError> {
        if batch_size == 0 || batch_size > 100 {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(())
    }

    pub fn set_embedding_dimension(&mut self, dimension: u32) -> Result<(), ConfigError> {
        if !(64..=4096).contains(&dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(dimension));
        }
        self.embedding_dimension = dimension;
        Ok(())
    }
}

//! TOML Configuration File Support
//!
//! Centralized configuration loading for citechat, from a TOML file at
//! `~/.config/citechat/config.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # XDG Base Directory Compliance
//!
//! - `$XDG_CONFIG_HOME/citechat/config.toml` (typically `~/.config/citechat/config.toml`)
//!
//! # Example Configuration
//!
//! ```toml
//! [backend]
//! api_url = "https://api.trieve.ai"
//! api_key = "tr-********"
//! dataset_id = "6b4f1c3e-..."
//! owner_id = "me"
//! timeout_secs = 10
//!
//! [chat]
//! search_type = "hybrid"
//! page_size = 10
//! system_prompt = "Answer only from the provided sources."
//! temperature = 0.5
//! max_tokens = 1024
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Overrides |
//! |---|---|
//! | `CITECHAT_API_URL` | `backend.api_url` |
//! | `CITECHAT_API_KEY` | `backend.api_key` |
//! | `CITECHAT_DATASET_ID` | `backend.dataset_id` |
//! | `CITECHAT_OWNER_ID` | `backend.owner_id` |
//! | `CITECHAT_TIMEOUT_SECS` | `backend.timeout_secs` |

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{LlmOptions, MessageOptions, SearchType};

/// Default API root
pub const DEFAULT_API_URL: &str = "https://api.trieve.ai";

/// Owner id used for created topics when none is configured
pub const DEFAULT_OWNER_ID: &str = "citechat";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where the highest-priority configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[backend]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendToml {
    /// API root URL
    pub api_url: Option<String>,

    /// API key sent as `Authorization`
    pub api_key: Option<String>,

    /// Dataset id sent as `TR-Dataset`
    pub dataset_id: Option<String>,

    /// Owner of created topics
    pub owner_id: Option<String>,

    /// Connect timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// `[chat]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatToml {
    /// Retrieval strategy
    pub search_type: Option<SearchType>,

    /// Chunks retrieved per message
    pub page_size: Option<u32>,

    /// System prompt override
    pub system_prompt: Option<String>,

    /// Sampling temperature
    pub temperature: Option<f32>,

    /// Maximum generated tokens
    pub max_tokens: Option<u32>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CitechatToml {
    /// Backend section
    pub backend: BackendToml,

    /// Chat section
    pub chat: ChatToml,
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Connection settings for the chat backend
#[derive(Clone, Debug, PartialEq)]
pub struct BackendSettings {
    /// API root URL
    pub api_url: String,
    /// API key, if any
    pub api_key: Option<String>,
    /// Dataset to chat against
    pub dataset_id: String,
    /// Owner of created topics
    pub owner_id: String,
    /// Connect timeout
    pub connect_timeout: Duration,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            dataset_id: String::new(),
            owner_id: DEFAULT_OWNER_ID.to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Retrieval and generation defaults for every message
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatSettings {
    /// Retrieval strategy
    pub search_type: Option<SearchType>,
    /// Chunks retrieved per message
    pub page_size: Option<u32>,
    /// System prompt override
    pub system_prompt: Option<String>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Maximum generated tokens
    pub max_tokens: Option<u32>,
}

impl ChatSettings {
    /// Request options carrying these settings
    #[must_use]
    pub fn to_message_options(&self) -> MessageOptions {
        let llm = LlmOptions {
            system_prompt: self.system_prompt.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            completion_first: None,
        };

        MessageOptions {
            search_type: self.search_type,
            page_size: self.page_size,
            llm_options: (!llm.is_empty()).then_some(llm),
            ..Default::default()
        }
    }
}

/// Fully resolved citechat configuration
#[derive(Clone, Debug)]
pub struct CitechatConfig {
    /// Backend connection
    pub backend: BackendSettings,

    /// Message defaults
    pub chat: ChatSettings,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    source: ConfigSource,
}

impl Default for CitechatConfig {
    fn default() -> Self {
        Self {
            backend: BackendSettings::default(),
            chat: ChatSettings::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl CitechatConfig {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest-priority layer that set a value
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Check that the configuration can reach a backend
    ///
    /// A missing API key only logs a warning; public datasets work without one.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ValidationError`] for an empty dataset id, a non-HTTP
    /// API URL, or a zero timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.dataset_id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "dataset_id is required (set [backend].dataset_id or CITECHAT_DATASET_ID)"
                    .to_string(),
            ));
        }

        let url = self.backend.api_url.as_str();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "api_url must start with http:// or https://, got '{url}'"
            )));
        }

        if self.backend.connect_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }

        if self.backend.api_key.is_none() {
            tracing::warn!("No API key configured; requests will be sent unauthenticated");
        }

        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/citechat/config.toml` or
/// `~/.config/citechat/config.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("citechat").join("config.toml"))
}

/// Load configuration from the default path, then the environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<CitechatConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path, then the environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<CitechatConfig, ConfigError> {
    let mut config = load_file_layer(path)?;
    apply_env_config(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Defaults plus the file at `path`, without the environment
fn load_file_layer(path: Option<PathBuf>) -> Result<CitechatConfig, ConfigError> {
    let mut config = CitechatConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: CitechatToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    Ok(config)
}

fn apply_toml_config(config: &mut CitechatConfig, toml: &CitechatToml) {
    let backend = &toml.backend;
    if let Some(ref url) = backend.api_url {
        config.backend.api_url.clone_from(url);
    }
    if backend.api_key.is_some() {
        config.backend.api_key.clone_from(&backend.api_key);
    }
    if let Some(ref dataset) = backend.dataset_id {
        config.backend.dataset_id.clone_from(dataset);
    }
    if let Some(ref owner) = backend.owner_id {
        config.backend.owner_id.clone_from(owner);
    }
    if let Some(secs) = backend.timeout_secs {
        config.backend.connect_timeout = Duration::from_secs(secs);
    }

    let chat = &toml.chat;
    if chat.search_type.is_some() {
        config.chat.search_type = chat.search_type;
    }
    if chat.page_size.is_some() {
        config.chat.page_size = chat.page_size;
    }
    if chat.system_prompt.is_some() {
        config.chat.system_prompt.clone_from(&chat.system_prompt);
    }
    if chat.temperature.is_some() {
        config.chat.temperature = chat.temperature;
    }
    if chat.max_tokens.is_some() {
        config.chat.max_tokens = chat.max_tokens;
    }
}

/// Apply environment overrides read through `var`
fn apply_env_config(config: &mut CitechatConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(url) = var("CITECHAT_API_URL") {
        config.backend.api_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(key) = var("CITECHAT_API_KEY") {
        config.backend.api_key = Some(key);
        config.source = ConfigSource::Env;
    }
    if let Some(dataset) = var("CITECHAT_DATASET_ID") {
        config.backend.dataset_id = dataset;
        config.source = ConfigSource::Env;
    }
    if let Some(owner) = var("CITECHAT_OWNER_ID") {
        config.backend.owner_id = owner;
        config.source = ConfigSource::Env;
    }
    if let Some(timeout) = var("CITECHAT_TIMEOUT_SECS") {
        match timeout.parse::<u64>() {
            Ok(secs) => {
                config.backend.connect_timeout = Duration::from_secs(secs);
                config.source = ConfigSource::Env;
            }
            Err(_) => tracing::warn!(value = %timeout, "Ignoring invalid CITECHAT_TIMEOUT_SECS"),
        }
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// API URL override
    pub api_url: Option<String>,

    /// Dataset id override
    pub dataset_id: Option<String>,

    /// Owner id override
    pub owner_id: Option<String>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set API URL override
    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    /// Set dataset id override
    #[must_use]
    pub fn with_dataset_id(mut self, dataset: impl Into<String>) -> Self {
        self.dataset_id = Some(dataset.into());
        self
    }

    /// Set owner id override
    #[must_use]
    pub fn with_owner_id(mut self, owner: impl Into<String>) -> Self {
        self.owner_id = Some(owner.into());
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut CitechatConfig) {
        if self.api_url.is_some() || self.dataset_id.is_some() || self.owner_id.is_some() {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref url) = self.api_url {
            config.backend.api_url.clone_from(url);
        }
        if let Some(ref dataset) = self.dataset_id {
            config.backend.dataset_id.clone_from(dataset);
        }
        if let Some(ref owner) = self.owner_id {
            config.backend.owner_id.clone_from(owner);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

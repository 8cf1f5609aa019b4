//! TOML Configuration File Support
//!
//! Configuration for a feed host, loaded from a TOML file at
//! `~/.config/linewindow/feed.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [source]
//! base_url = "http://localhost:8000"
//! endpoint = "/read_dataset"
//! category_param = "attack_type"
//! connect_timeout_ms = 10000
//!
//! [source.category_values]
//! Normal = "normal_run"
//!
//! [window]
//! capacity = 20
//! publish_mode = "per_line"
//!
//! [decoder]
//! utf8 = "lossy"
//! max_line_bytes = 65536
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::category::Category;
use crate::decoder::{DecoderOptions, Utf8Policy, DEFAULT_MAX_LINE_BYTES};
use crate::session::{PublishMode, SessionConfig};
use crate::source::{HttpSource, SourceError};
use crate::window::DEFAULT_WINDOW_CAPACITY;

/// Default feed server
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Default connect timeout for the HTTP source
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

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

/// Tracks where a configuration value came from
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

/// Source section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceToml {
    /// Base URL of the feed server
    pub base_url: Option<String>,

    /// Streaming endpoint path
    pub endpoint: Option<String>,

    /// Query parameter carrying the category
    pub category_param: Option<String>,

    /// Connection timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,

    /// Per-category query value overrides, keyed by category name
    pub category_values: HashMap<String, String>,
}

/// Window section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowToml {
    /// Lines kept per window
    pub capacity: Option<usize>,

    /// `per_chunk` or `per_line`
    pub publish_mode: Option<PublishMode>,
}

/// Decoder section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderToml {
    /// `lossy` or `strict`
    pub utf8: Option<String>,

    /// Longest unterminated line accepted
    pub max_line_bytes: Option<usize>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedToml {
    /// Source configuration section
    pub source: SourceToml,

    /// Window configuration section
    pub window: WindowToml,

    /// Decoder configuration section
    pub decoder: DecoderToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved configuration of a feed host
///
/// Use [`load_config`] to load configuration with proper priority handling.
#[derive(Clone, Debug)]
pub struct FeedConfig {
    /// Base URL of the feed server
    pub base_url: String,

    /// Streaming endpoint path
    pub endpoint: String,

    /// Query parameter carrying the category
    pub category_param: String,

    /// Per-category query value overrides
    pub category_values: HashMap<Category, String>,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// Lines kept per window
    pub window_capacity: usize,

    /// Publication granularity
    pub publish_mode: PublishMode,

    /// Invalid UTF-8 handling
    pub utf8: Utf8Policy,

    /// Longest unterminated line accepted
    pub max_line_bytes: usize,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            endpoint: HttpSource::DEFAULT_ENDPOINT.to_string(),
            category_param: HttpSource::DEFAULT_CATEGORY_PARAM.to_string(),
            category_values: HashMap::new(),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            publish_mode: PublishMode::default(),
            utf8: Utf8Policy::default(),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl FeedConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for a zero window capacity,
    /// a zero line limit, or an empty base URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "window capacity must be at least 1".to_string(),
            ));
        }
        if self.max_line_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "max_line_bytes must be at least 1".to_string(),
            ));
        }
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "base_url must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Session settings derived from this configuration
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            window_capacity: self.window_capacity,
            publish_mode: self.publish_mode,
            decoder: DecoderOptions {
                utf8: self.utf8,
                max_line_bytes: self.max_line_bytes,
            },
        }
    }

    /// Build the HTTP source described by this configuration
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Unavailable`] if the HTTP client cannot be built.
    pub fn http_source(&self) -> Result<HttpSource, SourceError> {
        let mut builder = HttpSource::builder(self.base_url.clone())
            .endpoint_path(self.endpoint.clone())
            .category_param(self.category_param.clone())
            .connect_timeout(self.connect_timeout);

        for (category, value) in &self.category_values {
            builder = builder.category_value(*category, value.clone());
        }

        builder.build()
    }
}

fn parse_utf8_policy(value: &str) -> Option<Utf8Policy> {
    match value.trim().to_ascii_lowercase().as_str() {
        "lossy" => Some(Utf8Policy::Lossy),
        "strict" => Some(Utf8Policy::Strict),
        _ => None,
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/linewindow/feed.toml` or
/// `~/.config/linewindow/feed.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("linewindow").join("feed.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if
/// the resolved values are invalid. A missing config file is not an error.
pub fn load_config() -> Result<FeedConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Arguments
///
/// * `path` - Optional path to the configuration file. If `None`, only defaults
///   and environment variables are used.
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or if the resolved values are invalid.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<FeedConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration, reading environment overrides through `env`
///
/// # Errors
///
/// Same as [`load_config_from_path`].
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<FeedConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = FeedConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: FeedToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config)?;
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

    apply_env_config(&mut config, env);
    config.validate()?;

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut FeedConfig, toml: &FeedToml) -> Result<(), ConfigError> {
    // Source settings
    if let Some(ref url) = toml.source.base_url {
        config.base_url = url.clone();
    }
    if let Some(ref endpoint) = toml.source.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(ref param) = toml.source.category_param {
        config.category_param = param.clone();
    }
    if let Some(timeout) = toml.source.connect_timeout_ms {
        config.connect_timeout = Duration::from_millis(timeout);
    }
    for (name, value) in &toml.source.category_values {
        let category: Category = name
            .parse()
            .map_err(|e| ConfigError::ValidationError(format!("[source.category_values]: {e}")))?;
        config.category_values.insert(category, value.clone());
    }

    // Window settings
    if let Some(capacity) = toml.window.capacity {
        config.window_capacity = capacity;
    }
    if let Some(mode) = toml.window.publish_mode {
        config.publish_mode = mode;
    }

    // Decoder settings
    if let Some(ref utf8) = toml.decoder.utf8 {
        config.utf8 = parse_utf8_policy(utf8).ok_or_else(|| {
            ConfigError::ValidationError(format!(
                "decoder.utf8 must be 'lossy' or 'strict', got '{utf8}'"
            ))
        })?;
    }
    if let Some(limit) = toml.decoder.max_line_bytes {
        config.max_line_bytes = limit;
    }

    Ok(())
}

/// Apply environment variable overrides to the config
///
/// Unparseable values are ignored with a warning.
fn apply_env_config<F>(config: &mut FeedConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    fn ignored(key: &str, value: &str) {
        tracing::warn!(key, value, "Ignoring invalid environment override");
    }

    if let Some(url) = env("LINEWINDOW_BASE_URL") {
        config.base_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(endpoint) = env("LINEWINDOW_ENDPOINT") {
        config.endpoint = endpoint;
        config.source = ConfigSource::Env;
    }
    if let Some(param) = env("LINEWINDOW_CATEGORY_PARAM") {
        config.category_param = param;
        config.source = ConfigSource::Env;
    }
    if let Some(timeout) = env("LINEWINDOW_CONNECT_TIMEOUT_MS") {
        match timeout.parse::<u64>() {
            Ok(ms) => {
                config.connect_timeout = Duration::from_millis(ms);
                config.source = ConfigSource::Env;
            }
            Err(_) => ignored("LINEWINDOW_CONNECT_TIMEOUT_MS", &timeout),
        }
    }
    if let Some(capacity) = env("LINEWINDOW_WINDOW_CAPACITY") {
        match capacity.parse::<usize>() {
            Ok(n) => {
                config.window_capacity = n;
                config.source = ConfigSource::Env;
            }
            Err(_) => ignored("LINEWINDOW_WINDOW_CAPACITY", &capacity),
        }
    }
    if let Some(mode) = env("LINEWINDOW_PUBLISH_MODE") {
        match mode.parse::<PublishMode>() {
            Ok(m) => {
                config.publish_mode = m;
                config.source = ConfigSource::Env;
            }
            Err(_) => ignored("LINEWINDOW_PUBLISH_MODE", &mode),
        }
    }
    if let Some(utf8) = env("LINEWINDOW_UTF8") {
        match parse_utf8_policy(&utf8) {
            Some(policy) => {
                config.utf8 = policy;
                config.source = ConfigSource::Env;
            }
            None => ignored("LINEWINDOW_UTF8", &utf8),
        }
    }
    if let Some(limit) = env("LINEWINDOW_MAX_LINE_BYTES") {
        match limit.parse::<usize>() {
            Ok(n) => {
                config.max_line_bytes = n;
                config.source = ConfigSource::Env;
            }
            Err(_) => ignored("LINEWINDOW_MAX_LINE_BYTES", &limit),
        }
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Command-line overrides, applied after [`load_config`]
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Base URL override
    pub base_url: Option<String>,

    /// Window capacity override
    pub window_capacity: Option<usize>,

    /// Publish mode override
    pub publish_mode: Option<PublishMode>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set base URL override
    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Set window capacity override
    #[must_use]
    pub fn with_window_capacity(mut self, capacity: usize) -> Self {
        self.window_capacity = Some(capacity);
        self
    }

    /// Set publish mode override
    #[must_use]
    pub fn with_publish_mode(mut self, mode: PublishMode) -> Self {
        self.publish_mode = Some(mode);
        self
    }

    /// Apply overrides to a configuration and re-validate it
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if an override is out of range.
    pub fn apply(&self, config: &mut FeedConfig) -> Result<(), ConfigError> {
        if self.base_url.is_some() || self.window_capacity.is_some() || self.publish_mode.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref url) = self.base_url {
            config.base_url = url.clone();
        }
        if let Some(capacity) = self.window_capacity {
            config.window_capacity = capacity;
        }
        if let Some(mode) = self.publish_mode {
            config.publish_mode = mode;
        }

        config.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================

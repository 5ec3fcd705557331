//! Configuration loading, validation, and management for Compass.
//!
//! Loads configuration from `~/.compass/config.toml` with environment
//! variable overrides. Validates all settings at startup. Every field has a
//! default, so an empty or missing file yields a working configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.compass/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the completion service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Name used in logs for the completion backend
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Base URL of an OpenAI-compatible endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Model used for every specialist
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per specialist response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Completion-service call policy
    #[serde(default)]
    pub invocation: InvocationConfig,

    /// Classifier thresholds and extra trigger keywords
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Specialist registry overrides (empty = built-in registry)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub specialists: Vec<SpecialistConfig>,

    /// Persistence backend
    #[serde(default)]
    pub store: StoreConfig,

    /// Analytics logger settings
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_true() -> bool {
    true
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("invocation", &self.invocation)
            .field("routing", &self.routing)
            .field("specialists", &self.specialists)
            .field("store", &self.store)
            .field("analytics", &self.analytics)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationConfig {
    /// Hard timeout per completion-service attempt
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Most recent messages sent as history on the first attempt
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_timeout_secs() -> u64 {
    40
}
fn default_history_limit() -> usize {
    20
}

impl Default for InvocationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            history_limit: default_history_limit(),
        }
    }
}

/// Classifier thresholds and additional trigger keywords.
///
/// Extra keywords extend the built-in tables; they never replace them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Turns after which a keyword-free conversation is supervisor-mediated
    #[serde(default = "default_multi_turn_threshold")]
    pub multi_turn_threshold: u32,

    /// Message length above which one moderate indicator escalates to high
    #[serde(default = "default_long_message_chars")]
    pub long_message_chars: usize,

    /// High-priority indicator count that yields the high tier
    #[serde(default = "default_high_priority_min")]
    pub high_priority_min: usize,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_crisis: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_high_priority: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_strong: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_moderate: Vec<String>,

    /// Extra topic keywords keyed by topic tag (e.g. "veteran")
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra_topics: HashMap<String, Vec<String>>,
}

fn default_multi_turn_threshold() -> u32 {
    2
}
fn default_long_message_chars() -> usize {
    500
}
fn default_high_priority_min() -> usize {
    2
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            multi_turn_threshold: default_multi_turn_threshold(),
            long_message_chars: default_long_message_chars(),
            high_priority_min: default_high_priority_min(),
            extra_crisis: vec![],
            extra_high_priority: vec![],
            extra_strong: vec![],
            extra_moderate: vec![],
            extra_topics: HashMap::new(),
        }
    }
}

/// A specialist entry overriding the built-in registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialistConfig {
    pub id: String,

    #[serde(default)]
    pub capability_tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Full system instructions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Reduced instructions used for the retry attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brief: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "memory", "file" or "none"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// Data directory for the file backend (default: ~/.compass/data)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

fn default_store_backend() -> String {
    "file".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Bounded queue size; records beyond it are dropped with a warning
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Also emit every record as a tracing event
    #[serde(default)]
    pub tracing_sink: bool,
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: default_queue_capacity(),
            tracing_sink: false,
        }
    }
}

const STORE_BACKENDS: [&str; 3] = ["memory", "file", "none"];

impl AppConfig {
    /// Load configuration from the default path (~/.compass/config.toml).
    ///
    /// Environment overrides:
    /// - `COMPASS_API_KEY`, then `OPENAI_API_KEY` (when no key is configured)
    /// - `COMPASS_API_URL`
    /// - `COMPASS_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("COMPASS_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(url) = std::env::var("COMPASS_API_URL") {
            config.api_url = url;
        }

        if let Ok(model) = std::env::var("COMPASS_MODEL") {
            config.model = model;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".compass")
    }

    /// Data directory used by the file store.
    pub fn data_dir(&self) -> PathBuf {
        self.store
            .path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| Self::config_dir().join("data"))
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.invocation.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "invocation.timeout_secs must be > 0".into(),
            ));
        }

        if self.routing.high_priority_min == 0 {
            return Err(ConfigError::ValidationError(
                "routing.high_priority_min must be > 0".into(),
            ));
        }

        if self.analytics.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "analytics.queue_capacity must be > 0".into(),
            ));
        }

        if !STORE_BACKENDS.contains(&self.store.backend.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "store.backend must be one of {STORE_BACKENDS:?}, got '{}'",
                self.store.backend
            )));
        }

        if self.specialists.iter().any(|s| s.id.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "specialists entries must have a non-empty id".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: default_provider(),
            api_url: default_api_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            invocation: InvocationConfig::default(),
            routing: RoutingConfig::default(),
            specialists: vec![],
            store: StoreConfig::default(),
            analytics: AnalyticsConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

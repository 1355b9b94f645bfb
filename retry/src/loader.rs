//! Layered loading of retry settings.
//!
//! Layers, later ones winning:
//! 1. Defaults (from [`RetrySettings::default`])
//! 2. Config file (`retry.toml`, or the per-user config directory)
//! 3. Environment variables (`GWS_RETRY_*`)
//!
//! Keys are accepted in snake_case or camelCase (`maxAttempts`,
//! `max_attempts`, `MAX_ATTEMPTS`), and `base_delay_ms` is an alias of
//! `initial_delay_ms`. `retriable_codes` may be a list or a comma-separated
//! string such as `429,500,503`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File, Source};
use serde::{Deserialize, Deserializer, Serialize};

use crate::policy::{DEFAULT_RETRIABLE_CODES, RetryConfig, RetryConfigError};

/// Default environment prefix.
pub const ENV_PREFIX: &str = "GWS_RETRY";

/// Directory name under the per-user config directory.
pub const CONFIG_DIR_NAME: &str = "google-workspace-mcp";

const CONFIG_FILE_NAME: &str = "retry.toml";

/// Errors that can occur while loading retry settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Configuration file not found at path: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid retry configuration: {0}")]
    Invalid(#[from] RetryConfigError),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Load(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Raw, unvalidated settings as read from files and the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
    #[serde(deserialize_with = "deserialize_codes")]
    pub retriable_codes: Vec<u16>,
    pub max_elapsed_ms: Option<u64>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_attempts: defaults.max_attempts(),
            initial_delay_ms: defaults.initial_delay().as_millis() as u64,
            max_delay_ms: defaults.max_delay().as_millis() as u64,
            backoff_multiplier: defaults.backoff_multiplier(),
            jitter_factor: defaults.jitter_factor(),
            retriable_codes: DEFAULT_RETRIABLE_CODES.to_vec(),
            max_elapsed_ms: None,
        }
    }
}

impl TryFrom<RetrySettings> for RetryConfig {
    type Error = RetryConfigError;

    fn try_from(settings: RetrySettings) -> std::result::Result<Self, Self::Error> {
        RetryConfig::builder()
            .max_attempts(settings.max_attempts)
            .initial_delay_ms(settings.initial_delay_ms)
            .max_delay_ms(settings.max_delay_ms)
            .backoff_multiplier(settings.backoff_multiplier)
            .jitter_factor(settings.jitter_factor)
            .retriable_codes(settings.retriable_codes)
            .max_elapsed_ms(settings.max_elapsed_ms)
            .build()
    }
}

/// Configuration loader with layered merging support.
pub struct RetryConfigLoader {
    config_path: Option<PathBuf>,
    env_prefix: String,
    env_source: Option<HashMap<String, String>>,
}

impl Default for RetryConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryConfigLoader {
    pub fn new() -> Self {
        Self {
            config_path: None,
            env_prefix: ENV_PREFIX.to_string(),
            env_source: None,
        }
    }

    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Reads variables from `vars` instead of the process environment.
    pub fn with_env_source(mut self, vars: HashMap<String, String>) -> Self {
        self.env_source = Some(vars);
        self
    }

    /// Merges all layers without validating them.
    pub fn load_settings(&self) -> Result<RetrySettings> {
        let mut merged = Config::builder();

        if let Some(ref path) = self.config_path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            let file_layer = Config::builder()
                .add_source(File::from(path.as_path()))
                .build()?;
            merged = apply_layer(merged, file_layer)?;
        }

        // Example: GWS_RETRY_MAX_ATTEMPTS=5, GWS_RETRY_RETRIABLE_CODES=429,503
        let env_layer = Config::builder()
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(self.env_source.clone()),
            )
            .build()?;
        merged = apply_layer(merged, env_layer)?;

        Ok(merged.build()?.try_deserialize()?)
    }

    /// Merges all layers and validates the result into a [`RetryConfig`].
    pub fn load(&self) -> Result<RetryConfig> {
        let settings = self.load_settings()?;
        let config = RetryConfig::try_from(settings)?;
        tracing::debug!(
            max_attempts = config.max_attempts(),
            initial_delay_ms = config.initial_delay().as_millis() as u64,
            max_delay_ms = config.max_delay().as_millis() as u64,
            "loaded retry configuration"
        );
        Ok(config)
    }

    /// Locates the config file in standard locations:
    /// 1. Current directory: ./retry.toml
    /// 2. Per-user config: <config_dir>/google-workspace-mcp/retry.toml
    pub fn find_config_file() -> Option<PathBuf> {
        let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
        if cwd_config.exists() {
            return Some(cwd_config);
        }

        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
            .filter(|path| path.exists())
    }

    /// Loads from the default locations and the process environment.
    pub fn load_default() -> Result<RetryConfig> {
        let loader = match Self::find_config_file() {
            Some(path) => RetryConfigLoader::new().with_file(path),
            None => RetryConfigLoader::new(),
        };
        loader.load()
    }
}

/// Copies every key of `layer` into `merged` under its canonical name.
fn apply_layer(
    mut merged: config::ConfigBuilder<config::builder::DefaultState>,
    layer: Config,
) -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
    for (key, value) in layer.collect()? {
        merged = merged.set_override(canonical_key(&key), value)?;
    }
    Ok(merged)
}

/// Maps camelCase, snake_case and alias spellings onto field names.
fn canonical_key(key: &str) -> String {
    let folded: String = key
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect();

    match folded.as_str() {
        "maxattempts" => "max_attempts",
        "initialdelayms" | "basedelayms" => "initial_delay_ms",
        "maxdelayms" => "max_delay_ms",
        "backoffmultiplier" => "backoff_multiplier",
        "jitterfactor" => "jitter_factor",
        "retriablecodes" | "retryablecodes" => "retriable_codes",
        "maxelapsedms" => "max_elapsed_ms",
        _ => return key.to_string(),
    }
    .to_string()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CodeItem {
    Number(u16),
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CodeList {
    Single(u16),
    Csv(String),
    Items(Vec<CodeItem>),
}

fn deserialize_codes<'de, D>(deserializer: D) -> std::result::Result<Vec<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let parse = |text: &str| -> std::result::Result<Vec<u16>, D::Error> {
        text.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<u16>()
                    .map_err(|_| D::Error::custom(format!("invalid retriable code '{part}'")))
            })
            .collect()
    };

    match CodeList::deserialize(deserializer)? {
        CodeList::Single(code) => Ok(vec![code]),
        CodeList::Csv(text) => parse(&text),
        CodeList::Items(items) => {
            let mut codes = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    CodeItem::Number(code) => codes.push(code),
                    CodeItem::Text(text) => codes.extend(parse(&text)?),
                }
            }
            Ok(codes)
        }
    }
}

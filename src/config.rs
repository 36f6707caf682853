//! YAML configuration for the anagram pipeline.
//!
//! Every section is optional; missing fields take their defaults. A file can
//! be loaded on its own with [`AppConfig::from_file`], or layered with
//! environment overrides through [`AppConfig::load`], where
//! `ANAGRAM__MATCHER__CACHE_CAPACITY=50000` overrides `matcher.cache_capacity`.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! version: "1.0"
//!
//! filter:
//!   required_lang: en
//!   low_letter_cutoff: 16
//!   low_unique_cutoff: 11
//!   nice_ratio_cutoff: 0.85
//!
//! matcher:
//!   cache_capacity: 200000
//!   buffer_threshold: 20000
//!   overflow_match: retain
//!   fetch_pool_size: 0
//!   eviction: inline
//!   hit_ledger_capacity: 100000
//!   snapshot_path: /var/lib/anagrammatic/cache.bin
//!   cascade:
//!     char_diff_cutoff: 0.3
//!     word_diff_cutoff: 0.3
//!     combined_words_cutoff: 0.5
//!     greedy_cutoff: 0.8
//!
//! store:
//!   backend:
//!     kind: redb
//!     dir: /var/lib/anagrammatic/overflow
//!   segment_capacity: 2000000
//!
//! stream:
//!   queue_capacity: 4096
//!   default_lang: en
//!
//! logging:
//!   level: info
//!   json: false
//! ```

use std::fs;
use std::path::Path;

use canonical::FilterConfig;
use matcher::MatcherConfig;
use serde::{Deserialize, Serialize};
use store::StoreConfig;
use thiserror::Error;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "ANAGRAM";

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("failed to layer configuration: {0}")]
    Layered(#[from] ::config::ConfigError),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// Top-level configuration for the whole pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Configuration format version
    pub version: String,
    pub filter: FilterConfig,
    pub matcher: MatcherConfig,
    pub store: StoreConfig,
    pub stream: StreamConfig,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            filter: FilterConfig::default(),
            matcher: MatcherConfig::default(),
            store: StoreConfig::default(),
            stream: StreamConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Queue between the message source and the matcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Bound of the producer/consumer queue.
    pub queue_capacity: usize,
    /// Language assumed for input lines that do not carry one.
    pub default_lang: Option<String>,
    /// Log a status line every this many messages; `0` disables it.
    pub status_every: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 4096,
            default_lang: Some("en".to_string()),
            status_every: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load a YAML configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: AppConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, then the YAML file at `path` (if given), then `ANAGRAM__*`
    /// environment variables. Every section defaults field by field, so an
    /// empty source set yields [`AppConfig::default`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigLoadError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Yaml)
                    .required(true),
            );
        }
        let config: AppConfig = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        self.filter
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("filter: {e}")))?;
        self.matcher
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("matcher: {e}")))?;
        self.store
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("store: {e}")))?;
        if self.stream.queue_capacity == 0 {
            return Err(ConfigLoadError::Validation(
                "stream.queue_capacity must be greater than zero".into(),
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigLoadError::Validation(
                "logging.level must not be empty".into(),
            ));
        }
        Ok(())
    }
}

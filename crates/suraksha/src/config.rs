//! Configuration management for suraksha.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "suraksha";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "suraksha.db";

/// Default blob directory name.
const BLOB_DIR_NAME: &str = "blobs";

/// Environment variable prefix.
const ENV_PREFIX: &str = "SURAKSHA_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `SURAKSHA_`)
/// 2. TOML config file at `~/.config/suraksha/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Notification configuration.
    pub notification: NotificationConfig,
    /// Offline sync configuration.
    pub sync: SyncConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/suraksha/suraksha.db`
    pub database_path: Option<PathBuf>,
    /// Directory for evidence and voice-note payloads.
    /// Defaults to `~/.local/share/suraksha/blobs`
    pub blob_dir: Option<PathBuf>,
}

/// Notification-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Signature appended to every emergency message.
    pub signature: String,
    /// Regex an emergency contact must match.
    pub recipient_pattern: String,
    /// Maximum emergency contacts per subject.
    pub max_contacts: usize,
}

/// Offline sync configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Largest batch accepted in one request.
    pub max_batch_size: usize,
    /// Skip operations whose idempotency token was already applied.
    pub dedup_tokens: bool,
    /// Seconds after which an unsettled token claim may be taken over.
    pub claim_timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            signature: "Suraksha 360".to_string(),
            // E.164-style phone numbers, optional leading +
            recipient_pattern: r"^\+?[0-9]{7,15}$".to_string(),
            max_contacts: 3,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 500,
            dedup_tokens: false,
            claim_timeout_secs: 300,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `SURAKSHA_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);
        let config: Config = Self::figment(&config_file).extract()?;
        config.validate()?;
        Ok(config)
    }

    fn figment(config_file: &std::path::Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        self.recipient_regex()?;

        if self.notification.max_contacts == 0 {
            return Err(Error::ConfigValidation {
                message: "max_contacts must be at least 1".to_string(),
            });
        }

        if self.notification.signature.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "signature must not be empty".to_string(),
            });
        }

        if self.sync.max_batch_size == 0 {
            return Err(Error::ConfigValidation {
                message: "max_batch_size must be greater than 0".to_string(),
            });
        }

        if self.sync.claim_timeout_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "claim_timeout_secs must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Compile the emergency contact pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is not a valid regex.
    pub fn recipient_regex(&self) -> Result<Regex> {
        Regex::new(&self.notification.recipient_pattern).map_err(|e| Error::ConfigValidation {
            message: format!(
                "invalid recipient_pattern {}: {e}",
                self.notification.recipient_pattern
            ),
        })
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the blob directory, resolving defaults if not set.
    #[must_use]
    pub fn blob_dir(&self) -> PathBuf {
        self.storage
            .blob_dir
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(BLOB_DIR_NAME))
    }
}

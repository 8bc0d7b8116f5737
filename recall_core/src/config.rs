//! Configuration file support for Recall.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/recall/config.toml`.

use crate::interval::{DEFAULT_EASY_DAYS, DEFAULT_HARD_DAYS, DEFAULT_MEDIUM_DAYS};
use crate::{Error, IntervalPolicy, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub intervals: IntervalsConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub review: ReviewConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Day sequences per grade tier
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IntervalsConfig {
    #[serde(default = "default_hard")]
    pub hard: Vec<u32>,

    #[serde(default = "default_medium")]
    pub medium: Vec<u32>,

    #[serde(default = "default_easy")]
    pub easy: Vec<u32>,
}

impl Default for IntervalsConfig {
    fn default() -> Self {
        Self {
            hard: default_hard(),
            medium: default_medium(),
            easy: default_easy(),
        }
    }
}

/// Deck file access
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

/// Review session settings
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ReviewConfig {
    /// Maximum cards per session; all due cards when unset
    #[serde(default)]
    pub session_limit: Option<usize>,
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| {
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".local/share"))
            .unwrap_or_else(|| PathBuf::from("."))
    });
    base.join("recall")
}

fn default_hard() -> Vec<u32> {
    DEFAULT_HARD_DAYS.to_vec()
}

fn default_medium() -> Vec<u32> {
    DEFAULT_MEDIUM_DAYS.to_vec()
}

fn default_easy() -> Vec<u32> {
    DEFAULT_EASY_DAYS.to_vec()
}

fn default_lock_timeout_ms() -> u64 {
    2000
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .unwrap_or_else(|| PathBuf::from("."))
        });
        base.join("recall").join("config.toml")
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Build the validated interval policy described by `[intervals]`
    pub fn interval_policy(&self) -> Result<IntervalPolicy> {
        IntervalPolicy::new(
            self.intervals.hard.clone(),
            self.intervals.medium.clone(),
            self.intervals.easy.clone(),
        )
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.persistence.lock_timeout_ms)
    }

    /// Path of the deck file under the data directory
    pub fn deck_path(data_dir: &Path) -> PathBuf {
        data_dir.join("cards.json")
    }

    /// Path of the review journal under the data directory
    pub fn journal_path(data_dir: &Path) -> PathBuf {
        data_dir.join("reviews.jsonl")
    }
}

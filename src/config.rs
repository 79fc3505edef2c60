//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.listening-study.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE: &str = ".listening-study.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Session defaults.
    #[serde(default)]
    pub session: SessionConfig,

    /// Submission settings.
    #[serde(default)]
    pub submit: SubmitConfig,

    /// Local storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Progress gate settings.
    #[serde(default)]
    pub gates: GatesConfig,
}

/// Session defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Interface language (zh, en, ja).
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
        }
    }
}

fn default_language() -> String {
    crate::session::aggregator::DEFAULT_LANGUAGE.to_string()
}

/// Submission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitConfig {
    /// Whether to POST sessions to the backend at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Backend submission endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_endpoint(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_endpoint() -> String {
    "http://localhost:8000/api/submit".to_string()
}

fn default_timeout() -> u64 {
    10
}

/// Local storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON array of every submitted session.
    #[serde(default = "default_backup_path")]
    pub backup_path: PathBuf,

    /// Directory for exported session files.
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backup_path: default_backup_path(),
            export_dir: default_export_dir(),
        }
    }
}

fn default_backup_path() -> PathBuf {
    PathBuf::from("submissions.json")
}

fn default_export_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Progress gate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatesConfig {
    /// Enforce the thresholds below. Off by default.
    #[serde(default)]
    pub enforce: bool,

    /// Songs that must be listened to before leaving a guided task.
    #[serde(default = "default_guided_min_listened")]
    pub guided_min_listened: usize,

    /// Songs that must be listened to before leaving a free task.
    #[serde(default = "default_free_min_listened")]
    pub free_min_listened: usize,

    /// Songs that must be liked before leaving a free task.
    #[serde(default = "default_free_min_liked")]
    pub free_min_liked: usize,
}

impl Default for GatesConfig {
    fn default() -> Self {
        Self {
            enforce: false,
            guided_min_listened: default_guided_min_listened(),
            free_min_listened: default_free_min_listened(),
            free_min_liked: default_free_min_liked(),
        }
    }
}

fn default_guided_min_listened() -> usize {
    1
}

fn default_free_min_listened() -> usize {
    3
}

fn default_free_min_liked() -> usize {
    1
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref language) = args.language {
            self.session.language = language.clone();
        }

        if let Some(ref endpoint) = args.endpoint {
            self.submit.endpoint = endpoint.clone();
        }
        if let Some(timeout) = args.timeout {
            self.submit.timeout_seconds = timeout;
        }
        if args.offline {
            self.submit.enabled = false;
        }

        if let Some(ref backup) = args.backup {
            self.storage.backup_path = backup.clone();
        }
        if let Some(ref dir) = args.export_dir {
            self.storage.export_dir = dir.clone();
        }

        if args.enforce_gates {
            self.gates.enforce = true;
        }
    }

    /// Endpoint to submit to, or `None` when submission is disabled.
    pub fn submit_endpoint(&self) -> Option<String> {
        if self.submit.enabled {
            Some(self.submit.endpoint.clone())
        } else {
            None
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

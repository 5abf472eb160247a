//! Configuration system for hoard.
//!
//! Provides layered configuration from multiple sources:
//!
//! 1. **Compiled defaults** - Sensible defaults built into the binary
//! 2. **Config file** - `~/.config/hoard/config.toml`, or `--config` / `HOARD_CONFIG`
//! 3. **Environment variables** - `HOARD_*` prefix
//! 4. **CLI arguments** - Highest priority, always wins
//!
//! # Example Configuration File
//!
//! ```toml
//! [paths]
//! db = "~/.local/share/hoard/hoard.db"
//! media = "~/.local/share/hoard/media"
//!
//! [sync]
//! upgrade_csv_stubs = true
//!
//! [rate_limits.favorites]
//! requests = 15
//! spacing_secs = 60
//!
//! [[accounts]]
//! handle = "alice"
//! bearer_token = "AAAA..."
//! ```

use crate::backoff::RateBudget;
use crate::error::{HoardError, Result};
use crate::remote::PAGE_SIZE;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure for hoard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub api: ApiSettings,
    pub sync: SyncConfig,
    pub rate_limits: RateLimits,
    /// Credentialed accounts to archive.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub accounts: Vec<Account>,
}

/// Storage locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Path to the `SQLite` database file.
    /// Environment variable: `HOARD_DB`
    pub db: Option<PathBuf>,

    /// Root directory for downloaded media.
    /// Environment variable: `HOARD_MEDIA`
    pub media: Option<PathBuf>,

    /// Directory for raw JSON snapshots.
    /// Environment variable: `HOARD_SNAPSHOTS`
    pub snapshots: Option<PathBuf>,
}

/// Remote API connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Environment variable: `HOARD_API_BASE`
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Statuses requested per page, capped at 200.
    pub page_size: usize,
    /// Complete CSV-only records in place when the API later returns them.
    pub upgrade_csv_stubs: bool,
    /// Media items processed between commits.
    pub download_batch: usize,
}

/// Request budgets per endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimits {
    pub timeline: RateBudget,
    pub favorites: RateBudget,
    pub lookup: RateBudget,
}

/// One archived account and its app-only bearer token.
#[derive(Clone, Serialize, Deserialize)]
pub struct Account {
    pub handle: String,
    pub bearer_token: String,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("handle", &self.handle)
            .field("bearer_token", &"***")
            .finish()
    }
}

impl Account {
    /// Handle without a leading `@`.
    #[must_use]
    pub fn name(&self) -> &str {
        self.handle.trim_start_matches('@')
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.twitter.com/1.1".to_string(),
            timeout_secs: 30,
            user_agent: format!("hoard/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            upgrade_csv_stubs: true,
            download_batch: crate::media::DEFAULT_BATCH_SIZE,
        }
    }
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            timeline: RateBudget::timeline(),
            favorites: RateBudget::favorites(),
            lookup: RateBudget::lookup(),
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// `explicit` is the `--config` path; without it the standard location is
    /// read if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read or parsed,
    /// or if an explicitly named file is missing.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from_file(path)?.ok_or_else(|| HoardError::Config {
                path: path.to_path_buf(),
                reason: "file not found".to_string(),
            })?,
            None => match Self::user_config_path() {
                Some(path) => Self::load_from_file(&path)?.unwrap_or_default(),
                None => Self::default(),
            },
        };

        config.apply_env_overrides();
        debug!("Configuration loaded: {:?}", config);
        Ok(config)
    }

    /// Load configuration from a specific file. `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML for
    /// this structure.
    pub fn load_from_file(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            debug!("Config file not found: {}", path.display());
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| HoardError::path_error("read", path, e))?;
        let config = toml::from_str(&content).map_err(|e| HoardError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        info!("Loaded config from: {}", path.display());
        Ok(Some(config))
    }

    /// Get the path to the user configuration file.
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("hoard").join("config.toml"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(db) = std::env::var("HOARD_DB") {
            self.paths.db = Some(PathBuf::from(db));
        }
        if let Ok(media) = std::env::var("HOARD_MEDIA") {
            self.paths.media = Some(PathBuf::from(media));
        }
        if let Ok(snapshots) = std::env::var("HOARD_SNAPSHOTS") {
            self.paths.snapshots = Some(PathBuf::from(snapshots));
        }
        if let Ok(base) = std::env::var("HOARD_API_BASE") {
            self.api.base_url = base;
        }
    }

    /// Credentials for `handle`, matched case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotConfigured` if no entry matches.
    pub fn account(&self, handle: &str) -> Result<&Account> {
        let wanted = handle.trim_start_matches('@');
        self.accounts
            .iter()
            .find(|a| a.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| HoardError::AccountNotConfigured {
                handle: wanted.to_string(),
            })
    }

    /// Page size the remote will actually honour.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.sync.page_size.clamp(1, PAGE_SIZE)
    }

    /// Get the database path, using defaults if not configured.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.paths.db.clone().unwrap_or_else(crate::default_db_path)
    }

    #[must_use]
    pub fn media_path(&self) -> PathBuf {
        self.paths
            .media
            .clone()
            .unwrap_or_else(crate::default_media_path)
    }

    #[must_use]
    pub fn snapshots_path(&self) -> PathBuf {
        self.paths
            .snapshots
            .clone()
            .unwrap_or_else(crate::default_snapshots_path)
    }

    /// Copy with every bearer token masked, for display.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for account in &mut copy.accounts {
            account.bearer_token = "***".to_string();
        }
        copy
    }

    /// Write [`default_config_content`](Self::default_config_content) to
    /// `path`, creating parent directories. An existing file is only
    /// replaced when `overwrite` is set.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error if the file exists and `overwrite` is
    /// false, or an IO error if the directory or file cannot be written.
    pub fn write_default(path: &Path, overwrite: bool) -> Result<()> {
        if path.exists() && !overwrite {
            return Err(HoardError::validation(format!(
                "{} already exists (use --force to overwrite)",
                path.display()
            )));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| HoardError::path_error("create", parent, e))?;
        }
        std::fs::write(path, Self::default_config_content())
            .map_err(|e| HoardError::path_error("write", path, e))?;
        info!("Wrote default config to: {}", path.display());
        Ok(())
    }

    /// Generate a default configuration file content.
    #[must_use]
    pub fn default_config_content() -> String {
        let mut content = toml::to_string_pretty(&Self::default()).unwrap_or_default();
        content.push_str(
            "\n# [[accounts]]\n# handle = \"your_handle\"\n# bearer_token = \"app-only bearer token\"\n",
        );
        content
    }
}

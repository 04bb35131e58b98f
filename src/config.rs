//! Process settings
//!
//! Loaded from built-in defaults, then a TOML file, then environment
//! variables (highest priority).

use crate::error::{Error, Result};
use crate::platform::RetryPolicy;
use crate::repos::{DEFAULT_ENVIRONMENT, Repo, RepoConfig};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Retry settings as written in the config file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts per remote call
    pub max_attempts: u32,
    /// First backoff delay in milliseconds
    pub base_delay_ms: u64,
    /// Backoff ceiling in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: u64::try_from(policy.base_delay.as_millis()).unwrap_or(u64::MAX),
            max_delay_ms: u64::try_from(policy.max_delay.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Runtime settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Deployment environment selecting the repository table
    pub environment: String,
    /// Web root of the review service
    pub phabricator_url: Option<String>,
    /// Location of the uplift request store
    pub store_path: Option<PathBuf>,
    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,
    /// Retry behaviour for remote calls
    pub retry: RetrySettings,
    /// Extra repositories, keyed by environment then short name
    pub repositories: BTreeMap<String, BTreeMap<String, Repo>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: DEFAULT_ENVIRONMENT.to_string(),
            phabricator_url: None,
            store_path: None,
            request_timeout_secs: crate::platform::DEFAULT_TIMEOUT_SECS,
            retry: RetrySettings::default(),
            repositories: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Load settings
    ///
    /// Priority:
    /// 1. Environment variables (`UPLIFT_ENVIRONMENT`, `PHABRICATOR_URL`, `UPLIFT_STORE_PATH`)
    /// 2. `path`, or the default config file when it exists
    /// 3. Built-in defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(p) => Self::from_file(p)?,
            None => match default_config_path() {
                Some(p) if p.exists() => Self::from_file(&p)?,
                _ => Self::default(),
            },
        };
        settings.apply_env();
        Ok(settings)
    }

    /// Parse settings from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    fn from_file(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading settings");
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    fn apply_env(&mut self) {
        if let Ok(environment) = env::var("UPLIFT_ENVIRONMENT") {
            self.environment = environment;
        }
        if let Ok(url) = env::var("PHABRICATOR_URL") {
            self.phabricator_url = Some(url);
        }
        if let Ok(path) = env::var("UPLIFT_STORE_PATH") {
            self.store_path = Some(PathBuf::from(path));
        }
    }

    /// Review service URL, required for any remote work
    pub fn phabricator_url(&self) -> Result<&str> {
        self.phabricator_url.as_deref().ok_or_else(|| {
            Error::Config(
                "no review service URL configured; set PHABRICATOR_URL or phabricator_url".to_string(),
            )
        })
    }

    /// Resolved store location
    pub fn store_path(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.store_path {
            return Ok(path.clone());
        }
        dirs::data_dir()
            .map(|d| d.join("uplift").join("requests.db"))
            .ok_or_else(|| Error::Config("cannot determine data directory".to_string()))
    }

    /// Repository table for the configured environment
    pub fn repo_config(&self) -> RepoConfig {
        RepoConfig::for_env(&self.environment, &self.repositories)
    }

    /// Retry policy for remote calls
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }
}

/// `$CONFIG_DIR/uplift/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("uplift").join("config.toml"))
}

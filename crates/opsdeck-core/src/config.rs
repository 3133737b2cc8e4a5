//! Application configuration management.
//!
//! Handles loading and saving the configuration: backend URL, where the
//! session token is kept, and the session/cache timing knobs.
//!
//! Configuration is stored at `~/.config/opsdeck/config.json`. Every field
//! has a default, so a partial file (or none at all) is fine.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Application name used for config/data directory paths
const APP_NAME: &str = "opsdeck";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Ceiling for the token timing knobs (ten years)
const MAX_TOKEN_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Credential file name for the `file` backend
const CREDENTIALS_FILE: &str = "credentials.json";

const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";

/// Environment variable overriding `api_base_url`
pub const ENV_API_URL: &str = "OPSDECK_API_URL";

/// Environment variable overriding `credential_backend`
pub const ENV_CREDENTIAL_BACKEND: &str = "OPSDECK_CREDENTIAL_BACKEND";

/// Where the session token and user record are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    #[default]
    File,
    Keyring,
    Memory,
}

impl std::str::FromStr for CredentialBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(CredentialBackend::File),
            "keyring" => Ok(CredentialBackend::Keyring),
            "memory" => Ok(CredentialBackend::Memory),
            other => Err(format!("unknown credential backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How often the background checker looks at the token's expiry
    pub expiry_check_interval_secs: u64,
    /// Window in which repeated `check_auth` calls collapse into one
    pub check_auth_debounce_ms: u64,
    /// How long before expiry a token counts as near expiry
    pub refresh_buffer_secs: u64,
    /// Assumed token lifetime when the gateway does not report an expiry
    pub token_lifetime_secs: u64,
    /// Upper bound on every Auth Gateway call
    pub request_timeout_secs: u64,
    /// Refresh automatically when the checker finds the token near expiry
    pub auto_refresh: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expiry_check_interval_secs: 60,
            check_auth_debounce_ms: 300,
            refresh_buffer_secs: 5 * 60,
            token_lifetime_secs: 60 * 60,
            request_timeout_secs: 30,
            auto_refresh: false,
        }
    }
}

impl SessionConfig {
    pub fn expiry_check_interval(&self) -> Duration {
        // A zero period would make tokio's interval panic
        Duration::from_secs(self.expiry_check_interval_secs.max(1))
    }

    pub fn check_auth_debounce(&self) -> Duration {
        Duration::from_millis(self.check_auth_debounce_ms)
    }

    pub fn refresh_buffer(&self) -> chrono::Duration {
        token_duration(self.refresh_buffer_secs)
    }

    pub fn token_lifetime(&self) -> chrono::Duration {
        token_duration(self.token_lifetime_secs)
    }

    /// Expiry assumed for a token issued at `now` without a reported one.
    pub fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.token_lifetime())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn token_duration(secs: u64) -> chrono::Duration {
    let secs = i64::try_from(secs.min(MAX_TOKEN_SECS)).unwrap_or(i64::MAX);
    chrono::Duration::try_seconds(secs).unwrap_or(chrono::Duration::MAX)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Default time-to-live for cached statistics
    pub ttl_secs: u64,
    /// Upper bound on a single stats fetch, retries included
    pub fetch_timeout_secs: u64,
    /// Retries for transient failures (authentication errors never retry)
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 5 * 60,
            fetch_timeout_secs: 30,
            max_retries: 3,
            initial_backoff_ms: 500,
        }
    }
}

impl StatsConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub credential_backend: CredentialBackend,
    pub last_email: Option<String>,
    pub session: SessionConfig,
    pub stats: StatsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            credential_backend: CredentialBackend::default(),
            last_email: None,
            session: SessionConfig::default(),
            stats: StatsConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply `OPSDECK_*` environment overrides.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(ENV_API_URL) {
            if !url.trim().is_empty() {
                self.api_base_url = url.trim().to_string();
            }
        }
        if let Ok(backend) = std::env::var(ENV_CREDENTIAL_BACKEND) {
            match backend.parse() {
                Ok(parsed) => self.credential_backend = parsed,
                Err(e) => warn!(error = %e, "Ignoring {}", ENV_CREDENTIAL_BACKEND),
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn credentials_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(CREDENTIALS_FILE))
    }
}

//! Client configuration, read once from the environment.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use campus_observability::{LogFormat, ObservabilityConfig};

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_RESTORE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Paths of the auth endpoints, relative to the API base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub sign_in: String,
    pub sign_up: String,
    pub who_am_i: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            sign_in: "/api/auth/signin".to_string(),
            sign_up: "/api/auth/signup".to_string(),
            who_am_i: "/api/auth/me".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_url: String,
    pub endpoints: Endpoints,
    /// SQLite file holding the persisted token. `None` uses the OS data dir.
    pub token_db: Option<PathBuf>,
    /// Upper bound for session restore. `None` waits indefinitely.
    pub restore_timeout: Option<Duration>,
    pub observability: ObservabilityConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            endpoints: Endpoints::default(),
            token_db: None,
            restore_timeout: Some(DEFAULT_RESTORE_TIMEOUT),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Build from `CAMPUS_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(url) = get("CAMPUS_API_URL") {
            config.api_url = url;
        }
        if let Some(path) = get("CAMPUS_SIGNIN_PATH") {
            config.endpoints.sign_in = path;
        }
        if let Some(path) = get("CAMPUS_SIGNUP_PATH") {
            config.endpoints.sign_up = path;
        }
        if let Some(path) = get("CAMPUS_ME_PATH") {
            config.endpoints.who_am_i = path;
        }
        if let Some(path) = get("CAMPUS_TOKEN_DB") {
            config.token_db = Some(PathBuf::from(path));
        }
        if let Some(secs) = get("CAMPUS_RESTORE_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|e| ConfigError::Invalid {
                key: "CAMPUS_RESTORE_TIMEOUT_SECS",
                reason: format!("{e}"),
            })?;
            // 0 disables the bound.
            config.restore_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(format) = get("CAMPUS_LOG_FORMAT") {
            config.observability.format =
                format.parse::<LogFormat>().map_err(|reason| ConfigError::Invalid {
                    key: "CAMPUS_LOG_FORMAT",
                    reason,
                })?;
        }

        Ok(config)
    }

    /// Resolve the token database path: explicit, else `{data_dir}/campus/session.db`.
    pub fn token_db_path(&self) -> anyhow::Result<PathBuf> {
        if let Some(path) = &self.token_db {
            return Ok(path.clone());
        }

        let base = dirs::data_dir()
            .or_else(|| {
                dirs::home_dir().map(|mut h| {
                    h.push(".local");
                    h.push("share");
                    h
                })
            })
            .context("failed to resolve OS app data directory - tried data_dir() and home_dir()/.local/share")?;

        Ok(base.join("campus").join("session.db"))
    }
}

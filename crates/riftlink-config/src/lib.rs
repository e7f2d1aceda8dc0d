//! Shared configuration for riftlink.
//!
//! TOML config file + `RIFTLINK_` environment overrides, backend API-key
//! resolution (env + keyring + plaintext), and translation to
//! `riftlink_core::MonitorConfig`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use riftlink_core::MonitorConfig;

/// Keyring service holding the backend API key.
pub const KEYRING_SERVICE: &str = "riftlink";
/// Keyring user for the backend API key.
pub const KEYRING_API_KEY: &str = "backend-api-key";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no backend API key configured")]
    NoCredentials,

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorSection,

    #[serde(default)]
    pub backend: BackendSection,
}

/// Polling and timeout knobs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MonitorSection {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_websocket_reconnect_secs")]
    pub websocket_reconnect_secs: u64,

    #[serde(default = "default_captcha_timeout_secs")]
    pub captcha_timeout_secs: u64,

    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    #[serde(default = "default_account_cache_ttl_secs")]
    pub account_cache_ttl_secs: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            websocket_reconnect_secs: default_websocket_reconnect_secs(),
            captcha_timeout_secs: default_captcha_timeout_secs(),
            probe_timeout_ms: default_probe_timeout_ms(),
            account_cache_ttl_secs: default_account_cache_ttl_secs(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    750
}
fn default_websocket_reconnect_secs() -> u64 {
    5
}
fn default_captcha_timeout_secs() -> u64 {
    30
}
fn default_probe_timeout_ms() -> u64 {
    1_000
}
fn default_account_cache_ttl_secs() -> u64 {
    300
}

/// Account backend connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct BackendSection {
    /// Backend base URL (e.g., "https://accounts.example.com").
    pub url: Option<String>,

    /// API key (plaintext — prefer keyring or env var).
    pub api_key: Option<String>,

    /// Environment variable name containing the API key.
    pub api_key_env: Option<String>,
}

impl BackendSection {
    /// Parsed backend URL, or `None` when no backend is configured.
    pub fn parsed_url(&self) -> Result<Option<url::Url>, ConfigError> {
        self.url
            .as_deref()
            .map(|raw| {
                raw.parse().map_err(|_| ConfigError::Validation {
                    field: "backend.url".into(),
                    reason: format!("invalid URL: {raw}"),
                })
            })
            .transpose()
    }
}

impl Config {
    /// Build the core monitor config, rejecting zero intervals.
    pub fn to_monitor_config(&self) -> Result<MonitorConfig, ConfigError> {
        let m = &self.monitor;
        for (field, value) in [
            ("monitor.poll_interval_ms", m.poll_interval_ms),
            ("monitor.websocket_reconnect_secs", m.websocket_reconnect_secs),
            ("monitor.captcha_timeout_secs", m.captcha_timeout_secs),
            ("monitor.probe_timeout_ms", m.probe_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Validation {
                    field: field.into(),
                    reason: "must be greater than zero".into(),
                });
            }
        }

        Ok(MonitorConfig {
            poll_interval: Duration::from_millis(m.poll_interval_ms),
            websocket_reconnect: Duration::from_secs(m.websocket_reconnect_secs),
            captcha_timeout: Duration::from_secs(m.captcha_timeout_secs),
            probe_timeout: Duration::from_millis(m.probe_timeout_ms),
            account_cache_ttl: Duration::from_secs(m.account_cache_ttl_secs),
        })
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("gg", "riftlink", "riftlink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("riftlink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file yields the defaults.
///
/// Environment keys use `__` between section and field, e.g.
/// `RIFTLINK_MONITOR__POLL_INTERVAL_MS=500`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("RIFTLINK_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the backend API key: env var named by `api_key_env`, then the
/// system keyring, then plaintext in the config.
pub fn resolve_backend_api_key(backend: &BackendSection) -> Result<SecretString, ConfigError> {
    // 1. api_key_env → env var lookup
    if let Some(ref env_name) = backend.api_key_env {
        if let Ok(val) = std::env::var(env_name) {
            if !val.is_empty() {
                return Ok(SecretString::from(val));
            }
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, KEYRING_API_KEY) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref key) = backend.api_key {
        return Ok(SecretString::from(key.clone()));
    }

    Err(ConfigError::NoCredentials)
}

//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (STOCKSYNC_*)
//! 2. TOML config file (if STOCKSYNC_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (STOCKSYNC_*)
/// 2. TOML config file (if STOCKSYNC_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Origin of the authoritative inventory API.
    ///
    /// Set via STOCKSYNC_API_BASE_URL environment variable.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Path prefix that marks a request as a data route.
    ///
    /// Set via STOCKSYNC_API_PREFIX environment variable.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Path to the SQLite local store.
    ///
    /// Set via STOCKSYNC_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via STOCKSYNC_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Seconds between periodic sync triggers.
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    /// Page size used by reconciliation to refresh the local store.
    #[serde(default = "default_sync_page_size")]
    pub sync_page_size: u32,

    /// Page size for UI listing.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Largest accepted upload, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    /// Name of the current response cache version.
    ///
    /// Activating the router deletes entries stored under any other name.
    #[serde(default = "default_cache_name")]
    pub cache_name: String,

    /// Static asset paths fetched into the response cache on install.
    #[serde(default = "default_precache_paths")]
    pub precache_paths: Vec<String>,

    /// Document served for navigational requests when both network and cache miss.
    #[serde(default = "default_offline_fallback_path")]
    pub offline_fallback_path: String,

    /// Bearer token for the authoritative API.
    ///
    /// Set via STOCKSYNC_AUTH_TOKEN environment variable. Can also be set at
    /// runtime through the session.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Seconds between connectivity probes. Zero disables probing.
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
}

fn default_api_base_url() -> String {
    "http://localhost:3000".into()
}

fn default_api_prefix() -> String {
    "/api/".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./stocksync.sqlite")
}

fn default_user_agent() -> String {
    "stocksync/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_sync_interval_secs() -> u64 {
    60
}

fn default_sync_page_size() -> u32 {
    200
}

fn default_page_size() -> u32 {
    20
}

fn default_max_upload_bytes() -> u64 {
    50 * 1024 * 1024 // 50MB
}

fn default_cache_name() -> String {
    "stocksync-v1".into()
}

fn default_precache_paths() -> Vec<String> {
    ["/", "/index.html", "/login.html", "/dashboard.html", "/css/styles.css", "/js/app.js", "/manifest.json"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_offline_fallback_path() -> String {
    "/index.html".into()
}

fn default_probe_interval_secs() -> u64 {
    15
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            api_prefix: default_api_prefix(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            sync_interval_secs: default_sync_interval_secs(),
            sync_page_size: default_sync_page_size(),
            page_size: default_page_size(),
            max_upload_bytes: default_max_upload_bytes(),
            cache_name: default_cache_name(),
            precache_paths: default_precache_paths(),
            offline_fallback_path: default_offline_fallback_path(),
            auth_token: None,
            probe_interval_secs: default_probe_interval_secs(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    /// Probe interval, or None when probing is disabled.
    pub fn probe_interval(&self) -> Option<Duration> {
        (self.probe_interval_secs > 0).then(|| Duration::from_secs(self.probe_interval_secs))
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `STOCKSYNC_`
    /// 2. TOML file from `STOCKSYNC_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file or environment cannot be parsed, or
    /// validation fails after loading.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("STOCKSYNC_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("STOCKSYNC_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Check if an auth token is configured.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if no token is set.
    pub fn require_auth_token(&self) -> Result<&str, ConfigError> {
        self.auth_token.as_deref().filter(|t| !t.is_empty()).ok_or_else(|| ConfigError::Missing {
            field: "auth_token".into(),
            hint: "Set STOCKSYNC_AUTH_TOKEN environment variable".into(),
        })
    }
}

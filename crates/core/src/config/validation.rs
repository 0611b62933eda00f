//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first field out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = url::Url::parse(&self.api_base_url).map_err(|e| invalid("api_base_url", &e.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(invalid("api_base_url", "scheme must be http or https"));
        }

        if !self.api_prefix.starts_with('/') {
            return Err(invalid("api_prefix", "must start with '/'"));
        }
        if !self.offline_fallback_path.starts_with('/') {
            return Err(invalid("offline_fallback_path", "must start with '/'"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.sync_interval_secs == 0 {
            return Err(invalid("sync_interval_secs", "must be greater than 0"));
        }
        if !(1..=1000).contains(&self.sync_page_size) {
            return Err(invalid("sync_page_size", "must be between 1 and 1000"));
        }
        if !(1..=100).contains(&self.page_size) {
            return Err(invalid("page_size", "must be between 1 and 100"));
        }
        if self.max_upload_bytes == 0 {
            return Err(invalid("max_upload_bytes", "must be greater than 0"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }
        if self.cache_name.trim().is_empty() {
            return Err(invalid("cache_name", "must not be empty"));
        }

        if self.auth_token.is_none() {
            tracing::debug!("no auth token configured; periodic sync waits for a session token");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid_field(config: AppConfig) -> String {
        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => field,
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_default_config() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_api_base_url() {
        let config = AppConfig { api_base_url: "not a url".into(), ..Default::default() };
        assert_eq!(invalid_field(config), "api_base_url");

        let config = AppConfig { api_base_url: "ftp://example.com".into(), ..Default::default() };
        assert_eq!(invalid_field(config), "api_base_url");
    }

    #[test]
    fn test_validate_prefix_and_fallback_paths() {
        let config = AppConfig { api_prefix: "api/".into(), ..Default::default() };
        assert_eq!(invalid_field(config), "api_prefix");

        let config = AppConfig { offline_fallback_path: "index.html".into(), ..Default::default() };
        assert_eq!(invalid_field(config), "offline_fallback_path");
    }

    #[test]
    fn test_validate_timeout_bounds() {
        let config = AppConfig { timeout_ms: 50, ..Default::default() };
        assert_eq!(invalid_field(config), "timeout_ms");

        let config = AppConfig { timeout_ms: 301_000, ..Default::default() };
        assert_eq!(invalid_field(config), "timeout_ms");
    }

    #[test]
    fn test_validate_page_sizes() {
        let config = AppConfig { page_size: 0, ..Default::default() };
        assert_eq!(invalid_field(config), "page_size");

        let config = AppConfig { page_size: 101, ..Default::default() };
        assert_eq!(invalid_field(config), "page_size");

        let config = AppConfig { sync_page_size: 1001, ..Default::default() };
        assert_eq!(invalid_field(config), "sync_page_size");
    }

    #[test]
    fn test_validate_zero_interval_and_upload_limit() {
        let config = AppConfig { sync_interval_secs: 0, ..Default::default() };
        assert_eq!(invalid_field(config), "sync_interval_secs");

        let config = AppConfig { max_upload_bytes: 0, ..Default::default() };
        assert_eq!(invalid_field(config), "max_upload_bytes");
    }

    #[test]
    fn test_validate_empty_strings() {
        let config = AppConfig { user_agent: String::new(), ..Default::default() };
        assert_eq!(invalid_field(config), "user_agent");

        let config = AppConfig { cache_name: "  ".into(), ..Default::default() };
        assert_eq!(invalid_field(config), "cache_name");
    }

    #[test]
    fn test_validate_edge_case_values() {
        let config = AppConfig {
            timeout_ms: 100,
            sync_interval_secs: 1,
            sync_page_size: 1000,
            page_size: 100,
            max_upload_bytes: 1,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}

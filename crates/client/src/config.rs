//! Portal configuration.
//!
//! Loaded from `PORTAL_*` environment variables (unset or unparsable values
//! fall back to defaults with a warning) or from a JSON document.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use portal_auth::{MonitorConfig, RoutePaths};
use portal_observability::LogFormat;

pub const ENV_API_BASE_URL: &str = "PORTAL_API_BASE_URL";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "PORTAL_REQUEST_TIMEOUT_MS";
pub const ENV_TICK_INTERVAL_MS: &str = "PORTAL_TICK_INTERVAL_MS";
pub const ENV_WARNING_THRESHOLD_MS: &str = "PORTAL_WARNING_THRESHOLD_MS";
pub const ENV_LOGIN_PATH: &str = "PORTAL_LOGIN_PATH";
pub const ENV_ADMIN_LOGIN_PATH: &str = "PORTAL_ADMIN_LOGIN_PATH";
pub const ENV_ADMIN_DASHBOARD_PATH: &str = "PORTAL_ADMIN_DASHBOARD_PATH";
pub const ENV_PROFILE_PATH: &str = "PORTAL_PROFILE_PATH";
pub const ENV_NOTIFICATION_KEY_PATH: &str = "PORTAL_NOTIFICATION_KEY_PATH";
pub const ENV_LOG_FORMAT: &str = "PORTAL_LOG_FORMAT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid API base URL '{0}' (expected http:// or https://)")]
    InvalidBaseUrl(String),

    #[error("route path {field} must start with '/', got '{value}'")]
    InvalidPath { field: &'static str, value: String },

    #[error("invalid config document: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    pub routes: RoutePaths,
    pub monitor: MonitorConfig,
    /// Where the last-shown verification notice key lives. `None` uses the
    /// platform data directory.
    pub notification_key_path: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".to_string(),
            request_timeout_ms: 10_000,
            routes: RoutePaths::default(),
            monitor: MonitorConfig::default(),
            notification_key_path: None,
            log_format: LogFormat::default(),
        }
    }
}

impl PortalConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment, in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_API_BASE_URL) {
            config.api_base_url = url;
        }
        config.request_timeout_ms = parsed(&lookup, ENV_REQUEST_TIMEOUT_MS, config.request_timeout_ms);
        config.monitor.tick_interval_ms =
            parsed(&lookup, ENV_TICK_INTERVAL_MS, config.monitor.tick_interval_ms);
        config.monitor.warning_threshold_ms =
            parsed(&lookup, ENV_WARNING_THRESHOLD_MS, config.monitor.warning_threshold_ms);
        config.log_format = parsed(&lookup, ENV_LOG_FORMAT, config.log_format);

        let routes = &mut config.routes;
        for (key, slot) in [
            (ENV_LOGIN_PATH, &mut routes.login),
            (ENV_ADMIN_LOGIN_PATH, &mut routes.admin_login),
            (ENV_ADMIN_DASHBOARD_PATH, &mut routes.admin_dashboard),
            (ENV_PROFILE_PATH, &mut routes.profile),
        ] {
            if let Some(path) = lookup(key) {
                *slot = path;
            }
        }

        config.notification_key_path = lookup(ENV_NOTIFICATION_KEY_PATH)
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);

        config
    }

    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.api_base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(self.api_base_url.clone()));
        }

        for (field, value) in [
            ("login", &self.routes.login),
            ("admin_login", &self.routes.admin_login),
            ("admin_dashboard", &self.routes.admin_dashboard),
            ("profile", &self.routes.profile),
        ] {
            if !value.starts_with('/') {
                return Err(ConfigError::InvalidPath {
                    field,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "unparsable config value; using default");
            default
        }),
    }
}

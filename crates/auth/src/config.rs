//! Navigation targets and timer settings.

use serde::{Deserialize, Serialize};

/// Where the guard sends visitors it turns away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutePaths {
    pub login: String,
    pub admin_login: String,
    pub admin_dashboard: String,
    pub profile: String,
}

impl Default for RoutePaths {
    fn default() -> Self {
        Self {
            login: "/login".to_string(),
            admin_login: "/admin/login".to_string(),
            admin_dashboard: "/admin/dashboard".to_string(),
            profile: "/profile".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub tick_interval_ms: u64,
    pub warning_threshold_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            warning_threshold_ms: 120_000,
        }
    }
}

impl MonitorConfig {
    pub fn tick_interval(&self) -> std::time::Duration {
        // A zero period would make `tokio::time::interval` panic.
        std::time::Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn warning_threshold(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(i64::try_from(self.warning_threshold_ms).unwrap_or(i64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let paths: RoutePaths = serde_json::from_str(r#"{"profile":"/account/kyc"}"#).unwrap();
        assert_eq!(paths.profile, "/account/kyc");
        assert_eq!(paths.login, "/login");

        let monitor: MonitorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(monitor.warning_threshold(), chrono::Duration::seconds(120));
        assert_eq!(monitor.tick_interval(), std::time::Duration::from_secs(1));
    }
}

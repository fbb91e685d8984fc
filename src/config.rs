use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::Severity;

/// Errors raised while loading or saving configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Configuration for the Heimdall daemon and CLI
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub geolocation: GeolocationConfig,
    pub collector: CollectorConfig,
    pub risk: RiskConfig,
    pub suspicious: SuspiciousConfig,
    pub input: InputConfig,
    pub output: OutputConfig,
    pub alerting: AlertConfig,
    pub retention: RetentionConfig,
}

/// Login log storage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            database_path: PathBuf::from("heimdall.db"),
        }
    }
}

/// IP geolocation sources
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeolocationConfig {
    /// MaxMind GeoLite2-City database
    pub maxmind_path: Option<PathBuf>,
    /// JSON lookup table mapping IP -> location, used when no MaxMind database is set
    pub table_path: Option<PathBuf>,
    /// Base URL of an HTTP geolocation service queried as `<url>/<ip>`
    pub remote_url: Option<String>,
}

/// Connection info collection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Header names redacted in addition to the built-in sensitive set
    pub extra_redacted_headers: Vec<String>,
}

/// Point values for each risk factor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskWeights {
    pub new_device: u32,
    pub new_country: u32,
    pub new_city: u32,
    pub recent_failed_attempts: u32,
    pub unusual_login_hour: u32,
}

impl Default for RiskWeights {
    fn default() -> Self {
        RiskWeights {
            new_device: 30,
            new_country: 40,
            new_city: 20,
            recent_failed_attempts: 25,
            unusual_login_hour: 15,
        }
    }
}

/// Risk scorer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub weights: RiskWeights,
    /// Scores strictly above this require additional verification
    pub verification_threshold: u32,
    /// Lookback for the geo change check, in days
    pub geo_window_days: i64,
    /// Number of recent successful logins fetched for the geo change check
    pub geo_history_limit: usize,
    /// Lookback for the recent failures check, in hours
    pub failure_window_hours: i64,
    /// Failed attempts strictly above this add the recent failures factor
    pub max_recent_failures: usize,
    /// Lookback for building the usual login hours, in days
    pub usual_hours_window_days: i64,
    /// Successful logins needed within an hour-of-day for it to count as usual
    pub usual_hour_min_logins: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            weights: RiskWeights::default(),
            verification_threshold: 50,
            geo_window_days: 7,
            geo_history_limit: 10,
            failure_window_hours: 24,
            max_recent_failures: 2,
            usual_hours_window_days: 30,
            usual_hour_min_logins: 2,
        }
    }
}

/// Suspicious activity rule chain configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuspiciousConfig {
    /// Trailing window for the burst rules, in hours
    pub window_hours: i64,
    /// Distinct countries strictly above this are suspicious
    pub max_countries: usize,
    /// Failed attempts at or above this are treated as brute force
    pub brute_force_attempts: usize,
    /// Earlier logins inspected by the new device rule
    pub device_history_limit: usize,
}

impl Default for SuspiciousConfig {
    fn default() -> Self {
        SuspiciousConfig {
            window_hours: 24,
            max_countries: 2,
            brute_force_attempts: 5,
            device_history_limit: 50,
        }
    }
}

/// Input source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Type of input source: "file" or "udp"
    pub source_type: String,
    /// Path to a JSON-lines file of login events (if source_type is "file")
    pub file_path: Option<PathBuf>,
    /// UDP bind address (if source_type is "udp")
    pub listen_address: Option<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        InputConfig {
            source_type: "file".to_string(),
            file_path: Some(PathBuf::from("login-events.jsonl")),
            listen_address: None,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format: "json", "jsonl", or "console"
    pub format: String,
    /// Output file path (if format is not "console")
    pub file_path: Option<PathBuf>,
    /// Write reports for every attempt, not only flagged ones
    pub report_all: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            format: "jsonl".to_string(),
            file_path: Some(PathBuf::from("login-reports.jsonl")),
            report_all: false,
        }
    }
}

/// Alert dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub enabled: bool,
    pub min_severity: Severity,
    pub slack: Option<SlackConfig>,
    pub webhooks: Vec<WebhookConfig>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        AlertConfig {
            enabled: false,
            min_severity: Severity::Medium,
            slack: None,
            webhooks: Vec::new(),
        }
    }
}

/// Slack incoming webhook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    pub webhook_url: String,
    pub channel: Option<String>,
    pub username: Option<String>,
}

/// Generic JSON webhook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub name: String,
    pub url: String,
    /// "POST" (default) or "PUT"
    pub method: Option<String>,
    pub headers: Option<Vec<(String, String)>>,
}

/// Data retention
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Login logs and assessments older than this are pruned
    pub days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        RetentionConfig { days: 90 }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights() {
        let risk = RiskConfig::default();
        assert_eq!(risk.weights.new_device, 30);
        assert_eq!(risk.weights.new_country, 40);
        assert_eq!(risk.weights.new_city, 20);
        assert_eq!(risk.weights.recent_failed_attempts, 25);
        assert_eq!(risk.weights.unusual_login_hour, 15);
        assert_eq!(risk.verification_threshold, 50);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [risk]
            verification_threshold = 60

            [alerting]
            enabled = true
            min_severity = "high"
            "#,
        )
        .unwrap();

        assert_eq!(config.risk.verification_threshold, 60);
        assert_eq!(config.risk.weights.new_country, 40);
        assert!(config.alerting.enabled);
        assert_eq!(config.alerting.min_severity, Severity::High);
        assert_eq!(config.suspicious.brute_force_attempts, 5);
        assert_eq!(config.storage.database_path, PathBuf::from("heimdall.db"));
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heimdall.toml");

        let mut config = Config::default();
        config.collector.extra_redacted_headers = vec!["x-session-id".to_string()];
        config.to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.collector.extra_redacted_headers, vec!["x-session-id"]);
        assert_eq!(loaded.retention.days, 90);
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file(Path::new("does-not-exist.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}

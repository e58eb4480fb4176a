//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::checkpoint::Checkpoint;
use crate::schema::{Language, MetricFamily};
use crate::session::{Credentials, DEFAULT_REDIRECT_URI};
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub account: AccountConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Health Planet account and registered client application
#[derive(Clone, Default, Deserialize)]
pub struct AccountConfig {
    #[serde(default)]
    pub login_id: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("login_id", &self.login_id)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Sync behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub family: MetricFamily,

    /// Checkpoint from a previous run, `YYYY-MM-DD HH:MM:SS`
    pub last_date: Option<String>,

    /// Column display language: ja, en, or anything else for raw tags
    #[serde(default)]
    pub lang: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    /// Time zone the service's timestamps are expressed in
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub preview: bool,
}

fn default_base_url() -> String {
    "https://www.healthplanet.jp".to_string()
}

fn default_redirect_uri() -> String {
    DEFAULT_REDIRECT_URI.to_string()
}

fn default_timezone() -> String {
    "Asia/Tokyo".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            family: MetricFamily::default(),
            last_date: None,
            lang: String::new(),
            base_url: default_base_url(),
            redirect_uri: default_redirect_uri(),
            timezone: default_timezone(),
            request_timeout_secs: default_request_timeout(),
            preview: false,
        }
    }
}

/// Row output and checkpoint persistence
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// csv or jsonl
    #[serde(default = "default_output_format")]
    pub format: String,

    /// Output file; stdout when absent
    pub path: Option<String>,

    #[serde(default = "default_state_file")]
    pub state_file: String,
}

fn default_output_format() -> String {
    "csv".to_string()
}

fn default_state_file() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("healthsync").join("state.json").to_string_lossy().to_string())
        .unwrap_or_else(|| "./healthsync_state.json".to_string())
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_output_format(),
            path: None,
            state_file: default_state_file(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::from_toml(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e,
        })
    }

    fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("healthsync").join("config.toml")),
            Some(PathBuf::from("/etc/healthsync/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // Account overrides
        if let Ok(v) = std::env::var("HEALTHSYNC_LOGIN_ID") {
            self.account.login_id = v;
        }
        if let Ok(v) = std::env::var("HEALTHSYNC_PASSWORD") {
            self.account.password = v;
        }
        if let Ok(v) = std::env::var("HEALTHSYNC_CLIENT_ID") {
            self.account.client_id = v;
        }
        if let Ok(v) = std::env::var("HEALTHSYNC_CLIENT_SECRET") {
            self.account.client_secret = v;
        }

        // Sync overrides
        if let Ok(v) = std::env::var("HEALTHSYNC_LAST_DATE") {
            self.sync.last_date = Some(v);
        }

        // Logging overrides
        if let Ok(level) = std::env::var("HEALTHSYNC_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("HEALTHSYNC_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Credentials for the login sequence; all four fields are required
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let a = &self.account;
        let missing: Vec<&str> = [
            ("login_id", &a.login_id),
            ("password", &a.password),
            ("client_id", &a.client_id),
            ("client_secret", &a.client_secret),
        ]
        .iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| *k)
        .collect();

        if !missing.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "missing account settings: {}",
                missing.join(", ")
            )));
        }

        Ok(Credentials {
            login_id: a.login_id.clone(),
            password: a.password.clone(),
            client_id: a.client_id.clone(),
            client_secret: a.client_secret.clone(),
        })
    }

    /// Configured prior checkpoint, if any
    pub fn last_date(&self) -> Result<Option<Checkpoint>, ConfigError> {
        match self.sync.last_date.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => Checkpoint::parse(s)
                .map(Some)
                .map_err(|e| ConfigError::Invalid(e.to_string())),
        }
    }

    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.sync
            .timezone
            .parse::<Tz>()
            .map_err(|e| ConfigError::Invalid(format!("timezone {}: {}", self.sync.timezone, e)))
    }

    pub fn language(&self) -> Language {
        Language::from_selector(&self.sync.lang)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# healthsync Configuration
#
# Environment variables override these settings:
# - HEALTHSYNC_LOGIN_ID
# - HEALTHSYNC_PASSWORD
# - HEALTHSYNC_CLIENT_ID
# - HEALTHSYNC_CLIENT_SECRET
# - HEALTHSYNC_LAST_DATE
# - HEALTHSYNC_LOG_LEVEL
# - HEALTHSYNC_LOG_FORMAT

[account]
# Health Planet login
login_id = ""
password = ""

# Credentials of a "Client Application" registered at Health Planet
client_id = ""
client_secret = ""

[sync]
# innerscan (body composition) or sphygmomanometer (blood pressure)
family = "innerscan"

# Resume point; omit to fetch the last year
# last_date = "2020-01-15 08:01:00"

# Column names: ja, en, or empty for raw API tags
lang = "en"

base_url = "https://www.healthplanet.jp"
redirect_uri = "https://www.healthplanet.jp/success.html"

# Time zone of the service's timestamps
timezone = "Asia/Tokyo"

request_timeout_secs = 30

# Emit rows without advancing the checkpoint
preview = false

[output]
# csv or jsonl
format = "csv"

# Output file (default: stdout)
# path = "measurements.csv"

# Where the checkpoint is kept between runs
# (default: <data-local-dir>/healthsync/state.json)
# state_file = "/var/lib/healthsync/state.json"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_template_parses() {
        let config = Config::from_toml(&generate_default_config()).unwrap();
        assert_eq!(config.sync.family, MetricFamily::Innerscan);
        assert_eq!(config.sync.base_url, "https://www.healthplanet.jp");
        assert_eq!(config.output.format, "csv");
        assert_eq!(config.language(), Language::English);
        assert_eq!(config.last_date().unwrap(), None);
    }

    #[test]
    fn test_load_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[account]
login_id = "me"
password = "pw"
client_id = "cid"
client_secret = "cs"

[sync]
family = "sphygmomanometer"
last_date = "2020-01-15 08:01:00"
lang = "ja"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.sync.family, MetricFamily::Sphygmomanometer);
        assert_eq!(config.language(), Language::Japanese);
        assert_eq!(
            config.last_date().unwrap().unwrap().to_string(),
            "2020-01-15 08:01:00"
        );
        assert_eq!(config.credentials().unwrap().client_secret, "cs");
        assert_eq!(config.timezone().unwrap(), chrono_tz::Asia::Tokyo);
    }

    #[test]
    fn test_missing_credentials() {
        let mut config = Config::default();
        config.account.login_id = "me".into();

        let err = config.credentials().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration: missing account settings: password, client_id, client_secret"
        );
    }

    #[test]
    fn test_invalid_values() {
        let mut config = Config::default();
        config.sync.last_date = Some("15/01/2020".into());
        config.sync.timezone = "Mars/Olympus".into();

        assert!(matches!(config.last_date(), Err(ConfigError::Invalid(_))));
        assert!(matches!(config.timezone(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_parse_error_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[sync\nfamily = ").unwrap();

        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_unknown_family_rejected() {
        assert!(Config::from_toml("[sync]\nfamily = \"scale\"\n").is_err());
    }

    #[test]
    fn test_debug_hides_password() {
        let mut config = Config::default();
        config.account.password = "hunter2".into();
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}

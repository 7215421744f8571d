use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one JSON file per table key
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_static_salt")]
    pub static_salt: String,
    #[serde(default = "default_min_username_len")]
    pub min_username_len: usize,
    #[serde(default = "default_min_password_len")]
    pub min_password_len: usize,
    #[serde(default = "default_admin_username")]
    pub default_admin_username: String,
    #[serde(default = "default_admin_password")]
    pub default_admin_password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Concurrent session cap for role `user` (admins are uncapped)
    #[serde(default = "default_user_session_cap")]
    pub user_session_cap: usize,
    /// Sessions older than this are purged on login
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    /// Delay between background drain passes
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Per-request deadline; an over-deadline call is abandoned, not retried
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_queue_depth")]
    pub max_queue_depth: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_console")]
    pub console: bool,
}

// Default value functions
fn default_static_salt() -> String {
    "lessonlog-salt".to_string()
}

fn default_min_username_len() -> usize {
    3
}

fn default_min_password_len() -> usize {
    6
}

fn default_admin_username() -> String {
    "admin".to_string()
}

fn default_admin_password() -> String {
    "admin123".to_string()
}

fn default_user_session_cap() -> usize {
    3
}

fn default_retention_days() -> i64 {
    30
}

fn default_flush_interval_ms() -> u64 {
    250
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_max_queue_depth() -> usize {
    10_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "console".to_string()
}

fn default_console() -> bool {
    true
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            static_salt: default_static_salt(),
            min_username_len: default_min_username_len(),
            min_password_len: default_min_password_len(),
            default_admin_username: default_admin_username(),
            default_admin_password: default_admin_password(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_session_cap: default_user_session_cap(),
            retention_days: default_retention_days(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            api_key: String::new(),
            flush_interval_ms: default_flush_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            max_queue_depth: default_max_queue_depth(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            console: default_console(),
        }
    }
}

impl SessionConfig {
    pub fn retention_millis(&self) -> i64 {
        self.retention_days * 24 * 60 * 60 * 1_000
    }
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .context(format!("Failed to read config file '{}'", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .context("Failed to parse config file as TOML")?;

        config.validate()?;

        Ok(config)
    }

    /// Minimal config rooted at `data_dir`, used by embedders and tests
    pub fn for_data_dir(data_dir: PathBuf) -> Self {
        Self {
            storage: StorageConfig { data_dir },
            auth: AuthConfig::default(),
            sessions: SessionConfig::default(),
            sync: SyncConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage.data_dir.as_os_str().is_empty() {
            bail!("storage.data_dir must not be empty");
        }

        if self.auth.static_salt.is_empty() {
            bail!("auth.static_salt must not be empty");
        }

        if self.auth.min_password_len < 4 {
            bail!("auth.min_password_len must be at least 4");
        }

        if self.sessions.user_session_cap == 0 {
            bail!("sessions.user_session_cap must be at least 1");
        }

        if self.sessions.retention_days <= 0 {
            bail!("sessions.retention_days must be positive");
        }

        if self.sync.enabled && self.sync.endpoint.is_empty() {
            bail!("sync.endpoint is required when sync.enabled = true");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_parses_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [storage]
            data_dir = "/tmp/lessonlog"
            "#,
        )
        .unwrap();

        assert_eq!(config.sessions.user_session_cap, 3);
        assert_eq!(config.sessions.retention_days, 30);
        assert_eq!(config.auth.min_password_len, 6);
        assert!(!config.sync.enabled);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_config_parses() {
        let config: Config = toml::from_str(
            r#"
            [storage]
            data_dir = "/var/lib/lessonlog"

            [auth]
            static_salt = "portal-salt"
            min_password_len = 8

            [sessions]
            user_session_cap = 5
            retention_days = 14

            [sync]
            enabled = true
            endpoint = "http://localhost:9000/api/store"
            api_key = "test-key"
            flush_interval_ms = 100

            [logging]
            level = "debug"
            format = "json"
            console = false
            "#,
        )
        .unwrap();

        assert_eq!(config.auth.static_salt, "portal-salt");
        assert_eq!(config.sessions.user_session_cap, 5);
        assert_eq!(
            config.sessions.retention_millis(),
            14 * 24 * 60 * 60 * 1_000
        );
        assert!(config.sync.enabled);
        assert_eq!(config.sync.flush_interval_ms, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sync_enabled_requires_endpoint() {
        let config: Config = toml::from_str(
            r#"
            [storage]
            data_dir = "/tmp/lessonlog"

            [sync]
            enabled = true
            "#,
        )
        .unwrap();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_session_cap_rejected() {
        let mut config = Config::for_data_dir(PathBuf::from("/tmp/lessonlog"));
        config.sessions.user_session_cap = 0;
        assert!(config.validate().is_err());
    }
}

//! Configuration for the storefront session client

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::types::Route;

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the storefront REST API (e.g. `https://api.example.com/api`)
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Timeout applied to every API request
    #[serde(default = "default_request_timeout", with = "duration_str")]
    pub request_timeout: Duration,

    /// Session lifecycle tuning
    #[serde(default)]
    pub session: SessionSettings,

    /// Where the session token and sibling values are persisted
    #[serde(default)]
    pub storage: StorageConfig,

    /// Navigation targets requested by the controller
    #[serde(default)]
    pub routes: RoutesConfig,

    /// Log level filter string. Overridden by RUST_LOG.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Session lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Idle window after which the session is force-logged-out
    #[serde(default = "default_inactivity_timeout", with = "duration_str")]
    pub inactivity_timeout: Duration,

    /// Minimum spacing between inactivity re-arms caused by interaction
    /// events. Zero re-arms on every event.
    #[serde(default, with = "duration_str")]
    pub activity_throttle: Duration,

    /// Treat a token whose expiry cannot be decoded as fatal to the session.
    /// When false the token stays live with no expiry alarm.
    #[serde(default)]
    pub logout_on_malformed_token: bool,
}

/// Persistent key-value storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackendConfig,

    /// Key holding the bearer token
    #[serde(default = "default_token_key")]
    pub token_key: String,

    /// Key holding the e-mail awaiting verification after registration
    #[serde(default = "default_pending_email_key")]
    pub pending_email_key: String,
}

/// Storage backend selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageBackendConfig {
    /// JSON file on disk
    File { path: PathBuf },

    /// Process memory only; nothing survives a restart
    Memory,
}

/// Route paths used when the controller requests navigation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutesConfig {
    #[serde(default = "default_landing_route")]
    pub landing: String,
    #[serde(default = "default_login_route")]
    pub login: String,
    #[serde(default = "default_home_route")]
    pub home: String,
    #[serde(default = "default_verify_email_route")]
    pub verify_email: String,
    /// Query string appended to the login route after a forced logout
    #[serde(default = "default_session_expired_query")]
    pub session_expired_query: String,
}

// Default value functions for serde
fn default_api_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_inactivity_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_log_level() -> String {
    "storefront_session=info".to_string()
}

fn default_token_key() -> String {
    "token".to_string()
}

fn default_pending_email_key() -> String {
    "pendingVerificationEmail".to_string()
}

fn default_state_path() -> PathBuf {
    PathBuf::from("./.storefront/session.json")
}

fn default_landing_route() -> String {
    "/shop".to_string()
}

fn default_login_route() -> String {
    "/login".to_string()
}

fn default_home_route() -> String {
    "/".to_string()
}

fn default_verify_email_route() -> String {
    "/verify-email".to_string()
}

fn default_session_expired_query() -> String {
    "session=expired".to_string()
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            inactivity_timeout: default_inactivity_timeout(),
            activity_throttle: Duration::ZERO,
            logout_on_malformed_token: false,
        }
    }
}

impl Default for StorageBackendConfig {
    fn default() -> Self {
        StorageBackendConfig::File {
            path: default_state_path(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendConfig::default(),
            token_key: default_token_key(),
            pending_email_key: default_pending_email_key(),
        }
    }
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            landing: default_landing_route(),
            login: default_login_route(),
            home: default_home_route(),
            verify_email: default_verify_email_route(),
            session_expired_query: default_session_expired_query(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout: default_request_timeout(),
            session: SessionSettings::default(),
            storage: StorageConfig::default(),
            routes: RoutesConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl RoutesConfig {
    /// Resolve a route to the path the UI should navigate to.
    pub fn path_for(&self, route: Route) -> String {
        match route {
            Route::Landing => self.landing.clone(),
            Route::Login {
                session_expired: true,
            } => format!("{}?{}", self.login, self.session_expired_query),
            Route::Login {
                session_expired: false,
            } => self.login.clone(),
            Route::Home => self.home.clone(),
            Route::VerifyEmail => self.verify_email.clone(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply `SFS_*` environment overrides on top of the current values.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("SFS_API_URL") {
            self.api_base_url = url;
        }

        if let Ok(timeout) = std::env::var("SFS_REQUEST_TIMEOUT") {
            if let Ok(parsed) = humantime::parse_duration(&timeout) {
                self.request_timeout = parsed;
            }
        }

        if let Ok(timeout) = std::env::var("SFS_INACTIVITY_TIMEOUT") {
            if let Ok(parsed) = humantime::parse_duration(&timeout) {
                self.session.inactivity_timeout = parsed;
            }
        }

        if let Ok(dir) = std::env::var("SFS_STATE_DIR") {
            self.storage.backend = StorageBackendConfig::File {
                path: PathBuf::from(dir).join("session.json"),
            };
        }

        if let Ok(level) = std::env::var("SFS_LOG_LEVEL") {
            self.log_level = level;
        }
    }

    /// Load configuration from file if it exists, otherwise from environment
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("SFS_CONFIG") {
            if let Ok(mut config) = Self::from_file(&path) {
                config.apply_env();
                return config;
            }
        }

        for path in &["storefront_session.toml", "/etc/storefront_session/config.toml"] {
            if std::path::Path::new(path).exists() {
                if let Ok(mut config) = Self::from_file(path) {
                    config.apply_env();
                    return config;
                }
            }
        }

        Self::from_env()
    }

    /// Check values that would make the session unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.inactivity_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "session.inactivity_timeout must be greater than zero".to_string(),
            ));
        }
        if self.session.activity_throttle >= self.session.inactivity_timeout {
            return Err(ConfigError::Invalid(
                "session.activity_throttle must be shorter than the inactivity timeout"
                    .to_string(),
            ));
        }
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            return Err(ConfigError::Invalid(format!(
                "api_base_url must be an http(s) URL, got {}",
                self.api_base_url
            )));
        }
        Ok(())
    }
}

/// Serde adapter for humantime duration strings ("30m", "15s").
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.session.inactivity_timeout, Duration::from_secs(1800));
        assert!(config.session.activity_throttle.is_zero());
        assert!(matches!(
            config.storage.backend,
            StorageBackendConfig::File { .. }
        ));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_parse_file_storage() {
        let toml = r#"
            api_base_url = "https://api.example.com/api"
            request_timeout = "5s"

            [session]
            inactivity_timeout = "10m"
            activity_throttle = "2s"

            [storage.backend]
            type = "file"
            path = "/var/lib/storefront/session.json"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.api_base_url, "https://api.example.com/api");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.session.inactivity_timeout, Duration::from_secs(600));
        assert_eq!(config.session.activity_throttle, Duration::from_secs(2));
        assert_eq!(config.storage.token_key, "token");

        match config.storage.backend {
            StorageBackendConfig::File { path } => {
                assert_eq!(path, PathBuf::from("/var/lib/storefront/session.json"));
            }
            _ => panic!("Expected file storage"),
        }
    }

    #[test]
    fn test_config_parse_memory_storage() {
        let toml = r#"
            [storage]
            token_key = "auth_token"

            [storage.backend]
            type = "memory"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert!(matches!(config.storage.backend, StorageBackendConfig::Memory));
        assert_eq!(config.storage.token_key, "auth_token");
    }

    #[test]
    fn test_config_rejects_bad_duration() {
        let toml = r#"
            [session]
            inactivity_timeout = "forever"
        "#;
        assert!(toml::from_str::<Config>(toml).is_err());
    }

    #[test]
    fn test_validate_rejects_throttle_longer_than_window() {
        let mut config = Config::default();
        config.session.activity_throttle = Duration::from_secs(3600);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_route_paths() {
        let routes = RoutesConfig::default();
        assert_eq!(
            routes.path_for(Route::Login {
                session_expired: true
            }),
            "/login?session=expired"
        );
        assert_eq!(
            routes.path_for(Route::Login {
                session_expired: false
            }),
            "/login"
        );
        assert_eq!(routes.path_for(Route::Landing), "/shop");
    }
}

//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: SCHOOL_, nested keys split on `__`)
//! 2. Current working directory: ./config.toml
//! 3. XDG config directory: ~/.config/school-service/config.toml
//! 4. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Middleware configuration
    #[serde(default)]
    pub middleware: MiddlewareConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error) or a full EnvFilter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            port: default_port(),
            log_level: default_log_level(),
            timeout_secs: default_timeout(),
        }
    }
}

impl ServiceConfig {
    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,

    /// Maximum retry attempts for establishing database connection
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between retry attempts in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            connection_timeout_secs: default_connection_timeout(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

/// Rate limiting configuration
///
/// Each caller (peer IP address) may issue `max_requests` within a fixed
/// window of `window_secs` seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Enable the rate limiting stage
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Requests admitted per caller per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

impl RateLimitConfig {
    /// Get the window as Duration
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Middleware configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiddlewareConfig {
    /// Enable gzip response compression
    #[serde(default = "default_true")]
    pub compression: bool,

    /// Enable response-time instrumentation
    #[serde(default = "default_true")]
    pub response_time: bool,

    /// Request body size limit in MB
    #[serde(default = "default_body_limit_mb")]
    pub body_limit_mb: usize,

    /// HTTP parameter pollution filter
    #[serde(default)]
    pub parameter_pollution: ParameterPollutionConfig,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            compression: true,
            response_time: true,
            body_limit_mb: default_body_limit_mb(),
            parameter_pollution: ParameterPollutionConfig::default(),
        }
    }
}

/// What the pollution filter does with an offending request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollutionAction {
    /// Reject the request with a validation error
    #[default]
    Reject,
    /// Drop disallowed keys and extra duplicates, then forward
    Strip,
}

/// HTTP parameter pollution filter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterPollutionConfig {
    /// Enable the stage
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Inspect query string parameters
    #[serde(default = "default_true")]
    pub check_query: bool,

    /// Inspect urlencoded form bodies
    #[serde(default = "default_false")]
    pub check_body: bool,

    /// Only inspect bodies with this content type
    #[serde(default)]
    pub body_content_type: Option<String>,

    /// Allowed parameter names; empty means derive from the field registry
    #[serde(default)]
    pub whitelist: Vec<String>,

    /// Parameter names that may appear more than once
    #[serde(default = "default_repeatable")]
    pub repeatable: Vec<String>,

    /// Reject or strip offending requests
    #[serde(default)]
    pub action: PollutionAction,
}

impl Default for ParameterPollutionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_query: true,
            check_body: false,
            body_content_type: None,
            whitelist: Vec::new(),
            repeatable: default_repeatable(),
            action: PollutionAction::default(),
        }
    }
}

// Default value functions
fn default_service_name() -> String {
    "school-service".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_database_url() -> String {
    "sqlite://school.db?mode=rwc".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    2
}

fn default_max_requests() -> u32 {
    100
}

fn default_window_secs() -> u64 {
    60
}

fn default_body_limit_mb() -> usize {
    1
}

fn default_repeatable() -> Vec<String> {
    vec![crate::query::SORT_PARAM.to_string()]
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

impl Config {
    /// Load configuration from all sources
    ///
    /// Searches for config files in this order (first found wins):
    /// 1. Current working directory: ./config.toml
    /// 2. XDG config directory: ~/.config/school-service/config.toml
    ///
    /// Environment variables (SCHOOL_ prefix) override all file-based configs.
    pub fn load() -> Result<Self> {
        let config_paths = Self::find_config_paths();

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        // Lowest priority first so that higher priority files override
        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        let config = figment
            .merge(Env::prefixed("SCHOOL_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    ///
    /// This bypasses XDG directories and loads directly from the given path.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("SCHOOL_").split("__"))
            .extract()?;

        Ok(config)
    }

    /// Find all possible config file paths, highest priority first
    fn find_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        let xdg_dirs = xdg::BaseDirectories::with_prefix("school-service");
        if let Ok(path) = xdg_dirs.place_config_file("config.toml") {
            paths.push(path);
        }

        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service.port, 3000);
        assert_eq!(config.service.log_level, "info");
        assert_eq!(config.rate_limit.max_requests, 100);
        assert_eq!(config.rate_limit.window(), Duration::from_secs(60));
        assert!(config.middleware.compression);
        assert!(config.middleware.parameter_pollution.whitelist.is_empty());
        assert_eq!(
            config.middleware.parameter_pollution.repeatable,
            vec!["sort-by".to_string()]
        );
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[service]
port = 9000

[rate_limit]
max_requests = 5
window_secs = 1

[middleware.parameter_pollution]
whitelist = ["name", "sortBy"]
action = "strip"
"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.service.port, 9000);
        assert_eq!(config.service.name, "school-service");
        assert_eq!(config.rate_limit.max_requests, 5);
        assert_eq!(config.rate_limit.window_secs, 1);
        assert_eq!(
            config.middleware.parameter_pollution.whitelist,
            vec!["name".to_string(), "sortBy".to_string()]
        );
        assert_eq!(
            config.middleware.parameter_pollution.action,
            PollutionAction::Strip
        );
    }
}

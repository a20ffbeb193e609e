//! Configuration system for licensehub.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `config.toml` file
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `LICENSEHUB_SERVER_HOST` - Server bind address
//! - `LICENSEHUB_SERVER_PORT` - Server port
//! - `LICENSEHUB_DATABASE_TYPE` - `sqlite` or `postgres`
//! - `LICENSEHUB_DATABASE_URL` - Database connection URL (routed by scheme)
//! - `LICENSEHUB_LICENSE_KEY_PREFIX` - License key prefix
//! - `LICENSEHUB_REMOTE_URL` - Remote registry base URL (empty disables remote calls)
//! - `LICENSEHUB_REMOTE_ADMIN_TOKEN` - Bearer token for pushing to the remote registry
//! - `LICENSEHUB_REMOTE_SYNC_INTERVAL_SECS` - Full sync period
//! - `LICENSEHUB_LOG_LEVEL` - Log level (trace, debug, info, warn, error)
//! - `LICENSEHUB_API_URL` - Backend base URL used by the admin dashboard
//! - `LICENSEHUB_PROXY_PORT` - Dev proxy listen port
//! - `LICENSEHUB_PROXY_BACKEND` - Dev proxy backend origin

use config::Config;
use serde::Deserialize;
use std::env;
use std::sync::OnceLock;

use crate::errors::{LicenseError, LicenseResult};

/// Global configuration singleton.
static CONFIG: OnceLock<HubConfig> = OnceLock::new();

/// Token value shipped in sample environments; treated as "not configured".
pub const REMOTE_TOKEN_PLACEHOLDER: &str = "REPLACE_WITH_REAL_TOKEN_IN_ENV";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub server: ServerConfig,
    pub license: LicenseConfig,
    pub database: DatabaseConfig,
    pub remote: RemoteConfig,
    pub logging: LoggingConfig,
    pub dashboard: DashboardConfig,
    pub proxy: ProxyConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8001,
        }
    }
}

/// License key generation configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Prefix for generated license keys (e.g., "WB" -> "WB-XXXXXXXX-XXXXXXXX")
    pub key_prefix: String,
    /// Number of segments in the license key
    pub key_segments: u8,
    /// Characters per segment
    pub key_segment_length: u8,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            key_prefix: "WB".to_string(),
            key_segments: 2,
            key_segment_length: 8,
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database type: "sqlite" or "postgres"
    pub db_type: String,
    /// SQLite connection URL
    pub sqlite_url: String,
    /// PostgreSQL connection URL
    pub postgres_url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: "sqlite".to_string(),
            sqlite_url: "sqlite://licensehub.db?mode=rwc".to_string(),
            postgres_url: "postgres://localhost/license_server_db".to_string(),
        }
    }
}

/// Remote license registry configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the registry. Empty disables every remote call.
    pub url: String,
    /// Bearer token for registry writes. Empty or the placeholder disables pushes.
    pub admin_token: String,
    /// Seconds between full syncs
    pub sync_interval_secs: u64,
    /// Maximum number of licenses pushed per full sync
    pub sync_batch_limit: i64,
    /// Timeout for push/fetch/patch/delete calls
    pub request_timeout_secs: u64,
    /// Timeout for the validation override check
    pub override_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            admin_token: String::new(),
            sync_interval_secs: 900,
            sync_batch_limit: 1000,
            request_timeout_secs: 60,
            override_timeout_secs: 10,
        }
    }
}

impl RemoteConfig {
    /// Whether the registry is reachable at all.
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty()
    }

    /// Whether pushes to the registry are allowed.
    pub fn sync_enabled(&self) -> bool {
        self.is_configured()
            && !self.admin_token.trim().is_empty()
            && self.admin_token != REMOTE_TOKEN_PLACEHOLDER
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Admin dashboard configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Base URL of the license server the dashboard talks to
    pub api_base_url: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8001".to_string(),
        }
    }
}

/// Dev proxy configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Port the proxy listens on
    pub listen_port: u16,
    /// Origin requests are forwarded to
    pub backend_origin: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_port: 3000,
            backend_origin: "http://localhost:8001".to_string(),
        }
    }
}

fn config_error(e: config::ConfigError) -> LicenseError {
    LicenseError::ConfigError(e.to_string())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

impl HubConfig {
    /// Load configuration from file and environment.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. `config.toml` file (optional)
    /// 3. Environment variables
    pub fn load() -> LicenseResult<Self> {
        let defaults = HubConfig::default();

        let builder = Config::builder()
            .set_default("server.host", defaults.server.host)
            .map_err(config_error)?
            .set_default("server.port", i64::from(defaults.server.port))
            .map_err(config_error)?
            .set_default("license.key_prefix", defaults.license.key_prefix)
            .map_err(config_error)?
            .set_default("license.key_segments", i64::from(defaults.license.key_segments))
            .map_err(config_error)?
            .set_default(
                "license.key_segment_length",
                i64::from(defaults.license.key_segment_length),
            )
            .map_err(config_error)?
            .set_default("database.db_type", defaults.database.db_type)
            .map_err(config_error)?
            .set_default("database.sqlite_url", defaults.database.sqlite_url)
            .map_err(config_error)?
            .set_default("database.postgres_url", defaults.database.postgres_url)
            .map_err(config_error)?
            .set_default("remote.url", defaults.remote.url)
            .map_err(config_error)?
            .set_default("remote.admin_token", defaults.remote.admin_token)
            .map_err(config_error)?
            .set_default(
                "remote.sync_interval_secs",
                defaults.remote.sync_interval_secs,
            )
            .map_err(config_error)?
            .set_default("remote.sync_batch_limit", defaults.remote.sync_batch_limit)
            .map_err(config_error)?
            .set_default(
                "remote.request_timeout_secs",
                defaults.remote.request_timeout_secs,
            )
            .map_err(config_error)?
            .set_default(
                "remote.override_timeout_secs",
                defaults.remote.override_timeout_secs,
            )
            .map_err(config_error)?
            .set_default("logging.level", defaults.logging.level)
            .map_err(config_error)?
            .set_default("dashboard.api_base_url", defaults.dashboard.api_base_url)
            .map_err(config_error)?
            .set_default("proxy.listen_port", i64::from(defaults.proxy.listen_port))
            .map_err(config_error)?
            .set_default("proxy.backend_origin", defaults.proxy.backend_origin)
            .map_err(config_error)?
            // Load from config.toml (optional)
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables
            .set_override_option("server.host", env::var("LICENSEHUB_SERVER_HOST").ok())
            .map_err(config_error)?
            .set_override_option(
                "server.port",
                env_parsed::<i64>("LICENSEHUB_SERVER_PORT"),
            )
            .map_err(config_error)?
            .set_override_option(
                "license.key_prefix",
                env::var("LICENSEHUB_LICENSE_KEY_PREFIX").ok(),
            )
            .map_err(config_error)?
            .set_override_option(
                "database.db_type",
                env::var("LICENSEHUB_DATABASE_TYPE").ok(),
            )
            .map_err(config_error)?
            .set_override_option(
                "database.sqlite_url",
                env::var("LICENSEHUB_DATABASE_URL")
                    .ok()
                    .filter(|url| url.starts_with("sqlite")),
            )
            .map_err(config_error)?
            .set_override_option(
                "database.postgres_url",
                env::var("LICENSEHUB_DATABASE_URL")
                    .ok()
                    .filter(|url| url.starts_with("postgres")),
            )
            .map_err(config_error)?
            .set_override_option("remote.url", env::var("LICENSEHUB_REMOTE_URL").ok())
            .map_err(config_error)?
            .set_override_option(
                "remote.admin_token",
                env::var("LICENSEHUB_REMOTE_ADMIN_TOKEN").ok(),
            )
            .map_err(config_error)?
            .set_override_option(
                "remote.sync_interval_secs",
                env_parsed::<i64>("LICENSEHUB_REMOTE_SYNC_INTERVAL_SECS"),
            )
            .map_err(config_error)?
            .set_override_option("logging.level", env::var("LICENSEHUB_LOG_LEVEL").ok())
            .map_err(config_error)?
            .set_override_option(
                "dashboard.api_base_url",
                env::var("LICENSEHUB_API_URL").ok(),
            )
            .map_err(config_error)?
            .set_override_option(
                "proxy.listen_port",
                env_parsed::<i64>("LICENSEHUB_PROXY_PORT"),
            )
            .map_err(config_error)?
            .set_override_option(
                "proxy.backend_origin",
                env::var("LICENSEHUB_PROXY_BACKEND").ok(),
            )
            .map_err(config_error)?;

        let settings = builder
            .build()
            .map_err(|e| LicenseError::ConfigError(format!("failed to build config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| LicenseError::ConfigError(format!("failed to deserialize config: {e}")))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> LicenseResult<()> {
        if self.server.port == 0 {
            return Err(LicenseError::ConfigError(
                "server.port must be greater than 0".to_string(),
            ));
        }

        match self.database.db_type.as_str() {
            "sqlite" | "postgres" => {}
            other => {
                return Err(LicenseError::ConfigError(format!(
                    "database.db_type must be 'sqlite' or 'postgres', got '{other}'"
                )));
            }
        }

        if self.license.key_prefix.is_empty() {
            return Err(LicenseError::ConfigError(
                "license.key_prefix cannot be empty".to_string(),
            ));
        }
        if self.license.key_segments == 0 || self.license.key_segment_length == 0 {
            return Err(LicenseError::ConfigError(
                "license.key_segments and license.key_segment_length must be greater than 0"
                    .to_string(),
            ));
        }

        if self.remote.sync_interval_secs == 0 {
            return Err(LicenseError::ConfigError(
                "remote.sync_interval_secs must be greater than 0".to_string(),
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(LicenseError::ConfigError(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        if self.proxy.listen_port == 0 {
            return Err(LicenseError::ConfigError(
                "proxy.listen_port must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Get the global configuration.
///
/// This loads the configuration on first access and caches it.
pub fn get_config() -> LicenseResult<&'static HubConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = HubConfig::load()?;
    config.validate()?;

    // Another thread may have won the race; either value is fine.
    Ok(CONFIG.get_or_init(|| config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = HubConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 8001);
        assert_eq!(config.proxy.listen_port, 3000);
        assert_eq!(config.license.key_prefix, "WB");
    }

    #[test]
    fn rejects_unknown_database_type() {
        let mut config = HubConfig::default();
        config.database.db_type = "mysql".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("database.db_type"));
    }

    #[test]
    fn rejects_bad_log_level() {
        let mut config = HubConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn placeholder_token_disables_sync() {
        let mut remote = RemoteConfig {
            url: "https://registry.example".to_string(),
            admin_token: REMOTE_TOKEN_PLACEHOLDER.to_string(),
            ..RemoteConfig::default()
        };
        assert!(remote.is_configured());
        assert!(!remote.sync_enabled());

        remote.admin_token = "real-token".to_string();
        assert!(remote.sync_enabled());

        remote.url = String::new();
        assert!(!remote.sync_enabled());
    }
}

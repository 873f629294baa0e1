//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `share.yaml` but can be specified via `-f` flag or `BLOBSHARE_CONFIG`
//! environment variable. A missing file is not an error: every field has a default.
//!
//! ## Loading Priority
//!
//! 1. **YAML config file** - Base configuration (default: `share.yaml`)
//! 2. **Environment variables** - Variables prefixed with `BLOBSHARE_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `BLOBSHARE_DATABASE__PATH=/var/lib/blobshare/share.db` sets the `database.path` field.
//! Lists use figment's inline syntax: `BLOBSHARE_KEYS='[first, second]'`.
//!
//! ## Configuration Structure
//!
//! - **Server**: `host`, `port`, `public_url` - HTTP binding and the base of returned links
//! - **Keys**: `keys` - credentials accepted for uploads
//! - **Downloads**: `redirect_post_to_get` - answer POSTs on file routes with a 303 to the GET
//! - **Database**: `database.path`, `database.pool`, `database.busy_timeout_secs`
//! - **Limits**: `limits.max_upload_size`
//! - **Console**: `console.enabled` - run the admin console on stdin
//! - **Telemetry**: `enable_otel_export`

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "BLOBSHARE_CONFIG", default_value = "share.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Base of the links returned from uploads (e.g., "https://share.example.com").
    /// When unset, links are built from the request's `Host` header.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<Url>,
    /// Credentials accepted in the `key` field of an upload
    pub keys: Vec<String>,
    /// Redirect `POST /{id}` and `POST /{id}/{filename}` to the GET routes with a 303
    pub redirect_post_to_get: bool,
    /// Where and how to open the store
    pub database: DatabaseConfig,
    /// Request size limits
    pub limits: LimitsConfig,
    /// Admin console settings
    pub console: ConsoleConfig,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

/// Individual pool configuration with all SQLx parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSettings {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of idle connections to maintain
    pub min_connections: u32,
    /// Maximum time to wait for a connection (seconds)
    pub acquire_timeout_secs: u64,
    /// Time before idle connections are closed (seconds, 0 = never)
    pub idle_timeout_secs: u64,
    /// Maximum lifetime of a connection (seconds, 0 = never)
    pub max_lifetime_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 8,
            min_connections: 1,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,  // 10 minutes
            max_lifetime_secs: 1800, // 30 minutes
        }
    }
}

impl PoolSettings {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        (self.max_lifetime_secs > 0).then(|| Duration::from_secs(self.max_lifetime_secs))
    }
}

/// SQLite store location and connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Path of the SQLite database file, created on first start
    pub path: PathBuf,
    /// How long a writer waits for the lock before failing (seconds)
    pub busy_timeout_secs: u64,
    pub pool: PoolSettings,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("share.db"),
            busy_timeout_secs: 5,
            pool: PoolSettings::default(),
        }
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.busy_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Largest accepted upload request body, in bytes
    pub max_upload_size: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_size: 100 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConsoleConfig {
    /// Read admin commands from stdin while serving
    pub enabled: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8082,
            public_url: None,
            keys: Vec::new(),
            redirect_post_to_get: false,
            database: DatabaseConfig::default(),
            limits: LimitsConfig::default(),
            console: ConsoleConfig::default(),
            enable_otel_export: false,
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.limits.max_upload_size == 0 {
            return Err(Error::Internal {
                operation: "Config validation: limits.max_upload_size must be greater than 0".to_string(),
            });
        }

        if self.database.path.as_os_str().is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: database.path cannot be empty".to_string(),
            });
        }

        let pool = &self.database.pool;
        if pool.max_connections < 1 {
            return Err(Error::Internal {
                operation: "Config validation: database.pool.max_connections must be at least 1".to_string(),
            });
        }

        if pool.min_connections > pool.max_connections {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: database.pool.min_connections ({}) cannot be greater than max_connections ({})",
                    pool.min_connections, pool.max_connections
                ),
            });
        }

        if let Some(url) = &self.public_url
            && !matches!(url.scheme(), "http" | "https")
        {
            return Err(Error::Internal {
                operation: format!("Config validation: public_url must be an http or https URL, got '{url}'"),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("BLOBSHARE_").split("__"))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

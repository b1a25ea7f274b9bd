//! Application configuration
//!
//! This module provides centralized configuration management using the `config` crate.
//! Configuration can be loaded from environment variables and config files.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub telephony: TelephonyConfig,
    #[serde(default)]
    pub dialer: DialerConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Comma separated list of allowed CORS origins
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_cors_origins() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

/// Authentication configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// JWT signing secret
    pub jwt_secret: String,

    /// JWT token expiration in minutes
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_minutes: i64,
}

fn default_jwt_expiration() -> i64 {
    1440 // 24 hours
}

/// Telephony provider (call-control API) configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelephonyConfig {
    /// Base URL of the call-control REST API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// API key sent as a bearer token
    pub api_key: String,

    /// Provider connection (application) id used for outbound dials
    pub connection_id: String,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_api_base_url() -> String {
    "https://api.telnyx.com/v2".to_string()
}

fn default_request_timeout() -> u64 {
    5000
}

/// Call-control engine tuning
#[derive(Debug, Deserialize, Clone)]
pub struct DialerConfig {
    /// How long a bridge request waits for the agent's cell to answer
    #[serde(default = "default_bridge_timeout")]
    pub bridge_timeout_secs: u64,

    /// Retries for webhook events that reference a leg not yet stored
    #[serde(default = "default_webhook_retry_attempts")]
    pub webhook_retry_attempts: u32,

    /// Delay between webhook retries in milliseconds
    #[serde(default = "default_webhook_retry_delay")]
    pub webhook_retry_delay_ms: u64,

    /// Capacity of the in-process webhook queue
    #[serde(default = "default_webhook_queue_capacity")]
    pub webhook_queue_capacity: usize,

    /// Interval of the bridge expiry / cleanup task in seconds
    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval_secs: u64,

    /// How long finished bridge requests are kept before removal
    #[serde(default = "default_bridge_retention")]
    pub bridge_retention_secs: u64,

    /// Dial attempts per queue item before it is marked failed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
}

fn default_bridge_timeout() -> u64 {
    30
}

fn default_webhook_retry_attempts() -> u32 {
    5
}

fn default_webhook_retry_delay() -> u64 {
    2000
}

fn default_webhook_queue_capacity() -> usize {
    1024
}

fn default_maintenance_interval() -> u64 {
    5
}

fn default_bridge_retention() -> u64 {
    3600
}

fn default_max_attempts() -> i32 {
    3
}

impl DialerConfig {
    pub fn bridge_timeout(&self) -> Duration {
        Duration::from_secs(self.bridge_timeout_secs)
    }

    pub fn webhook_retry_delay(&self) -> Duration {
        Duration::from_millis(self.webhook_retry_delay_ms)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }

    pub fn bridge_retention(&self) -> Duration {
        Duration::from_secs(self.bridge_retention_secs)
    }
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self {
            bridge_timeout_secs: default_bridge_timeout(),
            webhook_retry_attempts: default_webhook_retry_attempts(),
            webhook_retry_delay_ms: default_webhook_retry_delay(),
            webhook_queue_capacity: default_webhook_queue_capacity(),
            maintenance_interval_secs: default_maintenance_interval(),
            bridge_retention_secs: default_bridge_retention(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("auth.jwt_expiration_minutes", 1440)?
            .set_default("telephony.api_base_url", default_api_base_url())?
            .set_default("telephony.request_timeout_ms", 5000)?
            .set_default("dialer.bridge_timeout_secs", 30)?
            .set_default("dialer.webhook_retry_attempts", 5)?
            .set_default("dialer.webhook_retry_delay_ms", 2000)?
            .set_default("dialer.webhook_queue_capacity", 1024)?
            .set_default("dialer.maintenance_interval_secs", 5)?
            .set_default("dialer.bridge_retention_secs", 3600)?
            .set_default("dialer.max_attempts", 3)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables with DIALER_ prefix
            .add_source(
                Environment::with_prefix("DIALER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get the server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

//! Configuration management for the bonded inventory service
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with BZI_ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT authentication configuration
    pub jwt: JwtConfig,

    /// INSW reporting API configuration
    pub insw: InswConfig,

    /// Batch transmission limits
    pub transmission: TransmissionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// Secret key used to verify session tokens
    pub secret: String,
}

/// Which INSW environment requests are sent to
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InswMode {
    Test,
    Real,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InswConfig {
    pub mode: InswMode,

    /// Sent as `x-insw-key`
    pub api_key: String,

    /// Sent as `x-unique-key`
    pub secret_key: String,

    /// Upper bound for a single INSW call
    pub timeout_secs: u64,

    pub test: InswEndpoints,

    pub real: InswEndpoints,
}

/// One URL per INSW category
#[derive(Debug, Deserialize, Clone)]
pub struct InswEndpoints {
    pub initial_balance: String,
    pub transaction: String,
    pub document_detail: String,
}

impl InswConfig {
    /// Endpoints for the configured mode
    pub fn endpoints(&self) -> &InswEndpoints {
        match self.mode {
            InswMode::Test => &self.test,
            InswMode::Real => &self.real,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TransmissionConfig {
    /// Largest number of record ids accepted in one batch
    pub max_batch_size: usize,

    /// A SENT claim older than this may be taken over by another batch
    pub stale_claim_secs: i64,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("BZI_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("insw.mode", "test")?
            .set_default("insw.timeout_secs", 30)?
            .set_default("transmission.max_batch_size", 200)?
            .set_default("transmission.stale_claim_secs", 300)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (BZI_ prefix)
            .add_source(
                Environment::with_prefix("BZI")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

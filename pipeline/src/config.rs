//! Configuration management for the climate ingestion pipeline
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with VCP_ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;
use shared::DataSource;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Ingestion run tuning
    pub ingestion: IngestionConfig,

    /// Per-provider endpoints and credentials
    pub providers: ProvidersConfig,

    /// Zone aggregation tuning
    pub aggregation: AggregationConfig,

    /// Phenology forecasting tuning
    pub phenology: PhenologyConfig,
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
pub struct IngestionConfig {
    /// First-run window length when a (station, variable) has no watermark
    pub lookback_hours: i64,

    /// Bounded worker pool size for per-station fan-out
    pub workers: usize,

    /// Retry attempts per provider call
    pub max_retries: u32,

    /// Initial backoff delay, doubled per attempt
    pub retry_base_ms: u64,

    /// Per-request HTTP timeout
    pub http_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProvidersConfig {
    pub harvest: ProviderConfig,
    pub hilltop: ProviderConfig,
    pub metwatch: ProviderConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    /// Provider API base URL
    pub base_url: String,

    /// API key, for providers that require one
    pub api_key: Option<String>,

    /// Publication lag: the fetch window ends this many hours in the past
    pub publication_delay_hours: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AggregationConfig {
    /// Stations contributing temperature needed for a `high` confidence day
    pub high_confidence_min_stations: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PhenologyConfig {
    /// Trailing window for the average daily GDD accumulation rate
    pub rate_lookback_days: i64,
}

impl ProvidersConfig {
    pub fn for_source(&self, source: DataSource) -> &ProviderConfig {
        match source {
            DataSource::Harvest => &self.harvest,
            DataSource::Hilltop => &self.hilltop,
            DataSource::Metwatch => &self.metwatch,
        }
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("VCP_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("ingestion.lookback_hours", 48)?
            .set_default("ingestion.workers", 4)?
            .set_default("ingestion.max_retries", 3)?
            .set_default("ingestion.retry_base_ms", 500)?
            .set_default("ingestion.http_timeout_secs", 30)?
            .set_default("providers.harvest.publication_delay_hours", 0)?
            .set_default("providers.hilltop.publication_delay_hours", 0)?
            .set_default("providers.metwatch.publication_delay_hours", 6)?
            .set_default("aggregation.high_confidence_min_stations", 2)?
            .set_default("phenology.rate_lookback_days", 14)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (VCP_ prefix)
            .add_source(
                Environment::with_prefix("VCP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

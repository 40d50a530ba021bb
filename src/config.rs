use config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub nats: NatsConfig,
    pub identity: IdentityConfig,
    pub market_data: MarketDataConfig,
    pub forecast: ForecastConfig,
    pub exchange: ExchangeConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub requests_per_minute: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NatsConfig {
    pub url: String,
    pub topic_prefix: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IdentityConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MarketDataConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ForecastConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExchangeConfig {
    pub rate_window_hours: i64,       // Trailing window for the derived rate signal
    pub max_rate_window_hours: i64,
    pub default_margin_percent: f64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut builder = config::Config::builder()
            // Start with default configuration
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8084)?
            .set_default("server.workers", 4)?
            .set_default("server.requests_per_minute", 120)?
            .set_default("database.max_connections", 10)?
            .set_default("nats.url", "nats://localhost:4222")?
            .set_default("nats.topic_prefix", "exchange")?
            .set_default("identity.base_url", "http://localhost:8180")?
            .set_default("identity.timeout_secs", 10)?
            .set_default("market_data.base_url", "https://api.frankfurter.app")?
            .set_default("market_data.timeout_secs", 15)?
            .set_default("forecast.base_url", "http://localhost:8280")?
            .set_default("forecast.timeout_secs", 30)?
            .set_default("exchange.rate_window_hours", 72)?
            .set_default("exchange.max_rate_window_hours", 24 * 30)?
            .set_default("exchange.default_margin_percent", 2.0)?;

        // Add environment-specific config file if it exists
        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(File::with_name(&config_file).required(false));
        } else {
            builder = builder
                .add_source(File::with_name(&format!("config/{}", environment)).required(false));
        }

        // Override with environment variables
        builder = builder.add_source(
            Environment::with_prefix("EXCHANGE_ENGINE")
                .separator("__")
                .list_separator(","),
        );

        // Special handling for common env vars
        if let Ok(db_url) = env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", db_url)?;
        }

        if let Ok(nats_url) = env::var("NATS_URL") {
            builder = builder.set_override("nats.url", nats_url)?;
        }

        if let Ok(identity_url) = env::var("IDENTITY_PROVIDER_URL") {
            builder = builder.set_override("identity.base_url", identity_url)?;
        }

        if let Ok(port) = env::var("EXCHANGE_ENGINE_PORT") {
            builder = builder.set_override("server.port", port)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }

        if self.database.url.is_empty() {
            return Err("Database URL is required".to_string());
        }

        if self.nats.url.is_empty() {
            return Err("NATS URL is required".to_string());
        }

        if self.identity.base_url.is_empty() {
            return Err("Identity provider URL is required".to_string());
        }

        if self.exchange.rate_window_hours <= 0
            || self.exchange.rate_window_hours > self.exchange.max_rate_window_hours
        {
            return Err("Rate window must be positive and within the configured maximum".to_string());
        }

        Ok(())
    }
}

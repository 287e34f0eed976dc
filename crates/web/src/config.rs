use anyhow::{Context, Result};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub api_keys: String,
    pub max_batch_writes: usize,
    pub drift_tolerance: Decimal,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: std::env::var("HOST").context("Cannot load HOST env variable")?,
            port: std::env::var("PORT")
                .context("PORT must be a number")?
                .parse()?,
            database_url: std::env::var("DATABASE_URL")
                .context("Cannot load DATABASE_URL env variable")?,
            api_keys: std::env::var("API_KEYS").unwrap_or_default(),
            max_batch_writes: match std::env::var("MAX_BATCH_WRITES") {
                Ok(value) => value
                    .parse()
                    .context("MAX_BATCH_WRITES must be a positive integer")?,
                Err(_) => storage::store::DEFAULT_MAX_BATCH_WRITES,
            },
            drift_tolerance: match std::env::var("DRIFT_TOLERANCE") {
                Ok(value) => value
                    .parse()
                    .context("DRIFT_TOLERANCE must be a decimal number")?,
                Err(_) => Decimal::ONE,
            },
        })
    }
}

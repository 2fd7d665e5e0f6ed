//! Configuration management

use std::str::FromStr;
use std::time::Duration;

use anyhow::{self, Context, Result};

use crate::services::intake::UploadLimits;
use crate::services::upload_pipeline::{ExistingLookup, PipelineOptions};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// NATS server URL
    pub nats_url: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Pool size
    pub db_max_connections: u32,

    /// Upper bound for any single storage stage (acquire, load, commit)
    pub db_timeout: Duration,

    /// Size and row caps applied before parsing
    pub limits: UploadLimits,

    /// Number of threads used for row validation
    pub validation_workers: usize,

    /// How the existing-assignment snapshot is loaded
    pub existing_lookup: ExistingLookup,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let nats_url = lookup("NATS_URL")
            .unwrap_or_else(|| "nats://localhost:4222".to_string());

        let database_url = lookup("DATABASE_URL")
            .context("DATABASE_URL must be set")?;

        let db_max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?;
        let db_timeout = Duration::from_secs(parse_or(&lookup, "DB_TIMEOUT_SECS", 30)?);

        let defaults = UploadLimits::default();
        let limits = UploadLimits {
            max_bytes: parse_or(&lookup, "UPLOAD_MAX_BYTES", defaults.max_bytes)?,
            max_rows: parse_or(&lookup, "UPLOAD_MAX_ROWS", defaults.max_rows)?,
        };

        let validation_workers = parse_or(
            &lookup,
            "VALIDATION_WORKERS",
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
        )?;
        if validation_workers == 0 {
            anyhow::bail!("VALIDATION_WORKERS must be at least 1");
        }

        let existing_lookup = parse_or(&lookup, "EXISTING_LOOKUP", ExistingLookup::Targeted)?;

        Ok(Self {
            nats_url,
            database_url,
            db_max_connections,
            db_timeout,
            limits,
            validation_workers,
            existing_lookup,
        })
    }

    /// Options handed to the upload pipeline
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            limits: self.limits,
            validation_workers: self.validation_workers,
            storage_timeout: self.db_timeout,
            existing_lookup: self.existing_lookup,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has invalid value '{}': {}", key, raw, e)),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_config_requires_database_url() {
        let result = Config::from_lookup(lookup_from(&[]));
        assert!(result.is_err());
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://test")])).unwrap();
        assert_eq!(config.nats_url, "nats://localhost:4222");
        assert_eq!(config.db_max_connections, 10);
        assert_eq!(config.db_timeout, Duration::from_secs(30));
        assert_eq!(config.limits.max_rows, 50_000);
        assert_eq!(config.limits.max_bytes, 2_500_000);
        assert_eq!(config.existing_lookup, ExistingLookup::Targeted);
        assert!(config.validation_workers >= 1);
    }

    #[test]
    fn test_config_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://test"),
            ("UPLOAD_MAX_ROWS", "100"),
            ("UPLOAD_MAX_BYTES", "4096"),
            ("VALIDATION_WORKERS", "2"),
            ("EXISTING_LOOKUP", "full"),
            ("DB_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.limits.max_rows, 100);
        assert_eq!(config.limits.max_bytes, 4096);
        assert_eq!(config.validation_workers, 2);
        assert_eq!(config.existing_lookup, ExistingLookup::Full);

        let options = config.pipeline_options();
        assert_eq!(options.storage_timeout, Duration::from_secs(5));
        assert_eq!(options.limits.max_rows, 100);
    }

    #[test]
    fn test_config_rejects_invalid_numbers() {
        let result = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://test"),
            ("UPLOAD_MAX_ROWS", "lots"),
        ]));
        let message = result.unwrap_err().to_string();
        assert!(message.contains("UPLOAD_MAX_ROWS"));
    }

    #[test]
    fn test_config_rejects_zero_workers() {
        let result = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://test"),
            ("VALIDATION_WORKERS", "0"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_config_rejects_unknown_lookup_mode() {
        let result = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://test"),
            ("EXISTING_LOOKUP", "sometimes"),
        ]));
        assert!(result.is_err());
    }
}

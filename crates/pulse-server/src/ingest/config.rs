//! Ingestion configuration
//!
//! Read from `INGEST_*` environment variables; anything unset or unparsable
//! falls back to the defaults below.

use pulse_common::PulseError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::importer::DEFAULT_BATCH_SIZE;
use super::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use super::scheduler::DEFAULT_FILE_CONCURRENCY;

/// Default directory scanned for `activities_YYYYMMDD.csv` files
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Default base delay between write attempts, in milliseconds
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1_000;

/// Year the activity files are expected to cover
pub const DEFAULT_EXPECTED_YEAR: i32 = 2024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestConfig {
    pub data_dir: PathBuf,
    /// Clean records per bulk write
    pub batch_size: usize,
    /// Files imported at the same time
    pub file_concurrency: usize,
    pub max_write_attempts: u32,
    pub retry_base_delay_ms: u64,
    /// Timestamps outside this year are flagged as suspicious
    pub expected_year: i32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            batch_size: DEFAULT_BATCH_SIZE,
            file_concurrency: DEFAULT_FILE_CONCURRENCY,
            max_write_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            expected_year: DEFAULT_EXPECTED_YEAR,
        }
    }
}

impl IngestConfig {
    /// Load ingestion configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            data_dir: std::env::var("INGEST_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR)),
            batch_size: std::env::var("INGEST_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_BATCH_SIZE),
            file_concurrency: std::env::var("INGEST_FILE_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_FILE_CONCURRENCY),
            max_write_attempts: std::env::var("INGEST_MAX_WRITE_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_ATTEMPTS),
            retry_base_delay_ms: std::env::var("INGEST_RETRY_BASE_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_RETRY_BASE_DELAY_MS),
            expected_year: std::env::var("INGEST_EXPECTED_YEAR")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_EXPECTED_YEAR),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> pulse_common::Result<()> {
        if self.batch_size == 0 {
            return Err(PulseError::config("INGEST_BATCH_SIZE must be greater than 0"));
        }
        if self.file_concurrency == 0 {
            return Err(PulseError::config("INGEST_FILE_CONCURRENCY must be greater than 0"));
        }
        if self.max_write_attempts == 0 {
            return Err(PulseError::config("INGEST_MAX_WRITE_ATTEMPTS must be greater than 0"));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_write_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_config_default() {
        let config = IngestConfig::default();
        assert_eq!(config.batch_size, 5_000);
        assert_eq!(config.file_concurrency, 3);
        assert_eq!(config.max_write_attempts, 3);
        assert_eq!(config.expected_year, 2024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ingest_config_validation_zero_batch_size() {
        let config = IngestConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ingest_config_validation_zero_concurrency() {
        let config = IngestConfig {
            file_concurrency: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("INGEST_FILE_CONCURRENCY"));
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = IngestConfig {
            retry_base_delay_ms: 250,
            ..Default::default()
        };
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
    }
}

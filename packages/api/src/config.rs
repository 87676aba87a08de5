//! Application configuration read from environment variables.

use std::str::FromStr;
use std::time::Duration;

use actors::DEFAULT_CONCURRENCY;
use image_core::DEFAULT_MAX_UPLOAD_BYTES;
use removal::{REMOVE_BG_URL, RetryPolicy};
use storage::{StorageConfig, StorageError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid {name}={value}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Everything [`crate::init_image_api`] needs to start the pipeline.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Worker slots in the work queue.
    pub concurrency: usize,
    pub remove_bg_api_key: String,
    pub remove_bg_url: String,
    pub retry: RetryPolicy,
    /// RocksDB directory for job records; in-memory when unset.
    pub database_path: Option<String>,
    pub upload_folder: String,
    pub max_upload_bytes: usize,
    pub optimized_max_dimension: u32,
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Defaults for everything except the provider key.
    pub fn new(remove_bg_api_key: impl Into<String>, storage: StorageConfig) -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            remove_bg_api_key: remove_bg_api_key.into(),
            remove_bg_url: REMOVE_BG_URL.to_string(),
            retry: RetryPolicy::default(),
            database_path: None,
            upload_folder: "image-pipeline".to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            optimized_max_dimension: 1500,
            storage,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from a variable lookup.
    ///
    /// - `REMOVE_BG_API_KEY` (required)
    /// - `REMOVE_BG_URL` (default: the public remove.bg endpoint)
    /// - `REMOVE_BG_MAX_ATTEMPTS` (default: 3), `REMOVE_BG_BASE_DELAY_MS` (default: 400)
    /// - `JOB_CONCURRENCY` (default: 2)
    /// - `DATABASE_PATH` (optional)
    /// - `UPLOAD_FOLDER` (default: `image-pipeline`)
    /// - `MAX_UPLOAD_BYTES` (default: 10 MiB)
    /// - `OPTIMIZED_MAX_DIMENSION` (default: 1500)
    /// - storage variables, see [`StorageConfig::from_lookup`]
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = var("REMOVE_BG_API_KEY").ok_or(ConfigError::Missing("REMOVE_BG_API_KEY"))?;
        let storage = StorageConfig::from_lookup(&lookup)?;
        let mut config = Self::new(api_key, storage);

        if let Some(url) = var("REMOVE_BG_URL") {
            config.remove_bg_url = url;
        }
        if let Some(folder) = var("UPLOAD_FOLDER") {
            config.upload_folder = folder;
        }
        config.database_path = var("DATABASE_PATH");

        let concurrency = parse(&var, "JOB_CONCURRENCY")?.unwrap_or(config.concurrency);
        if concurrency == 0 {
            return Err(invalid("JOB_CONCURRENCY", "0", "must be at least 1"));
        }
        config.concurrency = concurrency;

        let attempts = parse(&var, "REMOVE_BG_MAX_ATTEMPTS")?.unwrap_or(config.retry.max_attempts);
        if attempts == 0 {
            return Err(invalid("REMOVE_BG_MAX_ATTEMPTS", "0", "must be at least 1"));
        }
        let base_delay = parse::<u64, _>(&var, "REMOVE_BG_BASE_DELAY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(config.retry.base_delay);
        config.retry = RetryPolicy::new(attempts, base_delay);

        if let Some(max) = parse(&var, "MAX_UPLOAD_BYTES")? {
            config.max_upload_bytes = max;
        }
        if let Some(dim) = parse::<u32, _>(&var, "OPTIMIZED_MAX_DIMENSION")? {
            if dim == 0 {
                return Err(invalid("OPTIMIZED_MAX_DIMENSION", "0", "must be positive"));
            }
            config.optimized_max_dimension = dim;
        }

        Ok(config)
    }
}

fn parse<T, F>(var: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = var(name) else {
        return Ok(None);
    };
    raw.parse()
        .map(Some)
        .map_err(|e: T::Err| invalid(name, &raw, &e.to_string()))
}

fn invalid(name: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

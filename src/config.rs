//! Process configuration.
//!
//! Loaded once at startup from environment variables (a `.env` file is read
//! first when present). Missing credentials are a startup failure.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Default record retention window.
pub const DEFAULT_TASK_TTL_SECS: u64 = 3600;

/// Default number of candidate sources per search.
pub const DEFAULT_MAX_SOURCES: usize = 5;

pub const DEFAULT_MAX_CONCURRENT_TASKS: usize = 32;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// OpenRouter key used by the extraction oracle.
    pub openrouter_api_key: String,
    /// Google Programmable Search credentials.
    pub google_api_key: String,
    pub search_engine_id: String,
    /// Redis URL for the task store; in-memory store when unset.
    pub redis_url: Option<String>,
    pub task_ttl: Duration,
    pub max_sources: usize,
    pub fetch_timeout: Duration,
    /// Budget for one fetch + oracle attempt.
    pub extraction_timeout: Duration,
    pub extraction_model: String,
    pub max_concurrent_tasks: usize,
    /// Frontend assets served at `/`.
    pub static_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .with_context(|| format!("{} must be set", key))
        };
        let optional = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let config = Self {
            host: optional("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_or(&optional, "PORT", 8000)?,
            openrouter_api_key: required("OPENROUTER_API_KEY")?,
            google_api_key: required("GOOGLE_API_KEY")?,
            search_engine_id: required("SEARCH_ENGINE_ID")?,
            redis_url: optional("REDIS_URL"),
            task_ttl: Duration::from_secs(parse_or(&optional, "TASK_TTL_SECS", DEFAULT_TASK_TTL_SECS)?),
            max_sources: parse_or(&optional, "MAX_SOURCES", DEFAULT_MAX_SOURCES)?,
            fetch_timeout: Duration::from_secs(parse_or(&optional, "FETCH_TIMEOUT_SECS", 12)?),
            extraction_timeout: Duration::from_secs(parse_or(
                &optional,
                "EXTRACTION_TIMEOUT_SECS",
                60,
            )?),
            extraction_model: optional("EXTRACTION_MODEL")
                .unwrap_or_else(|| "google/gemini-flash-1.5".to_string()),
            max_concurrent_tasks: parse_or(&optional, "MAX_CONCURRENT_TASKS", DEFAULT_MAX_CONCURRENT_TASKS)?,
            static_dir: optional("STATIC_DIR").map(PathBuf::from),
        };

        if config.task_ttl.is_zero() {
            bail!("TASK_TTL_SECS must be greater than zero");
        }
        if config.max_sources == 0 {
            bail!("MAX_SOURCES must be greater than zero");
        }
        if config.max_concurrent_tasks == 0 {
            bail!("MAX_CONCURRENT_TASKS must be greater than zero");
        }
        if config.redis_url.is_some() && !cfg!(feature = "redis") {
            bail!("REDIS_URL is set but this build was compiled without the `redis` feature");
        }

        Ok(config)
    }
}

fn parse_or<T, F>(optional: &F, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match optional(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{} must be a valid number, got {:?}", key, raw)),
        None => Ok(default),
    }
}

use core::time::Duration;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use object_store::ObjectStore;
use object_store::path::Path as ObjectStorePath;
use url::Url;

/// Default local root for synchronized experiments.
pub const DEFAULT_EXPERIMENTS_PATH: &str = "/persistent/experiments";

const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;
const DEFAULT_FETCH_WORKERS: usize = 32;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 120;
const DEFAULT_FETCH_RETRIES: usize = 2;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: Option<String>,

    /// URL of the remote artifact store (e.g. `gs://bucket`)
    pub artifact_store_url: String,

    /// Local directory experiments are synchronized into
    pub experiments_path: PathBuf,

    /// Time between sync cycles
    pub sync_interval: Duration,

    /// Number of concurrent artifact transfers
    pub fetch_workers: usize,

    /// Upper bound for a single artifact transfer
    pub fetch_timeout: Duration,

    /// Retries per artifact transfer after the first attempt
    pub fetch_retries: usize,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// Required environment variables:
    /// - `ARTIFACT_STORE_URL`: remote store, e.g. `gs://my-models` or `file:///data/models`
    ///
    /// Optional environment variables:
    /// - `DATABASE_URL`: `PostgreSQL` connection string (needed by commands touching the leaderboard)
    /// - `LOCAL_EXPERIMENTS_PATH`: local cache root (default: `/persistent/experiments`)
    /// - `SYNC_INTERVAL_SECS`: seconds between sync cycles (default: 60)
    /// - `FETCH_WORKERS`: concurrent artifact transfers (default: 32)
    /// - `FETCH_TIMEOUT_SECS`: per-transfer timeout (default: 120)
    /// - `FETCH_RETRIES`: per-transfer retries (default: 2)
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or malformed.
    pub fn from_env() -> Result<Self> {
        // Load .env file
        dotenvy::dotenv().ok();

        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let artifact_store_url = lookup("ARTIFACT_STORE_URL")
            .context("ARTIFACT_STORE_URL environment variable not set")?;

        let experiments_path = lookup("LOCAL_EXPERIMENTS_PATH")
            .map_or_else(|| PathBuf::from(DEFAULT_EXPERIMENTS_PATH), PathBuf::from);

        let fetch_workers = parse_or(&lookup, "FETCH_WORKERS", DEFAULT_FETCH_WORKERS)?;
        anyhow::ensure!(fetch_workers > 0, "FETCH_WORKERS must be at least 1");

        Ok(Self {
            database_url: lookup("DATABASE_URL"),
            artifact_store_url,
            experiments_path,
            sync_interval: Duration::from_secs(parse_or(
                &lookup,
                "SYNC_INTERVAL_SECS",
                DEFAULT_SYNC_INTERVAL_SECS,
            )?),
            fetch_workers,
            fetch_timeout: Duration::from_secs(parse_or(
                &lookup,
                "FETCH_TIMEOUT_SECS",
                DEFAULT_FETCH_TIMEOUT_SECS,
            )?),
            fetch_retries: parse_or(&lookup, "FETCH_RETRIES", DEFAULT_FETCH_RETRIES)?,
        })
    }

    /// Returns the database URL or an error naming the missing variable.
    ///
    /// # Errors
    ///
    /// Returns an error if `DATABASE_URL` was not set.
    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL environment variable not set")
    }

    /// Opens the remote artifact store named by `ARTIFACT_STORE_URL`.
    ///
    /// Returns the store together with the path prefix embedded in the URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or its scheme is unsupported.
    pub fn open_artifact_store(&self) -> Result<(Arc<dyn ObjectStore>, ObjectStorePath)> {
        let url = Url::parse(&self.artifact_store_url)
            .with_context(|| format!("Invalid ARTIFACT_STORE_URL: {}", self.artifact_store_url))?;

        let (store, prefix) = object_store::parse_url(&url)
            .with_context(|| format!("Unsupported artifact store: {url}"))?;

        Ok((Arc::from(store), prefix))
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: core::str::FromStr,
    T::Err: core::error::Error + Send + Sync + 'static,
{
    lookup(name).map_or(Ok(default), |raw| {
        raw.trim()
            .parse()
            .with_context(|| format!("{name} has an invalid value: {raw}"))
    })
}

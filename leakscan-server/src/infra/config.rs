use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

/// Runtime configuration, resolved from the environment once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    /// Root directory of the filesystem object store.
    pub object_store_root: PathBuf,
    /// Concurrent scan workers to run in-process.
    pub worker_count: usize,
    /// Seconds a received queue message stays invisible.
    pub queue_visibility_secs: i64,
    /// Deliveries before a message is parked as dead-letter.
    pub queue_max_receives: i64,
    /// Worker pause between empty receive cycles, in milliseconds.
    pub worker_poll_ms: u64,
    /// Messages requested per receive call.
    pub worker_batch_size: usize,
    /// Objects requested per listing page during enumeration.
    pub enumeration_page_size: usize,
}

fn var_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("invalid value for {name}: {raw:?}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL")
            .context("DATABASE_URL must be set")?;
        let object_store_root = env::var("OBJECT_STORE_ROOT")
            .context("OBJECT_STORE_ROOT must be set")?;

        Ok(Self {
            server_host: var_or("SERVER_HOST", "0.0.0.0".to_string())?,
            server_port: var_or("SERVER_PORT", 8080u16)?,
            database_url,
            object_store_root: PathBuf::from(object_store_root),
            worker_count: var_or("WORKER_COUNT", 4usize)?,
            queue_visibility_secs: var_or("QUEUE_VISIBILITY_SECS", 60i64)?,
            queue_max_receives: var_or("QUEUE_MAX_RECEIVES", 3i64)?,
            worker_poll_ms: var_or("WORKER_POLL_MS", 1000u64)?,
            worker_batch_size: var_or("WORKER_BATCH_SIZE", 10usize)?,
            enumeration_page_size: var_or("ENUMERATION_PAGE_SIZE", 1000usize)?,
        })
    }
}

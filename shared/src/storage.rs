//! Construction of the pooled SQL connection shared by the account and event
//! stores.

use serde::Deserialize;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("invalid storage url: {0}")]
    InvalidUrl(sqlx::Error),
    #[error("could not open storage pool: {0}")]
    Connect(sqlx::Error),
}

fn default_max_connections() -> u32 {
    25
}

fn default_min_connections() -> u32 {
    5
}

fn default_max_lifetime_secs() -> u64 {
    300
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// Connection string, e.g. `sqlite://pulse.db`
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Number of connections kept open while idle
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_max_lifetime_secs")]
    pub max_lifetime_secs: u64,
}

impl StorageConfig {
    pub fn new(url: impl Into<String>) -> Self {
        StorageConfig {
            url: url.into(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            max_lifetime_secs: default_max_lifetime_secs(),
        }
    }
}

/// Opens a bounded pool of reusable connections. The database file is created
/// when missing.
pub async fn connect(config: &StorageConfig) -> Result<SqlitePool, StorageError> {
    let options = SqliteConnectOptions::from_str(&config.url)
        .map_err(StorageError::InvalidUrl)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections.min(config.max_connections))
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
        .connect_with(options)
        .await
        .map_err(StorageError::Connect)?;

    tracing::info!(
        max_connections = config.max_connections,
        "Connected to storage"
    );

    Ok(pool)
}

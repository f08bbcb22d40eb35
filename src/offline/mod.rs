//! Durable local state kept on the gateway: the queue of scans taken while
//! offline and a snapshot of ticket states used to pre-check those scans.

use std::str::FromStr;

use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use thiserror::Error;

mod queue;
mod snapshot;

pub use queue::QueueStats;
pub use snapshot::SnapshotTicket;

static MIGRATOR: Migrator = sqlx::migrate!("./local_migrations");

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("offline queue database error")]
    Database(#[from] sqlx::Error),

    #[error("offline queue migration failed")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("corrupt offline queue row: {0}")]
    Corrupt(String),
}

/// SQLite-backed offline store. Cheap to clone.
#[derive(Clone)]
pub struct OfflineQueue {
    pool: SqlitePool,
}

impl OfflineQueue {
    pub async fn connect(url: &str) -> Result<Self, QueueError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        // Every connection to `:memory:` opens a separate database.
        let max_connections = if url.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        MIGRATOR.run(&pool).await?;
        tracing::info!(url, "Offline queue ready");

        Ok(Self { pool })
    }

    pub async fn in_memory() -> Result<Self, QueueError> {
        Self::connect("sqlite::memory:").await
    }
}

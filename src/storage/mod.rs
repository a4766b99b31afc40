pub mod live;
pub mod memory;
pub mod postgres;
pub mod push_id;
pub mod sqlite;
pub mod trait_def;

pub use live::{LiveStore, Snapshot, Subscription};
pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;
pub use push_id::PushIdGenerator;
pub use sqlite::SqliteStorage;
pub use trait_def::{validate_key, Entry, Storage, StorageError, StorageResult};

use crate::config::{DatabaseBackend, DatabaseConfig};
use std::sync::Arc;

/// Open and initialize the configured backend, wrapped with change feeds.
pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<Arc<LiveStore>> {
    let storage: Arc<dyn Storage> = match config.backend {
        DatabaseBackend::Memory => {
            tracing::info!("Using in-memory storage (data is lost on restart)");
            Arc::new(MemoryStorage::new())
        }
        DatabaseBackend::Sqlite => {
            tracing::info!("Using SQLite storage: {}", config.url);
            Arc::new(SqliteStorage::new(&config.url, config.max_connections).await?)
        }
        DatabaseBackend::Postgres => {
            tracing::info!("Using PostgreSQL storage: {}", config.url);
            Arc::new(PostgresStorage::new(&config.url, config.max_connections).await?)
        }
    };

    storage.init().await?;
    Ok(Arc::new(LiveStore::new(storage)))
}

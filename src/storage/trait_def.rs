use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid key: {0:?}")]
    InvalidKey(String),
    #[error("malformed value: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// A single child of a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub key: String,
    pub value: Value,
}

/// Flat two-level key/value store: every node lives at `<collection>/<key>`
/// and holds a JSON object.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables, etc.)
    async fn init(&self) -> Result<()>;

    /// Point read of a node
    async fn get(&self, collection: &str, key: &str) -> StorageResult<Option<Value>>;

    /// Overwrite (or create) a node
    async fn set(&self, collection: &str, key: &str, value: Value) -> StorageResult<()>;

    /// Merge `fields` into an existing node.
    /// Returns false without writing anything if the node does not exist.
    async fn update(
        &self,
        collection: &str,
        key: &str,
        fields: Map<String, Value>,
    ) -> StorageResult<bool>;

    /// Remove a node, returning whether it existed
    async fn remove(&self, collection: &str, key: &str) -> StorageResult<bool>;

    /// All children of a collection, ordered by key (byte order)
    async fn children(&self, collection: &str) -> StorageResult<Vec<Entry>>;

    /// Atomically add 1 to the integer `field` of a node, or create the node
    /// from `seed` with `field` set to 1 when it does not exist yet.
    /// Returns the new value of `field`.
    async fn increment(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        seed: Map<String, Value>,
    ) -> StorageResult<i64>;
}

/// Reject keys that cannot address a single node.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.contains('/') || key.chars().any(char::is_control) {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Seed object with `field` forced to 1.
pub(crate) fn seeded(mut seed: Map<String, Value>, field: &str) -> Value {
    seed.insert(field.to_string(), Value::from(1));
    Value::Object(seed)
}

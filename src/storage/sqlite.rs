use crate::storage::trait_def::seeded;
use crate::storage::{Entry, Storage, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

fn decode(raw: &str) -> StorageResult<Value> {
    Ok(serde_json::from_str(raw)?)
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                collection TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (collection, key)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn get(&self, collection: &str, key: &str) -> StorageResult<Option<Value>> {
        let raw = sqlx::query_scalar::<_, String>(
            "SELECT value FROM nodes WHERE collection = ? AND key = ?",
        )
        .bind(collection)
        .bind(key)
        .fetch_optional(self.pool.as_ref())
        .await?;

        raw.as_deref().map(decode).transpose()
    }

    async fn set(&self, collection: &str, key: &str, value: Value) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO nodes (collection, key, value)
            VALUES (?, ?, ?)
            ON CONFLICT(collection, key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(collection)
        .bind(key)
        .bind(serde_json::to_string(&value)?)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        key: &str,
        fields: Map<String, Value>,
    ) -> StorageResult<bool> {
        // json_patch is an RFC 7396 merge: null members delete keys
        let result = sqlx::query(
            r#"
            UPDATE nodes
            SET value = json_patch(value, ?)
            WHERE collection = ? AND key = ?
            "#,
        )
        .bind(serde_json::to_string(&Value::Object(fields))?)
        .bind(collection)
        .bind(key)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove(&self, collection: &str, key: &str) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM nodes WHERE collection = ? AND key = ?")
            .bind(collection)
            .bind(key)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn children(&self, collection: &str) -> StorageResult<Vec<Entry>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT key, value FROM nodes WHERE collection = ? ORDER BY key",
        )
        .bind(collection)
        .fetch_all(self.pool.as_ref())
        .await?;

        rows.into_iter()
            .map(|(key, raw)| {
                Ok(Entry {
                    key,
                    value: decode(&raw)?,
                })
            })
            .collect()
    }

    async fn increment(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        seed: Map<String, Value>,
    ) -> StorageResult<i64> {
        let json_path = format!("$.{field}");

        // Single upsert statement: SQLite serializes writers, so concurrent
        // increments of the same node cannot be lost.
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO nodes (collection, key, value)
            VALUES (?, ?, ?)
            ON CONFLICT(collection, key) DO UPDATE SET value = json_set(
                nodes.value,
                ?,
                CASE WHEN json_type(nodes.value, ?) IN ('integer', 'real')
                    THEN CAST(json_extract(nodes.value, ?) AS INTEGER)
                    ELSE 0
                END + 1
            )
            RETURNING CAST(json_extract(value, ?) AS INTEGER)
            "#,
        )
        .bind(collection)
        .bind(key)
        .bind(serde_json::to_string(&seeded(seed, field))?)
        .bind(&json_path)
        .bind(&json_path)
        .bind(&json_path)
        .bind(&json_path)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn setup_sqlite() -> SqliteStorage {
        let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
        storage.init().await.unwrap();
        storage
    }

    #[tokio::test]
    async fn test_update_preserves_other_fields() {
        let storage = setup_sqlite().await;
        storage
            .set("comments", "c1", json!({"ipAddress": "10.0.0.9", "text": "User9: hi"}))
            .await
            .unwrap();

        let mut fields = Map::new();
        fields.insert("text".into(), json!("bye"));
        assert!(storage.update("comments", "c1", fields).await.unwrap());

        let node = storage.get("comments", "c1").await.unwrap().unwrap();
        assert_eq!(node, json!({"ipAddress": "10.0.0.9", "text": "bye"}));
    }

    #[tokio::test]
    async fn test_increment_creates_then_bumps() {
        let storage = setup_sqlite().await;
        let mut seed = Map::new();
        seed.insert("ip".into(), json!("5555"));

        let first = storage
            .increment("User", "5555", "visitor", seed.clone())
            .await
            .unwrap();
        let second = storage
            .increment("User", "5555", "visitor", seed)
            .await
            .unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 2);
        let node = storage.get("User", "5555").await.unwrap().unwrap();
        assert_eq!(node, json!({"ip": "5555", "visitor": 2}));
    }
}

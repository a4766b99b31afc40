use crate::storage::trait_def::seeded;
use crate::storage::{Entry, Storage, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;

pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
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
impl Storage for PostgresStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                collection TEXT NOT NULL,
                key TEXT NOT NULL,
                value JSONB NOT NULL,
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
            "SELECT value::text FROM nodes WHERE collection = $1 AND key = $2",
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
            VALUES ($1, $2, $3::jsonb)
            ON CONFLICT (collection, key) DO UPDATE SET value = EXCLUDED.value
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
        let result = sqlx::query(
            r#"
            UPDATE nodes
            SET value = jsonb_strip_nulls(value || $3::jsonb)
            WHERE collection = $1 AND key = $2
            "#,
        )
        .bind(collection)
        .bind(key)
        .bind(serde_json::to_string(&Value::Object(fields))?)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove(&self, collection: &str, key: &str) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM nodes WHERE collection = $1 AND key = $2")
            .bind(collection)
            .bind(key)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn children(&self, collection: &str) -> StorageResult<Vec<Entry>> {
        // "C" collation keeps byte order, matching the other backends
        let rows = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT key, value::text FROM nodes
            WHERE collection = $1
            ORDER BY key COLLATE "C"
            "#,
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
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO nodes (collection, key, value)
            VALUES ($1, $2, $3::jsonb)
            ON CONFLICT (collection, key) DO UPDATE SET value = jsonb_set(
                nodes.value,
                ARRAY[$4::text],
                to_jsonb(
                    CASE WHEN jsonb_typeof(nodes.value -> $4::text) = 'number'
                        THEN trunc((nodes.value ->> $4::text)::numeric)::bigint
                        ELSE 0
                    END + 1
                )
            )
            RETURNING (value ->> $4::text)::bigint
            "#,
        )
        .bind(collection)
        .bind(key)
        .bind(serde_json::to_string(&seeded(seed, field))?)
        .bind(field)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count)
    }
}

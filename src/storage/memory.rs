use crate::storage::trait_def::seeded;
use crate::storage::{Entry, Storage, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Process-local storage. Each collection is an ordered map guarded by its
/// DashMap shard, so every operation on one collection is atomic.
#[derive(Default)]
pub struct MemoryStorage {
    collections: DashMap<String, BTreeMap<String, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Shallow merge; `null` fields delete the corresponding key.
pub(crate) fn merge_fields(target: &mut Value, fields: Map<String, Value>) {
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(object) = target {
        for (name, value) in fields {
            if value.is_null() {
                object.remove(&name);
            } else {
                object.insert(name, value);
            }
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, collection: &str, key: &str) -> StorageResult<Option<Value>> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|nodes| nodes.get(key).cloned()))
    }

    async fn set(&self, collection: &str, key: &str, value: Value) -> StorageResult<()> {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        key: &str,
        fields: Map<String, Value>,
    ) -> StorageResult<bool> {
        let Some(mut nodes) = self.collections.get_mut(collection) else {
            return Ok(false);
        };
        match nodes.get_mut(key) {
            Some(node) => {
                merge_fields(node, fields);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove(&self, collection: &str, key: &str) -> StorageResult<bool> {
        Ok(self
            .collections
            .get_mut(collection)
            .map(|mut nodes| nodes.remove(key).is_some())
            .unwrap_or(false))
    }

    async fn children(&self, collection: &str) -> StorageResult<Vec<Entry>> {
        Ok(self
            .collections
            .get(collection)
            .map(|nodes| {
                nodes
                    .iter()
                    .map(|(key, value)| Entry {
                        key: key.clone(),
                        value: value.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn increment(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        seed: Map<String, Value>,
    ) -> StorageResult<i64> {
        let mut nodes = self.collections.entry(collection.to_string()).or_default();
        match nodes.get_mut(key) {
            Some(node) => {
                let current = node
                    .get(field)
                    .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f.trunc() as i64)))
                    .unwrap_or(0);
                let next = current + 1;
                let mut fields = Map::new();
                fields.insert(field.to_string(), Value::from(next));
                merge_fields(node, fields);
                Ok(next)
            }
            None => {
                nodes.insert(key.to_string(), seeded(seed, field));
                Ok(1)
            }
        }
    }
}

use crate::storage::push_id::PushIdGenerator;
use crate::storage::trait_def::validate_key;
use crate::storage::{Entry, Storage, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// Full contents of one collection at one moment, ordered by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub entries: Vec<Entry>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decode every entry as `T`, skipping (and logging) entries that do not fit.
    pub fn decode<T: DeserializeOwned>(&self) -> Vec<(String, T)> {
        self.entries
            .iter()
            .filter_map(|entry| match T::deserialize(&entry.value) {
                Ok(item) => Some((entry.key.clone(), item)),
                Err(e) => {
                    tracing::warn!(key = %entry.key, error = %e, "skipping malformed entry");
                    None
                }
            })
            .collect()
    }
}

struct Feed {
    tx: watch::Sender<Arc<Snapshot>>,
    /// Serializes reload-and-send so a stale snapshot never lands last
    publish: Mutex<()>,
}

/// Storage decorator that adds push ids and per-collection change feeds.
pub struct LiveStore {
    inner: Arc<dyn Storage>,
    feeds: DashMap<String, Arc<Feed>>,
    ids: PushIdGenerator,
}

impl LiveStore {
    pub fn new(inner: Arc<dyn Storage>) -> Self {
        Self {
            inner,
            feeds: DashMap::new(),
            ids: PushIdGenerator::new(),
        }
    }

    /// Store `value` under a freshly generated key and return that key.
    pub async fn push(&self, collection: &str, value: Value) -> StorageResult<String> {
        let key = self.ids.next_id();
        self.set(collection, &key, value).await?;
        Ok(key)
    }

    /// Open a change feed on `collection`. The current contents are delivered
    /// first, then one snapshot per change until the subscription is dropped.
    pub async fn subscribe(&self, collection: &str) -> StorageResult<Subscription> {
        if let Some(feed) = self.feeds.get(collection) {
            return Ok(Subscription::new(collection, feed.tx.subscribe()));
        }

        let initial = Arc::new(Snapshot {
            entries: self.inner.children(collection).await?,
        });

        let mut created = false;
        // Subscribe under the entry lock so the feed cannot be pruned in between
        let rx = {
            let feed = self
                .feeds
                .entry(collection.to_string())
                .or_insert_with(|| {
                    created = true;
                    let (tx, _) = watch::channel(initial);
                    Arc::new(Feed {
                        tx,
                        publish: Mutex::new(()),
                    })
                });
            feed.tx.subscribe()
        };

        let subscription = Subscription::new(collection, rx);

        // A write may have landed between the initial read and feed creation
        if created {
            tracing::debug!(collection, "opened change feed");
            self.publish(collection).await;
        }

        Ok(subscription)
    }

    /// Number of collections that currently have an open feed.
    pub fn open_feeds(&self) -> usize {
        self.feeds.len()
    }

    async fn publish(&self, collection: &str) {
        let Some(feed) = self.feeds.get(collection).map(|f| Arc::clone(f.value())) else {
            return;
        };

        if feed.tx.receiver_count() == 0
            && self
                .feeds
                .remove_if(collection, |_, f| f.tx.receiver_count() == 0)
                .is_some()
        {
            tracing::debug!(collection, "pruned idle change feed");
            return;
        }

        let _guard = feed.publish.lock().await;
        match self.inner.children(collection).await {
            Ok(entries) => {
                feed.tx.send_replace(Arc::new(Snapshot { entries }));
            }
            Err(e) => {
                tracing::warn!(collection, error = %e, "failed to refresh change feed");
            }
        }
    }
}

#[async_trait]
impl Storage for LiveStore {
    async fn init(&self) -> Result<()> {
        self.inner.init().await
    }

    async fn get(&self, collection: &str, key: &str) -> StorageResult<Option<Value>> {
        validate_key(key)?;
        self.inner.get(collection, key).await
    }

    async fn set(&self, collection: &str, key: &str, value: Value) -> StorageResult<()> {
        validate_key(key)?;
        self.inner.set(collection, key, value).await?;
        self.publish(collection).await;
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        key: &str,
        fields: Map<String, Value>,
    ) -> StorageResult<bool> {
        validate_key(key)?;
        let updated = self.inner.update(collection, key, fields).await?;
        if updated {
            self.publish(collection).await;
        }
        Ok(updated)
    }

    async fn remove(&self, collection: &str, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        let removed = self.inner.remove(collection, key).await?;
        if removed {
            self.publish(collection).await;
        }
        Ok(removed)
    }

    async fn children(&self, collection: &str) -> StorageResult<Vec<Entry>> {
        self.inner.children(collection).await
    }

    async fn increment(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        seed: Map<String, Value>,
    ) -> StorageResult<i64> {
        validate_key(key)?;
        let count = self.inner.increment(collection, key, field, seed).await?;
        self.publish(collection).await;
        Ok(count)
    }
}

/// Handle on a collection's change feed. Dropping it unsubscribes.
pub struct Subscription {
    collection: String,
    rx: watch::Receiver<Arc<Snapshot>>,
}

impl Subscription {
    fn new(collection: &str, mut rx: watch::Receiver<Arc<Snapshot>>) -> Self {
        // Deliver the current contents on the first `next()`
        rx.mark_changed();
        Self {
            collection: collection.to_string(),
            rx,
        }
    }

    /// Latest snapshot without waiting.
    pub fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.rx.borrow())
    }

    /// Wait for the next snapshot. `None` once the store is gone.
    pub async fn next(&mut self) -> Option<Arc<Snapshot>> {
        self.rx.changed().await.ok()?;
        Some(Arc::clone(&self.rx.borrow_and_update()))
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        tracing::debug!(collection = %self.collection, "change feed subscription closed");
    }
}

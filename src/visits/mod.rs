//! Visit counter
//!
//! One record per visitor at `User/<storage key>`, incremented once per page
//! load. The global tally is the sum over all records and is pushed to
//! subscribers whenever any record changes.

use serde_json::{Map, Value};
use std::sync::Arc;

use crate::identity::IdentityKey;
use crate::models::visitor::{VISITORS, VISIT_COUNT_FIELD};
use crate::storage::{LiveStore, Snapshot, Storage, StorageResult, Subscription};

#[derive(Clone)]
pub struct VisitCounter {
    store: Arc<LiveStore>,
}

impl VisitCounter {
    pub fn new(store: Arc<LiveStore>) -> Self {
        Self { store }
    }

    /// Create the visitor's record with count 1, or add 1 to it.
    /// The store performs this as one atomic step.
    pub async fn record_visit(&self, key: &IdentityKey) -> StorageResult<i64> {
        let storage_key = key.storage_key();
        let mut seed = Map::new();
        seed.insert("ip".to_string(), Value::from(storage_key.clone()));

        let count = self
            .store
            .increment(VISITORS, &storage_key, VISIT_COUNT_FIELD, seed)
            .await?;
        tracing::info!(visitor = %storage_key, count, "recorded visit");
        Ok(count)
    }

    /// Current tally, read once.
    pub async fn total(&self) -> StorageResult<i64> {
        let entries = self.store.children(VISITORS).await?;
        Ok(sum_visits(&Snapshot { entries }))
    }

    /// Live tally, recomputed on every change to the visitor records.
    pub async fn total_visits(&self) -> StorageResult<TotalVisits> {
        Ok(TotalVisits {
            subscription: self.store.subscribe(VISITORS).await?,
        })
    }
}

/// Sum of every record's count; missing or non-numeric counts add nothing.
pub fn sum_visits(snapshot: &Snapshot) -> i64 {
    snapshot
        .entries
        .iter()
        .map(|entry| {
            entry
                .value
                .get(VISIT_COUNT_FIELD)
                .and_then(Value::as_i64)
                .unwrap_or(0)
        })
        .sum()
}

/// Stream of visit totals backed by a change feed on the visitor records.
pub struct TotalVisits {
    subscription: Subscription,
}

impl TotalVisits {
    pub fn current(&self) -> i64 {
        sum_visits(&self.subscription.current())
    }

    pub async fn next(&mut self) -> Option<i64> {
        let snapshot = self.subscription.next().await?;
        Some(sum_visits(&snapshot))
    }

    pub fn unsubscribe(self) {
        self.subscription.unsubscribe();
    }
}

/// Visit state of a single page load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum VisitState {
    #[default]
    Unresolved,
    Resolved(IdentityKey),
    /// Terminal for the page load
    Recorded { key: IdentityKey, count: i64 },
}

/// Guarantees at most one recorded visit per page load.
pub struct VisitTracker {
    counter: VisitCounter,
    state: VisitState,
}

impl VisitTracker {
    pub fn new(counter: VisitCounter) -> Self {
        Self {
            counter,
            state: VisitState::Unresolved,
        }
    }

    pub fn state(&self) -> &VisitState {
        &self.state
    }

    /// Attach the resolved identity. Ignored once an identity is attached.
    pub fn resolve(&mut self, key: IdentityKey) {
        if matches!(self.state, VisitState::Unresolved) {
            self.state = VisitState::Resolved(key);
        }
    }

    /// Record the visit if an identity is attached and nothing was recorded
    /// yet. Returns the visitor's new count when a visit was written.
    pub async fn record(&mut self) -> StorageResult<Option<i64>> {
        let VisitState::Resolved(key) = &self.state else {
            return Ok(None);
        };

        let key = key.clone();
        let count = self.counter.record_visit(&key).await?;
        self.state = VisitState::Recorded { key, count };
        Ok(Some(count))
    }
}

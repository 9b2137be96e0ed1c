use std::{future::Future, ops::Deref};

use anyhow::Result;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

/// Raw key-value content of a store.
pub type StoreEntries = Map<String, Value>;

/// A single key that changed its value after a write.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreChange {
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

/// Capacity of change notification channels. Slow listeners lose old notifications.
pub(crate) const CHANGE_CHANNEL_CAPACITY: usize = 32;

/// Interface for abstracting durable storage shared by the tracker and the cli. Writes are last
/// write wins, the store doesn't coordinate writers from different processes.
pub trait PersistentStore {
    /// Returns entries for the keys that are present.
    fn get(&self, keys: &[&str]) -> impl Future<Output = Result<StoreEntries>>;

    /// Merges `entries` into the store.
    fn set(&self, entries: StoreEntries) -> impl Future<Output = Result<()>>;

    /// Notifies about every batch of changed keys.
    fn subscribe(&self) -> broadcast::Receiver<Vec<StoreChange>>;
}

impl<T: Deref> PersistentStore for T
where
    T::Target: PersistentStore,
{
    fn get(&self, keys: &[&str]) -> impl Future<Output = Result<StoreEntries>> {
        self.deref().get(keys)
    }

    fn set(&self, entries: StoreEntries) -> impl Future<Output = Result<()>> {
        self.deref().set(entries)
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<StoreChange>> {
        self.deref().subscribe()
    }
}

/// Copies requested keys out of `entries`.
pub(crate) fn select_entries(entries: &StoreEntries, keys: &[&str]) -> StoreEntries {
    keys.iter()
        .filter_map(|key| entries.get(*key).map(|v| (key.to_string(), v.clone())))
        .collect()
}

/// Merges `update` into `current`, returning keys whose value actually changed.
pub(crate) fn merge_entries(current: &mut StoreEntries, update: StoreEntries) -> Vec<StoreChange> {
    let mut changes = vec![];
    for (key, new_value) in update {
        let old_value = current.insert(key.clone(), new_value.clone());
        if old_value.as_ref() != Some(&new_value) {
            changes.push(StoreChange {
                key,
                old_value,
                new_value: Some(new_value),
            });
        }
    }
    changes
}

/// Computes changes between two full copies of a store.
pub(crate) fn diff_entries(previous: &StoreEntries, next: &StoreEntries) -> Vec<StoreChange> {
    let mut changes = vec![];
    for (key, new_value) in next {
        let old_value = previous.get(key);
        if old_value != Some(new_value) {
            changes.push(StoreChange {
                key: key.clone(),
                old_value: old_value.cloned(),
                new_value: Some(new_value.clone()),
            });
        }
    }
    for (key, old_value) in previous {
        if !next.contains_key(key) {
            changes.push(StoreChange {
                key: key.clone(),
                old_value: Some(old_value.clone()),
                new_value: None,
            });
        }
    }
    changes
}

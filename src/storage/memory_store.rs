use std::sync::{Mutex, PoisonError};

use anyhow::Result;
use tokio::sync::broadcast;

use super::store::{
    merge_entries, select_entries, PersistentStore, StoreChange, StoreEntries,
    CHANGE_CHANNEL_CAPACITY,
};

/// Store that lives only as long as the process. Used when nothing has to survive a restart and
/// in tests.
pub struct MemoryStore {
    entries: Mutex<StoreEntries>,
    changes: broadcast::Sender<Vec<StoreChange>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_entries(StoreEntries::new())
    }

    pub fn with_entries(entries: StoreEntries) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            entries: Mutex::new(entries),
            changes,
        }
    }

    pub fn entries(&self) -> StoreEntries {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistentStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<StoreEntries> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(select_entries(&entries, keys))
    }

    async fn set(&self, update: StoreEntries) -> Result<()> {
        let changes = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            merge_entries(&mut entries, update)
        };
        if !changes.is_empty() {
            // Nobody listening is fine.
            let _ = self.changes.send(changes);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<StoreChange>> {
        self.changes.subscribe()
    }
}

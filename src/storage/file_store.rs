use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
    time::Duration,
};

use anyhow::Result;
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
    sync::broadcast,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::utils::clock::Clock;

use super::store::{
    diff_entries, merge_entries, select_entries, PersistentStore, StoreChange, StoreEntries,
    CHANGE_CHANNEL_CAPACITY,
};

pub const STORE_FILE_NAME: &str = "store.json";

/// How often [FileStore::watch_external_changes] looks for writes made by other processes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Store that keeps every entry in one json object on disk. The file is locked for each read
/// and write, but a get followed by a set is not atomic across processes.
pub struct FileStore {
    path: PathBuf,
    /// Last content seen by this process. Used to compute change notifications.
    known: Mutex<StoreEntries>,
    changes: broadcast::Sender<Vec<StoreChange>>,
}

impl FileStore {
    pub fn new(dir: &Path) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(dir)?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        let store = Self {
            path: dir.join(STORE_FILE_NAME),
            known: Mutex::new(StoreEntries::new()),
            changes,
        };
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<StoreEntries> {
        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StoreEntries::new()),
            Err(e) => Err(e)?,
        };
        file.lock_shared()?;
        let mut content = Vec::new();
        let result = file.read_to_end(&mut content).await;
        file.unlock_async().await?;
        result?;
        Ok(parse_content(&self.path, &content))
    }

    fn remember(&self, entries: StoreEntries) -> Vec<StoreChange> {
        let mut known = self.known.lock().unwrap_or_else(PoisonError::into_inner);
        let changes = diff_entries(&known, &entries);
        *known = entries;
        changes
    }

    fn notify(&self, changes: Vec<StoreChange>) {
        if !changes.is_empty() {
            debug!("Store changed {:?}", changes.iter().map(|v| &v.key).collect::<Vec<_>>());
            let _ = self.changes.send(changes);
        }
    }

    /// Reads the file and notifies subscribers about anything written by another process since
    /// the last read or write.
    pub async fn refresh(&self) -> Result<usize> {
        let entries = self.read_all().await?;
        let changes = self.remember(entries);
        let count = changes.len();
        self.notify(changes);
        Ok(count)
    }

    /// Polls the file until `shutdown` is cancelled.
    pub async fn watch_external_changes(
        &self,
        clock: &dyn Clock,
        interval: Duration,
        shutdown: CancellationToken,
    ) {
        // The first read only establishes the baseline.
        match self.read_all().await {
            Ok(entries) => {
                self.remember(entries);
            }
            Err(e) => warn!("Couldn't read store baseline {e:?}"),
        }
        info!("Watching {:?} for external changes", self.path);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = clock.sleep(interval) => (),
            }
            if let Err(e) = self.refresh().await {
                warn!("Failed to refresh store {e:?}");
            }
        }
    }
}

fn parse_content(path: &Path, content: &[u8]) -> StoreEntries {
    if content.iter().all(u8::is_ascii_whitespace) {
        return StoreEntries::new();
    }
    match serde_json::from_slice::<StoreEntries>(content) {
        Ok(v) => v,
        Err(e) => {
            // Might happen if a write was cut off. Starting over is the only option.
            warn!("Store file {path:?} is corrupted, treating it as empty: {e}");
            StoreEntries::new()
        }
    }
}

impl PersistentStore for FileStore {
    async fn get(&self, keys: &[&str]) -> Result<StoreEntries> {
        let entries = self.read_all().await?;
        Ok(select_entries(&entries, keys))
    }

    async fn set(&self, update: StoreEntries) -> Result<()> {
        let mut file = File::options()
            .write(true)
            .create(true)
            .read(true)
            .truncate(false)
            .open(&self.path)
            .await?;

        // Semi-safe acquire-release for a file
        file.lock_exclusive()?;
        let result = write_merged(&self.path, &mut file, update).await;
        file.unlock_async().await?;

        let changes = self.remember(result?);
        self.notify(changes);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<StoreChange>> {
        self.changes.subscribe()
    }
}

async fn write_merged(path: &Path, file: &mut File, update: StoreEntries) -> Result<StoreEntries> {
    let mut content = Vec::new();
    file.read_to_end(&mut content).await?;
    let mut entries = parse_content(path, &content);
    merge_entries(&mut entries, update);

    let buffer = serde_json::to_vec(&entries)?;
    file.rewind().await?;
    file.set_len(0).await?;
    file.write_all(&buffer).await?;
    file.flush().await?;
    Ok(entries)
}

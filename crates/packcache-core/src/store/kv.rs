//! Persistent key-value store shared by every client context of one origin.
//!
//! A `StorageArea` is the durable map itself. Each client context (a tab, a
//! window, a CLI session) works through its own `LocalStorage` handle. Writes
//! are visible to every handle immediately, and each handle can listen for
//! changes made by *other* handles, the way a browser delivers `storage`
//! events to every document except the writer.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::atomic::write_atomic;
use super::error::StoreResult;

/// Buffer size for the storage change broadcast.
/// Receivers that fall further behind get a keyless event instead.
const EVENT_BUFFER_SIZE: usize = 64;

/// A change made through some other context's handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// Changed key, or `None` when the receiver missed events and should
    /// re-read everything.
    pub key: Option<String>,
}

#[derive(Debug, Clone)]
struct RawEvent {
    key: String,
    source: u64,
}

pub struct StorageArea {
    path: Option<PathBuf>,
    items: Mutex<BTreeMap<String, String>>,
    events: broadcast::Sender<RawEvent>,
    next_context: AtomicU64,
}

impl StorageArea {
    /// Open (or create) a file-backed area.
    pub fn open(path: impl Into<PathBuf>) -> Arc<Self> {
        let path = path.into();
        let items = Self::load_items(&path);
        Arc::new(Self::with_items(Some(path), items))
    }

    /// An area that lives only as long as the process.
    pub fn in_memory() -> Arc<Self> {
        Arc::new(Self::with_items(None, BTreeMap::new()))
    }

    fn with_items(path: Option<PathBuf>, items: BTreeMap<String, String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self {
            path,
            items: Mutex::new(items),
            events,
            next_context: AtomicU64::new(1),
        }
    }

    fn load_items(path: &Path) -> BTreeMap<String, String> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read storage file, starting empty");
                return BTreeMap::new();
            }
        };

        match serde_json::from_str(&contents) {
            Ok(items) => items,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring malformed storage file");
                BTreeMap::new()
            }
        }
    }

    /// Create a handle for a new client context.
    pub fn context(self: &Arc<Self>) -> LocalStorage {
        LocalStorage {
            area: Arc::clone(self),
            id: self.next_context.fetch_add(1, Ordering::Relaxed),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        // A panicked writer leaves a complete map behind; keep serving it.
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, items: &BTreeMap<String, String>) -> StoreResult<()> {
        if let Some(ref path) = self.path {
            let contents = serde_json::to_vec_pretty(items)?;
            write_atomic(path, &contents)?;
        }
        Ok(())
    }

    fn write(&self, source: u64, key: &str, value: Option<&str>) -> StoreResult<()> {
        {
            let mut items = self.lock();
            // Pick up keys another process wrote since we last looked, so
            // persisting our map does not drop them. Nothing locks the file
            // across processes; two writes landing together still race.
            if let Some(ref path) = self.path {
                *items = Self::load_items(path);
            }
            let changed = match value {
                Some(v) => items.get(key).map(String::as_str) != Some(v),
                None => items.contains_key(key),
            };
            if !changed {
                return Ok(());
            }

            let previous = match value {
                Some(v) => items.insert(key.to_string(), v.to_string()),
                None => items.remove(key),
            };
            if let Err(e) = self.persist(&items) {
                // Keep memory and disk in agreement.
                match previous {
                    Some(old) => items.insert(key.to_string(), old),
                    None => items.remove(key),
                };
                return Err(e);
            }
        }

        debug!(key = key, context = source, "Storage key changed");
        // No receivers is fine.
        let _ = self.events.send(RawEvent {
            key: key.to_string(),
            source,
        });
        Ok(())
    }
}

/// One client context's view of a `StorageArea`.
#[derive(Clone)]
pub struct LocalStorage {
    area: Arc<StorageArea>,
    id: u64,
}

impl LocalStorage {
    pub fn get_item(&self, key: &str) -> Option<String> {
        self.area.lock().get(key).cloned()
    }

    pub fn set_item(&self, key: &str, value: &str) -> StoreResult<()> {
        self.area.write(self.id, key, Some(value))
    }

    pub fn remove_item(&self, key: &str) -> StoreResult<()> {
        self.area.write(self.id, key, None)
    }

    /// Changes made by other contexts sharing this area.
    pub fn changes(&self) -> StorageChanges {
        StorageChanges {
            rx: self.area.events.subscribe(),
            own_id: self.id,
        }
    }
}

pub struct StorageChanges {
    rx: broadcast::Receiver<RawEvent>,
    own_id: u64,
}

impl StorageChanges {
    /// Wait for the next foreign change. Returns `None` once the area is gone.
    pub async fn recv(&mut self) -> Option<StorageEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.source == self.own_id => continue,
                Ok(event) => return Some(StorageEvent { key: Some(event.key) }),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    debug!(missed = missed, "Storage change receiver lagged");
                    return Some(StorageEvent { key: None });
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_set_get_remove() {
        let area = StorageArea::in_memory();
        let storage = area.context();
        assert_eq!(storage.get_item("k"), None);
        storage.set_item("k", "v").unwrap();
        assert_eq!(storage.get_item("k").as_deref(), Some("v"));
        storage.remove_item("k").unwrap();
        assert_eq!(storage.get_item("k"), None);
    }

    #[test]
    fn test_file_area_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local_storage.json");
        StorageArea::open(&path).context().set_item("k", "v").unwrap();

        let reopened = StorageArea::open(&path);
        assert_eq!(reopened.context().get_item("k").as_deref(), Some("v"));
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local_storage.json");
        std::fs::write(&path, "{{{").unwrap();

        let storage = StorageArea::open(&path).context();
        assert_eq!(storage.get_item("k"), None);
        storage.set_item("k", "v").unwrap();
        assert_eq!(StorageArea::open(&path).context().get_item("k").as_deref(), Some("v"));
    }

    #[test]
    fn test_two_areas_on_one_file_keep_each_others_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local_storage.json");
        let first = StorageArea::open(&path).context();
        let second = StorageArea::open(&path).context();

        first.set_item("a", "1").unwrap();
        second.set_item("b", "2").unwrap();
        first.set_item("c", "3").unwrap();

        let reopened = StorageArea::open(&path).context();
        assert_eq!(reopened.get_item("a").as_deref(), Some("1"));
        assert_eq!(reopened.get_item("b").as_deref(), Some("2"));
        assert_eq!(reopened.get_item("c").as_deref(), Some("3"));
        assert_eq!(first.get_item("b").as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_changes_skip_own_writes() {
        let area = StorageArea::in_memory();
        let tab_a = area.context();
        let tab_b = area.context();
        let mut a_changes = tab_a.changes();
        let mut b_changes = tab_b.changes();

        tab_a.set_item("k", "v").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), b_changes.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.key.as_deref(), Some("k"));

        let own = tokio::time::timeout(Duration::from_millis(50), a_changes.recv()).await;
        assert!(own.is_err(), "writer must not see its own change");
    }

    #[tokio::test]
    async fn test_unchanged_write_raises_no_event() {
        let area = StorageArea::in_memory();
        let tab_a = area.context();
        let tab_b = area.context();
        tab_a.set_item("k", "v").unwrap();

        let mut b_changes = tab_b.changes();
        tab_a.set_item("k", "v").unwrap();
        let event = tokio::time::timeout(Duration::from_millis(50), b_changes.recv()).await;
        assert!(event.is_err());
    }
}

//! Resource cache store: isolated, named partitions of URL → response
//! snapshots.
//!
//! Each partition is persisted as one JSON file under the store root, named
//! by the hex-encoded partition name. Every mutation rewrites that file
//! atomically, so a crash leaves either the old or the new partition.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::atomic::write_atomic;
use super::error::{StoreError, StoreResult};

/// A captured response body with the metadata needed to serve it again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl CachedResponse {
    pub fn json(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            content_type: Some("application/json".to_string()),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Partition {
    name: String,
    /// Insertion ordered, one entry per URL
    entries: Vec<(String, CachedResponse)>,
}

impl Partition {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: Vec::new(),
        }
    }

    fn put(&mut self, url: &str, response: CachedResponse) {
        match self.entries.iter_mut().find(|(u, _)| u == url) {
            Some(entry) => entry.1 = response,
            None => self.entries.push((url.to_string(), response)),
        }
    }

    fn get(&self, url: &str) -> Option<&CachedResponse> {
        self.entries.iter().find(|(u, _)| u == url).map(|(_, r)| r)
    }
}

pub struct CacheStorage {
    root: Option<PathBuf>,
    partitions: RwLock<BTreeMap<String, Partition>>,
}

impl CacheStorage {
    /// Open a file-backed store rooted at `root`, loading every readable
    /// partition file found there.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;

        let mut partitions = BTreeMap::new();
        for entry in std::fs::read_dir(&root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::load_partition(&path) {
                Ok(partition) => {
                    partitions.insert(partition.name.clone(), partition);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable cache partition");
                }
            }
        }
        debug!(root = %root.display(), partitions = partitions.len(), "Opened cache storage");

        Ok(Self {
            root: Some(root),
            partitions: RwLock::new(partitions),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            root: None,
            partitions: RwLock::new(BTreeMap::new()),
        }
    }

    fn load_partition(path: &Path) -> StoreResult<Partition> {
        let contents = std::fs::read(path)?;
        Ok(serde_json::from_slice(&contents)?)
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Partition>> {
        self.partitions.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Partition>> {
        self.partitions.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn partition_path(&self, name: &str) -> Option<PathBuf> {
        let encoded: String = name.bytes().map(|b| format!("{:02x}", b)).collect();
        self.root
            .as_ref()
            .map(|root| root.join(format!("{}.json", encoded)))
    }

    fn persist(&self, partition: &Partition) -> StoreResult<()> {
        if let Some(path) = self.partition_path(&partition.name) {
            write_atomic(&path, &serde_json::to_vec(partition)?)?;
        }
        Ok(())
    }

    fn unpersist(&self, name: &str) -> StoreResult<()> {
        if let Some(path) = self.partition_path(name) {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Create the partition if it does not exist yet.
    pub fn open_partition(&self, name: &str) -> StoreResult<()> {
        let mut partitions = self.write();
        if partitions.contains_key(name) {
            return Ok(());
        }
        let partition = Partition::new(name);
        self.persist(&partition)?;
        partitions.insert(name.to_string(), partition);
        Ok(())
    }

    pub fn has(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Names of every partition, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Delete a partition. Returns whether it existed.
    pub fn delete(&self, name: &str) -> StoreResult<bool> {
        let mut partitions = self.write();
        if partitions.remove(name).is_none() {
            return Ok(false);
        }
        self.unpersist(name)?;
        Ok(true)
    }

    /// Store one response in an existing partition.
    pub fn put(&self, name: &str, url: &str, response: CachedResponse) -> StoreResult<()> {
        let mut partitions = self.write();
        let partition = partitions
            .get_mut(name)
            .ok_or_else(|| StoreError::MissingPartition(name.to_string()))?;
        partition.put(url, response);
        self.persist(partition)
    }

    pub fn match_in(&self, name: &str, url: &str) -> Option<CachedResponse> {
        self.read().get(name).and_then(|p| p.get(url)).cloned()
    }

    /// First match for `url` across the partitions accepted by `filter`.
    pub fn match_any(&self, url: &str, filter: impl Fn(&str) -> bool) -> Option<CachedResponse> {
        self.read()
            .values()
            .filter(|p| filter(&p.name))
            .find_map(|p| p.get(url))
            .cloned()
    }

    /// URLs stored in a partition, in insertion order.
    pub fn urls(&self, name: &str) -> StoreResult<Vec<String>> {
        self.read()
            .get(name)
            .map(|p| p.entries.iter().map(|(u, _)| u.clone()).collect())
            .ok_or_else(|| StoreError::MissingPartition(name.to_string()))
    }

    pub fn entries(&self, name: &str) -> StoreResult<Vec<(String, CachedResponse)>> {
        self.read()
            .get(name)
            .map(|p| p.entries.clone())
            .ok_or_else(|| StoreError::MissingPartition(name.to_string()))
    }

    /// Create or replace a partition with exactly `entries`.
    ///
    /// The partition becomes visible to readers only once fully populated.
    pub fn install_partition(
        &self,
        name: &str,
        entries: Vec<(String, CachedResponse)>,
    ) -> StoreResult<()> {
        let mut partition = Partition::new(name);
        for (url, response) in entries {
            partition.put(&url, response);
        }

        let mut partitions = self.write();
        self.persist(&partition)?;
        partitions.insert(name.to_string(), partition);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(text: &str) -> CachedResponse {
        CachedResponse::json(text.as_bytes().to_vec())
    }

    #[test]
    fn test_put_requires_open_partition() {
        let store = CacheStorage::in_memory();
        let err = store.put("missing", "https://x/a", body("a")).unwrap_err();
        assert!(matches!(err, StoreError::MissingPartition(_)));

        store.open_partition("p").unwrap();
        store.put("p", "https://x/a", body("a")).unwrap();
        store.put("p", "https://x/a", body("b")).unwrap();
        assert_eq!(store.match_in("p", "https://x/a"), Some(body("b")));
        assert_eq!(store.urls("p").unwrap().len(), 1);
    }

    #[test]
    fn test_install_partition_replaces_wholesale() {
        let store = CacheStorage::in_memory();
        store
            .install_partition("p", vec![("https://x/a".into(), body("a"))])
            .unwrap();
        store
            .install_partition("p", vec![("https://x/b".into(), body("b"))])
            .unwrap();
        assert_eq!(store.urls("p").unwrap(), vec!["https://x/b".to_string()]);
    }

    #[test]
    fn test_match_any_respects_filter() {
        let store = CacheStorage::in_memory();
        store
            .install_partition("keep", vec![("https://x/a".into(), body("keep"))])
            .unwrap();
        store
            .install_partition("hidden", vec![("https://x/b".into(), body("hidden"))])
            .unwrap();

        assert_eq!(store.match_any("https://x/a", |n| n == "keep"), Some(body("keep")));
        assert_eq!(store.match_any("https://x/b", |n| n == "keep"), None);
    }

    #[test]
    fn test_partitions_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = CacheStorage::open(dir.path()).unwrap();
            store
                .install_partition("travel-pack-cache:paris:v1", vec![("https://x/a".into(), body("a"))])
                .unwrap();
            store.open_partition("scratch").unwrap();
            assert!(store.delete("scratch").unwrap());
        }

        let store = CacheStorage::open(dir.path()).unwrap();
        assert_eq!(store.keys(), vec!["travel-pack-cache:paris:v1".to_string()]);
        assert_eq!(store.match_in("travel-pack-cache:paris:v1", "https://x/a"), Some(body("a")));
    }

    #[test]
    fn test_unreadable_partition_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "not json").unwrap();
        let store = CacheStorage::open(dir.path()).unwrap();
        assert!(store.keys().is_empty());
    }
}

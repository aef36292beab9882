//! JSON-file-backed store used by the CLI.
//!
//! The whole store is one JSON document rewritten atomically (tmp file +
//! rename) on every mutation. Fine for the few hundred keys a single site
//! produces; not meant for high write rates.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;

use super::KvStore;
use crate::{CardError, Result};

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileEntry {
    value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at_ms: Option<u64>,
}

impl FileEntry {
    fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at_ms.is_some_and(|at| at <= now_ms)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FileDocument {
    version: u32,
    entries: HashMap<String, FileEntry>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Default store path: `~/.cache/cardcrafter/store.json`.
pub fn default_store_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("cardcrafter")
        .join("store.json")
}

/// [`KvStore`] persisted as a single JSON file.
pub struct FileStore {
    path: PathBuf,
    // Serialises read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileStore {
    /// Open (lazily) a store at `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store at [`default_store_path()`].
    pub fn at_default_path() -> Self {
        Self::new(default_store_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file reads as empty; a corrupt file is logged and treated as empty.
    async fn load(&self) -> Result<FileDocument> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(FileDocument::default());
            }
            Err(e) => {
                return Err(CardError::Store(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };
        match serde_json::from_str::<FileDocument>(&content) {
            Ok(doc) if doc.version <= FORMAT_VERSION => Ok(doc),
            Ok(doc) => {
                warn!(path = %self.path.display(), version = doc.version, "unsupported store version, starting empty");
                Ok(FileDocument::default())
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "corrupt store file, starting empty");
                Ok(FileDocument::default())
            }
        }
    }

    async fn save(&self, mut doc: FileDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                CardError::Store(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        doc.version = FORMAT_VERSION;
        let json = serde_json::to_vec(&doc)
            .map_err(|e| CardError::Store(format!("failed to serialize store: {e}")))?;

        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json).await.map_err(|e| {
            CardError::Store(format!("failed to write {}: {e}", tmp_path.display()))
        })?;
        tokio::fs::rename(&tmp_path, &self.path).await.map_err(|e| {
            CardError::Store(format!(
                "failed to rename {} → {}: {e}",
                tmp_path.display(),
                self.path.display()
            ))
        })
    }
}

#[async_trait]
impl KvStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let _guard = self.lock.lock().await;
        let doc = self.load().await?;
        let now = now_ms();
        Ok(doc
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await?;
        let expires_at_ms = ttl.map(|ttl| now_ms().saturating_add(ttl.as_millis() as u64));
        doc.entries.insert(
            key.to_string(),
            FileEntry {
                value,
                expires_at_ms,
            },
        );
        self.save(doc).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await?;
        let now = now_ms();
        match doc.entries.remove(key) {
            Some(entry) => {
                self.save(doc).await?;
                Ok(!entry.is_expired(now))
            }
            None => Ok(false),
        }
    }

    async fn purge_expired(&self) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await?;
        let now = now_ms();
        let before = doc.entries.len();
        doc.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - doc.entries.len();
        if removed > 0 {
            self.save(doc).await?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("store.json"));
        assert!(store.get("anything").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        FileStore::new(&path)
            .set("k", json!(["a", "b"]), None)
            .await
            .unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get("k").await.unwrap(), Some(json!(["a", "b"])));
    }

    #[tokio::test]
    async fn corrupt_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "not json {{{").unwrap();

        let store = FileStore::new(&path);
        assert!(store.get("k").await.unwrap().is_none());
        store.set("k", json!(1), None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn purge_removes_only_expired_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = FileStore::new(&path);

        store
            .set("old", json!(1), Some(Duration::from_millis(10)))
            .await
            .unwrap();
        store.set("keep", json!(2), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.purge_expired().await.unwrap(), 0);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw["entries"].get("old").is_none());
        assert_eq!(raw["entries"]["keep"]["value"], 2);
    }
}

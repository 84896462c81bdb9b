use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

use anyhow::Context;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;

/// A named-slot key-value store. Each key holds one opaque string value.
#[async_trait]
pub trait SlotStorage: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
}

pub(crate) fn is_valid_key(key: &str) -> bool {
    lazy_static! {
        static ref KEY_RE: Regex = Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap();
    }
    KEY_RE.is_match(key)
}

/// One JSON file per slot under a data directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub async fn new(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("create data dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn slot_path(&self, key: &str) -> anyhow::Result<PathBuf> {
        anyhow::ensure!(is_valid_key(key), "invalid storage key {key:?}");
        Ok(self.dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl SlotStorage for FileStorage {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.slot_path(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read slot {}", path.display())),
        }
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.slot_path(key)?;
        // write-then-rename so a crash never leaves a half-written slot
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value)
            .await
            .with_context(|| format!("write slot {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("rename slot into {}", path.display()))?;
        Ok(())
    }
}

/// In-process slot storage. Writes can be made to fail to simulate a full disk.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slots: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slot(key: &str, value: &str) -> Self {
        let storage = Self::default();
        storage
            .slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        storage
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }
}

#[async_trait]
impl SlotStorage for MemoryStorage {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.raw(key))
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("storage quota exceeded");
        }
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod storage_tests {
    use super::*;

    #[test]
    fn test_is_valid_key() {
        assert!(is_valid_key("mealLogs"));
        assert!(is_valid_key("meal_logs-2"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("../etc/passwd"));
        assert!(!is_valid_key("a/b"));
    }

    #[tokio::test]
    async fn file_storage_absent_slot_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).await.unwrap();
        assert_eq!(storage.get("mealLogs").await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_storage_set_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("nested")).await.unwrap();
        storage.set("mealLogs", "[1]").await.unwrap();
        storage.set("mealLogs", "[2]").await.unwrap();
        assert_eq!(storage.get("mealLogs").await.unwrap().as_deref(), Some("[2]"));
        assert!(!dir.path().join("nested/mealLogs.json.tmp").exists());
    }

    #[tokio::test]
    async fn file_storage_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).await.unwrap();
        assert!(storage.set("../escape", "x").await.is_err());
        assert!(storage.get("../escape").await.is_err());
    }

    #[tokio::test]
    async fn memory_storage_can_fail_writes() {
        let storage = MemoryStorage::with_slot("k", "old");
        storage.set_fail_writes(true);
        let err = storage.set("k", "new").await.unwrap_err();
        assert!(err.to_string().contains("quota"));
        assert_eq!(storage.raw("k").as_deref(), Some("old"));
    }
}

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage quota exceeded")]
    QuotaExceeded,

    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Durable client-side key/value store backing the offline queue, the analog
/// of a browser's local storage.
///
/// Implementations are internally thread-safe, but the design assumes one
/// active writer per key at a time: concurrent instances sharing a key can
/// race on read-merge-write, and no cross-instance locking is attempted.
pub trait OfflineStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// May fail with [`StoreError::QuotaExceeded`], in which case the caller
    /// is expected to retry with a smaller value.
    fn write(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// In-memory store for tests and embedded use. An optional per-value byte
/// capacity simulates storage quota.
#[derive(Default)]
pub struct MemoryStore {
    map: Mutex<HashMap<String, String>>,
    capacity: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity_bytes: usize) -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
            capacity: Some(capacity_bytes),
        }
    }
}

impl OfflineStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.map.lock().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if let Some(capacity) = self.capacity
            && value.len() > capacity
        {
            return Err(StoreError::QuotaExceeded);
        }
        self.map.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.map.lock().remove(key);
        Ok(())
    }
}

/// File-backed store: one file per key inside a directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys become file names; anything outside a safe set is mapped away.
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(safe)
    }
}

impl OfflineStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        std::fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trips() {
        let store = MemoryStore::new();
        assert_eq!(store.read("k").unwrap(), None);
        store.write("k", "v").unwrap();
        assert_eq!(store.read("k").unwrap().as_deref(), Some("v"));
        store.remove("k").unwrap();
        assert_eq!(store.read("k").unwrap(), None);
    }

    #[test]
    fn memory_store_enforces_quota() {
        let store = MemoryStore::with_capacity(4);
        assert!(matches!(
            store.write("k", "too long"),
            Err(StoreError::QuotaExceeded)
        ));
        store.write("k", "ok").unwrap();
    }

    #[test]
    fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        assert_eq!(store.read("queue").unwrap(), None);
        store.write("queue", "[1,2]").unwrap();
        assert_eq!(store.read("queue").unwrap().as_deref(), Some("[1,2]"));
        store.remove("queue").unwrap();
        store.remove("queue").unwrap(); // idempotent
        assert_eq!(store.read("queue").unwrap(), None);
    }

    #[test]
    fn file_store_sanitizes_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        store.write("app/offline queue", "x").unwrap();
        assert_eq!(
            store.read("app/offline queue").unwrap().as_deref(),
            Some("x")
        );
    }
}

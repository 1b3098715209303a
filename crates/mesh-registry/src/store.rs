//! Durable storage for canonical service lists.
//!
//! The reconciler is the only writer; the sync driver reads. Values are
//! the serialized [`CanonicalList`] of one namespace, stored under
//! [`store_key`].

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use mesh_core::{CanonicalList, MeshError, Result};

/// Name of the stored object holding a namespace's service list.
pub const STORE_OBJECT_NAME: &str = "mesh-map";

/// Store key for a namespace's service list.
///
/// # Example
///
/// ```rust
/// assert_eq!(mesh_registry::store_key("default"), "default/mesh-map");
/// ```
pub fn store_key(namespace: &str) -> String {
    format!("{namespace}/{STORE_OBJECT_NAME}")
}

/// Key/value store for serialized service lists.
#[async_trait]
pub trait ServiceStore: Send + Sync {
    /// Read a value. `Ok(None)` means the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Create a value that does not exist yet.
    async fn create(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Replace an existing value.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::StoreNotFound`] when the key does not exist.
    async fn update(&self, key: &str, value: Vec<u8>) -> Result<()>;
}

/// Read and parse the persisted list of a namespace.
///
/// Returns `Ok(None)` when nothing has been persisted yet.
///
/// # Errors
///
/// Store failures are passed through; a malformed blob is
/// [`MeshError::Deserialization`].
pub async fn load_canonical_list(
    store: &dyn ServiceStore,
    namespace: &str,
) -> Result<Option<CanonicalList>> {
    let Some(bytes) = store.get(&store_key(namespace)).await? else {
        return Ok(None);
    };
    CanonicalList::from_bytes(&bytes)
        .map(Some)
        .map_err(|e| MeshError::Deserialization {
            namespace: namespace.to_string(),
            source: Box::new(e),
        })
}

/// In-memory store.
///
/// Counts successful writes, and can be switched into an unavailable
/// mode where every call fails.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: DashMap<String, Vec<u8>>,
    writes: AtomicU64,
    unavailable: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `create` and `update` calls.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Seed a value without counting a write.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.values.insert(key.into(), value.into());
    }

    /// Make every call fail with a store error until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self, key: &str) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(MeshError::Store {
                key: key.to_string(),
                message: "store unavailable".to_string(),
                source: None,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ServiceStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_available(key)?;
        Ok(self.values.get(key).map(|v| v.clone()))
    }

    async fn create(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.check_available(key)?;
        match self.values.entry(key.to_string()) {
            Entry::Occupied(_) => Err(MeshError::Store {
                key: key.to_string(),
                message: "already exists".to_string(),
                source: None,
            }),
            Entry::Vacant(slot) => {
                slot.insert(value);
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    async fn update(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.check_available(key)?;
        match self.values.get_mut(key) {
            Some(mut slot) => {
                *slot = value;
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(MeshError::StoreNotFound {
                key: key.to_string(),
            }),
        }
    }
}

/// Store keeping one file per key under a directory.
///
/// Key segments map to path segments, so `default/mesh-map` lives at
/// `<root>/default/mesh-map`. Writes go to a temporary sibling and are
/// renamed into place, so readers never see a partial value.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Store files under `root`, which is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(MeshError::Store {
                key: key.to_string(),
                message: "invalid store key".to_string(),
                source: None,
            });
        }
        Ok(self.root.join(relative))
    }

    async fn write_atomic(&self, key: &str, path: &Path, value: &[u8]) -> Result<()> {
        let write_err = |e: io::Error| MeshError::store(key, "write failed", e);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, value).await.map_err(write_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(write_err)
    }

    async fn exists(&self, key: &str, path: &Path) -> Result<bool> {
        tokio::fs::try_exists(path)
            .await
            .map_err(|e| MeshError::store(key, "stat failed", e))
    }
}

#[async_trait]
impl ServiceStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MeshError::store(key, "read failed", e)),
        }
    }

    async fn create(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let path = self.path_for(key)?;
        if self.exists(key, &path).await? {
            return Err(MeshError::Store {
                key: key.to_string(),
                message: "already exists".to_string(),
                source: None,
            });
        }
        self.write_atomic(key, &path, &value).await
    }

    async fn update(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let path = self.path_for(key)?;
        if !self.exists(key, &path).await? {
            return Err(MeshError::StoreNotFound {
                key: key.to_string(),
            });
        }
        self.write_atomic(key, &path, &value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_core::ServiceMeta;

    #[tokio::test]
    async fn memory_store_semantics() {
        let store = MemoryStore::new();

        assert!(store.get("ns/mesh-map").await.unwrap().is_none());
        assert!(store
            .update("ns/mesh-map", b"x".to_vec())
            .await
            .unwrap_err()
            .is_not_found());

        store.create("ns/mesh-map", b"x".to_vec()).await.unwrap();
        assert!(store.create("ns/mesh-map", b"y".to_vec()).await.is_err());
        store.update("ns/mesh-map", b"z".to_vec()).await.unwrap();

        assert_eq!(store.get("ns/mesh-map").await.unwrap().unwrap(), b"z");
        assert_eq!(store.writes(), 2);
    }

    #[tokio::test]
    async fn memory_store_unavailable() {
        let store = MemoryStore::new();
        store.set_unavailable(true);

        let err = store.get("ns/mesh-map").await.unwrap_err();
        assert!(matches!(err, MeshError::Store { .. }));
        assert!(!err.is_not_found());

        store.set_unavailable(false);
        assert!(store.get("ns/mesh-map").await.is_ok());
    }

    #[tokio::test]
    async fn file_store_semantics() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let key = store_key("default");

        assert!(store.get(&key).await.unwrap().is_none());
        assert!(store.update(&key, b"a".to_vec()).await.unwrap_err().is_not_found());

        store.create(&key, b"a".to_vec()).await.unwrap();
        assert!(dir.path().join("default").join("mesh-map").exists());
        assert!(store.create(&key, b"b".to_vec()).await.is_err());

        store.update(&key, b"b".to_vec()).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap().unwrap(), b"b");
        assert!(!dir.path().join("default").join("mesh-map.tmp").exists());
    }

    #[tokio::test]
    async fn file_store_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        for key in ["", "../etc/passwd", "/abs/key", "a/../../b"] {
            assert!(store.get(key).await.is_err(), "{key:?} should be rejected");
        }
    }

    #[tokio::test]
    async fn load_canonical_list_handles_missing_and_malformed() {
        let store = MemoryStore::new();
        assert!(load_canonical_list(&store, "default").await.unwrap().is_none());

        store.insert(store_key("default"), "not json");
        let err = load_canonical_list(&store, "default").await.unwrap_err();
        assert!(matches!(err, MeshError::Deserialization { .. }));

        let (list, _) = CanonicalList::from_records(vec![ServiceMeta::new("a", "10.0.0.1", 80)]);
        store.insert(store_key("default"), list.to_bytes().unwrap());
        assert_eq!(load_canonical_list(&store, "default").await.unwrap().unwrap(), list);
    }
}

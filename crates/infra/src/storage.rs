//! Blob stores behind GED documents.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::debug;

use atelier_ged::{DocumentStorage, StorageError, check_key};

/// Files under `<root>/<tenant_id>/<uuid>_<name>`.
#[derive(Debug, Clone)]
pub struct FsDocumentStorage {
    root: PathBuf,
}

impl FsDocumentStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        check_key(key)?;
        Ok(self.root.join(key))
    }
}

impl DocumentStorage for FsDocumentStorage {
    fn put(&self, key: &str, content: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, content)?;
        debug!(key, size = content.len(), "document blob stored");
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDocumentStorage {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryDocumentStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> StorageError {
        StorageError::Io(std::io::Error::other("lock poisoned"))
    }
}

impl DocumentStorage for InMemoryDocumentStorage {
    fn put(&self, key: &str, content: &[u8]) -> Result<(), StorageError> {
        check_key(key)?;
        self.blobs
            .write()
            .map_err(|_| Self::poisoned())?
            .insert(key.to_string(), content.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        check_key(key)?;
        self.blobs
            .read()
            .map_err(|_| Self::poisoned())?
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        check_key(key)?;
        self.blobs.write().map_err(|_| Self::poisoned())?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_root() -> PathBuf {
        std::env::temp_dir().join(format!("atelier-ged-{}", uuid::Uuid::now_v7()))
    }

    #[test]
    fn fs_storage_writes_under_the_tenant_directory() {
        let root = scratch_root();
        let storage = FsDocumentStorage::new(&root);

        storage.put("tenant-a/0001_offer.pdf", b"%PDF").unwrap();
        assert!(root.join("tenant-a").join("0001_offer.pdf").exists());
        assert_eq!(storage.get("tenant-a/0001_offer.pdf").unwrap(), b"%PDF");

        storage.delete("tenant-a/0001_offer.pdf").unwrap();
        assert!(matches!(
            storage.get("tenant-a/0001_offer.pdf"),
            Err(StorageError::NotFound(_))
        ));
        // deleting again is a no-op
        storage.delete("tenant-a/0001_offer.pdf").unwrap();

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn escaping_keys_never_touch_the_disk() {
        let storage = FsDocumentStorage::new(scratch_root());
        assert!(matches!(storage.put("../x", b"x"), Err(StorageError::InvalidKey(_))));
        assert!(matches!(storage.get("/etc/passwd"), Err(StorageError::InvalidKey(_))));
    }

    #[test]
    fn in_memory_storage_round_trips() {
        let storage = InMemoryDocumentStorage::new();
        storage.put("t/1_a.txt", b"hello").unwrap();
        assert_eq!(storage.get("t/1_a.txt").unwrap(), b"hello");
        storage.delete("t/1_a.txt").unwrap();
        storage.delete("t/1_a.txt").unwrap();
        assert!(storage.get("t/1_a.txt").is_err());
    }
}

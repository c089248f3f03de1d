//! Blob storage behind uploaded documents.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),
}

/// Content store addressed by the document's `storage_key`.
pub trait DocumentStorage: Send + Sync {
    fn put(&self, key: &str, content: &[u8]) -> Result<(), StorageError>;

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Removing a missing blob is not an error.
    fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Keys are `<tenant>/<uuid>_<name>`: reject anything that could escape the root.
pub fn check_key(key: &str) -> Result<(), StorageError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..");
    if bad {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_keys_are_rejected() {
        assert!(check_key("t/abc_file.pdf").is_ok());
        for key in ["", "/etc/passwd", "t/../x", "t//x", "t\\x"] {
            assert!(check_key(key).is_err(), "{key} should be rejected");
        }
    }
}

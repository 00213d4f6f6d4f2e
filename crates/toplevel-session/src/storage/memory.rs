//! In-memory key/value storage.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use toplevel_core::{ShellStorage, StorageError};

/// In-memory storage implementation.
///
/// Useful for tests and embedded sessions. Data is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Create an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    ///
    /// # Errors
    /// Returns error if the lock is poisoned.
    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self
            .values
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .len())
    }
}

#[async_trait]
impl ShellStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .values
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .get(key)
            .cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.values
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_remove() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get("history").await.unwrap(), None);

        storage.set("history", "[]").await.unwrap();
        assert_eq!(storage.get("history").await.unwrap().as_deref(), Some("[]"));

        storage.remove("history").await.unwrap();
        storage.remove("history").await.unwrap();
        assert_eq!(storage.len().unwrap(), 0);
    }
}

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::StoreError;
use crate::store::StateStore;

/// Process-local store. Used by tests and when no database path is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl StateStore for MemoryStore {
    async fn load_json(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn save_json(&self, key: &str, blob: &str) -> Result<(), StoreError> {
        self.entries.write().insert(key.to_string(), blob.to_string());
        Ok(())
    }

    async fn save_many(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        let mut guard = self.entries.write();
        for (key, blob) in entries {
            guard.insert((*key).to_string(), blob.clone());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().remove(key);
        Ok(())
    }
}

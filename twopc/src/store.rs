use std::collections::HashMap;

use labrpc::anyhow::Result;
use parking_lot::RwLock;

/// Durable key/value storage local to one replica.
pub trait LocalStore: Send + Sync + 'static {
    /// Value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>>;
    /// Store `value` under `key`, replacing a previous value.
    fn insert(&self, key: &str, value: &str) -> Result<()>;
    /// Remove `key`. Removing an absent key succeeds.
    fn delete(&self, key: &str) -> Result<()>;
}

/// [`LocalStore`] kept in memory.
#[derive(Debug, Default)]
pub struct MemStore {
    map: RwLock<HashMap<String, String>>,
}

impl MemStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

impl LocalStore for MemStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.read().get(key).cloned())
    }

    fn insert(&self, key: &str, value: &str) -> Result<()> {
        self.map.write().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.map.write().remove(key);
        Ok(())
    }
}

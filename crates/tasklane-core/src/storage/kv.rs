//! Key-value store contract and in-memory implementation

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Persistent string-keyed, string-valued storage on this device
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Prepare the store (create tables, run migrations). Safe to call twice.
    async fn initialize(&self) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;
}

/// Volatile key-value store, used for tests and anonymous demo sessions
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Storage("key-value store lock poisoned".to_string()))
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }
}

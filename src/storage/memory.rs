// src/storage/memory.rs

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{key_components, KeyValueStore};
use crate::ParseError;

/// Keeps everything in memory. Useful for tests and for clients that only
/// need the offline queue for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, ParseError> {
        key_components(key)?;
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &[u8]) -> Result<(), ParseError> {
        key_components(key)?;
        self.data.write().await.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), ParseError> {
        key_components(key)?;
        self.data.write().await.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, ParseError> {
        let dir = format!("{}/", prefix.trim_end_matches('/'));
        let data = self.data.read().await;
        Ok(data
            .keys()
            .filter(|k| k.starts_with(&dir) && !k[dir.len()..].contains('/'))
            .cloned()
            .collect())
    }
}

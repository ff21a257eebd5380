// src/storage/mod.rs

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::ParseError;

/// A flat, namespaced byte store used for the offline object cache and ledger.
///
/// Keys are `/`-separated paths such as `objects/GameScore/abc.json`.
/// Writes must replace a value atomically: a reader sees either the old or
/// the new bytes, never a partial write.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, ParseError>;

    async fn write(&self, key: &str, value: &[u8]) -> Result<(), ParseError>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), ParseError>;

    /// Keys stored directly under `prefix` (one level deep), sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, ParseError>;
}

/// Splits a key into path components, rejecting anything that could escape the store.
pub(crate) fn key_components(key: &str) -> Result<Vec<&str>, ParseError> {
    let parts: Vec<&str> = key.split('/').collect();
    let valid = !parts.is_empty()
        && parts
            .iter()
            .all(|p| !p.is_empty() && *p != "." && *p != ".." && !p.contains('\\'));
    if valid {
        Ok(parts)
    } else {
        Err(ParseError::InvalidInput(format!(
            "Invalid local storage key: '{}'",
            key
        )))
    }
}

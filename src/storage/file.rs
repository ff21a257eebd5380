// src/storage/file.rs

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

use super::{key_components, KeyValueStore};
use crate::ParseError;

const TEMP_SUFFIX: &str = ".tmp";

/// Stores each key as a file under a root directory.
///
/// Writes go to a temporary file in the destination directory which is then
/// renamed over the target, so a crash never leaves a half-written record.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, ParseError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        log::debug!("Opened local file store at {}", root.display());
        Ok(FileStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, ParseError> {
        let mut path = self.root.clone();
        for part in key_components(key)? {
            path.push(part);
        }
        Ok(path)
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, ParseError> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &str, value: &[u8]) -> Result<(), ParseError> {
        let path = self.path_for(key)?;
        let parent = path
            .parent()
            .ok_or_else(|| ParseError::InvalidInput(format!("Invalid local storage key: '{}'", key)))?;
        fs::create_dir_all(parent).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("record");
        let temp = parent.join(format!(".{}.{}{}", file_name, Uuid::new_v4().simple(), TEMP_SUFFIX));
        fs::write(&temp, value).await?;
        if let Err(e) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), ParseError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, ParseError> {
        let dir = self.path_for(prefix)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') && !name.ends_with(TEMP_SUFFIX) {
                    keys.push(format!("{}/{}", prefix.trim_end_matches('/'), name));
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

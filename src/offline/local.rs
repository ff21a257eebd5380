// src/offline/local.rs

use std::sync::Arc;
use tokio::sync::RwLock;

use super::ledger::{Ledger, PendingOperation};
use crate::coding::{EncodeMode, ParseEncoder, SavedIndex, SkipKeys};
use crate::object::{Identifiable, ParseObject};
use crate::storage::KeyValueStore;
use crate::transport::OperationKind;
use crate::ParseError;

pub(crate) const LEDGER_KEY: &str = "offline/pending_operations.json";
const OBJECTS_DIR: &str = "objects";

fn object_key(class_name: &str, object_id: &str) -> String {
    format!("{}/{}/{}.json", OBJECTS_DIR, class_name, object_id)
}

/// Cached object copies plus the pending-operation ledger, on top of a
/// [`KeyValueStore`].
///
/// Mutations hold the write side of an internal lock, so a reader never
/// observes a ledger that is half way through a read-modify-write.
pub struct LocalStore {
    store: Arc<dyn KeyValueStore>,
    encoder: ParseEncoder,
    barrier: RwLock<()>,
}

impl LocalStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        LocalStore {
            store,
            encoder: ParseEncoder::default(),
            barrier: RwLock::new(()),
        }
    }

    fn encode(&self, object: &ParseObject) -> Result<Vec<u8>, ParseError> {
        // Unsaved children cannot be referenced yet; they are left out of the cached copy.
        let encoded =
            self.encoder
                .encode_graph(object, &EncodeMode::collect(SkipKeys::None), &SavedIndex::new())?;
        if !encoded.pending_objects.is_empty() || !encoded.pending_files.is_empty() {
            log::debug!(
                "Cached copy of {} omits {} unsaved objects and {} unsaved files",
                object.class_name,
                encoded.pending_objects.len(),
                encoded.pending_files.len()
            );
        }
        Ok(encoded.bytes)
    }

    async fn write_object(&self, object: &ParseObject) -> Result<(), ParseError> {
        let object_id = object
            .stable_id()
            .ok_or_else(|| ParseError::MissingStableIdentifier(object.class_name.clone()))?;
        let bytes = self.encode(object)?;
        self.store
            .write(&object_key(&object.class_name, object_id), &bytes)
            .await
    }

    /// Writes the local copy of `object`, replacing any previous copy.
    pub async fn save_object(&self, object: &ParseObject) -> Result<(), ParseError> {
        let _guard = self.barrier.write().await;
        self.write_object(object).await
    }

    /// Saves each object independently; one failure does not stop the rest.
    pub async fn save_objects(&self, objects: &[ParseObject]) -> Vec<Result<(), ParseError>> {
        let _guard = self.barrier.write().await;
        let mut results = Vec::with_capacity(objects.len());
        for object in objects {
            results.push(self.write_object(object).await);
        }
        results
    }

    pub async fn fetch_object(
        &self,
        class_name: &str,
        object_id: &str,
    ) -> Result<Option<ParseObject>, ParseError> {
        let _guard = self.barrier.read().await;
        match self.store.read(&object_key(class_name, object_id)).await? {
            Some(bytes) => ParseObject::from_slice(class_name, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Every cached object of `class_name`. Unreadable records are skipped with a warning.
    pub async fn fetch_all(&self, class_name: &str) -> Result<Vec<ParseObject>, ParseError> {
        let _guard = self.barrier.read().await;
        let keys = self
            .store
            .list(&format!("{}/{}", OBJECTS_DIR, class_name))
            .await?;
        let mut objects = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(bytes) = self.store.read(&key).await? else {
                continue;
            };
            match ParseObject::from_slice(class_name, &bytes) {
                Ok(object) => objects.push(object),
                Err(e) => log::warn!("Skipping unreadable cached object {}: {}", key, e),
            }
        }
        Ok(objects)
    }

    pub async fn remove_object(&self, class_name: &str, object_id: &str) -> Result<(), ParseError> {
        let _guard = self.barrier.write().await;
        self.store.delete(&object_key(class_name, object_id)).await
    }

    async fn read_ledger(&self) -> Result<Ledger, ParseError> {
        match self.store.read(LEDGER_KEY).await? {
            Some(bytes) => Ledger::from_slice(&bytes),
            None => Ok(Ledger::new()),
        }
    }

    async fn write_ledger(&self, ledger: &Ledger) -> Result<(), ParseError> {
        self.store.write(LEDGER_KEY, &ledger.to_vec()?).await
    }

    pub async fn record_pending(&self, operation: PendingOperation) -> Result<(), ParseError> {
        let _guard = self.barrier.write().await;
        let mut ledger = self.read_ledger().await?;
        log::debug!(
            "Queueing offline {} for {} {}",
            operation.kind,
            operation.class_name,
            operation.object_id
        );
        ledger.upsert(operation);
        self.write_ledger(&ledger).await
    }

    /// All pending operations, in the order they were first recorded.
    pub async fn pending_operations(&self) -> Result<Vec<PendingOperation>, ParseError> {
        let _guard = self.barrier.read().await;
        Ok(self.read_ledger().await?.operations().to_vec())
    }

    pub async fn pending(&self, kind: OperationKind) -> Result<Vec<PendingOperation>, ParseError> {
        let _guard = self.barrier.read().await;
        Ok(self.read_ledger().await?.of_kind(kind))
    }

    pub async fn remove_pending(
        &self,
        kind: OperationKind,
        class_name: &str,
        object_ids: &[String],
    ) -> Result<(), ParseError> {
        let _guard = self.barrier.write().await;
        let mut ledger = self.read_ledger().await?;
        if ledger.remove(kind, class_name, object_ids) > 0 {
            self.write_ledger(&ledger).await?;
        }
        Ok(())
    }
}

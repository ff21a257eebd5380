// src/offline/mod.rs
//
// Offline write queue: writes that fail because the server is unreachable are
// cached locally and replayed later by `OfflineEngine::reconcile`.

pub mod ledger;
pub mod local;

pub use ledger::{Ledger, PendingOperation};
pub use local::LocalStore;

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::coding::{ParseEncoder, SavedIndex};
use crate::object::ParseObject;
use crate::query::ParseQuery;
use crate::save::{fetch_object, write_object};
use crate::storage::KeyValueStore;
use crate::transport::{OperationKind, Transport};
use crate::ParseError;

/// What happened to one pending operation during reconciliation.
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// The server copy was newer; it replaced the local copy.
    ServerWon(ParseObject),
    /// The local copy was sent to the server again.
    Replayed(ParseObject),
    /// The server is still unreachable; the operation stays queued.
    Deferred,
    /// There was no local copy left to replay.
    Dropped,
    /// The server rejected the replay. The operation stays queued with the
    /// local copy so a later pass can retry it.
    Failed(Arc<ParseError>),
}

#[derive(Debug)]
pub struct ReconciledObject {
    pub class_name: String,
    pub object_id: String,
    pub kind: OperationKind,
    pub outcome: ReconcileOutcome,
}

impl ReconciledObject {
    fn new(operation: &PendingOperation, outcome: ReconcileOutcome) -> Self {
        ReconciledObject {
            class_name: operation.class_name.clone(),
            object_id: operation.object_id.clone(),
            kind: operation.kind,
            outcome,
        }
    }
}

/// Server-strictly-newer check. A copy without a timestamp is older than any copy with one.
fn server_is_newer(server: Option<DateTime<Utc>>, local: Option<DateTime<Utc>>) -> bool {
    match (server, local) {
        (Some(server), Some(local)) => server > local,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// Sends writes through a [`Transport`] and keeps the ones that could not be
/// delivered for a later [`reconcile`](OfflineEngine::reconcile).
pub struct OfflineEngine<T: Transport + ?Sized> {
    transport: Arc<T>,
    local: LocalStore,
    encoder: ParseEncoder,
    reconciling: Mutex<()>,
}

impl<T: Transport + ?Sized> OfflineEngine<T> {
    pub fn new(transport: Arc<T>, store: Arc<dyn KeyValueStore>) -> Self {
        OfflineEngine {
            transport,
            local: LocalStore::new(store),
            encoder: ParseEncoder::default(),
            reconciling: Mutex::new(()),
        }
    }

    /// Uses `encoder` for payloads sent to the server.
    pub fn with_encoder(mut self, encoder: ParseEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn local_store(&self) -> &LocalStore {
        &self.local
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Writes `object` to the server and caches the result locally.
    ///
    /// If the server cannot be reached the object is cached and the write is
    /// queued; the call still fails with [`ParseError::NetworkUnavailable`] so
    /// the caller knows the write has not been delivered yet. Only objects with
    /// an `objectId` can be queued.
    pub async fn execute(&self, object: &mut ParseObject, kind: OperationKind) -> Result<(), ParseError> {
        match write_object(&*self.transport, &self.encoder, object, kind, &SavedIndex::new()).await {
            Ok(()) => {
                if object.object_id.is_some() {
                    self.local.save_object(object).await?;
                }
                Ok(())
            }
            Err(e) if e.is_network_down() => {
                let object_id = object
                    .object_id
                    .clone()
                    .ok_or_else(|| ParseError::MissingStableIdentifier(object.class_name.clone()))?;
                self.local.save_object(object).await?;
                self.local
                    .record_pending(PendingOperation::new(
                        kind,
                        &object.class_name,
                        &object_id,
                        object.updated_at,
                    ))
                    .await?;
                log::warn!(
                    "Server unreachable; queued {} of {} {} for later: {}",
                    kind,
                    object.class_name,
                    object_id,
                    e
                );
                Err(match e {
                    ParseError::NetworkUnavailable(_) => e,
                    other => ParseError::NetworkUnavailable(other.to_string()),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Fetches from the server, falling back to the local copy when offline.
    pub async fn fetch(&self, class_name: &str, object_id: &str) -> Result<ParseObject, ParseError> {
        match fetch_object(&*self.transport, class_name, object_id).await {
            Ok(object) => {
                self.local.save_object(&object).await?;
                Ok(object)
            }
            Err(e) if e.is_network_down() => {
                log::debug!("Server unreachable; reading {} {} from local store", class_name, object_id);
                self.local
                    .fetch_object(class_name, object_id)
                    .await?
                    .ok_or(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Replays every pending operation: saves, then creates, replaces and updates.
    ///
    /// Each class is checked against the server with one batch query. Where the
    /// server copy is strictly newer it wins; otherwise the local copy is sent
    /// again. Only one reconciliation runs at a time.
    pub async fn reconcile(&self) -> Result<Vec<ReconciledObject>, ParseError> {
        let _single_flight = self.reconciling.lock().await;
        let mut results = Vec::new();
        for kind in OperationKind::ALL {
            let pending = self.local.pending(kind).await?;
            if pending.is_empty() {
                continue;
            }
            let mut by_class: BTreeMap<String, Vec<PendingOperation>> = BTreeMap::new();
            for operation in pending {
                by_class
                    .entry(operation.class_name.clone())
                    .or_default()
                    .push(operation);
            }
            for (class_name, operations) in by_class {
                self.reconcile_class(kind, &class_name, &operations, &mut results)
                    .await;
            }
        }

        let count = |f: fn(&ReconcileOutcome) -> bool| results.iter().filter(|r| f(&r.outcome)).count();
        log::info!(
            "Reconciled {} pending operations: {} replayed, {} server copies kept, {} deferred, {} dropped, {} failed",
            results.len(),
            count(|o| matches!(o, ReconcileOutcome::Replayed(_))),
            count(|o| matches!(o, ReconcileOutcome::ServerWon(_))),
            count(|o| matches!(o, ReconcileOutcome::Deferred)),
            count(|o| matches!(o, ReconcileOutcome::Dropped)),
            count(|o| matches!(o, ReconcileOutcome::Failed(_))),
        );
        Ok(results)
    }

    async fn reconcile_class(
        &self,
        kind: OperationKind,
        class_name: &str,
        operations: &[PendingOperation],
        results: &mut Vec<ReconciledObject>,
    ) {
        let ids: Vec<String> = operations.iter().map(|op| op.object_id.clone()).collect();
        let mut query = ParseQuery::new(class_name);
        query
            .contained_in("objectId", ids.clone())
            .limit(ids.len() as isize);

        let server_objects = match query.find(&*self.transport).await {
            Ok(found) => found,
            Err(e) => {
                let outcome = if e.is_network_down() {
                    log::debug!("Server unreachable; deferring {} {} operations", ids.len(), class_name);
                    None
                } else {
                    log::warn!("Batch lookup of {} for {} failed: {}", class_name, kind, e);
                    Some(Arc::new(e))
                };
                for operation in operations {
                    let outcome = match &outcome {
                        None => ReconcileOutcome::Deferred,
                        Some(e) => ReconcileOutcome::Failed(Arc::clone(e)),
                    };
                    results.push(ReconciledObject::new(operation, outcome));
                }
                return;
            }
        };

        for operation in operations {
            let server = server_objects
                .iter()
                .find(|o| o.object_id.as_deref() == Some(operation.object_id.as_str()));
            let outcome = match self.reconcile_one(operation, server).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::warn!(
                        "Could not reconcile {} of {} {}: {}",
                        operation.kind,
                        operation.class_name,
                        operation.object_id,
                        e
                    );
                    ReconcileOutcome::Failed(Arc::new(e))
                }
            };
            results.push(ReconciledObject::new(operation, outcome));
        }
    }

    async fn reconcile_one(
        &self,
        operation: &PendingOperation,
        server: Option<&ParseObject>,
    ) -> Result<ReconcileOutcome, ParseError> {
        let class_name = operation.class_name.as_str();
        let done = [operation.object_id.clone()];

        let Some(mut local) = self.local.fetch_object(class_name, &operation.object_id).await? else {
            if let Some(server) = server {
                self.local.save_object(server).await?;
            }
            self.local.remove_pending(operation.kind, class_name, &done).await?;
            return Ok(ReconcileOutcome::Dropped);
        };

        if let Some(server) = server {
            if server_is_newer(server.updated_at, operation.updated_at) {
                log::debug!(
                    "Server copy of {} {} is newer; discarding queued {}",
                    class_name,
                    operation.object_id,
                    operation.kind
                );
                self.local.save_object(server).await?;
                self.local.remove_pending(operation.kind, class_name, &done).await?;
                return Ok(ReconcileOutcome::ServerWon(server.clone()));
            }
        }

        // A create whose object already exists on the server reached it before the
        // connection dropped; send the local copy as a save instead.
        let kind = match (operation.kind, server) {
            (OperationKind::Create, Some(_)) => OperationKind::Save,
            (kind, _) => kind,
        };
        match write_object(&*self.transport, &self.encoder, &mut local, kind, &SavedIndex::new()).await {
            Ok(()) => {
                self.local.save_object(&local).await?;
                self.local.remove_pending(operation.kind, class_name, &done).await?;
                Ok(ReconcileOutcome::Replayed(local))
            }
            Err(e) if e.is_network_down() => Ok(ReconcileOutcome::Deferred),
            Err(e) => {
                log::warn!(
                    "Replaying {} of {} {} failed; keeping it queued: {}",
                    operation.kind,
                    class_name,
                    operation.object_id,
                    e
                );
                Ok(ReconcileOutcome::Failed(Arc::new(e)))
            }
        }
    }
}

// src/offline/ledger.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::transport::OperationKind;
use crate::ParseError;

/// A write that could not reach the server and is waiting to be replayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    pub object_id: String,
    pub class_name: String,
    /// `updatedAt` of the local copy when the write was queued.
    pub updated_at: Option<DateTime<Utc>>,
    pub kind: OperationKind,
}

impl PendingOperation {
    pub fn new(
        kind: OperationKind,
        class_name: &str,
        object_id: &str,
        updated_at: Option<DateTime<Utc>>,
    ) -> Self {
        PendingOperation {
            object_id: object_id.to_string(),
            class_name: class_name.to_string(),
            updated_at,
            kind,
        }
    }

    fn same_object(&self, other: &PendingOperation) -> bool {
        self.class_name == other.class_name && self.object_id == other.object_id
    }
}

/// The persisted list of pending operations.
///
/// There is at most one record per object (class and `objectId`). Recording
/// the same object again keeps whichever record has the later `updated_at`,
/// kind included, so an object is never replayed twice in one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    operations: Vec<PendingOperation>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, ParseError> {
        let records: Vec<PendingOperation> = serde_json::from_slice(bytes).map_err(|e| {
            ParseError::JsonDeserializationFailed(format!("Corrupt pending operation ledger: {}", e))
        })?;
        let mut ledger = Ledger::new();
        for record in records {
            ledger.upsert(record);
        }
        Ok(ledger)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, ParseError> {
        Ok(serde_json::to_vec(&self.operations)?)
    }

    pub fn upsert(&mut self, operation: PendingOperation) {
        match self.operations.iter_mut().find(|op| op.same_object(&operation)) {
            // `None` sorts before any timestamp.
            Some(existing) if operation.updated_at >= existing.updated_at => *existing = operation,
            Some(_) => {}
            None => self.operations.push(operation),
        }
    }

    pub fn of_kind(&self, kind: OperationKind) -> Vec<PendingOperation> {
        self.operations
            .iter()
            .filter(|op| op.kind == kind)
            .cloned()
            .collect()
    }

    /// Removes the records for `object_ids`; returns how many were dropped.
    pub fn remove(&mut self, kind: OperationKind, class_name: &str, object_ids: &[String]) -> usize {
        let before = self.operations.len();
        self.operations.retain(|op| {
            !(op.kind == kind && op.class_name == class_name && object_ids.contains(&op.object_id))
        });
        before - self.operations.len()
    }

    pub fn operations(&self) -> &[PendingOperation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

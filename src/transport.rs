// src/transport.rs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::coding::SkipKeys;
use crate::ParseError;

/// The kind of write being sent for an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Save,
    Create,
    Replace,
    Update,
}

impl OperationKind {
    /// Order in which queued offline operations are replayed.
    pub const ALL: [OperationKind; 4] = [
        OperationKind::Save,
        OperationKind::Create,
        OperationKind::Replace,
        OperationKind::Update,
    ];

    /// Reserved keys stripped from the payload of this kind of write.
    pub fn skip_keys(&self, has_object_id: bool) -> SkipKeys {
        match self {
            OperationKind::Create if has_object_id => SkipKeys::CustomObjectId,
            _ => SkipKeys::Object,
        }
    }

    pub fn requires_object_id(&self) -> bool {
        matches!(self, OperationKind::Replace | OperationKind::Update)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Save => "save",
            OperationKind::Create => "create",
            OperationKind::Replace => "replace",
            OperationKind::Update => "update",
        };
        f.write_str(name)
    }
}

/// A request the SDK core asks the transport to perform.
///
/// Commands are semantic; turning them into URLs, headers and HTTP methods
/// is entirely up to the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum RestCommand {
    Find {
        class_name: String,
        params: Vec<(String, String)>,
    },
    Fetch {
        class_name: String,
        object_id: String,
    },
    Write {
        kind: OperationKind,
        class_name: String,
        object_id: Option<String>,
        body: Vec<u8>,
    },
    Delete {
        class_name: String,
        object_id: String,
    },
    RunFunction {
        name: String,
        body: Vec<u8>,
    },
    UploadFile {
        name: String,
        mime_type: String,
        data: Vec<u8>,
    },
}

/// Executes commands against a Parse Server and returns the raw response body.
///
/// Implementations must report unreachable-server failures with an error for
/// which [`ParseError::is_network_down`] is `true`; that is what queues writes
/// for offline replay.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, command: RestCommand) -> Result<Vec<u8>, ParseError>;
}

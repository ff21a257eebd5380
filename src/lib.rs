pub mod client;
pub mod cloud;
pub mod coding;
pub mod config;
pub mod error;
pub mod file;
pub mod node;
pub mod object;
pub mod offline;
pub mod query;
pub mod save;
pub mod storage;
pub mod transport;
pub mod types;

pub use client::ParseClient as Parse; // Alias for convenience
pub use client::ParseClient;
pub use cloud::ParseCloud;
pub use coding::{
    ContentHash, DataEncodingStrategy, DateEncodingStrategy, EncodeMode, Encoded, EncoderOptions,
    NonConformingFloatStrategy, ParseEncoder, SavedIndex, SingleValueEncoder, SkipKeys,
};
pub use config::ParseConfiguration;
pub use error::ParseError;
pub use file::{FileField, ParseFile};
pub use node::{Field, Node, ParseEncodable};
pub use object::{Identifiable, ParseObject, WriteResponse};
pub use offline::{OfflineEngine, PendingOperation, ReconcileOutcome, ReconciledObject};
pub use query::ParseQuery;
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use transport::{OperationKind, RestCommand, Transport};

// Re-export key types from the types module if needed directly
pub use types::{ParseDate, Pointer};

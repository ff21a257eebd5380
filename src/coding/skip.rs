// src/coding/skip.rs

use std::collections::BTreeSet;

/// Which top-level keys are left out of an encoded payload.
///
/// Only the root container is filtered; pointers substituted further down
/// always carry their `className` and `objectId`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SkipKeys {
    /// Server-managed fields of a regular object.
    #[default]
    Object,
    /// Like `Object`, but `objectId` is sent because the caller assigned it.
    CustomObjectId,
    /// Parameters of a cloud function or job call.
    Cloud,
    None,
    Custom(BTreeSet<String>),
}

const OBJECT_KEYS: [&str; 6] = [
    "objectId",
    "createdAt",
    "updatedAt",
    "className",
    "emailVerified",
    "id",
];

impl SkipKeys {
    pub fn keys(&self) -> BTreeSet<String> {
        match self {
            SkipKeys::Object => OBJECT_KEYS.iter().map(|k| k.to_string()).collect(),
            SkipKeys::CustomObjectId => OBJECT_KEYS
                .iter()
                .filter(|k| **k != "objectId")
                .map(|k| k.to_string())
                .collect(),
            SkipKeys::Cloud => BTreeSet::from(["functionJobName".to_string()]),
            SkipKeys::None => BTreeSet::new(),
            SkipKeys::Custom(keys) => keys.clone(),
        }
    }
}

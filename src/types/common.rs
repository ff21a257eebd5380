use serde::{Deserialize, Serialize};

/// Represents a Pointer to another Parse object.
/// Pointers are the wire form of an object that already has an `objectId`;
/// they never carry any other fields.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct Pointer {
    #[serde(rename = "__type")]
    pub __type: String, // Should always be "Pointer"
    #[serde(rename = "className")]
    pub class_name: String,
    #[serde(rename = "objectId")]
    pub object_id: String,
}

impl Pointer {
    /// Creates a new Pointer.
    pub fn new(class_name: impl Into<String>, object_id: impl Into<String>) -> Self {
        Pointer {
            __type: "Pointer".to_string(),
            class_name: class_name.into(),
            object_id: object_id.into(),
        }
    }

    /// Returns `true` if this pointer refers to the object `class_name`/`object_id`.
    pub fn has_same_object_id(&self, class_name: &str, object_id: &str) -> bool {
        self.class_name == class_name && self.object_id == object_id
    }
}

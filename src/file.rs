use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a file field as stored in a ParseObject.
/// This struct is used for serialization and deserialization
/// when a ParseFile is part of a ParseObject.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FileField {
    pub name: String,
    pub url: String,
    #[serde(rename = "__type")]
    pub _type: String, // Should always be "File"
}

impl FileField {
    pub fn new(name: String, url: String) -> Self {
        FileField {
            name,
            url,
            _type: "File".to_string(),
        }
    }
}

/// Represents a file to be uploaded to Parse Server or a file
/// that has already been uploaded.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseFile {
    /// Identifies this file instance for the lifetime of the process.
    /// Unsaved files have no content hash worth computing, so the encoder
    /// keys them by this id instead.
    pub local_id: Uuid,
    /// The name of the file. This could be the original filename
    /// or the name assigned by Parse Server upon upload.
    pub name: String,
    /// The URL of the file after it has been uploaded to Parse Server.
    /// This will be `None` for a file that hasn't been uploaded yet.
    pub url: Option<String>,
    /// The MIME type of the file (e.g., "image/jpeg", "text/plain").
    pub mime_type: String,
    /// The raw byte data of the file.
    pub data: Vec<u8>,
}

impl ParseFile {
    /// Creates a new `ParseFile` instance with the given name, data, and MIME type.
    /// The URL will be `None` initially and should be populated after uploading.
    pub fn new(name: impl Into<String>, data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        ParseFile {
            local_id: Uuid::new_v4(),
            name: name.into(),
            url: None,
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Wraps a file field returned by the server. The data is not downloaded.
    pub fn from_field(field: FileField) -> Self {
        ParseFile {
            local_id: Uuid::new_v4(),
            name: field.name,
            url: Some(field.url),
            mime_type: String::new(),
            data: Vec::new(),
        }
    }

    pub fn is_saved(&self) -> bool {
        self.url.is_some()
    }

    /// Converts this `ParseFile` into a `FileField` suitable for embedding
    /// within a `ParseObject`. Returns `None` if the file has not been uploaded
    /// (i.e., if `url` is `None`).
    pub fn to_field(&self) -> Option<FileField> {
        self.url
            .as_ref()
            .map(|u| FileField::new(self.name.clone(), u.clone()))
    }
}

// src/save.rs
//
// Object writes over a `Transport`, including the bottom-up save of a whole
// object graph.

use serde::Deserialize;

use crate::coding::{EncodeMode, ParseEncoder, SavedIndex};
use crate::error::ParseError;
use crate::file::{FileField, ParseFile};
use crate::object::{validate_class_name, Identifiable, ParseObject, WriteResponse};
use crate::transport::{OperationKind, RestCommand, Transport};

#[derive(Deserialize, Debug)]
struct FileUploadResponse {
    name: String,
    url: String,
}

/// Sends one write for `object`, resolving children through `saved`.
///
/// On success the object's id and timestamps are updated from the response.
pub async fn write_object<T: Transport + ?Sized>(
    transport: &T,
    encoder: &ParseEncoder,
    object: &mut ParseObject,
    kind: OperationKind,
    saved: &SavedIndex,
) -> Result<(), ParseError> {
    validate_class_name(&object.class_name)?;
    if kind.requires_object_id() && object.object_id.is_none() {
        return Err(ParseError::InvalidInput(format!(
            "Cannot {} a {} without an objectId",
            kind, object.class_name
        )));
    }
    let mode = EncodeMode::resolve(kind.skip_keys(object.object_id.is_some()));
    let encoded = encoder.encode_graph(&*object, &mode, saved)?;
    let response = transport
        .execute(RestCommand::Write {
            kind,
            class_name: object.class_name.clone(),
            object_id: object.object_id.clone(),
            body: encoded.bytes,
        })
        .await?;
    let write: WriteResponse = serde_json::from_slice(&response).map_err(|e| {
        ParseError::UnexpectedResponse(format!(
            "Invalid {} response for {}: {}",
            kind, object.class_name, e
        ))
    })?;
    object.apply_write_response(&write)
}

/// Fetches the current server copy of an object.
pub async fn fetch_object<T: Transport + ?Sized>(
    transport: &T,
    class_name: &str,
    object_id: &str,
) -> Result<ParseObject, ParseError> {
    validate_class_name(class_name)?;
    if object_id.is_empty() {
        return Err(ParseError::InvalidInput(
            "Object ID cannot be empty".to_string(),
        ));
    }
    let response = transport
        .execute(RestCommand::Fetch {
            class_name: class_name.to_string(),
            object_id: object_id.to_string(),
        })
        .await?;
    ParseObject::from_slice(class_name, &response)
}

pub async fn delete_object<T: Transport + ?Sized>(
    transport: &T,
    class_name: &str,
    object_id: &str,
) -> Result<(), ParseError> {
    validate_class_name(class_name)?;
    let response = transport
        .execute(RestCommand::Delete {
            class_name: class_name.to_string(),
            object_id: object_id.to_string(),
        })
        .await?;
    let value: serde_json::Value = serde_json::from_slice(&response)?;
    if value.as_object().is_some_and(|obj| obj.is_empty()) {
        Ok(())
    } else {
        Err(ParseError::UnexpectedResponse(format!(
            "Expected empty JSON object {{}} for delete, got: {:?}",
            value
        )))
    }
}

pub async fn upload_file<T: Transport + ?Sized>(
    transport: &T,
    file: &ParseFile,
) -> Result<FileField, ParseError> {
    let response = transport
        .execute(RestCommand::UploadFile {
            name: file.name.clone(),
            mime_type: file.mime_type.clone(),
            data: file.data.clone(),
        })
        .await?;
    let uploaded: FileUploadResponse = serde_json::from_slice(&response)?;
    Ok(FileField::new(uploaded.name, uploaded.url))
}

/// Saves `root` together with every unsaved object and file reachable from it.
///
/// A collecting pass finds the unsaved children (deepest first). Files are
/// uploaded, then each child is created and recorded in the returned index,
/// and finally the root is written with every child resolved to a pointer.
pub async fn deep_save<T: Transport + ?Sized>(
    transport: &T,
    encoder: &ParseEncoder,
    root: &mut ParseObject,
    kind: OperationKind,
) -> Result<SavedIndex, ParseError> {
    let mode = EncodeMode::collect(kind.skip_keys(root.object_id.is_some()));
    let discovered = encoder.encode_graph(&*root, &mode, &SavedIndex::new())?;
    let mut saved = SavedIndex::new();

    for file in &discovered.pending_files {
        let field = upload_file(transport, file).await?;
        log::debug!("Uploaded pending file {} as {}", file.name, field.url);
        saved.insert_file(file.local_id, field);
    }

    for child in &discovered.pending_objects {
        let mut created = child.clone();
        write_object(transport, encoder, &mut created, OperationKind::Create, &saved).await?;
        let pointer = created.pointer().ok_or_else(|| {
            ParseError::UnexpectedResponse(format!(
                "Server did not return an objectId for new {}",
                child.class_name
            ))
        })?;
        log::debug!(
            "Saved pending {} child as {}",
            child.class_name,
            pointer.object_id
        );
        saved.record_object(child, pointer, encoder.options())?;
    }

    write_object(transport, encoder, root, kind, &saved).await?;
    Ok(saved)
}

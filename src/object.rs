// src/object.rs

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use serde_json::Value;

use crate::node::{Field, Node, ParseEncodable};
use crate::types::date::parse_iso;
use crate::types::{ParseDate, Pointer};
use crate::ParseError;

/// Identity of an object as seen by the encoder and the offline store.
pub trait Identifiable {
    fn class_name(&self) -> &str;

    /// The server-assigned (or caller-assigned) `objectId`, if any.
    fn stable_id(&self) -> Option<&str>;

    fn pointer(&self) -> Option<Pointer> {
        self.stable_id()
            .map(|id| Pointer::new(self.class_name(), id))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseObject {
    pub class_name: String,
    pub object_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    // Declaration order is kept; `set` on an existing key replaces in place.
    fields: Vec<(String, Node)>,
}

impl ParseObject {
    pub fn new(class_name: &str) -> Self {
        ParseObject {
            class_name: class_name.to_string(),
            object_id: None,
            created_at: None,
            updated_at: None,
            fields: Vec::new(),
        }
    }

    pub fn with_id(class_name: &str, object_id: &str) -> Self {
        let mut object = ParseObject::new(class_name);
        object.object_id = Some(object_id.to_string());
        object
    }

    /// Creates an object with a client-generated 10 character `objectId`,
    /// for servers that allow custom object ids.
    pub fn with_generated_id(class_name: &str) -> Self {
        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(10)
            .map(char::from)
            .collect();
        ParseObject::with_id(class_name, &id)
    }

    /// Builder form of [`ParseObject::set`].
    pub fn with<T: ParseEncodable + ?Sized>(mut self, field_name: &str, value: &T) -> Self {
        self.set(field_name, value);
        self
    }

    pub fn set<T: ParseEncodable + ?Sized>(&mut self, field_name: &str, value: &T) {
        self.set_node(field_name, value.to_node());
    }

    /// Applies a three-state field: `Absent` removes the key locally,
    /// `Delete` schedules a server-side delete.
    pub fn set_field<T: ParseEncodable>(&mut self, field_name: &str, field: Field<T>) {
        match field.to_node() {
            Some(node) => self.set_node(field_name, node),
            None => {
                self.remove(field_name);
            }
        }
    }

    pub fn set_node(&mut self, field_name: &str, node: Node) {
        match self.fields.iter_mut().find(|(k, _)| k == field_name) {
            Some(entry) => entry.1 = node,
            None => self.fields.push((field_name.to_string(), node)),
        }
    }

    pub fn get(&self, field_name: &str) -> Option<&Node> {
        self.fields
            .iter()
            .find(|(k, _)| k == field_name)
            .map(|(_, v)| v)
    }

    pub fn remove(&mut self, field_name: &str) -> Option<Node> {
        let index = self.fields.iter().position(|(k, _)| k == field_name)?;
        Some(self.fields.remove(index).1)
    }

    pub fn fields(&self) -> &[(String, Node)] {
        &self.fields
    }

    pub fn increment(&mut self, field_name: &str, amount: i64) {
        self.set_node(field_name, operation("Increment", "amount", Node::Int(amount)));
    }

    pub fn decrement(&mut self, field_name: &str, amount: i64) {
        self.increment(field_name, -amount);
    }

    pub fn add_to_array<T: ParseEncodable>(&mut self, field_name: &str, items: &[T]) {
        self.set_node(field_name, operation("Add", "objects", items.to_node()));
    }

    pub fn add_unique_to_array<T: ParseEncodable>(&mut self, field_name: &str, items: &[T]) {
        self.set_node(field_name, operation("AddUnique", "objects", items.to_node()));
    }

    pub fn remove_from_array<T: ParseEncodable>(&mut self, field_name: &str, items: &[T]) {
        self.set_node(field_name, operation("Remove", "objects", items.to_node()));
    }

    /// Decodes an object from its JSON representation as returned by Parse Server
    /// (or as written to the local store).
    pub fn from_wire(class_name: &str, value: &Value) -> Result<ParseObject, ParseError> {
        let map = value.as_object().ok_or_else(|| {
            ParseError::JsonDeserializationFailed(format!(
                "expected a JSON object for class {}, got: {}",
                class_name, value
            ))
        })?;
        let mut object = ParseObject::new(class_name);
        for (key, field) in map {
            match key.as_str() {
                "objectId" => object.object_id = field.as_str().map(str::to_string),
                "createdAt" => object.created_at = wire_date(field)?,
                "updatedAt" => object.updated_at = wire_date(field)?,
                "className" | "__type" => {}
                _ => object.set_node(key, Node::from_wire(field)),
            }
        }
        Ok(object)
    }

    pub fn from_slice(class_name: &str, bytes: &[u8]) -> Result<ParseObject, ParseError> {
        let value: Value = serde_json::from_slice(bytes)?;
        ParseObject::from_wire(class_name, &value)
    }

    /// Copies the identifier and timestamps the server returned for a write.
    pub fn apply_write_response(&mut self, response: &WriteResponse) -> Result<(), ParseError> {
        if let Some(id) = &response.object_id {
            self.object_id = Some(id.clone());
        }
        if let Some(created) = &response.created_at {
            let created = created.to_datetime()?;
            self.created_at = Some(created);
            // A create response has no updatedAt; the object was last updated when created.
            if response.updated_at.is_none() {
                self.updated_at = Some(created);
            }
        }
        if let Some(updated) = &response.updated_at {
            self.updated_at = Some(updated.to_datetime()?);
        }
        Ok(())
    }
}

fn operation(op: &str, key: &str, value: Node) -> Node {
    Node::Map(vec![
        ("__op".to_string(), Node::String(op.to_string())),
        (key.to_string(), value),
    ])
}

fn wire_date(value: &Value) -> Result<Option<DateTime<Utc>>, ParseError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => parse_iso(s).map(Some),
        Value::Object(_) => match value.get("iso").and_then(Value::as_str) {
            Some(iso) => parse_iso(iso).map(Some),
            None => Ok(None),
        },
        _ => Err(ParseError::JsonDeserializationFailed(format!(
            "unexpected timestamp value: {}",
            value
        ))),
    }
}

impl Identifiable for ParseObject {
    fn class_name(&self) -> &str {
        &self.class_name
    }

    fn stable_id(&self) -> Option<&str> {
        self.object_id.as_deref()
    }
}

/// Body returned by Parse Server for create, save, replace and update calls.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct WriteResponse {
    pub object_id: Option<String>,
    pub created_at: Option<ParseDate>,
    pub updated_at: Option<ParseDate>,
}

/// Checks a class name against Parse Server's naming rules.
pub fn validate_class_name(class_name: &str) -> Result<(), ParseError> {
    if class_name.is_empty() {
        return Err(ParseError::InvalidInput(
            "Class name cannot be empty".to_string(),
        ));
    }
    if !class_name
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
    {
        return Err(ParseError::InvalidInput(
            "Invalid class name: must start with a letter or underscore.".to_string(),
        ));
    }
    if !class_name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(ParseError::InvalidInput(
            "Invalid class name: can only contain letters, numbers, or underscores.".to_string(),
        ));
    }
    Ok(())
}

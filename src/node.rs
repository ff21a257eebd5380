// src/node.rs

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use url::Url;

use crate::file::{FileField, ParseFile};
use crate::object::ParseObject;
use crate::types::date::parse_iso;
use crate::types::Pointer;

/// A value reachable while encoding an object graph.
///
/// Every encodable type states which variant it is through [`ParseEncodable`];
/// the encoder never inspects types at runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(DateTime<Utc>),
    Bytes(Vec<u8>),
    Url(Url),
    /// Decimal kept in its textual form so no precision is lost before boxing.
    Decimal(String),
    Object(ParseObject),
    Pointer(Pointer),
    File(ParseFile),
    Array(Vec<Node>),
    /// Keyed container; entries keep insertion order.
    Map(Vec<(String, Node)>),
    /// Explicit removal of a field, sent as `{"__op":"Delete"}`.
    Delete,
    /// A raw field operation such as `Increment` or `AddUnique`.
    Op(Value),
}

impl Node {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Node::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Node::Float(f) => Some(*f),
            Node::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Node::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ParseObject> {
        match self {
            Node::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<&Pointer> {
        match self {
            Node::Pointer(p) => Some(p),
            _ => None,
        }
    }

    /// Decodes a JSON value received from Parse Server.
    ///
    /// Typed wrappers (`Date`, `Pointer`, `File`, `Bytes`, `Object`) become their
    /// matching variants; a wrapper that fails to decode is kept as a plain map.
    pub fn from_wire(value: &Value) -> Node {
        match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Node::Int(i),
                None => Node::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Node::String(s.clone()),
            Value::Array(items) => Node::Array(items.iter().map(Node::from_wire).collect()),
            Value::Object(map) => {
                if let Some(node) = decode_typed(value) {
                    return node;
                }
                if let Some(op) = map.get("__op").and_then(Value::as_str) {
                    return if op == "Delete" {
                        Node::Delete
                    } else {
                        Node::Op(value.clone())
                    };
                }
                Node::Map(
                    map.iter()
                        .map(|(k, v)| (k.clone(), Node::from_wire(v)))
                        .collect(),
                )
            }
        }
    }
}

fn decode_typed(value: &Value) -> Option<Node> {
    let type_name = value.get("__type")?.as_str()?;
    match type_name {
        "Date" => {
            let iso = value.get("iso")?.as_str()?;
            parse_iso(iso).ok().map(Node::Date)
        }
        "Pointer" => serde_json::from_value::<Pointer>(value.clone())
            .ok()
            .map(Node::Pointer),
        "File" => serde_json::from_value::<FileField>(value.clone())
            .ok()
            .map(|f| Node::File(ParseFile::from_field(f))),
        "Bytes" => {
            let encoded = value.get("base64")?.as_str()?;
            BASE64.decode(encoded).ok().map(Node::Bytes)
        }
        "Object" => {
            let class_name = value.get("className")?.as_str()?;
            ParseObject::from_wire(class_name, value).ok().map(Node::Object)
        }
        _ => None,
    }
}

/// A field that distinguishes "not set" from "explicitly removed".
///
/// `Absent` leaves the key out of the payload, `Delete` sends the delete
/// operation, and `Present` sends the value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Field<T> {
    #[default]
    Absent,
    Delete,
    Present(T),
}

impl<T> Field<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Field::Absent)
    }

    pub fn as_present(&self) -> Option<&T> {
        match self {
            Field::Present(v) => Some(v),
            _ => None,
        }
    }
}

impl<T: ParseEncodable> Field<T> {
    /// The node to encode for this field, or `None` when the key must be omitted.
    pub fn to_node(&self) -> Option<Node> {
        match self {
            Field::Absent => None,
            Field::Delete => Some(Node::Delete),
            Field::Present(v) => Some(v.to_node()),
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Field::Present(v),
            None => Field::Absent,
        }
    }
}

/// Declares how a type appears in an encodable object graph.
pub trait ParseEncodable {
    fn to_node(&self) -> Node;
}

impl ParseEncodable for Node {
    fn to_node(&self) -> Node {
        self.clone()
    }
}

impl ParseEncodable for bool {
    fn to_node(&self) -> Node {
        Node::Bool(*self)
    }
}

macro_rules! encodable_int {
    ($($t:ty),*) => {
        $(impl ParseEncodable for $t {
            fn to_node(&self) -> Node {
                Node::Int(i64::from(*self))
            }
        })*
    };
}

encodable_int!(i8, i16, i32, i64, u16, u32);

impl ParseEncodable for f32 {
    fn to_node(&self) -> Node {
        Node::Float(f64::from(*self))
    }
}

impl ParseEncodable for f64 {
    fn to_node(&self) -> Node {
        Node::Float(*self)
    }
}

impl ParseEncodable for str {
    fn to_node(&self) -> Node {
        Node::String(self.to_string())
    }
}

impl ParseEncodable for String {
    fn to_node(&self) -> Node {
        Node::String(self.clone())
    }
}

impl ParseEncodable for DateTime<Utc> {
    fn to_node(&self) -> Node {
        Node::Date(*self)
    }
}

impl ParseEncodable for Url {
    fn to_node(&self) -> Node {
        Node::Url(self.clone())
    }
}

impl ParseEncodable for Pointer {
    fn to_node(&self) -> Node {
        Node::Pointer(self.clone())
    }
}

impl ParseEncodable for ParseFile {
    fn to_node(&self) -> Node {
        Node::File(self.clone())
    }
}

impl ParseEncodable for ParseObject {
    fn to_node(&self) -> Node {
        Node::Object(self.clone())
    }
}

impl ParseEncodable for Value {
    fn to_node(&self) -> Node {
        Node::from_wire(self)
    }
}

impl<T: ParseEncodable + ?Sized> ParseEncodable for &T {
    fn to_node(&self) -> Node {
        (**self).to_node()
    }
}

impl<T: ParseEncodable> ParseEncodable for Option<T> {
    fn to_node(&self) -> Node {
        match self {
            Some(v) => v.to_node(),
            None => Node::Null,
        }
    }
}

impl<T: ParseEncodable> ParseEncodable for Vec<T> {
    fn to_node(&self) -> Node {
        Node::Array(self.iter().map(ParseEncodable::to_node).collect())
    }
}

impl<T: ParseEncodable> ParseEncodable for [T] {
    fn to_node(&self) -> Node {
        Node::Array(self.iter().map(ParseEncodable::to_node).collect())
    }
}

impl<T: ParseEncodable> ParseEncodable for BTreeMap<String, T> {
    fn to_node(&self) -> Node {
        Node::Map(self.iter().map(|(k, v)| (k.clone(), v.to_node())).collect())
    }
}

impl<T: ParseEncodable> ParseEncodable for HashMap<String, T> {
    fn to_node(&self) -> Node {
        let mut entries: Vec<(String, Node)> =
            self.iter().map(|(k, v)| (k.clone(), v.to_node())).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Node::Map(entries)
    }
}

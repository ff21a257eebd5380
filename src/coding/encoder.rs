// src/coding/encoder.rs

use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

use crate::coding::boxing::{Boxer, EncoderOptions, EncodingContext};
use crate::coding::resolver::{ContentHash, Resolution, Resolver, SavedIndex};
use crate::coding::skip::SkipKeys;
use crate::file::ParseFile;
use crate::node::{Node, ParseEncodable};
use crate::object::{Identifiable, ParseObject};
use crate::types::date::format_iso;
use crate::types::Pointer;
use crate::ParseError;

/// How a single encoding pass treats unsaved children and reserved keys.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncodeMode {
    /// When set, unsaved children are collected and left out of the output
    /// instead of failing the pass.
    pub collect_children: bool,
    pub skip: SkipKeys,
}

impl EncodeMode {
    pub fn collect(skip: SkipKeys) -> Self {
        EncodeMode {
            collect_children: true,
            skip,
        }
    }

    pub fn resolve(skip: SkipKeys) -> Self {
        EncodeMode {
            collect_children: false,
            skip,
        }
    }
}

/// Result of one encoding pass.
#[derive(Debug, Clone)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    /// Pointer to the root object, if it already had an `objectId`.
    pub pointer: Option<Pointer>,
    /// Unsaved objects found in the graph, children before their parents.
    pub pending_objects: Vec<ParseObject>,
    pub pending_files: Vec<ParseFile>,
}

/// Encodes object graphs into Parse REST JSON.
///
/// The encoder keeps no state between calls. Each call builds its own
/// resolver over the caller's [`SavedIndex`], so independent graphs can be
/// encoded concurrently from one shared `ParseEncoder`.
#[derive(Debug, Clone, Default)]
pub struct ParseEncoder {
    options: EncoderOptions,
}

impl ParseEncoder {
    pub fn new(options: EncoderOptions) -> Self {
        ParseEncoder { options }
    }

    pub fn options(&self) -> &EncoderOptions {
        &self.options
    }

    /// Content hash of `object` under this encoder's options.
    pub fn content_hash(&self, object: &ParseObject) -> Result<ContentHash, ParseError> {
        ContentHash::of(object, &self.options)
    }

    /// Encodes `value`, substituting pointers for persisted objects.
    ///
    /// In collect mode the unsaved objects and files reachable from the root
    /// are returned in `Encoded::pending_*` and omitted from `bytes`; save them,
    /// record them in `saved`, and encode again to get the complete payload.
    pub fn encode_graph<T: ParseEncodable + ?Sized>(
        &self,
        value: &T,
        mode: &EncodeMode,
        saved: &SavedIndex,
    ) -> Result<Encoded, ParseError> {
        let node = value.to_node();
        let root = match &node {
            Node::Object(object) => object.pointer(),
            _ => None,
        };
        let resolver = Resolver::new(root.clone(), mode.collect_children, saved, &self.options);
        let mut walker = Walker {
            boxer: Boxer::new(&self.options),
            resolver,
            skip: mode.skip.keys(),
            storage: Vec::new(),
        };
        let encoded = walker.encode_root(&node)?;
        if !(encoded.is_object() || encoded.is_array()) {
            return Err(ParseError::EncodingFailure(format!(
                "top-level value is not a JSON object or array: {}",
                encoded
            )));
        }
        let bytes = serde_json::to_vec(&encoded)?;
        let (pending_objects, pending_files) = walker.resolver.into_pending();
        log::debug!(
            "Encoded {} bytes (collect_children={}, pending objects={}, pending files={})",
            bytes.len(),
            mode.collect_children,
            pending_objects.len(),
            pending_files.len()
        );
        Ok(Encoded {
            bytes,
            pointer: root,
            pending_objects,
            pending_files,
        })
    }

    /// Encodes a graph whose children are all persisted.
    pub fn encode<T: ParseEncodable + ?Sized>(
        &self,
        value: &T,
        skip: SkipKeys,
    ) -> Result<Vec<u8>, ParseError> {
        let encoded = self.encode_graph(value, &EncodeMode::resolve(skip), &SavedIndex::new())?;
        Ok(encoded.bytes)
    }

    pub fn encode_to_value<T: ParseEncodable + ?Sized>(
        &self,
        value: &T,
        skip: SkipKeys,
    ) -> Result<Value, ParseError> {
        let bytes = self.encode(value, skip)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Encodes a nested value without the top-level container rule.
    pub(crate) fn encode_fragment(&self, node: &Node) -> Result<Value, ParseError> {
        let saved = SavedIndex::new();
        let mut walker = Walker {
            boxer: Boxer::new(&self.options),
            resolver: Resolver::new(None, false, &saved, &self.options),
            skip: BTreeSet::new(),
            storage: Vec::new(),
        };
        Ok(walker.encode_node(node, "")?.unwrap_or(Value::Null))
    }
}

struct Walker<'a> {
    boxer: Boxer<'a>,
    resolver: Resolver<'a>,
    skip: BTreeSet<String>,
    // Output stack for custom date/data closures.
    storage: Vec<Value>,
}

impl EncodingContext for Walker<'_> {
    fn storage(&mut self) -> &mut Vec<Value> {
        &mut self.storage
    }

    fn encode_nested(&mut self, node: &Node, path: &str) -> Result<Option<Value>, ParseError> {
        self.encode_node(node, path)
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

impl Walker<'_> {
    fn encode_root(&mut self, node: &Node) -> Result<Value, ParseError> {
        match node {
            Node::Object(object) => self.encode_object(object, "", true),
            Node::Pointer(pointer) => Ok(serde_json::to_value(pointer)?),
            Node::Map(entries) => self.encode_map(entries, "", true),
            other => Ok(self.encode_node(other, "")?.unwrap_or(Value::Null)),
        }
    }

    fn encode_object(
        &mut self,
        object: &ParseObject,
        path: &str,
        top_level: bool,
    ) -> Result<Value, ParseError> {
        let mut map = Map::new();
        map.insert(
            "className".to_string(),
            Value::String(object.class_name.clone()),
        );
        if let Some(id) = &object.object_id {
            map.insert("objectId".to_string(), Value::String(id.clone()));
        }
        if let Some(created) = &object.created_at {
            map.insert("createdAt".to_string(), Value::String(format_iso(created)));
        }
        if let Some(updated) = &object.updated_at {
            map.insert("updatedAt".to_string(), Value::String(format_iso(updated)));
        }
        if top_level {
            map.retain(|key, _| !self.skip.contains(key));
        }
        for (key, node) in object.fields() {
            if top_level && self.skip.contains(key) {
                continue;
            }
            if let Some(value) = self.encode_node(node, &join(path, key))? {
                map.insert(key.clone(), value);
            }
        }
        Ok(Value::Object(map))
    }

    fn encode_map(
        &mut self,
        entries: &[(String, Node)],
        path: &str,
        top_level: bool,
    ) -> Result<Value, ParseError> {
        let mut map = Map::new();
        for (key, node) in entries {
            if top_level && self.skip.contains(key) {
                continue;
            }
            if let Some(value) = self.encode_node(node, &join(path, key))? {
                map.insert(key.clone(), value);
            }
        }
        Ok(Value::Object(map))
    }

    /// Encodes a node below the root; `None` means "leave it out".
    fn encode_node(&mut self, node: &Node, path: &str) -> Result<Option<Value>, ParseError> {
        let value = match node {
            Node::Null => Value::Null,
            Node::Bool(b) => Value::Bool(*b),
            Node::Int(i) => json!(i),
            Node::Float(f) => self.boxer.box_float(*f, path)?,
            Node::String(s) => Value::String(s.clone()),
            Node::Date(d) => {
                let boxer = self.boxer;
                boxer.box_date(d, path, self)?
            }
            Node::Bytes(b) => {
                let boxer = self.boxer;
                boxer.box_data(b, path, self)?
            }
            Node::Url(u) => Value::String(u.to_string()),
            Node::Decimal(d) => self.boxer.box_decimal(d, path)?,
            Node::Object(object) => match self.resolver.resolve_object(object, path)? {
                Resolution::Substitute(value) => value,
                Resolution::Omit => return Ok(None),
                Resolution::Pending(hash) => {
                    // Walk the child first so its own unsaved children are listed before it.
                    for (key, child) in object.fields() {
                        self.encode_node(child, &join(path, key))?;
                    }
                    self.resolver.push_pending(hash, object);
                    return Ok(None);
                }
            },
            Node::Pointer(pointer) => self.resolver.resolve_pointer(pointer, path)?,
            Node::File(file) => match self.resolver.resolve_file(file, path)? {
                Resolution::Substitute(value) => value,
                Resolution::Omit | Resolution::Pending(_) => return Ok(None),
            },
            Node::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    if let Some(value) = self.encode_node(item, &format!("{}[{}]", path, index))? {
                        out.push(value);
                    }
                }
                Value::Array(out)
            }
            Node::Map(entries) => self.encode_map(entries, path, false)?,
            Node::Delete => json!({"__op": "Delete"}),
            Node::Op(op) => op.clone(),
        };
        Ok(Some(value))
    }
}

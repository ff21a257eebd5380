// src/coding/resolver.rs

use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use uuid::Uuid;

use crate::coding::boxing::{Boxer, EncoderOptions, FragmentContext};
use crate::file::{FileField, ParseFile};
use crate::node::Node;
use crate::object::{Identifiable, ParseObject};
use crate::types::Pointer;
use crate::ParseError;

/// A blake3 digest of an object's content, identifiers excluded.
///
/// Two unsaved objects with the same class and the same field values hash
/// equally, which is how an object saved earlier in a batch is recognised
/// again without an `objectId`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn of(object: &ParseObject, options: &EncoderOptions) -> Result<Self, ParseError> {
        let mut hasher = Canonical {
            boxer: Boxer::new(options),
            context: FragmentContext::new(options),
        };
        let canonical = hasher.object(object)?;
        let bytes = serde_json::to_vec(&canonical)?;
        Ok(ContentHash(*blake3::hash(&bytes).as_bytes()))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self)
    }
}

struct Canonical<'a> {
    boxer: Boxer<'a>,
    context: FragmentContext<'a>,
}

// serde_json maps sort their keys, so the serialized form is canonical.
impl Canonical<'_> {
    fn object(&mut self, object: &ParseObject) -> Result<Value, ParseError> {
        let mut map = Map::new();
        map.insert(
            "className".to_string(),
            Value::String(object.class_name.clone()),
        );
        for (key, node) in object.fields() {
            map.insert(key.clone(), self.node(node, key)?);
        }
        Ok(Value::Object(map))
    }

    fn node(&mut self, node: &Node, path: &str) -> Result<Value, ParseError> {
        let boxer = self.boxer;
        Ok(match node {
            Node::Null => Value::Null,
            Node::Bool(b) => Value::Bool(*b),
            Node::Int(i) => json!(i),
            // Hashing must not fail on values the payload encoder would reject later.
            Node::Float(f) => match serde_json::Number::from_f64(*f) {
                Some(n) => Value::Number(n),
                None => Value::String(f.to_string()),
            },
            Node::String(s) => Value::String(s.clone()),
            Node::Date(d) => boxer.box_date(d, path, &mut self.context)?,
            Node::Bytes(b) => boxer.box_data(b, path, &mut self.context)?,
            Node::Url(u) => Value::String(u.to_string()),
            Node::Decimal(d) => Value::String(d.clone()),
            Node::Object(o) => match o.pointer() {
                Some(pointer) => serde_json::to_value(pointer)?,
                None => self.object(o)?,
            },
            Node::Pointer(p) => serde_json::to_value(p)?,
            Node::File(f) => match f.to_field() {
                Some(field) => serde_json::to_value(field)?,
                None => json!({"__type": "File", "name": f.name, "localId": f.local_id.to_string()}),
            },
            Node::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|n| self.node(n, path))
                    .collect::<Result<_, _>>()?,
            ),
            Node::Map(entries) => {
                let mut map = Map::new();
                for (key, value) in entries {
                    map.insert(key.clone(), self.node(value, key)?);
                }
                Value::Object(map)
            }
            Node::Delete => json!({"__op": "Delete"}),
            Node::Op(v) => v.clone(),
        })
    }
}

/// Objects and files persisted earlier in the same batch.
///
/// Built by the caller between encoding passes: after a pending child is
/// saved, its pointer is recorded here so the next pass can substitute it.
#[derive(Debug, Clone, Default)]
pub struct SavedIndex {
    objects: HashMap<ContentHash, Pointer>,
    files: HashMap<Uuid, FileField>,
}

impl SavedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_object(&mut self, hash: ContentHash, pointer: Pointer) {
        self.objects.insert(hash, pointer);
    }

    /// Records `unsaved` (the object as it appears in the graph) as saved under `pointer`.
    pub fn record_object(
        &mut self,
        unsaved: &ParseObject,
        pointer: Pointer,
        options: &EncoderOptions,
    ) -> Result<ContentHash, ParseError> {
        let hash = ContentHash::of(unsaved, options)?;
        self.objects.insert(hash, pointer);
        Ok(hash)
    }

    pub fn object(&self, hash: &ContentHash) -> Option<&Pointer> {
        self.objects.get(hash)
    }

    pub fn insert_file(&mut self, local_id: Uuid, field: FileField) {
        self.files.insert(local_id, field);
    }

    pub fn file(&self, local_id: &Uuid) -> Option<&FileField> {
        self.files.get(local_id)
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.files.is_empty()
    }
}

/// Outcome of resolving an object-like node.
pub(crate) enum Resolution {
    /// Encode this value in place of the node.
    Substitute(Value),
    /// An unsaved object not seen before in this pass; the caller walks it
    /// for nested children, then registers it with [`Resolver::push_pending`].
    Pending(ContentHash),
    /// Leave the key (or array element) out of this pass's output.
    Omit,
}

/// Per-pass state for pointer substitution and pending-child discovery.
pub(crate) struct Resolver<'a> {
    root: Option<Pointer>,
    collect_children: bool,
    saved: &'a SavedIndex,
    options: &'a EncoderOptions,
    pending_objects: Vec<ParseObject>,
    pending_hashes: HashSet<ContentHash>,
    pending_files: Vec<ParseFile>,
    seen_files: HashSet<Uuid>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(
        root: Option<Pointer>,
        collect_children: bool,
        saved: &'a SavedIndex,
        options: &'a EncoderOptions,
    ) -> Self {
        Resolver {
            root,
            collect_children,
            saved,
            options,
            pending_objects: Vec::new(),
            pending_hashes: HashSet::new(),
            pending_files: Vec::new(),
            seen_files: HashSet::new(),
        }
    }

    fn check_root(&self, class_name: &str, object_id: &str, path: &str) -> Result<(), ParseError> {
        match &self.root {
            Some(root) if root.has_same_object_id(class_name, object_id) => {
                Err(ParseError::CircularDependency(path.to_string()))
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn resolve_pointer(&self, pointer: &Pointer, path: &str) -> Result<Value, ParseError> {
        self.check_root(&pointer.class_name, &pointer.object_id, path)?;
        Ok(serde_json::to_value(pointer)?)
    }

    pub(crate) fn resolve_object(
        &self,
        object: &ParseObject,
        path: &str,
    ) -> Result<Resolution, ParseError> {
        if let Some(pointer) = object.pointer() {
            self.check_root(&pointer.class_name, &pointer.object_id, path)?;
            return Ok(Resolution::Substitute(serde_json::to_value(pointer)?));
        }
        let hash = ContentHash::of(object, self.options)?;
        if let Some(pointer) = self.saved.object(&hash) {
            return Ok(Resolution::Substitute(serde_json::to_value(pointer)?));
        }
        if !self.collect_children {
            return Err(ParseError::UnresolvedChild(path.to_string()));
        }
        if self.pending_hashes.contains(&hash) {
            return Ok(Resolution::Omit);
        }
        Ok(Resolution::Pending(hash))
    }

    pub(crate) fn push_pending(&mut self, hash: ContentHash, object: &ParseObject) {
        if self.pending_hashes.insert(hash) {
            log::debug!(
                "Found unsaved {} child while encoding (hash {})",
                object.class_name,
                hash
            );
            self.pending_objects.push(object.clone());
        }
    }

    pub(crate) fn resolve_file(&mut self, file: &ParseFile, path: &str) -> Result<Resolution, ParseError> {
        if let Some(field) = file.to_field() {
            if !self.seen_files.insert(file.local_id) {
                return Err(ParseError::CircularDependency(path.to_string()));
            }
            return Ok(Resolution::Substitute(serde_json::to_value(field)?));
        }
        if let Some(field) = self.saved.file(&file.local_id) {
            return Ok(Resolution::Substitute(serde_json::to_value(field)?));
        }
        if !self.collect_children {
            return Err(ParseError::UnresolvedChild(path.to_string()));
        }
        if !self.pending_files.iter().any(|f| f.local_id == file.local_id) {
            self.pending_files.push(file.clone());
        }
        Ok(Resolution::Omit)
    }

    pub(crate) fn into_pending(self) -> (Vec<ParseObject>, Vec<ParseFile>) {
        (self.pending_objects, self.pending_files)
    }
}

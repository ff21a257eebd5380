// src/coding/boxing.rs

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Number, Value};
use std::fmt::{self, Write as _};
use std::sync::Arc;

use crate::coding::encoder::ParseEncoder;
use crate::node::{Node, ParseEncodable};
use crate::types::date::format_iso;
use crate::ParseError;

pub type DateClosure =
    Arc<dyn Fn(&DateTime<Utc>, &mut SingleValueEncoder<'_>) -> Result<(), ParseError> + Send + Sync>;
pub type DataClosure =
    Arc<dyn Fn(&[u8], &mut SingleValueEncoder<'_>) -> Result<(), ParseError> + Send + Sync>;

/// How `Node::Date` values are written.
#[derive(Clone, Default)]
pub enum DateEncodingStrategy {
    /// `{"__type":"Date","iso":"..."}`, the form Parse Server stores.
    #[default]
    ParseDate,
    SecondsSince1970,
    MillisecondsSince1970,
    /// Plain ISO 8601 string with millisecond precision.
    Iso8601,
    /// A chrono format string, e.g. `"%Y-%m-%d"`.
    Formatted(String),
    /// The closure writes zero or one value; writing nothing yields `{}`.
    Custom(DateClosure),
}

impl fmt::Debug for DateEncodingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateEncodingStrategy::ParseDate => f.write_str("ParseDate"),
            DateEncodingStrategy::SecondsSince1970 => f.write_str("SecondsSince1970"),
            DateEncodingStrategy::MillisecondsSince1970 => f.write_str("MillisecondsSince1970"),
            DateEncodingStrategy::Iso8601 => f.write_str("Iso8601"),
            DateEncodingStrategy::Formatted(format) => write!(f, "Formatted({:?})", format),
            DateEncodingStrategy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// How `Node::Bytes` values are written.
#[derive(Clone, Default)]
pub enum DataEncodingStrategy {
    /// `{"__type":"Bytes","base64":"..."}`.
    #[default]
    ParseBytes,
    Base64,
    ByteArray,
    Custom(DataClosure),
}

impl fmt::Debug for DataEncodingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataEncodingStrategy::ParseBytes => f.write_str("ParseBytes"),
            DataEncodingStrategy::Base64 => f.write_str("Base64"),
            DataEncodingStrategy::ByteArray => f.write_str("ByteArray"),
            DataEncodingStrategy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// What to do with infinite and NaN floats, which JSON cannot represent.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum NonConformingFloatStrategy {
    #[default]
    Throw,
    ConvertToString {
        positive_infinity: String,
        negative_infinity: String,
        nan: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct EncoderOptions {
    pub date_strategy: DateEncodingStrategy,
    pub data_strategy: DataEncodingStrategy,
    pub float_strategy: NonConformingFloatStrategy,
}

/// Where custom closures write, and how they encode nested values.
///
/// The graph walker implements this so values encoded from inside a closure
/// go through the same resolver as the rest of the pass.
pub(crate) trait EncodingContext {
    /// Values produced by custom closures; its length is the depth check.
    fn storage(&mut self) -> &mut Vec<Value>;

    /// `None` means the value was left out (an unsaved child in a collecting pass).
    fn encode_nested(&mut self, node: &Node, path: &str) -> Result<Option<Value>, ParseError>;
}

/// Context for values encoded outside a graph walk, such as content hashing.
pub(crate) struct FragmentContext<'a> {
    options: &'a EncoderOptions,
    storage: Vec<Value>,
}

impl<'a> FragmentContext<'a> {
    pub(crate) fn new(options: &'a EncoderOptions) -> Self {
        FragmentContext {
            options,
            storage: Vec::new(),
        }
    }
}

impl EncodingContext for FragmentContext<'_> {
    fn storage(&mut self) -> &mut Vec<Value> {
        &mut self.storage
    }

    fn encode_nested(&mut self, node: &Node, _path: &str) -> Result<Option<Value>, ParseError> {
        ParseEncoder::new(self.options.clone())
            .encode_fragment(node)
            .map(Some)
    }
}

/// Handed to custom date/data closures. Holds at most one value.
pub struct SingleValueEncoder<'a> {
    context: &'a mut dyn EncodingContext,
    depth: usize,
    path: &'a str,
}

impl SingleValueEncoder<'_> {
    fn ensure_empty(&mut self) -> Result<(), ParseError> {
        if self.context.storage().len() > self.depth {
            return Err(ParseError::EncodingFailure(
                "a single value was already encoded by this closure".to_string(),
            ));
        }
        Ok(())
    }

    /// Writes a raw JSON value.
    pub fn encode_value(&mut self, value: Value) -> Result<(), ParseError> {
        self.ensure_empty()?;
        self.context.storage().push(value);
        Ok(())
    }

    pub fn encode_nil(&mut self) -> Result<(), ParseError> {
        self.encode_value(Value::Null)
    }

    /// Encodes any encodable value as part of the surrounding pass: objects
    /// are resolved, checked for cycles and collected like any other child.
    pub fn encode<T: ParseEncodable + ?Sized>(&mut self, value: &T) -> Result<(), ParseError> {
        self.ensure_empty()?;
        if let Some(encoded) = self.context.encode_nested(&value.to_node(), self.path)? {
            self.context.storage().push(encoded);
        }
        Ok(())
    }
}

/// Converts primitive nodes into wire values.
#[derive(Clone, Copy)]
pub(crate) struct Boxer<'a> {
    options: &'a EncoderOptions,
}

impl<'a> Boxer<'a> {
    pub(crate) fn new(options: &'a EncoderOptions) -> Self {
        Boxer { options }
    }

    pub(crate) fn box_float(&self, value: f64, path: &str) -> Result<Value, ParseError> {
        if value.is_finite() {
            return Number::from_f64(value)
                .map(Value::Number)
                .ok_or_else(|| ParseError::InvalidFloatingPoint {
                    value,
                    path: path.to_string(),
                });
        }
        match &self.options.float_strategy {
            NonConformingFloatStrategy::Throw => Err(ParseError::InvalidFloatingPoint {
                value,
                path: path.to_string(),
            }),
            NonConformingFloatStrategy::ConvertToString {
                positive_infinity,
                negative_infinity,
                nan,
            } => {
                let text = if value.is_nan() {
                    nan
                } else if value.is_sign_positive() {
                    positive_infinity
                } else {
                    negative_infinity
                };
                Ok(Value::String(text.clone()))
            }
        }
    }

    pub(crate) fn box_date<C: EncodingContext>(
        &self,
        date: &DateTime<Utc>,
        path: &str,
        context: &mut C,
    ) -> Result<Value, ParseError> {
        match &self.options.date_strategy {
            DateEncodingStrategy::ParseDate => Ok(json!({
                "__type": "Date",
                "iso": format_iso(date),
            })),
            DateEncodingStrategy::SecondsSince1970 => {
                let seconds = date.timestamp_millis() as f64 / 1000.0;
                self.box_float(seconds, path)
            }
            DateEncodingStrategy::MillisecondsSince1970 => Ok(json!(date.timestamp_millis())),
            DateEncodingStrategy::Iso8601 => Ok(Value::String(format_iso(date))),
            DateEncodingStrategy::Formatted(format) => {
                let mut out = String::new();
                write!(out, "{}", date.format(format)).map_err(|_| {
                    ParseError::EncodingFailure(format!("invalid date format '{}'", format))
                })?;
                Ok(Value::String(out))
            }
            DateEncodingStrategy::Custom(closure) => {
                with_closure(context, path, |encoder| closure(date, encoder))
            }
        }
    }

    pub(crate) fn box_data<C: EncodingContext>(
        &self,
        data: &[u8],
        path: &str,
        context: &mut C,
    ) -> Result<Value, ParseError> {
        match &self.options.data_strategy {
            DataEncodingStrategy::ParseBytes => Ok(json!({
                "__type": "Bytes",
                "base64": BASE64.encode(data),
            })),
            DataEncodingStrategy::Base64 => Ok(Value::String(BASE64.encode(data))),
            DataEncodingStrategy::ByteArray => Ok(json!(data)),
            DataEncodingStrategy::Custom(closure) => {
                with_closure(context, path, |encoder| closure(data, encoder))
            }
        }
    }

    pub(crate) fn box_decimal(&self, text: &str, path: &str) -> Result<Value, ParseError> {
        text.parse::<Number>().map(Value::Number).map_err(|e| {
            ParseError::EncodingFailure(format!("invalid decimal '{}' at '{}': {}", text, path, e))
        })
    }
}

// Runs a custom closure over the context's stack. The stack is put back to
// its previous depth whether the closure succeeds or fails.
fn with_closure<C, F>(context: &mut C, path: &str, f: F) -> Result<Value, ParseError>
where
    C: EncodingContext,
    F: FnOnce(&mut SingleValueEncoder<'_>) -> Result<(), ParseError>,
{
    let depth = context.storage().len();
    let result = {
        let mut encoder = SingleValueEncoder {
            context: &mut *context,
            depth,
            path,
        };
        f(&mut encoder)
    };
    let storage = context.storage();
    if let Err(e) = result {
        storage.truncate(depth);
        return Err(e);
    }
    if storage.len() > depth {
        let value = storage.pop().unwrap_or(Value::Null);
        storage.truncate(depth);
        Ok(value)
    } else {
        Ok(Value::Object(Map::new()))
    }
}

//! Codecs - conversion between values and object/item rows
//!
//! A codec owns one type tag. Scalar codecs turn a value into a single
//! [`Payload`]; nested codecs turn it into child values addressed by [`Slot`]s,
//! which are encoded recursively. The [`Registry`] resolves a codec by value
//! (encoding) or by tag (decoding); codecs registered later win.

use std::collections::BTreeMap;

use crate::array::{DType, NdArray};
use crate::storage::{Payload, Slot};
use crate::value::{Value, float_text};
use crate::{Error, Result};

/// Built-in type tags, as stored in `objects.type`
pub mod tags {
    pub const NONE: &str = "NoneType";
    pub const BOOL: &str = "bool";
    pub const INT: &str = "int";
    pub const FLOAT: &str = "float";
    pub const STR: &str = "str";
    pub const LIST: &str = "list";
    pub const TUPLE: &str = "tuple";
    pub const DICT: &str = "dict";
    pub const NDARRAY: &str = "ndarray";
}

/// Item key of an array's shape tuple
pub const SHAPE_KEY: &str = "shape";
/// Item key of an array's dtype descriptor
pub const DTYPE_KEY: &str = "dtype";

/// The row-level form of a value
#[derive(Debug, Clone, PartialEq)]
pub enum Encoded {
    Scalar(Payload),
    Nested(Vec<(Slot, Value)>),
}

/// Converts one kind of value to and from rows.
pub trait Codec {
    /// Tag stored in `objects.type`
    fn tag(&self) -> &str;

    fn is_nested(&self) -> bool;

    /// Whether this codec handles the value
    fn accepts(&self, value: &Value) -> bool;

    fn encode(&self, value: &Value) -> Result<Encoded>;

    /// Rebuild a value from its payload and its already decoded children
    fn decode(&self, payload: &Payload, children: Vec<(Slot, Value)>) -> Result<Value>;
}

/// Codecs for the built-in value variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Null,
    Bool,
    Int,
    Float,
    Text,
    List,
    Tuple,
    Dict,
    NdArray,
}

impl Builtin {
    pub fn all() -> &'static [Builtin] {
        &[
            Builtin::Null,
            Builtin::Bool,
            Builtin::Int,
            Builtin::Float,
            Builtin::Text,
            Builtin::List,
            Builtin::Tuple,
            Builtin::Dict,
            Builtin::NdArray,
        ]
    }

    fn corrupted(&self, payload: &Payload) -> Error {
        Error::CorruptedState(format!("{} object carries payload {:?}", self.tag(), payload))
    }
}

impl Codec for Builtin {
    fn tag(&self) -> &str {
        match self {
            Builtin::Null => tags::NONE,
            Builtin::Bool => tags::BOOL,
            Builtin::Int => tags::INT,
            Builtin::Float => tags::FLOAT,
            Builtin::Text => tags::STR,
            Builtin::List => tags::LIST,
            Builtin::Tuple => tags::TUPLE,
            Builtin::Dict => tags::DICT,
            Builtin::NdArray => tags::NDARRAY,
        }
    }

    fn is_nested(&self) -> bool {
        matches!(self, Builtin::List | Builtin::Tuple | Builtin::Dict | Builtin::NdArray)
    }

    fn accepts(&self, value: &Value) -> bool {
        value.type_tag() == self.tag()
    }

    fn encode(&self, value: &Value) -> Result<Encoded> {
        let encoded = match (self, value) {
            (Builtin::Null, Value::Null) => Encoded::Scalar(Payload::Empty),
            (Builtin::Bool, Value::Bool(b)) => Encoded::Scalar(Payload::Bool(*b)),
            (Builtin::Int, Value::Int(i)) => Encoded::Scalar(Payload::Int(*i)),
            (Builtin::Float, Value::Float(f)) if f.is_finite() => Encoded::Scalar(Payload::Real(*f)),
            (Builtin::Float, Value::Float(f)) => Encoded::Scalar(Payload::Text(float_text(*f))),
            (Builtin::Text, Value::Text(s)) => Encoded::Scalar(Payload::Text(s.clone())),
            (Builtin::List, Value::List(items)) | (Builtin::Tuple, Value::Tuple(items)) => Encoded::Nested(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (Slot::Ind(i as i64), v.clone()))
                    .collect(),
            ),
            (Builtin::Dict, Value::Map(entries)) => Encoded::Nested(
                entries
                    .iter()
                    .map(|(k, v)| (Slot::Key(k.clone()), v.clone()))
                    .collect(),
            ),
            (Builtin::NdArray, Value::Array(array)) => {
                let mut children = Vec::with_capacity(array.size() + 2);
                children.push((Slot::Key(SHAPE_KEY.to_string()), encode_shape(array.shape())));
                children.push((Slot::Key(DTYPE_KEY.to_string()), Value::Text(array.dtype().to_string())));
                children.extend(
                    array
                        .data()
                        .iter()
                        .enumerate()
                        .map(|(i, v)| (Slot::Ind(i as i64), v.clone())),
                );
                Encoded::Nested(children)
            }
            _ => {
                return Err(Error::TypeMismatch(format!(
                    "{} codec cannot encode a {} value",
                    self.tag(),
                    value.type_tag()
                )));
            }
        };
        Ok(encoded)
    }

    fn decode(&self, payload: &Payload, children: Vec<(Slot, Value)>) -> Result<Value> {
        match self {
            Builtin::Null => match payload {
                Payload::Empty => Ok(Value::Null),
                other => Err(self.corrupted(other)),
            },
            Builtin::Bool => match payload {
                Payload::Bool(b) => Ok(Value::Bool(*b)),
                Payload::Int(i) => Ok(Value::Bool(*i != 0)),
                other => Err(self.corrupted(other)),
            },
            Builtin::Int => match payload {
                Payload::Int(i) => Ok(Value::Int(*i)),
                other => Err(self.corrupted(other)),
            },
            Builtin::Float => match payload {
                Payload::Real(f) => Ok(Value::Float(*f)),
                Payload::Int(i) => Ok(Value::Float(*i as f64)),
                Payload::Text(t) => match t.as_str() {
                    "+inf" => Ok(Value::Float(f64::INFINITY)),
                    "-inf" => Ok(Value::Float(f64::NEG_INFINITY)),
                    "nan" => Ok(Value::Float(f64::NAN)),
                    _ => Err(self.corrupted(payload)),
                },
                other => Err(self.corrupted(other)),
            },
            Builtin::Text => match payload {
                Payload::Text(t) => Ok(Value::Text(t.clone())),
                other => Err(self.corrupted(other)),
            },
            Builtin::List => Ok(Value::List(indexed_values(self.tag(), children)?)),
            Builtin::Tuple => Ok(Value::Tuple(indexed_values(self.tag(), children)?)),
            Builtin::Dict => {
                let mut entries = BTreeMap::new();
                for (slot, value) in children {
                    match slot {
                        Slot::Key(k) => {
                            entries.insert(k, value);
                        }
                        Slot::Ind(i) => {
                            return Err(Error::CorruptedState(format!("dict object has an item at index {}", i)));
                        }
                    }
                }
                Ok(Value::Map(entries))
            }
            Builtin::NdArray => {
                let mut shape = None;
                let mut dtype = None;
                let mut elements = Vec::new();
                for (slot, value) in children {
                    match slot {
                        Slot::Key(k) if k == SHAPE_KEY => shape = Some(decode_shape(&value)?),
                        Slot::Key(k) if k == DTYPE_KEY => dtype = Some(decode_dtype(&value)?),
                        Slot::Key(k) => {
                            return Err(Error::CorruptedState(format!("ndarray object has unexpected key {:?}", k)));
                        }
                        Slot::Ind(i) => elements.push((i, value)),
                    }
                }
                let shape = shape.ok_or_else(|| Error::CorruptedState("ndarray object has no shape".to_string()))?;
                let dtype = dtype.ok_or_else(|| Error::CorruptedState("ndarray object has no dtype".to_string()))?;
                let data = dense(tags::NDARRAY, elements)?;
                NdArray::new(shape, dtype, data).map(Value::Array)
            }
        }
    }
}

/// Values of index-addressed children, which must be exactly 0..len
fn indexed_values(tag: &str, children: Vec<(Slot, Value)>) -> Result<Vec<Value>> {
    let mut elements = Vec::with_capacity(children.len());
    for (slot, value) in children {
        match slot {
            Slot::Ind(i) => elements.push((i, value)),
            Slot::Key(k) => {
                return Err(Error::CorruptedState(format!("{} object has an item keyed {:?}", tag, k)));
            }
        }
    }
    dense(tag, elements)
}

fn dense(tag: &str, mut elements: Vec<(i64, Value)>) -> Result<Vec<Value>> {
    elements.sort_by_key(|(i, _)| *i);
    for (expected, (ind, _)) in elements.iter().enumerate() {
        if *ind != expected as i64 {
            return Err(Error::CorruptedState(format!(
                "{} object has index {} where {} was expected",
                tag, ind, expected
            )));
        }
    }
    Ok(elements.into_iter().map(|(_, v)| v).collect())
}

/// Shape as the tuple value stored under [`SHAPE_KEY`]
pub fn encode_shape(shape: &[usize]) -> Value {
    Value::Tuple(shape.iter().map(|&d| Value::Int(d as i64)).collect())
}

pub fn decode_shape(value: &Value) -> Result<Vec<usize>> {
    let dims = value
        .as_slice()
        .ok_or_else(|| Error::CorruptedState(format!("array shape is {} rather than a tuple", value)))?;
    dims.iter()
        .map(|d| {
            d.as_i64()
                .and_then(|d| usize::try_from(d).ok())
                .ok_or_else(|| Error::CorruptedState(format!("invalid array dimension {}", d)))
        })
        .collect()
}

pub fn decode_dtype(value: &Value) -> Result<DType> {
    value
        .as_str()
        .ok_or_else(|| Error::CorruptedState(format!("array dtype is {} rather than text", value)))?
        .parse()
}

/// Tag-to-codec registry owned by a database handle
pub struct Registry {
    codecs: Vec<Box<dyn Codec>>,
}

impl Registry {
    /// Registry with the built-in codecs
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for builtin in Builtin::all() {
            registry.register(Box::new(*builtin));
        }
        registry
    }

    /// Registry without any codec
    pub fn empty() -> Self {
        Self { codecs: Vec::new() }
    }

    /// Add a codec; it takes priority over everything registered before it
    pub fn register(&mut self, codec: Box<dyn Codec>) {
        tracing::debug!(tag = codec.tag(), nested = codec.is_nested(), "registering codec");
        self.codecs.push(codec);
    }

    /// Codec for encoding a value
    pub fn for_value(&self, value: &Value) -> Result<&dyn Codec> {
        self.codecs
            .iter()
            .rev()
            .find(|c| c.accepts(value))
            .map(|c| c.as_ref())
            .ok_or_else(|| Error::UnsupportedType(format!("no codec accepts a {} value", value.type_tag())))
    }

    /// Codec for decoding an object of this tag
    pub fn for_tag(&self, tag: &str) -> Result<&dyn Codec> {
        self.codecs
            .iter()
            .rev()
            .find(|c| c.tag() == tag)
            .map(|c| c.as_ref())
            .ok_or_else(|| Error::UnsupportedType(format!("no codec for type tag {:?}", tag)))
    }

    /// Whether objects of this tag own children; unknown tags count as nested
    pub fn is_nested_tag(&self, tag: &str) -> bool {
        self.for_tag(tag).map_or(true, |c| c.is_nested())
    }

    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.codecs.iter().map(|c| c.tag()).collect();
        tags.sort_unstable();
        tags.dedup();
        tags
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

//! Value - the closed set of persistable runtime values

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::array::NdArray;
use crate::codec::tags;
use crate::{Error, Result};

/// A runtime value that can be persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
    /// Like a list, but never mutated once stored
    Tuple(Vec<Value>),
    /// String-keyed map; iterates in key order
    Map(BTreeMap<String, Value>),
    Array(NdArray),
}

impl Value {
    pub fn tuple(values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Value::Tuple(values.into_iter().map(Into::into).collect())
    }

    pub fn map<K: Into<String>, V: Into<Value>>(entries: impl IntoIterator<Item = (K, V)>) -> Self {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Tag of the built-in codec for this value
    pub fn type_tag(&self) -> &'static str {
        match self {
            Value::Null => tags::NONE,
            Value::Bool(_) => tags::BOOL,
            Value::Int(_) => tags::INT,
            Value::Float(_) => tags::FLOAT,
            Value::Text(_) => tags::STR,
            Value::List(_) => tags::LIST,
            Value::Tuple(_) => tags::TUPLE,
            Value::Map(_) => tags::DICT,
            Value::Array(_) => tags::NDARRAY,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Value::Null | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Text(_)
        )
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view of bools and ints
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float view of any numeric value
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            other => other.as_i64().map(|i| i as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_slice(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) | Value::Tuple(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Python truthiness
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::List(v) | Value::Tuple(v) => !v.is_empty(),
            Value::Map(m) => !m.is_empty(),
            Value::Array(a) => a.size() > 0,
        }
    }

    /// Ordering used by sorts; `None` for values that do not compare
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
                for (x, y) in a.iter().zip(b) {
                    match x.compare(y)? {
                        Ordering::Equal => continue,
                        unequal => return Some(unequal),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => Some(x.cmp(&y)),
                _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
            },
        }
    }

    // ========== Arithmetic ==========

    pub fn add(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => Ok(Value::Text(format!("{}{}", a, b))),
            (Value::List(a), Value::List(b)) => Ok(Value::List(a.iter().chain(b).cloned().collect())),
            (Value::Tuple(a), Value::Tuple(b)) => Ok(Value::Tuple(a.iter().chain(b).cloned().collect())),
            _ => self.numeric(other, "+", i64::checked_add, |a, b| a + b),
        }
    }

    pub fn sub(&self, other: &Value) -> Result<Value> {
        self.numeric(other, "-", i64::checked_sub, |a, b| a - b)
    }

    pub fn mul(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Text(s), Value::Int(n)) => Ok(Value::Text(s.repeat((*n).max(0) as usize))),
            (Value::List(v), Value::Int(n)) => {
                let n = (*n).max(0) as usize;
                Ok(Value::List(v.iter().cloned().cycle().take(v.len() * n).collect()))
            }
            _ => self.numeric(other, "*", i64::checked_mul, |a, b| a * b),
        }
    }

    /// True division; always produces a float
    pub fn div(&self, other: &Value) -> Result<Value> {
        match (self.as_f64(), other.as_f64()) {
            (Some(_), Some(d)) if d == 0.0 => Err(Error::TypeMismatch("division by zero".to_string())),
            (Some(a), Some(b)) => Ok(Value::Float(a / b)),
            _ => Err(self.operand_error("/", other)),
        }
    }

    fn numeric(
        &self,
        other: &Value,
        op: &str,
        int_op: fn(i64, i64) -> Option<i64>,
        float_op: fn(f64, f64) -> f64,
    ) -> Result<Value> {
        if let (Some(a), Some(b)) = (self.as_i64(), other.as_i64()) {
            return int_op(a, b)
                .map(Value::Int)
                .ok_or_else(|| Error::TypeMismatch(format!("integer overflow in {} {} {}", a, op, b)));
        }
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => Ok(Value::Float(float_op(a, b))),
            _ => Err(self.operand_error(op, other)),
        }
    }

    fn operand_error(&self, op: &str, other: &Value) -> Error {
        Error::TypeMismatch(format!(
            "unsupported operand types for {}: '{}' and '{}'",
            op,
            self.type_tag(),
            other.type_tag()
        ))
    }

    // ========== JSON ==========

    /// Convert from JSON; arrays become lists and objects become maps
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => Value::List(items.into_iter().map(Value::from_json).collect()),
            serde_json::Value::Object(entries) => {
                Value::Map(entries.into_iter().map(|(k, v)| (k, Value::from_json(v))).collect())
            }
        }
    }

    /// Convert to JSON; tuples and arrays become nested lists, non-finite floats become strings
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(float_text(*f))),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::List(v) | Value::Tuple(v) => serde_json::Value::Array(v.iter().map(Value::to_json).collect()),
            Value::Map(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Array(a) => a.tolist().to_json(),
        }
    }
}

/// Text form of a float, matching how non-finite values are stored
pub fn float_text(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        let sign = if f > 0.0 { '+' } else { '-' };
        format!("{}inf", sign)
    } else {
        format!("{:?}", f)
    }
}

fn write_seq(f: &mut fmt::Formatter<'_>, values: &[Value]) -> fmt::Result {
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", v)?;
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", float_text(*x)),
            Value::Text(s) => write!(f, "{:?}", s),
            Value::List(v) => {
                write!(f, "[")?;
                write_seq(f, v)?;
                write!(f, "]")
            }
            Value::Tuple(v) => {
                write!(f, "(")?;
                write_seq(f, v)?;
                if v.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Value::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Array(a) => write!(f, "array({}, dtype={})", a.tolist(), a.dtype()),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<NdArray> for Value {
    fn from(a: NdArray) -> Self {
        Value::Array(a)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<V: Into<Value>> From<BTreeMap<String, V>> for Value {
    fn from(m: BTreeMap<String, V>) -> Self {
        Value::Map(m.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(o: Option<T>) -> Self {
        o.map_or(Value::Null, Into::into)
    }
}

//! N-dimensional arrays
//!
//! An [`NdArray`] is a shape, a dtype and row-major element data. Elements
//! are plain [`Value`]s already coerced to the dtype.

use std::str::FromStr;

use crate::index::{self, Index, size_of, strides, unravel};
use crate::value::Value;
use crate::{Error, Result};

/// Element type of an array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Bool,
    Int64,
    Float64,
    Str,
    /// Any value, stored without coercion
    Object,
}

impl DType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::Int64 => "int64",
            DType::Float64 => "float64",
            DType::Str => "str",
            DType::Object => "object",
        }
    }

    /// Smallest dtype holding all values (float64 for no values)
    pub fn infer(values: &[Value]) -> DType {
        let mut dtype: Option<DType> = None;
        for value in values {
            let kind = match value {
                Value::Bool(_) => DType::Bool,
                Value::Int(_) => DType::Int64,
                Value::Float(_) => DType::Float64,
                Value::Text(_) => DType::Str,
                _ => return DType::Object,
            };
            dtype = Some(match (dtype, kind) {
                (None, k) => k,
                (Some(a), b) if a == b => a,
                (Some(DType::Bool | DType::Int64), DType::Bool | DType::Int64) => DType::Int64,
                (Some(DType::Bool | DType::Int64 | DType::Float64), DType::Bool | DType::Int64 | DType::Float64) => {
                    DType::Float64
                }
                _ => return DType::Object,
            });
        }
        dtype.unwrap_or(DType::Float64)
    }

    /// Cast a value to this dtype, the way numpy does on assignment
    pub fn coerce(&self, value: &Value) -> Result<Value> {
        let mismatch = || Error::TypeMismatch(format!("cannot store {} in a {} array", value, self));
        match (self, value) {
            (DType::Object, v) => Ok(v.clone()),

            (DType::Bool, Value::Bool(b)) => Ok(Value::Bool(*b)),
            (DType::Bool, Value::Int(i)) => Ok(Value::Bool(*i != 0)),
            (DType::Bool, Value::Float(f)) => Ok(Value::Bool(*f != 0.0)),

            (DType::Int64, Value::Bool(b)) => Ok(Value::Int(i64::from(*b))),
            (DType::Int64, Value::Int(i)) => Ok(Value::Int(*i)),
            (DType::Int64, Value::Float(f)) => {
                let t = f.trunc();
                if t.is_finite() && t >= i64::MIN as f64 && t <= i64::MAX as f64 {
                    Ok(Value::Int(t as i64))
                } else {
                    Err(mismatch())
                }
            }
            (DType::Int64, Value::Text(s)) => s.trim().parse().map(Value::Int).map_err(|_| mismatch()),

            (DType::Float64, Value::Text(s)) => s.trim().parse().map(Value::Float).map_err(|_| mismatch()),
            (DType::Float64, v) => v.as_f64().map(Value::Float).ok_or_else(mismatch),

            (DType::Str, Value::Text(s)) => Ok(Value::Text(s.clone())),
            (DType::Str, v) if v.is_scalar() => Ok(Value::Text(v.to_string())),

            _ => Err(mismatch()),
        }
    }
}

impl FromStr for DType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bool" => Ok(DType::Bool),
            "int" | "int64" => Ok(DType::Int64),
            "float" | "float64" => Ok(DType::Float64),
            "str" => Ok(DType::Str),
            "object" => Ok(DType::Object),
            _ => Err(Error::UnsupportedType(format!("dtype {}", s))),
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    shape: Vec<usize>,
    dtype: DType,
    data: Vec<Value>,
}

impl NdArray {
    /// Build an array, coercing every element to `dtype`
    pub fn new(shape: Vec<usize>, dtype: DType, data: Vec<Value>) -> Result<Self> {
        if size_of(&shape) != data.len() {
            return Err(Error::ShapeMismatch { from: vec![data.len()], to: shape });
        }
        let data = data.iter().map(|v| dtype.coerce(v)).collect::<Result<Vec<_>>>()?;
        Ok(Self { shape, dtype, data })
    }

    /// One-dimensional array with an inferred dtype
    pub fn from_vec(values: Vec<Value>) -> Result<Self> {
        let dtype = DType::infer(&values);
        Self::new(vec![values.len()], dtype, values)
    }

    /// Zero-dimensional array holding one value
    pub fn scalar(value: Value) -> Result<Self> {
        let dtype = DType::infer(std::slice::from_ref(&value));
        Self::new(Vec::new(), dtype, vec![value])
    }

    /// Build from nested lists/tuples; sub-sequences must be rectangular
    pub fn from_nested(value: &Value) -> Result<Self> {
        let mut shape = Vec::new();
        let mut probe = value;
        loop {
            match probe {
                Value::List(items) | Value::Tuple(items) => {
                    shape.push(items.len());
                    match items.first() {
                        Some(first) => probe = first,
                        None => break,
                    }
                }
                Value::Array(a) => {
                    shape.extend_from_slice(a.shape());
                    break;
                }
                _ => break,
            }
        }

        let mut data = Vec::with_capacity(size_of(&shape));
        flatten_into(value, &shape, &mut data)?;
        let dtype = DType::infer(&data);
        Self::new(shape, dtype, data)
    }

    /// `0..n` as int64
    pub fn arange(n: usize) -> Self {
        Self {
            shape: vec![n],
            dtype: DType::Int64,
            data: (0..n as i64).map(Value::Int).collect(),
        }
    }

    pub fn zeros(shape: Vec<usize>, dtype: DType) -> Self {
        let zero = match dtype {
            DType::Bool => Value::Bool(false),
            DType::Int64 => Value::Int(0),
            DType::Float64 => Value::Float(0.0),
            DType::Str => Value::Text(String::new()),
            DType::Object => Value::Int(0),
        };
        let data = vec![zero; size_of(&shape)];
        Self { shape, dtype, data }
    }

    pub fn reshape(self, shape: Vec<usize>) -> Result<Self> {
        if size_of(&shape) != self.data.len() {
            return Err(Error::ShapeMismatch { from: self.shape, to: shape });
        }
        Ok(Self { shape, ..self })
    }

    pub fn astype(&self, dtype: DType) -> Result<Self> {
        Self::new(self.shape.clone(), dtype, self.data.clone())
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn data(&self) -> &[Value] {
        &self.data
    }

    pub fn into_data(self) -> Vec<Value> {
        self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Element at a full multi-index
    pub fn get(&self, coords: &[usize]) -> Option<&Value> {
        if coords.len() != self.shape.len() || coords.iter().zip(&self.shape).any(|(c, d)| c >= d) {
            return None;
        }
        self.data.get(index::ravel(coords, &self.shape))
    }

    /// Copy out the elements selected by an index expression
    pub fn select(&self, index: &[Index]) -> Result<NdArray> {
        let resolved = index::resolve_materialized(&self.shape, index)?;
        let data = resolved.flat.iter().map(|&i| self.data[i].clone()).collect();
        Ok(Self { shape: resolved.shape, dtype: self.dtype, data })
    }

    /// Broadcast to `shape`, aligning trailing dimensions
    pub fn broadcast_to(&self, shape: &[usize]) -> Result<NdArray> {
        let mismatch = || Error::ShapeMismatch { from: self.shape.clone(), to: shape.to_vec() };

        let mut src: &[usize] = &self.shape;
        while src.len() > shape.len() && src.first() == Some(&1) {
            src = &src[1..];
        }
        if src.len() > shape.len() {
            return Err(mismatch());
        }
        let offset = shape.len() - src.len();
        if src.iter().enumerate().any(|(i, &d)| d != 1 && d != shape[offset + i]) {
            return Err(mismatch());
        }

        let src_strides = strides(src);
        let data = (0..size_of(shape))
            .map(|flat| {
                let coords = unravel(flat, shape);
                let pos: usize = src
                    .iter()
                    .enumerate()
                    .map(|(i, &d)| if d == 1 { 0 } else { coords[offset + i] * src_strides[i] })
                    .sum();
                self.data[pos].clone()
            })
            .collect();
        Ok(Self { shape: shape.to_vec(), dtype: self.dtype, data })
    }

    /// Nested lists; a zero-dimensional array gives its element
    pub fn tolist(&self) -> Value {
        nest(&self.shape, &self.data)
    }
}

fn nest(shape: &[usize], data: &[Value]) -> Value {
    match shape.split_first() {
        None => data.first().cloned().unwrap_or(Value::Null),
        Some((&n, rest)) => {
            let step = size_of(rest);
            Value::List((0..n).map(|i| nest(rest, &data[i * step..(i + 1) * step])).collect())
        }
    }
}

fn flatten_into(value: &Value, shape: &[usize], out: &mut Vec<Value>) -> Result<()> {
    let ragged = || Error::TypeMismatch(format!("cannot build a rectangular array of shape {:?}", shape));
    match shape.split_first() {
        None => match value {
            Value::List(_) | Value::Tuple(_) => Err(ragged()),
            Value::Array(a) if a.ndim() > 0 => Err(ragged()),
            Value::Array(a) => {
                out.extend(a.data().iter().cloned());
                Ok(())
            }
            v => {
                out.push(v.clone());
                Ok(())
            }
        },
        Some((&n, rest)) => match value {
            Value::List(items) | Value::Tuple(items) if items.len() == n => {
                for item in items {
                    flatten_into(item, rest, out)?;
                }
                Ok(())
            }
            Value::Array(a) if a.shape() == shape => {
                out.extend(a.data().iter().cloned());
                Ok(())
            }
            _ => Err(ragged()),
        },
    }
}

//! Scalar handles
//!
//! A scalar is addressed through its referrer rather than its id: rebinding
//! may move the referrer to a different (deduplicated) object.

use crate::array::DType;
use crate::database::{Database, Referrer};
use crate::value::Value;
use crate::{Error, Result};

use super::Stored;

pub struct Scalar<'db> {
    db: &'db Database,
    referrer: Referrer,
    /// Element dtype when the scalar lives inside an array
    dtype: Option<DType>,
}

impl<'db> Scalar<'db> {
    pub(crate) fn new(db: &'db Database, referrer: Referrer) -> Self {
        Self { db, referrer, dtype: None }
    }

    pub(crate) fn with_dtype(db: &'db Database, referrer: Referrer, dtype: DType) -> Self {
        Self { db, referrer, dtype: Some(dtype) }
    }

    pub fn dtype(&self) -> Option<DType> {
        self.dtype
    }

    /// Replace the value, updating the row in place when nothing else shares it
    pub fn set(&self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let value = match self.dtype {
            Some(dtype) => dtype.coerce(&value)?,
            None => value,
        };
        self.db.mutate(|| self.db.rebind(&self.referrer, &value).map(|_| ()))
    }

    pub fn as_i64(&self) -> Result<i64> {
        let value = self.value()?;
        value.as_i64().ok_or_else(|| mismatch("an integer", &value))
    }

    pub fn as_f64(&self) -> Result<f64> {
        let value = self.value()?;
        value.as_f64().ok_or_else(|| mismatch("a number", &value))
    }

    pub fn as_bool(&self) -> Result<bool> {
        let value = self.value()?;
        value.as_bool().ok_or_else(|| mismatch("a bool", &value))
    }

    pub fn as_string(&self) -> Result<String> {
        match self.value()? {
            Value::Text(s) => Ok(s),
            other => Err(mismatch("text", &other)),
        }
    }

    // ========== Arithmetic ==========

    pub fn add(&self, other: impl Into<Value>) -> Result<Value> {
        self.value()?.add(&other.into())
    }

    pub fn sub(&self, other: impl Into<Value>) -> Result<Value> {
        self.value()?.sub(&other.into())
    }

    pub fn mul(&self, other: impl Into<Value>) -> Result<Value> {
        self.value()?.mul(&other.into())
    }

    pub fn div(&self, other: impl Into<Value>) -> Result<Value> {
        self.value()?.div(&other.into())
    }

    pub fn add_assign(&self, other: impl Into<Value>) -> Result<()> {
        self.set(self.add(other)?)
    }

    pub fn sub_assign(&self, other: impl Into<Value>) -> Result<()> {
        self.set(self.sub(other)?)
    }

    pub fn mul_assign(&self, other: impl Into<Value>) -> Result<()> {
        self.set(self.mul(other)?)
    }

    pub fn div_assign(&self, other: impl Into<Value>) -> Result<()> {
        self.set(self.div(other)?)
    }

    // ========== Text ==========

    /// Length of a text value, in characters
    pub fn len(&self) -> Result<usize> {
        Ok(self.as_string()?.chars().count())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn push_str(&self, suffix: &str) -> Result<()> {
        let mut text = self.as_string()?;
        text.push_str(suffix);
        self.set(text)
    }
}

impl<'db> Stored<'db> for Scalar<'db> {
    fn db(&self) -> &'db Database {
        self.db
    }

    fn referrer(&self) -> Option<&Referrer> {
        Some(&self.referrer)
    }
}

fn mismatch(wanted: &str, found: &Value) -> Error {
    Error::TypeMismatch(format!("expected {}, found {} {}", wanted, found.type_tag(), found))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let db = Database::open_in_memory().unwrap();
        db.set("i", 4).unwrap();
        db.set("s", "abc").unwrap();

        let i = db.get("i").unwrap().into_scalar().unwrap();
        assert_eq!(i.as_i64().unwrap(), 4);
        assert_eq!(i.as_f64().unwrap(), 4.0);
        assert!(matches!(i.as_bool(), Err(Error::TypeMismatch(_))));

        let s = db.get("s").unwrap().into_scalar().unwrap();
        assert_eq!(s.as_string().unwrap(), "abc");
        assert_eq!(s.len().unwrap(), 3);
        assert!(matches!(s.as_i64(), Err(Error::TypeMismatch(_))));
    }

    #[test]
    fn test_arithmetic_assign() {
        let db = Database::open_in_memory().unwrap();
        db.set("n", 10).unwrap();
        let n = db.get("n").unwrap().into_scalar().unwrap();

        assert_eq!(n.add(5).unwrap(), Value::Int(15));
        n.add_assign(5).unwrap();
        n.mul_assign(2).unwrap();
        n.sub_assign(6).unwrap();
        assert_eq!(db.value("n").unwrap(), Value::Int(24));

        n.div_assign(4).unwrap();
        assert_eq!(db.value("n").unwrap(), Value::Float(6.0));
        assert!(matches!(n.div(0), Err(Error::TypeMismatch(_))));
    }

    #[test]
    fn test_assign_on_shared_scalar() {
        let db = Database::open_in_memory().unwrap();
        db.set("a", 1).unwrap();
        db.set("b", 1).unwrap();

        db.get("a").unwrap().into_scalar().unwrap().add_assign(1).unwrap();
        assert_eq!(db.value("a").unwrap(), Value::Int(2));
        assert_eq!(db.value("b").unwrap(), Value::Int(1));
    }

    #[test]
    fn test_push_str() {
        let db = Database::open_in_memory().unwrap();
        db.set("s", "ab").unwrap();
        let s = db.get("s").unwrap().into_scalar().unwrap();
        s.push_str("cd").unwrap();
        assert_eq!(db.value("s").unwrap(), Value::from("abcd"));
        assert!(!s.is_empty().unwrap());
    }

    #[test]
    fn test_delete_scalar() {
        let db = Database::open_in_memory().unwrap();
        db.set("x", 3).unwrap();
        db.get("x").unwrap().into_scalar().unwrap().delete().unwrap();
        assert!(!db.contains("x").unwrap());
        assert_eq!(db.stats().unwrap().objects, 0);
    }
}

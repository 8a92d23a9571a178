//! Views - lazy handles onto stored objects
//!
//! A handle keeps the database borrow and enough addressing (an object id,
//! the referrer it was reached through) to read or mutate rows on demand.
//! Nothing is cached: every read goes back to the store.

pub mod array;
pub mod mapping;
pub mod scalar;
pub mod sequence;

pub use array::ArrayView;
pub use mapping::Mapping;
pub use scalar::Scalar;
pub use sequence::Sequence;

use crate::database::{Database, Referrer};
use crate::value::Value;
use crate::{Error, Result};

/// What every handle onto a stored object can do
pub trait Stored<'db> {
    fn db(&self) -> &'db Database;

    /// How the object was reached; derived views have none
    fn referrer(&self) -> Option<&Referrer>;

    /// Id of the object behind the handle
    fn id(&self) -> Result<i64> {
        let referrer = self.referrer().ok_or_else(|| derived("has no object id"))?;
        self.db()
            .target(referrer)?
            .ok_or_else(|| Error::NotFound(referrer.to_string()))
    }

    /// Fully materialized value
    fn value(&self) -> Result<Value> {
        self.db().load(self.id()?)
    }

    fn ref_count(&self) -> Result<usize> {
        self.db().ref_count(self.id()?)
    }

    /// Remove the edge this handle was reached through and release the object.
    /// List elements close the gap they leave; tuple and array elements refuse.
    fn delete(&self) -> Result<()> {
        let db = self.db();
        let referrer = self.referrer().ok_or_else(|| derived("cannot be deleted"))?;
        db.mutate(|| db.unlink(referrer))
    }
}

fn derived(what: &str) -> Error {
    Error::TypeMismatch(format!("a derived view {}", what))
}

/// Handle to an object whose codec is nested but has no dedicated view
pub struct Opaque<'db> {
    db: &'db Database,
    id: i64,
    referrer: Option<Referrer>,
    tag: String,
}

impl<'db> Opaque<'db> {
    pub(crate) fn new(db: &'db Database, id: i64, referrer: Option<Referrer>, tag: String) -> Self {
        Self { db, id, referrer, tag }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl<'db> Stored<'db> for Opaque<'db> {
    fn db(&self) -> &'db Database {
        self.db
    }

    fn referrer(&self) -> Option<&Referrer> {
        self.referrer.as_ref()
    }

    fn id(&self) -> Result<i64> {
        Ok(self.id)
    }
}

/// A handle of whichever kind the stored type calls for
pub enum Handle<'db> {
    Scalar(Scalar<'db>),
    Sequence(Sequence<'db>),
    Mapping(Mapping<'db>),
    Array(ArrayView<'db>),
    Opaque(Opaque<'db>),
}

macro_rules! dispatch {
    ($handle:expr, $h:ident => $body:expr) => {
        match $handle {
            Handle::Scalar($h) => $body,
            Handle::Sequence($h) => $body,
            Handle::Mapping($h) => $body,
            Handle::Array($h) => $body,
            Handle::Opaque($h) => $body,
        }
    };
}

impl<'db> Handle<'db> {
    pub fn id(&self) -> Result<i64> {
        dispatch!(self, h => h.id())
    }

    pub fn value(&self) -> Result<Value> {
        dispatch!(self, h => h.value())
    }

    pub fn ref_count(&self) -> Result<usize> {
        dispatch!(self, h => h.ref_count())
    }

    pub fn delete(&self) -> Result<()> {
        dispatch!(self, h => Stored::delete(h))
    }

    /// Type tag of the stored object
    pub fn type_tag(&self) -> Result<String> {
        let id = self.id()?;
        let db = dispatch!(self, h => h.db());
        db.store()
            .object_type(id)?
            .ok_or_else(|| Error::CorruptedState(format!("object {} is referenced but missing", id)))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Handle::Scalar(_) => "scalar",
            Handle::Sequence(_) => "sequence",
            Handle::Mapping(_) => "mapping",
            Handle::Array(_) => "array",
            Handle::Opaque(_) => "opaque",
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar<'db>> {
        match self {
            Handle::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&Sequence<'db>> {
        match self {
            Handle::Sequence(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping<'db>> {
        match self {
            Handle::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayView<'db>> {
        match self {
            Handle::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn into_scalar(self) -> Result<Scalar<'db>> {
        match self {
            Handle::Scalar(s) => Ok(s),
            other => Err(other.wrong_kind("scalar")),
        }
    }

    pub fn into_sequence(self) -> Result<Sequence<'db>> {
        match self {
            Handle::Sequence(s) => Ok(s),
            other => Err(other.wrong_kind("sequence")),
        }
    }

    pub fn into_mapping(self) -> Result<Mapping<'db>> {
        match self {
            Handle::Mapping(m) => Ok(m),
            other => Err(other.wrong_kind("mapping")),
        }
    }

    pub fn into_array(self) -> Result<ArrayView<'db>> {
        match self {
            Handle::Array(a) => Ok(a),
            other => Err(other.wrong_kind("array")),
        }
    }

    fn wrong_kind(&self, wanted: &str) -> Error {
        Error::TypeMismatch(format!("expected a {} handle, found a {}", wanted, self.kind()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::NdArray;

    #[test]
    fn test_handle_kinds() {
        let db = Database::open_in_memory().unwrap();
        db.set("s", 1.5).unwrap();
        db.set("l", vec![1]).unwrap();
        db.set("t", Value::tuple([1])).unwrap();
        db.set("d", Value::map([("k", 1)])).unwrap();
        db.set("a", NdArray::arange(3)).unwrap();

        assert_eq!(db.get("s").unwrap().kind(), "scalar");
        assert_eq!(db.get("l").unwrap().kind(), "sequence");
        assert_eq!(db.get("t").unwrap().type_tag().unwrap(), "tuple");
        assert_eq!(db.get("d").unwrap().kind(), "mapping");
        assert_eq!(db.get("a").unwrap().kind(), "array");

        assert!(matches!(db.get("s").unwrap().into_sequence(), Err(Error::TypeMismatch(_))));
        assert_eq!(db.get("s").unwrap().into_scalar().unwrap().as_f64().unwrap(), 1.5);
    }

    #[test]
    fn test_handle_delete() {
        let db = Database::open_in_memory().unwrap();
        db.set("d", Value::map([("k", vec![1, 2])])).unwrap();

        let inner = db.get("d").unwrap().into_mapping().unwrap().get("k").unwrap();
        assert_eq!(inner.ref_count().unwrap(), 1);
        inner.delete().unwrap();
        assert_eq!(db.value("d").unwrap(), Value::Map(Default::default()));

        db.get("d").unwrap().delete().unwrap();
        assert_eq!(db.stats().unwrap().objects, 0);
    }
}

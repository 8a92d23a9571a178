//! Row types for the objects and items tables

use std::fmt;

/// The scalar payload of an object row.
///
/// Maps onto the four nullable value columns; at most one is populated.
/// Nested objects carry [`Payload::Empty`].
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Empty,
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
}

impl Payload {
    /// Split into (bool_val, int_val, real_val, txt_val) column values
    pub fn columns(&self) -> (Option<bool>, Option<i64>, Option<f64>, Option<&str>) {
        match self {
            Payload::Empty => (None, None, None, None),
            Payload::Bool(b) => (Some(*b), None, None, None),
            Payload::Int(i) => (None, Some(*i), None, None),
            Payload::Real(r) => (None, None, Some(*r), None),
            Payload::Text(t) => (None, None, None, Some(t.as_str())),
        }
    }

    /// Rebuild from column values, taking the first populated column
    pub fn from_columns(
        bool_val: Option<bool>,
        int_val: Option<i64>,
        real_val: Option<f64>,
        txt_val: Option<String>,
    ) -> Self {
        if let Some(b) = bool_val {
            Payload::Bool(b)
        } else if let Some(i) = int_val {
            Payload::Int(i)
        } else if let Some(r) = real_val {
            Payload::Real(r)
        } else if let Some(t) = txt_val {
            Payload::Text(t)
        } else {
            Payload::Empty
        }
    }
}

/// Address of a child inside its parent: a dense sequence index or a map key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    Ind(i64),
    Key(String),
}

impl Slot {
    pub fn ind(&self) -> Option<i64> {
        match self {
            Slot::Ind(i) => Some(*i),
            Slot::Key(_) => None,
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            Slot::Ind(_) => None,
            Slot::Key(k) => Some(k),
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Ind(i) => write!(f, "[{}]", i),
            Slot::Key(k) => write!(f, "[{:?}]", k),
        }
    }
}

/// One row of the objects table
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRow {
    pub id: i64,
    pub tag: String,
    pub payload: Payload,
}

/// One row of the items table
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRow {
    /// Parent object id
    pub id: i64,
    pub slot: Slot,
    pub child_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_columns() {
        let payload = Payload::Text("abc".to_string());
        let (b, i, r, t) = payload.columns();
        assert_eq!((b, i, r, t), (None, None, None, Some("abc")));

        let rebuilt = Payload::from_columns(b, i, r, t.map(str::to_string));
        assert_eq!(rebuilt, payload);
    }

    #[test]
    fn test_empty_payload() {
        assert_eq!(Payload::from_columns(None, None, None, None), Payload::Empty);
        assert_eq!(Payload::Empty.columns(), (None, None, None, None));
    }

    #[test]
    fn test_slot_display() {
        assert_eq!(Slot::Ind(3).to_string(), "[3]");
        assert_eq!(Slot::Key("a".into()).to_string(), "[\"a\"]");
        assert_eq!(Slot::Key("a".into()).ind(), None);
    }
}

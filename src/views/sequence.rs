//! List and tuple handles
//!
//! Elements are item rows keyed by `ind`, which always stays dense
//! (0..len). Structural edits renumber through the store's two-phase index
//! updates. A slice is a lazy view onto selected positions of its parent.

use std::cmp::Ordering;

use crate::database::{Database, Referrer};
use crate::index::slice_positions;
use crate::storage::Slot;
use crate::value::Value;
use crate::{Error, Result};

use super::{Handle, Stored};

pub struct Sequence<'db> {
    db: &'db Database,
    id: i64,
    referrer: Option<Referrer>,
    mutable: bool,
    /// Parent positions selected by a slice view
    positions: Option<Vec<i64>>,
}

impl<'db> Sequence<'db> {
    pub(crate) fn new(db: &'db Database, id: i64, referrer: Option<Referrer>, mutable: bool) -> Self {
        Self { db, id, referrer, mutable, positions: None }
    }

    pub fn is_tuple(&self) -> bool {
        !self.mutable
    }

    pub fn is_slice(&self) -> bool {
        self.positions.is_some()
    }

    pub fn len(&self) -> Result<usize> {
        match &self.positions {
            Some(positions) => Ok(positions.len()),
            None => self.db.store().count_indexed(self.id),
        }
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    // ========== Element Access ==========

    /// Handle to the element at `i`; negative values count from the end
    pub fn get(&self, i: i64) -> Result<Handle<'db>> {
        let pos = self.position(i)?;
        let child = self.child_at(pos)?;
        self.db.handle(child, self.item(pos))
    }

    pub fn get_value(&self, i: i64) -> Result<Value> {
        let pos = self.position(i)?;
        self.db.load(self.child_at(pos)?)
    }

    /// Rebind the element at `i`
    pub fn set(&self, i: i64, value: impl Into<Value>) -> Result<()> {
        self.ensure_mutable()?;
        let pos = self.position(i)?;
        let value = value.into();
        self.db.mutate(|| self.db.rebind(&self.item(pos), &value).map(|_| ()))
    }

    /// Rebind every selected element, in order
    pub fn assign(&self, values: impl IntoIterator<Item = impl Into<Value>>) -> Result<()> {
        self.ensure_mutable()?;
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let len = self.len()?;
        if values.len() != len {
            return Err(Error::Index(format!(
                "attempt to assign a sequence of size {} to a selection of size {}",
                values.len(),
                len
            )));
        }
        self.db.mutate(|| {
            for (i, value) in values.iter().enumerate() {
                let pos = self.position(i as i64)?;
                self.db.rebind(&self.item(pos), value)?;
            }
            Ok(())
        })
    }

    /// Remove the element at `i`, closing the gap
    pub fn delete(&self, i: i64) -> Result<()> {
        self.ensure_structural()?;
        let pos = self.position(i)?;
        self.db.mutate(|| self.remove_at(pos))
    }

    pub fn append(&self, value: impl Into<Value>) -> Result<()> {
        self.ensure_structural()?;
        let value = value.into();
        self.db.mutate(|| {
            let len = self.db.store().count_indexed(self.id)? as i64;
            self.db.attach(&self.item(len), &value).map(|_| ())
        })
    }

    /// Append several values in one commit
    pub fn extend(&self, values: impl IntoIterator<Item = impl Into<Value>>) -> Result<()> {
        self.ensure_structural()?;
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.db.mutate(|| {
            let len = self.db.store().count_indexed(self.id)? as i64;
            self.db.attach_many(self.id, len, &values)
        })
    }

    /// Insert before `i`; out-of-range positions clamp to either end
    pub fn insert(&self, i: i64, value: impl Into<Value>) -> Result<()> {
        self.ensure_structural()?;
        let value = value.into();
        let len = self.len()? as i64;
        let pos = if i < 0 { (i + len).max(0) } else { i.min(len) };
        self.db.mutate(|| {
            self.db.store().shift_indices(self.id, pos, 1)?;
            self.db.attach(&self.item(pos), &value).map(|_| ())
        })
    }

    /// Remove and return the element at `i` (the last one for `None`)
    pub fn pop(&self, i: Option<i64>) -> Result<Value> {
        self.ensure_structural()?;
        if self.len()? == 0 {
            return Err(Error::Index("pop from an empty sequence".to_string()));
        }
        let pos = self.position(i.unwrap_or(-1))?;
        self.db.mutate(|| {
            let value = self.db.load(self.child_at(pos)?)?;
            self.remove_at(pos)?;
            Ok(value)
        })
    }

    /// Remove the first element equal to `value`
    pub fn remove(&self, value: impl Into<Value>) -> Result<()> {
        self.ensure_structural()?;
        let pos = self.index(value)?;
        self.db.mutate(|| self.remove_at(pos as i64))
    }

    pub fn clear(&self) -> Result<()> {
        self.ensure_structural()?;
        self.db.mutate(|| self.db.clear_children(self.id))
    }

    pub fn reverse(&self) -> Result<()> {
        self.ensure_structural()?;
        let len = self.len()?;
        self.db.mutate(|| self.db.store().reverse_indices(self.id, len))
    }

    /// Stable sort by value ordering; fails without reordering anything when
    /// two elements do not compare
    pub fn sort(&self) -> Result<()> {
        self.ensure_structural()?;
        let values = self.values()?;
        let mut incomparable = None;
        let order = argsort(&values, |a, b| {
            a.compare(b).unwrap_or_else(|| {
                incomparable.get_or_insert((a.type_tag(), b.type_tag()));
                Ordering::Equal
            })
        });
        if let Some((a, b)) = incomparable {
            return Err(Error::TypeMismatch(format!(
                "'<' not supported between instances of '{}' and '{}'",
                a, b
            )));
        }
        self.permute(order)
    }

    /// Stable sort with a custom comparison
    pub fn sort_by(&self, compare: impl FnMut(&Value, &Value) -> Ordering) -> Result<()> {
        self.ensure_structural()?;
        let values = self.values()?;
        self.permute(argsort(&values, compare))
    }

    fn permute(&self, order: Vec<usize>) -> Result<()> {
        if order.iter().enumerate().all(|(position, &old)| position == old) {
            return Ok(());
        }
        let order: Vec<i64> = order.into_iter().map(|i| i as i64).collect();
        self.db.mutate(|| self.db.store().permute_indices(self.id, &order))
    }

    // ========== Queries ==========

    /// Position of the first element equal to `value`
    pub fn index(&self, value: impl Into<Value>) -> Result<usize> {
        let value = value.into();
        self.values()?
            .iter()
            .position(|v| *v == value)
            .ok_or_else(|| Error::NotFound(format!("{} is not in the sequence", value)))
    }

    pub fn count(&self, value: impl Into<Value>) -> Result<usize> {
        let value = value.into();
        Ok(self.values()?.iter().filter(|v| **v == value).count())
    }

    pub fn contains(&self, value: impl Into<Value>) -> Result<bool> {
        let value = value.into();
        Ok(self.values()?.contains(&value))
    }

    /// Every element, decoded
    pub fn values(&self) -> Result<Vec<Value>> {
        match &self.positions {
            Some(positions) => positions
                .iter()
                .map(|&pos| self.db.load(self.child_at(pos)?))
                .collect(),
            None => self
                .db
                .store()
                .children(self.id)?
                .into_iter()
                .filter(|item| matches!(item.slot, Slot::Ind(_)))
                .map(|item| self.db.load(item.child_id))
                .collect(),
        }
    }

    /// Lazily decode elements front to back
    pub fn iter(&self) -> Result<impl Iterator<Item = Result<Value>> + '_> {
        let len = self.len()? as i64;
        Ok((0..len).map(move |i| self.get_value(i)))
    }

    /// Lazy view of `start:stop:step`; it is as mutable as its parent
    pub fn slice(&self, start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Result<Sequence<'db>> {
        let len = self.len()?;
        let selected = slice_positions(len, start, stop, step)?;
        let positions = match &self.positions {
            Some(parent) => selected.iter().map(|&i| parent[i]).collect(),
            None => selected.iter().map(|&i| i as i64).collect(),
        };
        Ok(Sequence {
            db: self.db,
            id: self.id,
            referrer: None,
            mutable: self.mutable,
            positions: Some(positions),
        })
    }

    // ========== Internals ==========

    fn item(&self, pos: i64) -> Referrer {
        Referrer::item(self.id, Slot::Ind(pos))
    }

    /// Parent position of element `i` of this view
    fn position(&self, i: i64) -> Result<i64> {
        let len = self.len()? as i64;
        let wrapped = if i < 0 { i + len } else { i };
        if wrapped < 0 || wrapped >= len {
            return Err(Error::Index(format!("index {} out of range for length {}", i, len)));
        }
        Ok(match &self.positions {
            Some(positions) => positions[wrapped as usize],
            None => wrapped,
        })
    }

    fn child_at(&self, pos: i64) -> Result<i64> {
        self.db
            .store()
            .child(self.id, &Slot::Ind(pos))?
            .ok_or_else(|| Error::CorruptedState(format!("object {} has no item at [{}]", self.id, pos)))
    }

    fn remove_at(&self, pos: i64) -> Result<()> {
        self.db.unlink(&self.item(pos))
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.mutable {
            Ok(())
        } else {
            Err(Error::Immutable(format!("tuple object {}", self.id)))
        }
    }

    /// Length-changing edits need the whole sequence, not a slice of it
    fn ensure_structural(&self) -> Result<()> {
        self.ensure_mutable()?;
        if self.positions.is_some() {
            return Err(Error::TypeMismatch(
                "a slice view cannot change the length of its parent".to_string(),
            ));
        }
        Ok(())
    }
}

/// Positions of `values` in stable sorted order
fn argsort(values: &[Value], mut compare: impl FnMut(&Value, &Value) -> Ordering) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| compare(&values[a], &values[b]));
    order
}

impl<'db> Stored<'db> for Sequence<'db> {
    fn db(&self) -> &'db Database {
        self.db
    }

    fn referrer(&self) -> Option<&Referrer> {
        self.referrer.as_ref()
    }

    fn id(&self) -> Result<i64> {
        Ok(self.id)
    }

    fn value(&self) -> Result<Value> {
        let values = self.values()?;
        Ok(if self.mutable { Value::List(values) } else { Value::Tuple(values) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list<'db>(db: &'db Database, name: &str, values: Vec<i64>) -> Sequence<'db> {
        db.set(name, values).unwrap();
        db.get(name).unwrap().into_sequence().unwrap()
    }

    fn assert_dense(db: &Database, seq: &Sequence) {
        let len = seq.len().unwrap() as i64;
        let id = seq.id().unwrap();
        assert_eq!(db.store().indices(id).unwrap(), (0..len).collect::<Vec<_>>());
    }

    #[test]
    fn test_get_and_negative_indices() {
        let db = Database::open_in_memory().unwrap();
        let seq = list(&db, "l", vec![10, 20, 30]);

        assert_eq!(seq.get_value(0).unwrap(), Value::Int(10));
        assert_eq!(seq.get_value(-1).unwrap(), Value::Int(30));
        assert!(matches!(seq.get_value(3), Err(Error::Index(_))));
        assert!(matches!(seq.get_value(-4), Err(Error::Index(_))));
        assert_eq!(seq.get(1).unwrap().value().unwrap(), Value::Int(20));
    }

    #[test]
    fn test_set_and_delete() {
        let db = Database::open_in_memory().unwrap();
        let seq = list(&db, "l", vec![1, 2, 3, 4]);

        seq.set(-1, "four").unwrap();
        seq.delete(1).unwrap();
        assert_eq!(db.value("l").unwrap(), Value::List(vec![1.into(), 3.into(), "four".into()]));
        assert_dense(&db, &seq);
    }

    #[test]
    fn test_insert_clamps() {
        let db = Database::open_in_memory().unwrap();
        let seq = list(&db, "l", vec![1, 2]);

        seq.insert(1, 9).unwrap();
        seq.insert(100, 7).unwrap();
        seq.insert(-100, 0).unwrap();
        seq.insert(-1, 8).unwrap();
        assert_eq!(db.value("l").unwrap(), Value::from(vec![0, 1, 9, 2, 8, 7]));
        assert_dense(&db, &seq);
    }

    #[test]
    fn test_pop_and_remove() {
        let db = Database::open_in_memory().unwrap();
        let seq = list(&db, "l", vec![5, 6, 7, 6]);

        assert_eq!(seq.pop(None).unwrap(), Value::Int(6));
        assert_eq!(seq.pop(Some(0)).unwrap(), Value::Int(5));
        seq.remove(6).unwrap();
        assert_eq!(db.value("l").unwrap(), Value::from(vec![7]));
        assert!(matches!(seq.remove(42), Err(Error::NotFound(_))));

        seq.pop(None).unwrap();
        assert!(matches!(seq.pop(None), Err(Error::Index(_))));
        assert_eq!(db.stats().unwrap().objects, 1);
    }

    #[test]
    fn test_extend_reverse_sort() {
        let db = Database::open_in_memory().unwrap();
        let seq = list(&db, "l", vec![3, 1]);

        seq.extend(vec![2, 5, 4]).unwrap();
        seq.reverse().unwrap();
        assert_eq!(db.value("l").unwrap(), Value::from(vec![4, 5, 2, 1, 3]));

        seq.sort().unwrap();
        assert_eq!(db.value("l").unwrap(), Value::from(vec![1, 2, 3, 4, 5]));
        assert_dense(&db, &seq);

        seq.sort_by(|a, b| b.compare(a).unwrap_or(Ordering::Equal)).unwrap();
        assert_eq!(seq.value().unwrap(), Value::from(vec![5, 4, 3, 2, 1]));
    }

    #[test]
    fn test_sort_incomparable() {
        let db = Database::open_in_memory().unwrap();
        db.set("l", Value::List(vec![1.into(), "a".into()])).unwrap();
        let seq = db.get("l").unwrap().into_sequence().unwrap();
        assert!(matches!(seq.sort(), Err(Error::TypeMismatch(_))));
        assert_dense(&db, &seq);
    }

    #[test]
    fn test_queries() {
        let db = Database::open_in_memory().unwrap();
        let seq = list(&db, "l", vec![1, 2, 2, 3]);

        assert_eq!(seq.index(2).unwrap(), 1);
        assert_eq!(seq.count(2).unwrap(), 2);
        assert!(seq.contains(3).unwrap());
        assert!(!seq.contains(4).unwrap());

        let collected: Vec<Value> = seq.iter().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(collected.len(), 4);
    }

    #[test]
    fn test_clear() {
        let db = Database::open_in_memory().unwrap();
        let seq = list(&db, "l", vec![1, 2, 3]);
        seq.clear().unwrap();

        assert!(seq.is_empty().unwrap());
        assert_eq!(db.stats().unwrap().objects, 1);
        seq.append(1).unwrap();
        assert_eq!(db.value("l").unwrap(), Value::from(vec![1]));
    }

    #[test]
    fn test_slices() {
        let db = Database::open_in_memory().unwrap();
        let seq = list(&db, "l", vec![0, 1, 2, 3, 4, 5]);

        let evens = seq.slice(None, None, Some(2)).unwrap();
        assert_eq!(evens.value().unwrap(), Value::from(vec![0, 2, 4]));
        let tail = evens.slice(Some(1), None, None).unwrap();
        assert_eq!(tail.value().unwrap(), Value::from(vec![2, 4]));

        tail.set(0, 20).unwrap();
        evens.assign(vec![10, 30, 50]).unwrap();
        assert_eq!(db.value("l").unwrap(), Value::from(vec![10, 1, 30, 3, 50, 5]));

        assert!(matches!(evens.append(1), Err(Error::TypeMismatch(_))));
        assert!(matches!(evens.assign(vec![1]), Err(Error::Index(_))));
        assert!(matches!(Stored::delete(&evens), Err(Error::TypeMismatch(_))));

        let reversed = seq.slice(None, None, Some(-1)).unwrap();
        assert_eq!(reversed.get_value(0).unwrap(), Value::Int(5));
    }

    #[test]
    fn test_tuple_rejects_every_mutation() {
        let db = Database::open_in_memory().unwrap();
        db.set("t", Value::tuple([3, 1, 2])).unwrap();
        let t = db.get("t").unwrap().into_sequence().unwrap();

        assert!(t.is_tuple());
        assert!(matches!(t.set(0, 1), Err(Error::Immutable(_))));
        assert!(matches!(t.delete(0), Err(Error::Immutable(_))));
        assert!(matches!(t.append(1), Err(Error::Immutable(_))));
        assert!(matches!(t.extend(vec![1]), Err(Error::Immutable(_))));
        assert!(matches!(t.insert(0, 1), Err(Error::Immutable(_))));
        assert!(matches!(t.pop(None), Err(Error::Immutable(_))));
        assert!(matches!(t.remove(1), Err(Error::Immutable(_))));
        assert!(matches!(t.reverse(), Err(Error::Immutable(_))));
        assert!(matches!(t.sort(), Err(Error::Immutable(_))));
        assert!(matches!(t.clear(), Err(Error::Immutable(_))));

        assert_eq!(t.value().unwrap(), Value::tuple([3, 1, 2]));
        assert_eq!(t.slice(Some(1), None, None).unwrap().value().unwrap(), Value::tuple([1, 2]));
    }

    #[test]
    fn test_tuple_element_handles_are_immutable() {
        let db = Database::open_in_memory().unwrap();
        db.set("t", Value::Tuple(vec![1.into(), 2.into(), Value::from(vec![3])])).unwrap();
        let t = db.get("t").unwrap().into_sequence().unwrap();

        let first = t.get(0).unwrap().into_scalar().unwrap();
        assert!(matches!(first.set(9), Err(Error::Immutable(_))));
        assert!(matches!(first.add_assign(1), Err(Error::Immutable(_))));
        assert!(matches!(t.get(1).unwrap().delete(), Err(Error::Immutable(_))));
        let inner = t.get(2).unwrap().into_sequence().unwrap();
        assert!(matches!(Stored::delete(&inner), Err(Error::Immutable(_))));

        // the list inside stays a list
        inner.append(4).unwrap();
        assert_eq!(
            db.value("t").unwrap(),
            Value::Tuple(vec![1.into(), 2.into(), Value::from(vec![3, 4])])
        );
        assert_dense(&db, &t);
        assert!(db.check().unwrap().is_clean());
    }

    #[test]
    fn test_list_element_handles() {
        let db = Database::open_in_memory().unwrap();
        let seq = list(&db, "l", vec![1, 2, 3]);

        seq.get(1).unwrap().into_scalar().unwrap().set(20).unwrap();
        seq.get(0).unwrap().delete().unwrap();
        assert_eq!(db.value("l").unwrap(), Value::from(vec![20, 3]));
        assert_dense(&db, &seq);

        db.set("n", Value::List(vec![Value::from(vec![1]), Value::from(vec![2])])).unwrap();
        let nested = db.get("n").unwrap().into_sequence().unwrap();
        let head = nested.get(0).unwrap().into_sequence().unwrap();
        Stored::delete(&head).unwrap();
        assert_eq!(db.value("n").unwrap(), Value::List(vec![Value::from(vec![2])]));
        assert_dense(&db, &nested);
        assert!(db.check().unwrap().is_clean());
    }

    #[test]
    fn test_nested_element_handles() {
        let db = Database::open_in_memory().unwrap();
        db.set("l", Value::List(vec![Value::from(vec![1, 2]), Value::map([("k", 1)])])).unwrap();
        let seq = db.get("l").unwrap().into_sequence().unwrap();

        seq.get(0).unwrap().into_sequence().unwrap().append(3).unwrap();
        seq.get(1).unwrap().into_mapping().unwrap().set("j", 2).unwrap();
        assert_eq!(
            db.value("l").unwrap(),
            Value::List(vec![Value::from(vec![1, 2, 3]), Value::map([("j", 2), ("k", 1)])])
        );
    }
}

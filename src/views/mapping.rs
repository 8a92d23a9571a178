//! Dict handles; entries are item rows keyed by `key`

use crate::database::{Database, Referrer};
use crate::storage::Slot;
use crate::value::Value;
use crate::{Error, Result};

use super::{Handle, Stored};

pub struct Mapping<'db> {
    db: &'db Database,
    id: i64,
    referrer: Option<Referrer>,
}

impl<'db> Mapping<'db> {
    pub(crate) fn new(db: &'db Database, id: i64, referrer: Option<Referrer>) -> Self {
        Self { db, id, referrer }
    }

    pub fn len(&self) -> Result<usize> {
        self.db.store().count_children(self.id)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.db.store().child(self.id, &slot(key))?.is_some())
    }

    /// Handle to the value under `key`
    pub fn get(&self, key: &str) -> Result<Handle<'db>> {
        let child = self.child(key)?;
        self.db.handle(child, self.item(key))
    }

    pub fn get_value(&self, key: &str) -> Result<Value> {
        self.db.load(self.child(key)?)
    }

    /// Rebind `key`, adding it if absent
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.db.mutate(|| self.db.rebind(&self.item(key), &value).map(|_| ()))
    }

    /// Set several keys in one transaction
    pub fn update<K: AsRef<str>, V: Into<Value>>(&self, entries: impl IntoIterator<Item = (K, V)>) -> Result<()> {
        let entries: Vec<(K, Value)> = entries.into_iter().map(|(k, v)| (k, v.into())).collect();
        self.db.mutate(|| {
            for (key, value) in &entries {
                self.db.rebind(&self.item(key.as_ref()), value)?;
            }
            Ok(())
        })
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.db.mutate(|| self.db.detach(&self.item(key)))
    }

    /// Remove `key` and return what it held
    pub fn pop(&self, key: &str) -> Result<Value> {
        self.db.mutate(|| {
            let value = self.db.load(self.child(key)?)?;
            self.db.detach(&self.item(key))?;
            Ok(value)
        })
    }

    pub fn clear(&self) -> Result<()> {
        self.db.mutate(|| self.db.clear_children(self.id))
    }

    /// Keys in key order
    pub fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .db
            .store()
            .children(self.id)?
            .into_iter()
            .filter_map(|item| match item.slot {
                Slot::Key(key) => Some(key),
                Slot::Ind(_) => None,
            })
            .collect())
    }

    pub fn values(&self) -> Result<Vec<Value>> {
        Ok(self.items()?.into_iter().map(|(_, value)| value).collect())
    }

    pub fn items(&self) -> Result<Vec<(String, Value)>> {
        self.db
            .store()
            .children(self.id)?
            .into_iter()
            .filter_map(|item| match item.slot {
                Slot::Key(key) => Some((key, item.child_id)),
                Slot::Ind(_) => None,
            })
            .map(|(key, child)| Ok((key, self.db.load(child)?)))
            .collect()
    }

    fn item(&self, key: &str) -> Referrer {
        Referrer::item(self.id, slot(key))
    }

    fn child(&self, key: &str) -> Result<i64> {
        self.db
            .store()
            .child(self.id, &slot(key))?
            .ok_or_else(|| Error::NotFound(format!("key {:?}", key)))
    }
}

fn slot(key: &str) -> Slot {
    Slot::Key(key.to_string())
}

impl<'db> Stored<'db> for Mapping<'db> {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping<'db>(db: &'db Database) -> Mapping<'db> {
        db.set("d", Value::map([("b", 2), ("a", 1)])).unwrap();
        db.get("d").unwrap().into_mapping().unwrap()
    }

    #[test]
    fn test_get_set() {
        let db = Database::open_in_memory().unwrap();
        let d = mapping(&db);

        assert_eq!(d.get_value("a").unwrap(), Value::Int(1));
        assert!(matches!(d.get_value("zz"), Err(Error::NotFound(_))));
        assert!(matches!(d.get("zz"), Err(Error::NotFound(_))));

        d.set("a", 10).unwrap();
        d.set("c", vec![3]).unwrap();
        assert_eq!(d.len().unwrap(), 3);
        assert!(d.contains("c").unwrap());
        assert_eq!(d.get("c").unwrap().value().unwrap(), Value::from(vec![3]));
    }

    #[test]
    fn test_iteration_in_key_order() {
        let db = Database::open_in_memory().unwrap();
        let d = mapping(&db);
        d.set("0", Value::Null).unwrap();

        assert_eq!(d.keys().unwrap(), vec!["0", "a", "b"]);
        assert_eq!(d.values().unwrap(), vec![Value::Null, Value::Int(1), Value::Int(2)]);
        assert_eq!(d.items().unwrap()[1], ("a".to_string(), Value::Int(1)));
    }

    #[test]
    fn test_remove_pop_clear() {
        let db = Database::open_in_memory().unwrap();
        let d = mapping(&db);

        assert_eq!(d.pop("a").unwrap(), Value::Int(1));
        assert!(matches!(d.remove("a"), Err(Error::NotFound(_))));
        assert!(matches!(d.pop("a"), Err(Error::NotFound(_))));

        d.clear().unwrap();
        assert!(d.is_empty().unwrap());
        assert_eq!(db.stats().unwrap().objects, 1);
        assert_eq!(d.value().unwrap(), Value::Map(Default::default()));
    }

    #[test]
    fn test_update() {
        let db = Database::open_in_memory().unwrap();
        let d = mapping(&db);
        d.update([("a", 5), ("z", 26)]).unwrap();
        assert_eq!(db.value("d").unwrap(), Value::map([("a", 5), ("b", 2), ("z", 26)]));
    }
}

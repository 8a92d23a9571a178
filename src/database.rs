//! Database handle - named values over a relational object store
//!
//! A [`Database`] owns one store connection, one codec registry, one draft
//! and one transaction counter. Every mutation runs inside a transaction
//! scope; nested values are written through the draft in a single commit.

use std::cell::RefCell;
use std::fmt;
use std::path::Path;

use crate::codec::{Codec, Encoded, Registry, tags};
use crate::config::{OpenMode, Options, RelstoreConfig};
use crate::draft::{self, Draft, IdMap};
use crate::integrity::{self, Report};
use crate::storage::{DbStats, ItemRow, ObjectRow, Payload, Slot, SqliteStore};
use crate::transaction::{Transaction, TransactionManager};
use crate::value::Value;
use crate::views::{ArrayView, Handle, Mapping, Opaque, Scalar, Sequence};
use crate::{Error, Result};

/// Where an object is referenced from: a variable or a parent's item
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Referrer {
    Variable(String),
    Item { parent: i64, slot: Slot },
}

impl Referrer {
    pub fn item(parent: i64, slot: Slot) -> Self {
        Referrer::Item { parent, slot }
    }
}

impl fmt::Display for Referrer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Referrer::Variable(name) => write!(f, "variable {:?}", name),
            Referrer::Item { parent, slot } => write!(f, "item {} of object {}", slot, parent),
        }
    }
}

pub struct Database {
    store: SqliteStore,
    registry: Registry,
    draft: RefCell<Draft>,
    tx: TransactionManager,
    options: Options,
}

impl Database {
    /// Open a database file read/write, creating it if needed
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, Options::default())
    }

    pub fn open_with(path: &Path, options: Options) -> Result<Self> {
        let store = SqliteStore::open_with_mode(path, options.mode)?;
        tracing::debug!(path = %path.display(), mode = %options.mode, "opened database");
        Ok(Self::with_store(store, options))
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with(Options::default())
    }

    pub fn open_in_memory_with(options: Options) -> Result<Self> {
        if options.mode == OpenMode::Read {
            return Err(Error::Mode("an in-memory database cannot be opened read-only".to_string()));
        }
        Ok(Self::with_store(SqliteStore::open_in_memory()?, options))
    }

    /// Open the database a config file points at
    pub fn from_config(config: &RelstoreConfig) -> Result<Self> {
        Self::open_with(&config.database_path(), config.options())
    }

    fn with_store(store: SqliteStore, options: Options) -> Self {
        Self {
            store,
            registry: Registry::new(),
            draft: RefCell::new(Draft::new()),
            tx: TransactionManager::new(),
            options,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Add a user codec; it takes priority over the built-ins
    pub fn register(&mut self, codec: Box<dyn Codec>) {
        self.registry.register(codec);
    }

    // ========== Variable Operations ==========

    /// Bind `name` to a value, replacing whatever it held
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let referrer = Referrer::Variable(name.to_string());
        self.mutate(|| self.rebind(&referrer, &value).map(|_| ()))
    }

    /// Lazy handle to the value bound to `name`
    pub fn get(&self, name: &str) -> Result<Handle<'_>> {
        let id = self.variable_id(name)?;
        self.handle(id, Referrer::Variable(name.to_string()))
    }

    /// Fully materialized value bound to `name`
    pub fn value(&self, name: &str) -> Result<Value> {
        self.load(self.variable_id(name)?)
    }

    /// Unbind `name` and release everything only it kept alive
    pub fn delete(&self, name: &str) -> Result<()> {
        self.mutate(|| self.detach(&Referrer::Variable(name.to_string())))
    }

    pub fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.store.get_variable(name)?.is_some())
    }

    pub fn len(&self) -> Result<usize> {
        self.store.count_variables()
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Variable names in name order
    pub fn names(&self) -> Result<Vec<String>> {
        Ok(self.store.variables()?.into_iter().map(|(name, _)| name).collect())
    }

    /// Move a binding to a new name, replacing any value already there
    pub fn rename(&self, old: &str, new: &str) -> Result<()> {
        if old == new {
            return self.variable_id(old).map(|_| ());
        }
        self.mutate(|| {
            self.variable_id(old)?;
            if self.contains(new)? {
                self.detach(&Referrer::Variable(new.to_string()))?;
            }
            self.store.rename_variable(old, new)?;
            Ok(())
        })
    }

    /// Drop every variable, object and item
    pub fn clear(&self) -> Result<()> {
        self.mutate(|| self.store.clear_all())
    }

    /// Object id bound to `name`, if any
    pub fn id_of(&self, name: &str) -> Result<Option<i64>> {
        self.store.get_variable(name)
    }

    pub fn ref_count(&self, id: i64) -> Result<usize> {
        self.store.ref_count(id)
    }

    pub fn stats(&self) -> Result<DbStats> {
        self.store.stats()
    }

    // ========== Integrity Operations ==========

    pub fn check(&self) -> Result<Report> {
        integrity::check(&self.store, &self.registry)
    }

    /// Repair what [`Database::check`] reports; returns the number of rows removed
    pub fn fix(&self) -> Result<usize> {
        self.mutate(|| integrity::fix(&self.store, &self.registry))
    }

    // ========== Transaction Operations ==========

    /// Run `f` in a transaction scope; nothing it wrote survives an error
    pub fn transaction<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let result = self.tx.run(&self.store, || f(self));
        if result.is_err() {
            self.draft.borrow_mut().clear();
        }
        result
    }

    /// Open a scope that rolls back when dropped without [`Transaction::commit`]
    pub fn begin(&self) -> Result<Transaction<'_>> {
        Transaction::new(&self.tx, &self.store)
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.is_active()
    }

    // ========== Engine ==========

    /// Run a mutation in a transaction scope, rejecting it on read-only handles
    pub(crate) fn mutate<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        if self.store.is_read_only() {
            return Err(Error::Mode("database is open read-only".to_string()));
        }
        let result = self.tx.run(&self.store, f);
        if result.is_err() {
            self.draft.borrow_mut().clear();
        }
        result
    }

    fn variable_id(&self, name: &str) -> Result<i64> {
        self.store
            .get_variable(name)?
            .ok_or_else(|| Error::NotFound(format!("variable {:?}", name)))
    }

    /// Stage a value and all of its children; returns its (possibly placeholder) id
    fn draft_value(&self, value: &Value) -> Result<i64> {
        let codec = self.registry.for_value(value)?;
        let tag = codec.tag();
        match codec.encode(value)? {
            Encoded::Scalar(payload) => {
                let existing = self.draft.borrow().select_existing(&self.store, tag, &payload);
                match existing {
                    Ok(id) => Ok(id),
                    Err(Error::NotFound(_)) => {
                        let mut draft = self.draft.borrow_mut();
                        let id = draft.next_placeholder();
                        draft.append(ObjectRow { id, tag: tag.to_string(), payload });
                        Ok(id)
                    }
                    Err(e) => Err(e),
                }
            }
            Encoded::Nested(children) => {
                let id = {
                    let mut draft = self.draft.borrow_mut();
                    let id = draft.next_placeholder();
                    draft.append(ObjectRow { id, tag: tag.to_string(), payload: Payload::Empty });
                    id
                };
                for (slot, child) in children {
                    let child_id = self.draft_value(&child)?;
                    self.draft.borrow_mut().append_item(ItemRow { id, slot, child_id });
                }
                Ok(id)
            }
        }
    }

    fn commit_draft(&self) -> Result<IdMap> {
        self.draft
            .borrow_mut()
            .commit(&self.store, &self.tx, self.options.compact_ids)
    }

    /// Write a value without referencing it; returns its committed id
    fn store_value(&self, value: &Value) -> Result<i64> {
        let placeholder = self.draft_value(value)?;
        let map = self.commit_draft()?;
        draft::resolve(&map, placeholder)
    }

    /// Write a value and reference it from a slot that is currently empty
    pub(crate) fn attach(&self, referrer: &Referrer, value: &Value) -> Result<i64> {
        let placeholder = self.draft_value(value)?;
        match referrer {
            Referrer::Item { parent, slot } => {
                self.draft.borrow_mut().append_item(ItemRow {
                    id: *parent,
                    slot: slot.clone(),
                    child_id: placeholder,
                });
                let map = self.commit_draft()?;
                draft::resolve(&map, placeholder)
            }
            Referrer::Variable(name) => {
                let map = self.commit_draft()?;
                let id = draft::resolve(&map, placeholder)?;
                self.store.insert_variable(name, id)?;
                Ok(id)
            }
        }
    }

    /// Append values to a sequence at positions `start..`, in one commit
    pub(crate) fn attach_many(&self, parent: i64, start: i64, values: &[Value]) -> Result<()> {
        for (offset, value) in values.iter().enumerate() {
            let child_id = self.draft_value(value)?;
            self.draft.borrow_mut().append_item(ItemRow {
                id: parent,
                slot: Slot::Ind(start + offset as i64),
                child_id,
            });
        }
        self.commit_draft().map(|_| ())
    }

    /// Object id a referrer currently points at
    pub(crate) fn target(&self, referrer: &Referrer) -> Result<Option<i64>> {
        match referrer {
            Referrer::Variable(name) => self.store.get_variable(name),
            Referrer::Item { parent, slot } => self.store.child(*parent, slot),
        }
    }

    fn point(&self, referrer: &Referrer, id: i64) -> Result<()> {
        let changed = match referrer {
            Referrer::Variable(name) => self.store.set_variable(name, id)?,
            Referrer::Item { parent, slot } => self.store.set_child(*parent, slot, id)?,
        };
        if changed == 0 {
            return Err(Error::NotFound(referrer.to_string()));
        }
        Ok(())
    }

    /// Make a referrer hold `value`; returns the id it ends up pointing at
    pub(crate) fn rebind(&self, referrer: &Referrer, value: &Value) -> Result<i64> {
        if let Referrer::Item { parent, slot } = referrer {
            if self.parent_tag(*parent)? == tags::TUPLE {
                return Err(Error::Immutable(format!("item {} of tuple object {}", slot, parent)));
            }
        }
        let Some(old) = self.target(referrer)? else {
            return self.attach(referrer, value);
        };
        if self.update_in_place(old, value)? {
            tracing::trace!(id = old, "updated scalar in place");
            return Ok(old);
        }

        let new = self.store_value(value)?;
        if new != old {
            self.point(referrer, new)?;
            self.release(old, 0)?;
        }
        Ok(new)
    }

    /// Overwrite a scalar object that only one referrer uses, unless the new
    /// payload already exists somewhere
    fn update_in_place(&self, old: i64, value: &Value) -> Result<bool> {
        let codec = self.registry.for_value(value)?;
        let Encoded::Scalar(payload) = codec.encode(value)? else {
            return Ok(false);
        };
        let Some(row) = self.store.get_object(old)? else {
            return Err(Error::CorruptedState(format!("object {} is referenced but missing", old)));
        };
        if self.registry.is_nested_tag(&row.tag) || self.store.ref_count(old)? != 1 {
            return Ok(false);
        }

        match self.draft.borrow().select_existing(&self.store, codec.tag(), &payload) {
            Ok(_) => Ok(false),
            Err(Error::NotFound(_)) => {
                self.store.update_object(old, codec.tag(), &payload)?;
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    /// Delete an object, and then its children, once no more than `expected`
    /// references to it remain. Returns whether it was deleted.
    pub(crate) fn release(&self, id: i64, expected: usize) -> Result<bool> {
        if self.store.ref_count(id)? > expected {
            return Ok(false);
        }

        let mut children: Vec<i64> = self.store.children(id)?.into_iter().map(|item| item.child_id).collect();
        children.sort_unstable();
        children.dedup();

        self.store.delete_items(id)?;
        self.store.delete_object(id)?;
        tracing::debug!(id, children = children.len(), "released object");

        for child in children {
            self.release(child, 0)?;
        }
        Ok(true)
    }

    /// Remove a referrer's edge and release what it pointed at
    pub(crate) fn detach(&self, referrer: &Referrer) -> Result<()> {
        let id = self
            .target(referrer)?
            .ok_or_else(|| Error::NotFound(referrer.to_string()))?;
        match referrer {
            Referrer::Variable(name) => self.store.delete_variable(name)?,
            Referrer::Item { parent, slot } => self.store.delete_item(*parent, slot)?,
        };
        self.release(id, 0)?;
        Ok(())
    }

    /// Remove an element the way its container allows. Lists close the gap,
    /// tuples and array elements refuse.
    pub(crate) fn unlink(&self, referrer: &Referrer) -> Result<()> {
        let Referrer::Item { parent, slot: Slot::Ind(pos) } = referrer else {
            return self.detach(referrer);
        };
        match self.parent_tag(*parent)?.as_str() {
            tags::LIST => {
                self.detach(referrer)?;
                self.store.shift_indices(*parent, pos + 1, -1)
            }
            tags::TUPLE => Err(Error::Immutable(format!("item [{}] of tuple object {}", pos, parent))),
            tags::NDARRAY => Err(Error::TypeMismatch(format!(
                "cannot delete element {} of ndarray object {}",
                pos, parent
            ))),
            _ => self.detach(referrer),
        }
    }

    fn parent_tag(&self, parent: i64) -> Result<String> {
        self.store
            .object_type(parent)?
            .ok_or_else(|| Error::CorruptedState(format!("parent object {} is missing", parent)))
    }

    /// Remove every edge of a container and release its former children
    pub(crate) fn clear_children(&self, parent: i64) -> Result<()> {
        let mut children: Vec<i64> = self.store.children(parent)?.into_iter().map(|item| item.child_id).collect();
        children.sort_unstable();
        children.dedup();

        self.store.delete_items(parent)?;
        for child in children {
            self.release(child, 0)?;
        }
        Ok(())
    }

    /// Decode an object and everything below it
    pub(crate) fn load(&self, id: i64) -> Result<Value> {
        let row = self
            .store
            .get_object(id)?
            .ok_or_else(|| Error::CorruptedState(format!("object {} is referenced but missing", id)))?;
        let codec = self.registry.for_tag(&row.tag)?;
        let children = if codec.is_nested() {
            self.store
                .children(id)?
                .into_iter()
                .map(|item| Ok((item.slot, self.load(item.child_id)?)))
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };
        codec.decode(&row.payload, children)
    }

    /// Lazy handle for an object, chosen by its tag
    pub(crate) fn handle(&self, id: i64, referrer: Referrer) -> Result<Handle<'_>> {
        let tag = self
            .store
            .object_type(id)?
            .ok_or_else(|| Error::CorruptedState(format!("object {} is referenced but missing", id)))?;
        let handle = match tag.as_str() {
            tags::LIST => Handle::Sequence(Sequence::new(self, id, Some(referrer), true)),
            tags::TUPLE => Handle::Sequence(Sequence::new(self, id, Some(referrer), false)),
            tags::DICT => Handle::Mapping(Mapping::new(self, id, Some(referrer))),
            tags::NDARRAY => Handle::Array(ArrayView::load(self, id, Some(referrer))?),
            other if self.registry.is_nested_tag(other) => {
                Handle::Opaque(Opaque::new(self, id, Some(referrer), other.to_string()))
            }
            _ => Handle::Scalar(Scalar::new(self, referrer)),
        };
        Ok(handle)
    }
}

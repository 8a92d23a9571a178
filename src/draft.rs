//! Draft - staged object and item rows awaiting one batched commit
//!
//! New objects get negative placeholder ids (-1, -2, ...). Items may point at
//! placeholders or at committed ids. Committing allocates one block of real
//! ids, substitutes them everywhere and writes objects then items.

use std::collections::HashMap;

use crate::ids;
use crate::storage::{ItemRow, ObjectRow, Payload, Slot, SqliteStore};
use crate::transaction::TransactionManager;
use crate::{Error, Result};

/// Placeholder id -> committed id
pub type IdMap = HashMap<i64, i64>;

#[derive(Debug, Default)]
struct ObjectColumns {
    ids: Vec<i64>,
    tags: Vec<String>,
    payloads: Vec<Payload>,
}

#[derive(Debug, Default)]
struct ItemColumns {
    ids: Vec<i64>,
    slots: Vec<Slot>,
    child_ids: Vec<i64>,
}

/// Hashable form of a payload; floats key on their bits with -0.0 folded into 0.0
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PayloadKey {
    Empty,
    Bool(bool),
    Int(i64),
    Real(u64),
    Text(String),
}

impl From<&Payload> for PayloadKey {
    fn from(payload: &Payload) -> Self {
        match payload {
            Payload::Empty => PayloadKey::Empty,
            Payload::Bool(b) => PayloadKey::Bool(*b),
            Payload::Int(i) => PayloadKey::Int(*i),
            Payload::Real(r) => PayloadKey::Real(if *r == 0.0 { 0.0f64.to_bits() } else { r.to_bits() }),
            Payload::Text(t) => PayloadKey::Text(t.clone()),
        }
    }
}

#[derive(Debug)]
pub struct Draft {
    objects: ObjectColumns,
    items: ItemColumns,
    /// Drafted object ids by (tag, payload)
    lookup: HashMap<(String, PayloadKey), Vec<i64>>,
    next_placeholder: i64,
}

impl Default for Draft {
    fn default() -> Self {
        Self::new()
    }
}

impl Draft {
    pub fn new() -> Self {
        Self {
            objects: ObjectColumns::default(),
            items: ItemColumns::default(),
            lookup: HashMap::new(),
            next_placeholder: -1,
        }
    }

    /// Claim the next placeholder id
    pub fn next_placeholder(&mut self) -> i64 {
        let id = self.next_placeholder;
        self.next_placeholder -= 1;
        id
    }

    pub fn append(&mut self, row: ObjectRow) {
        self.lookup
            .entry((row.tag.clone(), PayloadKey::from(&row.payload)))
            .or_default()
            .push(row.id);
        self.objects.ids.push(row.id);
        self.objects.tags.push(row.tag);
        self.objects.payloads.push(row.payload);
    }

    pub fn extend(&mut self, rows: impl IntoIterator<Item = ObjectRow>) {
        for row in rows {
            self.append(row);
        }
    }

    pub fn append_item(&mut self, row: ItemRow) {
        self.items.ids.push(row.id);
        self.items.slots.push(row.slot);
        self.items.child_ids.push(row.child_id);
    }

    pub fn extend_items(&mut self, rows: impl IntoIterator<Item = ItemRow>) {
        for row in rows {
            self.append_item(row);
        }
    }

    pub fn object_count(&self) -> usize {
        self.objects.ids.len()
    }

    pub fn item_count(&self) -> usize {
        self.items.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.object_count() == 0 && self.item_count() == 0
    }

    /// Drafted objects with exactly this tag and payload
    pub fn find(&self, tag: &str, payload: &Payload) -> Vec<i64> {
        self.lookup
            .get(&(tag.to_string(), PayloadKey::from(payload)))
            .cloned()
            .unwrap_or_default()
    }

    /// Id of the one object, drafted or committed, with this tag and payload.
    ///
    /// Looks at the draft first. Fails with [`Error::NotFound`] when neither
    /// has it and [`Error::CorruptedState`] when there is more than one.
    pub fn select_existing(&self, store: &SqliteStore, tag: &str, payload: &Payload) -> Result<i64> {
        let mut hits = self.find(tag, payload);
        if hits.is_empty() {
            hits = store.find_scalar(tag, payload)?;
        }
        match hits.as_slice() {
            [] => Err(Error::NotFound(format!("{} object with payload {:?}", tag, payload))),
            [id] => Ok(*id),
            _ => Err(Error::CorruptedState(format!(
                "{} objects share the {} payload {:?}",
                hits.len(),
                tag,
                payload
            ))),
        }
    }

    /// Write everything staged in one transaction and clear the draft.
    ///
    /// Returns the placeholder mapping so callers can find the real ids of
    /// what they drafted.
    pub fn commit(&mut self, store: &SqliteStore, tx: &TransactionManager, compact: bool) -> Result<IdMap> {
        if self.is_empty() {
            return Ok(IdMap::new());
        }

        let result = tx.run(store, || {
            let real = ids::free_ids(store, self.object_count(), compact)?;
            let map: IdMap = self.objects.ids.iter().copied().zip(real).collect();

            let objects = (0..self.object_count())
                .map(|i| {
                    Ok(ObjectRow {
                        id: resolve(&map, self.objects.ids[i])?,
                        tag: self.objects.tags[i].clone(),
                        payload: self.objects.payloads[i].clone(),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let items = (0..self.item_count())
                .map(|i| {
                    Ok(ItemRow {
                        id: resolve(&map, self.items.ids[i])?,
                        slot: self.items.slots[i].clone(),
                        child_id: resolve(&map, self.items.child_ids[i])?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            store.insert_objects(&objects)?;
            store.insert_items(&items)?;
            tracing::debug!(objects = objects.len(), items = items.len(), "committed draft");
            Ok(map)
        });

        self.clear();
        result
    }

    /// Drop everything staged
    pub fn clear(&mut self) {
        self.objects = ObjectColumns::default();
        self.items = ItemColumns::default();
        self.lookup.clear();
        self.next_placeholder = -1;
    }
}

/// Committed id for a possibly placeholder id
pub fn resolve(map: &IdMap, id: i64) -> Result<i64> {
    if id >= 0 {
        return Ok(id);
    }
    map.get(&id)
        .copied()
        .ok_or_else(|| Error::CorruptedState(format!("placeholder {} was never drafted", id)))
}

//! Integrity check and repair of the cross-table invariants

use std::fmt;

use crate::codec::Registry;
use crate::storage::SqliteStore;
use crate::Result;

/// Everything [`check`] found wrong with a store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    /// Ids referenced by variables or items but missing from objects
    pub dangling: Vec<i64>,
    /// Objects nothing refers to
    pub orphans: Vec<i64>,
    /// Parent ids of items whose parent object is missing
    pub orphan_items: Vec<i64>,
    /// Sequences whose indices are not exactly 0..len
    pub sparse_sequences: Vec<i64>,
    /// (duplicate, canonical) scalar objects sharing one payload
    pub duplicate_scalars: Vec<(i64, i64)>,
}

impl Report {
    pub fn is_clean(&self) -> bool {
        self.problem_count() == 0
    }

    pub fn problem_count(&self) -> usize {
        self.dangling.len()
            + self.orphans.len()
            + self.orphan_items.len()
            + self.sparse_sequences.len()
            + self.duplicate_scalars.len()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Integrity Report:")?;
        writeln!(f, "  Dangling ids: {:?}", self.dangling)?;
        writeln!(f, "  Orphan objects: {:?}", self.orphans)?;
        writeln!(f, "  Orphan items (parents): {:?}", self.orphan_items)?;
        writeln!(f, "  Sparse sequences: {:?}", self.sparse_sequences)?;
        writeln!(f, "  Duplicate scalars: {:?}", self.duplicate_scalars)
    }
}

pub fn check(store: &SqliteStore, registry: &Registry) -> Result<Report> {
    let duplicate_scalars = store
        .duplicate_objects()?
        .into_iter()
        .filter(|(_, _, tag)| !registry.is_nested_tag(tag))
        .map(|(dup, canonical, _)| (dup, canonical))
        .collect();

    let report = Report {
        dangling: store.dangling_ids()?,
        orphans: store.orphan_objects()?,
        orphan_items: store.orphan_item_parents()?,
        sparse_sequences: store.sparse_sequences()?,
        duplicate_scalars,
    };
    if !report.is_clean() {
        tracing::warn!(problems = report.problem_count(), "integrity check found problems");
    }
    Ok(report)
}

/// Repair until a pass changes nothing; returns the number of rows removed.
///
/// Orphans are deleted together with their items, which can orphan their
/// children in turn, hence the loop.
pub fn fix(store: &SqliteStore, registry: &Registry) -> Result<usize> {
    let mut removed = 0;
    loop {
        let report = check(store, registry)?;
        if report.is_clean() {
            break;
        }

        let mut changed = 0;
        for &id in &report.orphans {
            changed += store.delete_items(id)?;
            changed += store.delete_object(id)?;
        }
        for &parent in &report.orphan_items {
            changed += store.delete_items(parent)?;
        }
        changed += store.delete_dangling_references()?;
        for &(duplicate, canonical) in &report.duplicate_scalars {
            changed += store.merge_object(duplicate, canonical)?;
        }
        for &parent in &report.sparse_sequences {
            let indices = store.indices(parent)?;
            store.permute_indices(parent, &indices)?;
            tracing::debug!(parent, len = indices.len(), "renumbered sequence");
        }

        tracing::debug!(changed, "integrity repair pass");
        removed += changed;
        if changed == 0 {
            let remaining = check(store, registry)?;
            if !remaining.is_clean() {
                tracing::warn!(problems = remaining.problem_count(), "integrity problems remain after repair");
            }
            break;
        }
    }
    Ok(removed)
}

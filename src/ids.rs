//! Id allocation for new object rows

use crate::Result;
use crate::storage::SqliteStore;

/// Hand out `n` ids that no committed row uses.
///
/// Non-compact allocation continues past the largest id ever seen. Compact
/// allocation first fills the smallest gaps left behind by deletions.
/// Uncommitted draft rows only carry negative placeholders, so nothing here
/// can collide with them.
pub fn free_ids(store: &SqliteStore, n: usize, compact: bool) -> Result<Vec<i64>> {
    if n == 0 {
        return Ok(Vec::new());
    }

    let ids = if compact {
        let used = store.used_ids()?;
        fill_gaps(&used, n)
    } else {
        let start = store.max_id()?.map_or(0, |max| max + 1);
        (start..start + n as i64).collect()
    };
    tracing::trace!(n, compact, first = ids.first().copied(), "allocated ids");
    Ok(ids)
}

/// The `n` smallest non-negative ids missing from `used` (sorted, distinct)
pub fn fill_gaps(used: &[i64], n: usize) -> Vec<i64> {
    let mut ids = Vec::with_capacity(n);
    let mut candidate = 0i64;
    for &taken in used {
        while candidate < taken && ids.len() < n {
            ids.push(candidate);
            candidate += 1;
        }
        if ids.len() == n {
            return ids;
        }
        candidate = candidate.max(taken + 1);
    }
    while ids.len() < n {
        ids.push(candidate);
        candidate += 1;
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ObjectRow, Payload};

    fn seed(store: &SqliteStore, ids: &[i64]) {
        let rows: Vec<ObjectRow> = ids
            .iter()
            .map(|&id| ObjectRow { id, tag: "int".to_string(), payload: Payload::Int(id) })
            .collect();
        store.insert_objects(&rows).unwrap();
    }

    #[test]
    fn test_fill_gaps() {
        assert_eq!(fill_gaps(&[], 3), vec![0, 1, 2]);
        assert_eq!(fill_gaps(&[0, 1, 2], 2), vec![3, 4]);
        assert_eq!(fill_gaps(&[1, 4], 4), vec![0, 2, 3, 5]);
        assert_eq!(fill_gaps(&[0, 3], 1), vec![1]);
    }

    #[test]
    fn test_empty_store() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(free_ids(&store, 3, true).unwrap(), vec![0, 1, 2]);
        assert_eq!(free_ids(&store, 3, false).unwrap(), vec![0, 1, 2]);
        assert!(free_ids(&store, 0, true).unwrap().is_empty());
    }

    #[test]
    fn test_compact_reuses_gaps() {
        let store = SqliteStore::open_in_memory().unwrap();
        seed(&store, &[0, 2, 5]);

        assert_eq!(free_ids(&store, 4, true).unwrap(), vec![1, 3, 4, 6]);
        assert_eq!(free_ids(&store, 2, false).unwrap(), vec![6, 7]);
    }
}

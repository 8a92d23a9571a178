//! SQLite storage implementation

use std::path::Path;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use crate::config::OpenMode;
use crate::{Error, Result};
use super::rows::{ItemRow, ObjectRow, Payload, Slot};
use super::schema;

const OBJECT_COLUMNS: &str = "id, type, bool_val, int_val, real_val, txt_val";

/// SQLite-backed storage for variables, objects and items
pub struct SqliteStore {
    conn: Connection,
    read_only: bool,
}

impl SqliteStore {
    /// Open a database file read/write (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_mode(path, OpenMode::ReadWrite)
    }

    /// Open a database file honoring the r/w/x/+ open modes
    pub fn open_with_mode(path: &Path, mode: OpenMode) -> Result<Self> {
        match mode {
            OpenMode::Read => {
                if !path.exists() {
                    return Err(Error::NotFound(format!("database {}", path.display())));
                }
                let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
                let store = Self { conn, read_only: true };
                for table in schema::TABLES {
                    if !store.table_exists(table)? {
                        return Err(Error::Mode(format!(
                            "{} is not a relstore database (missing table {})",
                            path.display(),
                            table
                        )));
                    }
                }
                return Ok(store);
            }
            OpenMode::Write => {
                if path.exists() {
                    tracing::debug!("Truncating {}", path.display());
                    std::fs::remove_file(path)?;
                }
            }
            OpenMode::Create => {
                if path.exists() {
                    return Err(Error::Mode(format!("{} already exists", path.display())));
                }
            }
            OpenMode::ReadWrite => {}
        }

        let conn = Connection::open(path)?;
        let store = Self { conn, read_only: false };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn, read_only: false };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema
    fn initialize_schema(&self) -> Result<()> {
        for stmt in schema::all_schema_statements() {
            self.conn.execute(stmt, [])?;
        }
        Ok(())
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Check whether a table exists in the database
    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // ========== Variable Operations ==========

    /// Bind a new name to an object id
    pub fn insert_variable(&self, name: &str, id: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO variables (name, id) VALUES (?1, ?2)",
            params![name, id],
        )?;
        Ok(())
    }

    /// Rebind an existing name
    pub fn set_variable(&self, name: &str, id: i64) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE variables SET id = ?2 WHERE name = ?1",
            params![name, id],
        )?;
        Ok(changed)
    }

    /// Get the object id bound to a name
    pub fn get_variable(&self, name: &str) -> Result<Option<i64>> {
        self.conn
            .query_row("SELECT id FROM variables WHERE name = ?1", [name], |row| row.get(0))
            .optional()
            .map_err(Into::into)
    }

    pub fn delete_variable(&self, name: &str) -> Result<usize> {
        let deleted = self.conn.execute("DELETE FROM variables WHERE name = ?1", [name])?;
        Ok(deleted)
    }

    pub fn rename_variable(&self, old: &str, new: &str) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE variables SET name = ?2 WHERE name = ?1",
            params![old, new],
        )?;
        Ok(changed)
    }

    /// All (name, id) bindings ordered by name
    pub fn variables(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare("SELECT name, id FROM variables ORDER BY name")?;
        let vars = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(vars)
    }

    /// Count all variables
    pub fn count_variables(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM variables", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ========== Object Operations ==========

    /// Insert a batch of object rows with one cached statement
    pub fn insert_objects(&self, rows: &[ObjectRow]) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO objects (id, type, bool_val, int_val, real_val, txt_val) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for row in rows {
            let (b, i, r, t) = row.payload.columns();
            stmt.execute(params![row.id, row.tag, b, i, r, t])?;
        }
        Ok(())
    }

    /// Get an object row by id
    pub fn get_object(&self, id: i64) -> Result<Option<ObjectRow>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM objects WHERE id = ?1", OBJECT_COLUMNS),
                [id],
                |row| self.row_to_object(row),
            )
            .optional()
            .map_err(Into::into)
    }

    /// Type tag of an object
    pub fn object_type(&self, id: i64) -> Result<Option<String>> {
        self.conn
            .query_row("SELECT type FROM objects WHERE id = ?1", [id], |row| row.get(0))
            .optional()
            .map_err(Into::into)
    }

    /// Find the ids of objects carrying exactly this tag and payload.
    ///
    /// Uses null-safe `IS` comparisons so that payload-less scalars match too.
    pub fn find_scalar(&self, tag: &str, payload: &Payload) -> Result<Vec<i64>> {
        let (b, i, r, t) = payload.columns();
        let mut stmt = self.conn.prepare_cached(
            "SELECT id FROM objects WHERE type = ?1 AND bool_val IS ?2 AND int_val IS ?3 AND real_val IS ?4 AND txt_val IS ?5",
        )?;
        let ids = stmt
            .query_map(params![tag, b, i, r, t], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// Overwrite the tag and payload of an existing object, keeping its id
    pub fn update_object(&self, id: i64, tag: &str, payload: &Payload) -> Result<usize> {
        let (b, i, r, t) = payload.columns();
        let changed = self.conn.execute(
            "UPDATE objects SET type = ?2, bool_val = ?3, int_val = ?4, real_val = ?5, txt_val = ?6 WHERE id = ?1",
            params![id, tag, b, i, r, t],
        )?;
        Ok(changed)
    }

    pub fn delete_object(&self, id: i64) -> Result<usize> {
        let deleted = self.conn.execute("DELETE FROM objects WHERE id = ?1", [id])?;
        Ok(deleted)
    }

    /// Count all objects
    pub fn count_objects(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM objects", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Helper to convert a row to an ObjectRow
    fn row_to_object(&self, row: &rusqlite::Row) -> rusqlite::Result<ObjectRow> {
        Ok(ObjectRow {
            id: row.get(0)?,
            tag: row.get(1)?,
            payload: Payload::from_columns(row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?),
        })
    }

    // ========== Item Operations ==========

    /// Insert a batch of item rows with one cached statement
    pub fn insert_items(&self, rows: &[ItemRow]) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO items (id, key, ind, child_id) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for row in rows {
            stmt.execute(params![row.id, row.slot.key(), row.slot.ind(), row.child_id])?;
        }
        Ok(())
    }

    /// All edges of a parent, sequence positions first in index order, then keys in key order
    pub fn children(&self, parent: i64) -> Result<Vec<ItemRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, key, ind, child_id FROM items WHERE id = ?1 ORDER BY ind, key",
        )?;
        let items = stmt
            .query_map([parent], |row| self.row_to_item(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    /// Child id stored at a slot of a parent
    pub fn child(&self, parent: i64, slot: &Slot) -> Result<Option<i64>> {
        let ids = match slot {
            Slot::Ind(ind) => {
                let mut stmt = self.conn.prepare_cached(
                    "SELECT child_id FROM items WHERE id = ?1 AND ind = ?2",
                )?;
                stmt.query_map(params![parent, ind], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<i64>>>()?
            }
            Slot::Key(key) => {
                let mut stmt = self.conn.prepare_cached(
                    "SELECT child_id FROM items WHERE id = ?1 AND key = ?2",
                )?;
                stmt.query_map(params![parent, key], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<i64>>>()?
            }
        };

        match ids.as_slice() {
            [] => Ok(None),
            [id] => Ok(Some(*id)),
            _ => Err(Error::CorruptedState(format!(
                "object {} has {} items at {}",
                parent,
                ids.len(),
                slot
            ))),
        }
    }

    /// Point an existing edge at a different child
    pub fn set_child(&self, parent: i64, slot: &Slot, child: i64) -> Result<usize> {
        let changed = match slot {
            Slot::Ind(ind) => self.conn.execute(
                "UPDATE items SET child_id = ?3 WHERE id = ?1 AND ind = ?2",
                params![parent, ind, child],
            )?,
            Slot::Key(key) => self.conn.execute(
                "UPDATE items SET child_id = ?3 WHERE id = ?1 AND key = ?2",
                params![parent, key, child],
            )?,
        };
        Ok(changed)
    }

    pub fn delete_item(&self, parent: i64, slot: &Slot) -> Result<usize> {
        let deleted = match slot {
            Slot::Ind(ind) => self.conn.execute(
                "DELETE FROM items WHERE id = ?1 AND ind = ?2",
                params![parent, ind],
            )?,
            Slot::Key(key) => self.conn.execute(
                "DELETE FROM items WHERE id = ?1 AND key = ?2",
                params![parent, key],
            )?,
        };
        Ok(deleted)
    }

    /// Delete every edge of a parent
    pub fn delete_items(&self, parent: i64) -> Result<usize> {
        let deleted = self.conn.execute("DELETE FROM items WHERE id = ?1", [parent])?;
        Ok(deleted)
    }

    /// Number of edges of a parent
    pub fn count_children(&self, parent: i64) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM items WHERE id = ?1",
            [parent],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Number of index-addressed edges of a parent
    pub fn count_indexed(&self, parent: i64) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM items WHERE id = ?1 AND ind IS NOT NULL",
            [parent],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Sorted `ind` values of a parent
    pub fn indices(&self, parent: i64) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT ind FROM items WHERE id = ?1 AND ind IS NOT NULL ORDER BY ind",
        )?;
        let inds = stmt
            .query_map([parent], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(inds)
    }

    /// Count all items
    pub fn count_items(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Helper to convert a row to an ItemRow
    fn row_to_item(&self, row: &rusqlite::Row) -> rusqlite::Result<ItemRow> {
        let id: i64 = row.get(0)?;
        let key: Option<String> = row.get(1)?;
        let ind: Option<i64> = row.get(2)?;

        let slot = match (ind, key) {
            (Some(ind), _) => Slot::Ind(ind),
            (None, Some(key)) => Slot::Key(key),
            (None, None) => {
                let err = Error::CorruptedState(format!("item of object {} has neither key nor ind", id));
                return Err(rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Null,
                    Box::new(err),
                ));
            }
        };

        Ok(ItemRow {
            id,
            slot,
            child_id: row.get(3)?,
        })
    }

    // ========== Index Renumbering ==========
    //
    // Every renumbering goes through negative intermediates (-ind - 1) so the
    // unique (id, ind) index never sees two rows at the same position.

    /// Add `delta` to every `ind >= from` of a parent
    pub fn shift_indices(&self, parent: i64, from: i64, delta: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE items SET ind = -ind - 1 WHERE id = ?1 AND ind >= ?2",
            params![parent, from],
        )?;
        self.conn.execute(
            "UPDATE items SET ind = ?2 - ind - 1 WHERE id = ?1 AND ind < 0",
            params![parent, delta],
        )?;
        Ok(())
    }

    /// Map every `ind` of a parent to `len - 1 - ind`
    pub fn reverse_indices(&self, parent: i64, len: usize) -> Result<()> {
        self.conn.execute(
            "UPDATE items SET ind = -ind - 1 WHERE id = ?1 AND ind IS NOT NULL",
            [parent],
        )?;
        self.conn.execute(
            "UPDATE items SET ind = ?2 + ind WHERE id = ?1 AND ind < 0",
            params![parent, len as i64],
        )?;
        Ok(())
    }

    /// Reorder a parent's sequence: position `j` receives the edge currently at `order[j]`
    pub fn permute_indices(&self, parent: i64, order: &[i64]) -> Result<()> {
        self.conn.execute(
            "UPDATE items SET ind = -ind - 1 WHERE id = ?1 AND ind IS NOT NULL",
            [parent],
        )?;
        let mut stmt = self.conn.prepare_cached(
            "UPDATE items SET ind = ?3 WHERE id = ?1 AND ind = ?2",
        )?;
        for (position, &old) in order.iter().enumerate() {
            stmt.execute(params![parent, -old - 1, position as i64])?;
        }
        Ok(())
    }

    // ========== Reference Operations ==========

    /// Number of variables and items pointing at an object
    pub fn ref_count(&self, id: i64) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT (SELECT COUNT(*) FROM variables WHERE id = ?1) + (SELECT COUNT(*) FROM items WHERE child_id = ?1)",
            [id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Every id mentioned anywhere, sorted and distinct
    pub fn used_ids(&self) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM objects UNION SELECT id FROM items UNION SELECT child_id FROM items UNION SELECT id FROM variables ORDER BY 1",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// Largest id mentioned anywhere
    pub fn max_id(&self) -> Result<Option<i64>> {
        let max: Option<i64> = self.conn.query_row(
            "SELECT MAX(m) FROM (
                SELECT MAX(id) AS m FROM objects
                UNION ALL SELECT MAX(id) FROM items
                UNION ALL SELECT MAX(child_id) FROM items
                UNION ALL SELECT MAX(id) FROM variables
            )",
            [],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    // ========== Integrity Operations ==========

    /// Ids referenced by a variable or item but missing from objects
    pub fn dangling_ids(&self) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM variables WHERE id NOT IN (SELECT id FROM objects)
             UNION
             SELECT child_id FROM items WHERE child_id NOT IN (SELECT id FROM objects)
             ORDER BY 1",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// Objects nothing refers to
    pub fn orphan_objects(&self) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM objects
             WHERE id NOT IN (SELECT id FROM variables)
               AND id NOT IN (SELECT child_id FROM items)
             ORDER BY id",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// Parents of items whose parent object is missing
    pub fn orphan_item_parents(&self) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT id FROM items WHERE id NOT IN (SELECT id FROM objects) ORDER BY id",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// Parents whose `ind` values are not exactly 0..len
    pub fn sparse_sequences(&self) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM items WHERE ind IS NOT NULL
             GROUP BY id
             HAVING MIN(ind) != 0 OR MAX(ind) != COUNT(*) - 1
             ORDER BY id",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// (duplicate id, canonical id, type) for objects sharing type and payload with a lower id
    pub fn duplicate_objects(&self) -> Result<Vec<(i64, i64, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT o.id, c.id, o.type FROM objects o
             JOIN objects c ON c.type = o.type
                AND c.bool_val IS o.bool_val
                AND c.int_val IS o.int_val
                AND c.real_val IS o.real_val
                AND c.txt_val IS o.txt_val
                AND c.id < o.id
             WHERE NOT EXISTS (
                SELECT 1 FROM objects p
                WHERE p.type = o.type
                  AND p.bool_val IS o.bool_val
                  AND p.int_val IS o.int_val
                  AND p.real_val IS o.real_val
                  AND p.txt_val IS o.txt_val
                  AND p.id < c.id
             )
             ORDER BY o.id",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Remove variables and items pointing at missing objects
    pub fn delete_dangling_references(&self) -> Result<usize> {
        let vars = self.conn.execute(
            "DELETE FROM variables WHERE id NOT IN (SELECT id FROM objects)",
            [],
        )?;
        let items = self.conn.execute(
            "DELETE FROM items WHERE child_id NOT IN (SELECT id FROM objects)",
            [],
        )?;
        Ok(vars + items)
    }

    /// Repoint every reference from `duplicate` to `canonical`, then drop `duplicate`
    pub fn merge_object(&self, duplicate: i64, canonical: i64) -> Result<usize> {
        self.conn.execute(
            "UPDATE variables SET id = ?2 WHERE id = ?1",
            params![duplicate, canonical],
        )?;
        self.conn.execute(
            "UPDATE items SET child_id = ?2 WHERE child_id = ?1",
            params![duplicate, canonical],
        )?;
        self.delete_object(duplicate)
    }

    // ========== Bulk Operations ==========

    /// Begin a transaction
    pub fn begin_transaction(&self) -> Result<()> {
        self.conn.execute("BEGIN TRANSACTION", [])?;
        Ok(())
    }

    /// Commit a transaction
    pub fn commit(&self) -> Result<()> {
        self.conn.execute("COMMIT", [])?;
        Ok(())
    }

    /// Rollback a transaction
    pub fn rollback(&self) -> Result<()> {
        self.conn.execute("ROLLBACK", [])?;
        Ok(())
    }

    /// Whether the connection is outside any transaction
    pub fn is_autocommit(&self) -> bool {
        self.conn.is_autocommit()
    }

    /// Clear all data
    pub fn clear_all(&self) -> Result<()> {
        self.conn.execute("DELETE FROM items", [])?;
        self.conn.execute("DELETE FROM variables", [])?;
        self.conn.execute("DELETE FROM objects", [])?;
        Ok(())
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        Ok(DbStats {
            variables: self.count_variables()?,
            objects: self.count_objects()?,
            items: self.count_items()?,
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbStats {
    pub variables: usize,
    pub objects: usize,
    pub items: usize,
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  Variables: {}", self.variables)?;
        writeln!(f, "  Objects: {}", self.objects)?;
        writeln!(f, "  Items: {}", self.items)
    }
}

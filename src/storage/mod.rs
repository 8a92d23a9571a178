//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with tables:
//! - variables(name, id)
//! - objects(id, type, bool_val, int_val, real_val, txt_val)
//! - items(id, key, ind, child_id)

pub mod rows;
pub mod schema;
pub mod sqlite;

pub use rows::{ItemRow, ObjectRow, Payload, Slot};
pub use sqlite::{DbStats, SqliteStore};

//! # relstore - Relational Object Store
//!
//! Persists structured values into a normalized three-table SQLite schema and
//! hands them back as lazily loaded, container-like handles.
//!
//! relstore provides:
//! - A closed [`Value`] model (null, bool, int, float, text, list, tuple, map, ndarray)
//! - An open codec registry mapping values onto object and item rows
//! - Batched draft/commit writes with placeholder ids and scalar deduplication
//! - Reference-counted deletion of shared children
//! - numpy-style indexing over persisted N-dimensional arrays
//! - Nested transaction scoping

pub mod array;
pub mod codec;
pub mod config;
pub mod database;
pub mod draft;
pub mod ids;
pub mod index;
pub mod integrity;
pub mod storage;
pub mod transaction;
pub mod ui;
pub mod value;
pub mod views;

#[cfg(test)]
mod proptests;

// Re-exports for convenient access
pub use array::{DType, NdArray};
pub use codec::{Codec, Encoded, Registry};
pub use config::{OpenMode, Options, RelstoreConfig};
pub use database::{Database, Referrer};
pub use index::{Index, Resolved};
pub use integrity::Report;
pub use storage::{Payload, Slot, SqliteStore};
pub use value::Value;
pub use views::{ArrayView, Handle, Mapping, Scalar, Sequence, Stored};

/// Result type alias for relstore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for relstore operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    /// A cross-table invariant does not hold (duplicate rows, dangling ids)
    #[error("Corrupted state: {0}")]
    CorruptedState(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Immutable object: {0}")]
    Immutable(String),

    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    #[error("Shape mismatch: cannot broadcast {from:?} to {to:?}")]
    ShapeMismatch { from: Vec<usize>, to: Vec<usize> },

    #[error("Index error: {0}")]
    Index(String),

    /// An inner scope failed and rolled back the enclosing transaction
    #[error("Transaction aborted by an inner scope")]
    TransactionAborted,

    #[error("Mode error: {0}")]
    Mode(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

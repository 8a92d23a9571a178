//! Nested transaction scoping
//!
//! Only the outermost scope talks to SQLite: `BEGIN` on the way in, `COMMIT`
//! on the way out. A failure at any depth rolls back immediately and leaves
//! the enclosing scopes aborted until the outermost one exits.

use std::cell::Cell;

use crate::storage::SqliteStore;
use crate::{Error, Result};

/// Per-handle nesting counter
#[derive(Debug, Default)]
pub struct TransactionManager {
    depth: Cell<usize>,
    aborted: Cell<bool>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    pub fn is_active(&self) -> bool {
        self.depth.get() > 0
    }

    /// Whether an inner scope failed and the outermost one has not exited yet
    pub fn is_aborted(&self) -> bool {
        self.aborted.get()
    }

    /// Enter a scope
    pub fn enter(&self, store: &SqliteStore) -> Result<()> {
        if self.aborted.get() {
            return Err(Error::TransactionAborted);
        }
        if self.depth.get() == 0 {
            store.begin_transaction()?;
            tracing::trace!("BEGIN");
        }
        self.depth.set(self.depth.get() + 1);
        Ok(())
    }

    /// Leave a scope successfully
    pub fn leave(&self, store: &SqliteStore) -> Result<()> {
        let depth = self.pop()?;
        if self.aborted.get() {
            if depth == 0 {
                self.aborted.set(false);
            }
            return Err(Error::TransactionAborted);
        }
        if depth == 0 {
            if let Err(e) = store.commit() {
                tracing::warn!(error = %e, "COMMIT failed; rolling back");
                if let Err(rollback) = store.rollback() {
                    tracing::warn!(error = %rollback, "ROLLBACK failed");
                }
                return Err(e);
            }
            tracing::trace!("COMMIT");
        }
        Ok(())
    }

    /// Leave a scope after a failure
    pub fn abort(&self, store: &SqliteStore) {
        let Ok(depth) = self.pop() else {
            return;
        };
        if !self.aborted.get() {
            if let Err(e) = store.rollback() {
                tracing::warn!(error = %e, "ROLLBACK failed");
            }
            tracing::debug!(depth, "transaction rolled back");
        }
        self.aborted.set(depth > 0);
    }

    /// Run `f` inside a scope
    pub fn run<T>(&self, store: &SqliteStore, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.enter(store)?;
        match f() {
            Ok(value) => {
                self.leave(store)?;
                Ok(value)
            }
            Err(e) => {
                self.abort(store);
                Err(e)
            }
        }
    }

    fn pop(&self) -> Result<usize> {
        let depth = self.depth.get().checked_sub(1).ok_or_else(|| {
            Error::CorruptedState("transaction exit without a matching enter".to_string())
        })?;
        self.depth.set(depth);
        Ok(depth)
    }
}

/// Scope guard returned by [`crate::Database::begin`].
///
/// Dropping it without calling [`Transaction::commit`] rolls back.
pub struct Transaction<'a> {
    manager: &'a TransactionManager,
    store: &'a SqliteStore,
    finished: bool,
}

impl<'a> Transaction<'a> {
    pub fn new(manager: &'a TransactionManager, store: &'a SqliteStore) -> Result<Self> {
        manager.enter(store)?;
        Ok(Self { manager, store, finished: false })
    }

    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        self.manager.leave(self.store)
    }

    pub fn rollback(mut self) {
        self.finished = true;
        self.manager.abort(self.store);
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.manager.abort(self.store);
        }
    }
}

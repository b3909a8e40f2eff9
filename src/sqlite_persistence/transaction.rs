//! Reference-counted transaction scopes over a single SQLite connection.
//!
//! Repository operations call each other (adding a song adds its path, file,
//! genres and artists), and each of them wants to run inside a transaction.
//! SQLite has no nested BEGIN, so scopes are counted: only the outermost
//! scope issues BEGIN and COMMIT/ROLLBACK. An inner scope that fails or is
//! dropped without commit marks the whole transaction for rollback.

use anyhow::{bail, Result};
use rusqlite::Connection;
use std::cell::Cell;
use std::ops::Deref;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Plain BEGIN, for multi-row reads.
    Deferred,
    /// BEGIN IMMEDIATE, for anything that writes.
    Immediate,
}

pub struct ScopedConnection {
    conn: Connection,
    depth: Cell<u32>,
    rollback_only: Cell<bool>,
}

impl ScopedConnection {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            depth: Cell::new(0),
            rollback_only: Cell::new(false),
        }
    }

    pub fn depth(&self) -> u32 {
        self.depth.get()
    }

    /// Opens a scope. The outermost scope starts the SQLite transaction.
    pub fn scope(&self, mode: TransactionMode) -> Result<TransactionScope<'_>> {
        if self.depth.get() == 0 {
            let begin = match mode {
                TransactionMode::Deferred => "BEGIN",
                TransactionMode::Immediate => "BEGIN IMMEDIATE",
            };
            self.conn.execute(begin, [])?;
            self.rollback_only.set(false);
        }
        self.depth.set(self.depth.get() + 1);
        Ok(TransactionScope {
            conn: self,
            finished: false,
        })
    }

    /// Runs `f` inside a scope, committing on success and rolling back on error.
    pub fn transaction<T>(
        &self,
        mode: TransactionMode,
        f: impl FnOnce(&ScopedConnection) -> Result<T>,
    ) -> Result<T> {
        let scope = self.scope(mode)?;
        match f(self) {
            Ok(value) => {
                scope.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = scope.rollback() {
                    warn!("Rollback after failure also failed: {:?}", rollback_err);
                }
                Err(e)
            }
        }
    }

    fn leave(&self, commit: bool) -> Result<()> {
        if !commit {
            self.rollback_only.set(true);
        }
        let depth = self.depth.get().saturating_sub(1);
        self.depth.set(depth);
        if depth > 0 {
            return Ok(());
        }

        if self.rollback_only.get() {
            self.conn.execute("ROLLBACK", [])?;
            if commit {
                bail!("Transaction was rolled back because an inner scope failed");
            }
            return Ok(());
        }

        if let Err(e) = self.conn.execute("COMMIT", []) {
            let _ = self.conn.execute("ROLLBACK", []);
            return Err(e.into());
        }
        Ok(())
    }
}

impl Deref for ScopedConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

#[must_use = "a scope dropped without commit rolls back the transaction"]
pub struct TransactionScope<'a> {
    conn: &'a ScopedConnection,
    finished: bool,
}

impl TransactionScope<'_> {
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        self.conn.leave(true)
    }

    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.conn.leave(false)
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.leave(false) {
                warn!("Failed to roll back abandoned transaction scope: {:?}", e);
            }
        }
    }
}

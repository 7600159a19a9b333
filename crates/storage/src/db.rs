// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Embedded relational store.
//!
//! One [`Database`] wraps a single SQLite file in WAL mode with two logical
//! connections: a write connection serialized behind a mutex, and a read
//! connection for concurrent queries. [`Database::transaction`] binds all
//! calls inside the closure to the write connection so reads observe
//! uncommitted writes within the transaction.

use crate::error::StorageError;
use meridian_core::Tier;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

/// Result of a write statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunResult {
    pub changes: usize,
    pub last_insert_rowid: i64,
}

/// A single SQLite database file with WAL and split read/write connections.
pub struct Database {
    path: PathBuf,
    write: Mutex<Connection>,
    read: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database at `path` and apply the WAL and
    /// tier-sizing pragmas to both connections.
    pub fn open(path: &Path, tier: Tier) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let write = Connection::open(path)?;
        apply_pragmas(&write, tier)?;
        let read = Connection::open(path)?;
        apply_pragmas(&read, tier)?;
        Ok(Self { path: path.to_path_buf(), write: Mutex::new(write), read: Mutex::new(read) })
    }

    /// In-memory database for tests. Read and write share one connection
    /// because a `:memory:` database is per-connection.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        // Shared-cache URI so both connections see the same data.
        let name = format!(
            "file:mem-{}?mode=memory&cache=shared",
            std::process::id() as u64 ^ rand::random::<u64>()
        );
        let write = Connection::open(&name)?;
        let read = Connection::open(&name)?;
        Ok(Self { path: PathBuf::from(name), write: Mutex::new(write), read: Mutex::new(read) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a query on the read connection and map each row.
    pub fn query<T>(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
        mut map: impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>, StorageError> {
        let conn = self.read.lock();
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params, |row| map(row))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Run a single query expected to return at most one row.
    pub fn query_row<T>(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
        map: impl FnOnce(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Option<T>, StorageError> {
        let conn = self.read.lock();
        let mut stmt = conn.prepare_cached(sql)?;
        match stmt.query_row(params, map) {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Execute a write statement on the serialized write connection.
    pub fn run(&self, sql: &str, params: impl rusqlite::Params) -> Result<RunResult, StorageError> {
        let conn = self.write.lock();
        let mut stmt = conn.prepare_cached(sql)?;
        let changes = stmt.execute(params)?;
        Ok(RunResult { changes, last_insert_rowid: conn.last_insert_rowid() })
    }

    /// Execute a batch of statements (migrations).
    pub fn execute_batch(&self, sql: &str) -> Result<(), StorageError> {
        let conn = self.write.lock();
        conn.execute_batch(sql)?;
        Ok(())
    }

    /// Run `f` inside BEGIN IMMEDIATE / COMMIT on the write connection.
    /// Rollback on error is handled by the transaction guard.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut conn = self.write.lock();
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Hot snapshot of this database into `dest`.
    pub fn backup(&self, dest: &Path) -> Result<(), StorageError> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let src = self.read.lock();
        let mut dst = Connection::open(dest)?;
        let backup = rusqlite::backup::Backup::new(&src, &mut dst)?;
        backup.run_to_completion(64, std::time::Duration::from_millis(5), None)?;
        Ok(())
    }
}

fn apply_pragmas(conn: &Connection, tier: Tier) -> Result<(), rusqlite::Error> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "busy_timeout", 5_000)?;
    // Negative cache_size is KiB; mmap_size is bytes.
    let (cache_kib, mmap_bytes): (i64, i64) = match tier {
        Tier::Pi => (-2_048, 0),
        Tier::Desktop => (-16_384, 268_435_456),
        Tier::Vps => (-65_536, 1_073_741_824),
    };
    conn.pragma_update(None, "cache_size", cache_kib)?;
    conn.pragma_update(None, "mmap_size", mmap_bytes)?;
    Ok(())
}

#[cfg(test)]
#[path = "db_tests.rs"]
mod tests;

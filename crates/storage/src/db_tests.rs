// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::error::StorageError;

fn scratch() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT UNIQUE)").unwrap();
    db
}

#[test]
fn run_reports_changes_and_rowid() {
    let db = scratch();
    let result = db.run("INSERT INTO t (name) VALUES (?1)", ["a"]).unwrap();
    assert_eq!(result.changes, 1);
    assert_eq!(result.last_insert_rowid, 1);
}

#[test]
fn query_reads_committed_writes() {
    let db = scratch();
    db.run("INSERT INTO t (name) VALUES ('a')", []).unwrap();
    let names =
        db.query("SELECT name FROM t", [], |row| row.get::<_, String>(0)).unwrap();
    assert_eq!(names, vec!["a".to_string()]);
}

#[test]
fn unique_violation_is_conflict() {
    let db = scratch();
    db.run("INSERT INTO t (name) VALUES ('a')", []).unwrap();
    let err = db.run("INSERT INTO t (name) VALUES ('a')", []).unwrap_err();
    assert!(matches!(err, StorageError::Conflict(_)), "got {err:?}");
}

#[test]
fn transaction_commits() {
    let db = scratch();
    db.transaction(|conn| {
        conn.execute("INSERT INTO t (name) VALUES ('a')", [])?;
        conn.execute("INSERT INTO t (name) VALUES ('b')", [])?;
        Ok(())
    })
    .unwrap();
    let count =
        db.query_row("SELECT COUNT(*) FROM t", [], |row| row.get::<_, i64>(0)).unwrap();
    assert_eq!(count, Some(2));
}

#[test]
fn transaction_rolls_back_on_error() {
    let db = scratch();
    let result: Result<(), StorageError> = db.transaction(|conn| {
        conn.execute("INSERT INTO t (name) VALUES ('a')", [])?;
        Err(StorageError::Conflict("boom".to_string()))
    });
    assert!(result.is_err());
    let count =
        db.query_row("SELECT COUNT(*) FROM t", [], |row| row.get::<_, i64>(0)).unwrap();
    assert_eq!(count, Some(0));
}

#[test]
fn transaction_reads_own_writes() {
    let db = scratch();
    db.transaction(|conn| {
        conn.execute("INSERT INTO t (name) VALUES ('a')", [])?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))?;
        assert_eq!(count, 1);
        Ok(())
    })
    .unwrap();
}

#[test]
fn query_row_none_on_empty() {
    let db = scratch();
    let row = db
        .query_row("SELECT name FROM t WHERE id = 999", [], |row| row.get::<_, String>(0))
        .unwrap();
    assert!(row.is_none());
}

#[test]
fn backup_copies_data() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(&dir.path().join("live.db"), meridian_core::Tier::Desktop).unwrap();
    db.execute_batch("CREATE TABLE t (v TEXT)").unwrap();
    db.run("INSERT INTO t (v) VALUES ('x')", []).unwrap();

    let dest = dir.path().join("snap.db");
    db.backup(&dest).unwrap();

    let copy = Database::open(&dest, meridian_core::Tier::Desktop).unwrap();
    let values = copy.query("SELECT v FROM t", [], |row| row.get::<_, String>(0)).unwrap();
    assert_eq!(values, vec!["x".to_string()]);
}

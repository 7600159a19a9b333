// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn meridian_migrations_are_idempotent() {
    let db = Database::open_in_memory().unwrap();
    migrate_meridian(&db).unwrap();
    migrate_meridian(&db).unwrap();

    // All expected tables exist
    for table in ["jobs", "nonces", "sessions", "auth_failures", "disabled_gears"] {
        let found = db
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get::<_, String>(0),
            )
            .unwrap();
        assert_eq!(found.as_deref(), Some(table));
    }
}

#[test]
fn sentinel_migrations_create_tables() {
    let db = Database::open_in_memory().unwrap();
    migrate_sentinel(&db).unwrap();
    for table in ["approval_cache", "user_policies"] {
        let found = db
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get::<_, String>(0),
            )
            .unwrap();
        assert_eq!(found.as_deref(), Some(table));
    }
}

#[test]
fn schema_version_tracks_highest_applied() {
    let db = Database::open_in_memory().unwrap();
    migrate_meridian(&db).unwrap();
    let version = db
        .query_row("SELECT version FROM schema_version", [], |row| row.get::<_, i64>(0))
        .unwrap();
    assert_eq!(version, Some(4));
}

#[test]
fn dedup_partial_index_only_guards_active_rows() {
    let db = Database::open_in_memory().unwrap();
    migrate_meridian(&db).unwrap();

    let insert = |id: &str, status: &str| {
        db.run(
            "INSERT INTO jobs (id, status, priority, source, content, user_id, created_at, \
             updated_at, dedup_hash) VALUES (?1, ?2, 1, 'user', 'c', 'u', 0, 0, 'h1')",
            rusqlite::params![id, status],
        )
    };

    insert("job-1", "completed").unwrap();
    // A terminal row with the same hash does not block a new active row
    insert("job-2", "pending").unwrap();
    // A second active row with the same hash does
    assert!(matches!(
        insert("job-3", "pending").unwrap_err(),
        crate::error::StorageError::Conflict(_)
    ));
}

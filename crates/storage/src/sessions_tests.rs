// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::migrations;

fn test_db() -> Database {
    let db = Database::open_in_memory().unwrap();
    migrations::migrate_meridian(&db).unwrap();
    db
}

#[test]
fn create_and_validate() {
    let db = test_db();
    let store = SessionStore::new(&db);
    let session = store.create("operator", 1_000, 10_000).unwrap();
    assert_eq!(session.id.len(), 64);
    assert_eq!(session.expires_at, 11_000);

    let found = store.validate(&session.id, 5_000).unwrap().unwrap();
    assert_eq!(found, session);
}

#[test]
fn expired_session_does_not_validate() {
    let db = test_db();
    let store = SessionStore::new(&db);
    let session = store.create("operator", 1_000, 5_000).unwrap();
    assert!(store.validate(&session.id, 6_001).unwrap().is_none());
}

#[test]
fn unknown_session_is_none() {
    let db = test_db();
    let store = SessionStore::new(&db);
    assert!(store.validate("not-a-session", 1_000).unwrap().is_none());
}

#[test]
fn delete_is_logout() {
    let db = test_db();
    let store = SessionStore::new(&db);
    let session = store.create("operator", 1_000, 10_000).unwrap();
    assert!(store.delete(&session.id).unwrap());
    assert!(!store.delete(&session.id).unwrap());
    assert!(store.validate(&session.id, 2_000).unwrap().is_none());
}

#[test]
fn prune_removes_only_expired() {
    let db = test_db();
    let store = SessionStore::new(&db);
    store.create("a", 1_000, 1_000).unwrap();
    let live = store.create("b", 1_000, 100_000).unwrap();

    assert_eq!(store.prune_expired(50_000).unwrap(), 1);
    assert!(store.validate(&live.id, 50_000).unwrap().is_some());
}

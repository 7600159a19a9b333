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
fn issue_produces_256_bit_hex_nonce() {
    let db = test_db();
    let store = NonceStore::new(&db);
    let issued = store.issue(&JobId::from_string("job-1"), 1_000, DEFAULT_NONCE_TTL_MS).unwrap();
    assert_eq!(issued.nonce.len(), 64);
    assert!(issued.nonce.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(issued.expires_at, 1_000 + DEFAULT_NONCE_TTL_MS);
}

#[test]
fn consume_succeeds_at_most_once() {
    let db = test_db();
    let store = NonceStore::new(&db);
    let job = JobId::from_string("job-1");
    let issued = store.issue(&job, 1_000, 10_000).unwrap();

    assert!(store.consume(&job, &issued.nonce, 2_000).unwrap());
    // Replay fails: the row was deleted on first use
    assert!(!store.consume(&job, &issued.nonce, 2_001).unwrap());
}

#[test]
fn wrong_nonce_rejected_and_preserved() {
    let db = test_db();
    let store = NonceStore::new(&db);
    let job = JobId::from_string("job-1");
    let issued = store.issue(&job, 1_000, 10_000).unwrap();

    assert!(!store.consume(&job, "deadbeef", 2_000).unwrap());
    // The real nonce still works after a bad attempt
    assert!(store.consume(&job, &issued.nonce, 2_001).unwrap());
}

#[test]
fn expired_nonce_rejected() {
    let db = test_db();
    let store = NonceStore::new(&db);
    let job = JobId::from_string("job-1");
    let issued = store.issue(&job, 1_000, 5_000).unwrap();
    assert!(!store.consume(&job, &issued.nonce, 6_000).unwrap());
}

#[test]
fn reissue_replaces_previous_nonce() {
    let db = test_db();
    let store = NonceStore::new(&db);
    let job = JobId::from_string("job-1");
    let first = store.issue(&job, 1_000, 10_000).unwrap();
    let second = store.issue(&job, 2_000, 10_000).unwrap();
    assert_ne!(first.nonce, second.nonce);

    assert!(!store.consume(&job, &first.nonce, 3_000).unwrap());
    assert!(store.consume(&job, &second.nonce, 3_000).unwrap());
}

#[test]
fn prune_removes_only_expired() {
    let db = test_db();
    let store = NonceStore::new(&db);
    store.issue(&JobId::from_string("job-1"), 1_000, 1_000).unwrap();
    store.issue(&JobId::from_string("job-2"), 1_000, 100_000).unwrap();

    assert_eq!(store.prune_expired(50_000).unwrap(), 1);
    assert_eq!(store.prune_expired(50_000).unwrap(), 0);
}

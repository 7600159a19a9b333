// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::migrations;

fn test_db() -> Database {
    let db = Database::open_in_memory().unwrap();
    migrations::migrate_sentinel(&db).unwrap();
    db
}

#[test]
fn approval_cache_honors_ttl() {
    let db = test_db();
    let store = SentinelStore::new(&db);
    store.cache_approval("fp-1", 1_000, 5_000).unwrap();

    assert!(store.is_approved("fp-1", 2_000).unwrap());
    assert!(!store.is_approved("fp-1", 6_001).unwrap());
    assert!(!store.is_approved("fp-other", 2_000).unwrap());
}

#[test]
fn prune_approval_cache_removes_expired() {
    let db = test_db();
    let store = SentinelStore::new(&db);
    store.cache_approval("fp-old", 1_000, 1_000).unwrap();
    store.cache_approval("fp-new", 1_000, 100_000).unwrap();

    assert_eq!(store.prune_approval_cache(10_000).unwrap(), 1);
    assert!(store.is_approved("fp-new", 10_000).unwrap());
}

#[test]
fn policies_round_trip_and_replace() {
    let db = test_db();
    let store = SentinelStore::new(&db);
    store
        .store_policy(
            UserPolicy { action_type: ActionType::NetworkGet, verdict: Verdict::NeedsUserApproval },
            1_000,
        )
        .unwrap();
    store
        .store_policy(
            UserPolicy { action_type: ActionType::NetworkGet, verdict: Verdict::Rejected },
            2_000,
        )
        .unwrap();
    store
        .store_policy(
            UserPolicy { action_type: ActionType::SendMessage, verdict: Verdict::Rejected },
            3_000,
        )
        .unwrap();

    let policies = store.load_policies().unwrap();
    assert_eq!(policies.len(), 2);
    let get = policies.iter().find(|p| p.action_type == ActionType::NetworkGet).unwrap();
    assert_eq!(get.verdict, Verdict::Rejected);
}

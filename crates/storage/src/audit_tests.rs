// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use meridian_core::Tier;

fn open_log(dir: &Path, now_ms: i64) -> AuditLog {
    AuditLog::open(dir, Tier::Desktop, now_ms).unwrap()
}

#[test]
fn first_entry_chains_from_genesis() {
    let dir = tempfile::tempdir().unwrap();
    let log = open_log(dir.path(), 1_000);
    let entry = log.append(AuditEvent::new("scheduler", "job.created"), 1_000).unwrap();
    assert_eq!(entry.previous_hash, GENESIS_HASH);
    assert_eq!(entry.entry_hash.len(), 64);
}

#[test]
fn entries_chain_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let log = open_log(dir.path(), 1_000);
    let first = log.append(AuditEvent::new("scheduler", "job.created"), 1_000).unwrap();
    let second = log
        .append(
            AuditEvent::new("scheduler", "job.transition")
                .job_id(JobId::from_string("job-1"))
                .details(serde_json::json!({"from": "pending", "to": "planning"})),
            1_001,
        )
        .unwrap();
    assert_eq!(second.previous_hash, first.entry_hash);
    assert!(matches!(log.verify().unwrap(), ChainStatus::Intact { entries: 2 }));
}

#[test]
fn chain_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let first_hash = {
        let log = open_log(dir.path(), 1_000);
        log.append(AuditEvent::new("scheduler", "job.created"), 1_000).unwrap().entry_hash
    };
    let log = open_log(dir.path(), 2_000);
    let next = log.append(AuditEvent::new("scheduler", "job.completed"), 2_000).unwrap();
    assert_eq!(next.previous_hash, first_hash);
    assert!(matches!(log.verify().unwrap(), ChainStatus::Intact { entries: 2 }));
}

#[test]
fn tampering_is_detected_with_first_divergent_id() {
    let dir = tempfile::tempdir().unwrap();
    let log = open_log(dir.path(), 1_000);
    log.append(AuditEvent::new("scheduler", "job.created"), 1_000).unwrap();
    let victim = log.append(AuditEvent::new("sandbox", "gear.spawn"), 1_001).unwrap();
    log.append(AuditEvent::new("sandbox", "gear.kill"), 1_002).unwrap();

    // Rewrite the middle entry behind the log's back
    let db = Database::open(
        &dir.path().join(format!("audit-{}.db", month_of(1_000))),
        Tier::Desktop,
    )
    .unwrap();
    db.run(
        "UPDATE audit_entries SET actor = 'intruder' WHERE id = ?1",
        [victim.id],
    )
    .unwrap();

    match log.verify().unwrap() {
        ChainStatus::Broken { first_divergent_id } => assert_eq!(first_divergent_id, victim.id),
        other => panic!("expected broken chain, got {other:?}"),
    }
}

#[test]
fn month_partitions_roll_on_append() {
    let dir = tempfile::tempdir().unwrap();
    // 2026-01-15 and 2026-02-02 in epoch ms
    let january = 1_768_435_200_000i64;
    let february = 1_769_990_400_000i64;
    assert_eq!(month_of(january), "2026-01");
    assert_eq!(month_of(february), "2026-02");

    let log = open_log(dir.path(), january);
    log.append(AuditEvent::new("scheduler", "job.created"), january).unwrap();
    assert_eq!(log.current_month(), "2026-01");

    let rolled = log.append(AuditEvent::new("scheduler", "job.created"), february).unwrap();
    assert_eq!(log.current_month(), "2026-02");
    // New partition restarts the chain from genesis
    assert_eq!(rolled.previous_hash, GENESIS_HASH);
    assert!(dir.path().join("audit-2026-01.db").exists());
    assert!(dir.path().join("audit-2026-02.db").exists());
}

#[test]
fn risk_and_target_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let log = open_log(dir.path(), 1_000);
    log.append(
        AuditEvent::new("sandbox", "gear.integrity_failure")
            .risk(RiskLevel::Critical)
            .target("gear-files"),
        1_000,
    )
    .unwrap();

    let entries = log.entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].risk, RiskLevel::Critical);
    assert_eq!(entries[0].target.as_deref(), Some("gear-files"));
}

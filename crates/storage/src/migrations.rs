// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schema migrations, applied in order at startup.
//!
//! Each migration runs at most once; `schema_version` records the highest
//! applied index.

use crate::db::Database;
use crate::error::StorageError;

const MERIDIAN_MIGRATIONS: &[&str] = &[
    // 1: jobs
    "CREATE TABLE IF NOT EXISTS jobs (
        id TEXT PRIMARY KEY,
        status TEXT NOT NULL,
        priority INTEGER NOT NULL DEFAULT 1,
        source TEXT NOT NULL,
        content TEXT NOT NULL,
        user_id TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        completed_at INTEGER,
        worker_id TEXT,
        attempts INTEGER NOT NULL DEFAULT 0,
        max_attempts INTEGER NOT NULL DEFAULT 3,
        timeout_ms INTEGER,
        plan TEXT,
        validation TEXT,
        result TEXT,
        error TEXT,
        revision_count INTEGER NOT NULL DEFAULT 0,
        replan_count INTEGER NOT NULL DEFAULT 0,
        dedup_hash TEXT,
        parent_id TEXT,
        conversation_id TEXT,
        source_message_id TEXT,
        metadata TEXT NOT NULL DEFAULT '{}'
    );
    CREATE INDEX IF NOT EXISTS jobs_status_idx ON jobs(status);
    CREATE INDEX IF NOT EXISTS jobs_claim_idx ON jobs(status, priority DESC, created_at ASC);
    CREATE UNIQUE INDEX IF NOT EXISTS jobs_dedup_active
        ON jobs(dedup_hash)
        WHERE dedup_hash IS NOT NULL
          AND status NOT IN ('completed', 'failed', 'cancelled');",
    // 2: approval nonces
    "CREATE TABLE IF NOT EXISTS nonces (
        job_id TEXT PRIMARY KEY,
        nonce TEXT NOT NULL,
        issued_at INTEGER NOT NULL,
        expires_at INTEGER NOT NULL
    );",
    // 3: bridge sessions (auth collaborator; pruned by maintenance)
    "CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        expires_at INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS auth_failures (
        ip TEXT PRIMARY KEY,
        count INTEGER NOT NULL DEFAULT 0,
        locked_until INTEGER
    );",
    // 4: disabled gears survive restarts
    "CREATE TABLE IF NOT EXISTS disabled_gears (
        gear_id TEXT PRIMARY KEY,
        reason TEXT NOT NULL,
        disabled_at INTEGER NOT NULL
    );",
];

const SENTINEL_MIGRATIONS: &[&str] = &[
    // 1: approval cache + stored user policy overrides
    "CREATE TABLE IF NOT EXISTS approval_cache (
        fingerprint TEXT PRIMARY KEY,
        verdict TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        expires_at INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS user_policies (
        action_type TEXT PRIMARY KEY,
        verdict TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    );",
];

const AUDIT_MIGRATIONS: &[&str] = &[
    // 1: append-only hash-chained entries
    "CREATE TABLE IF NOT EXISTS audit_entries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ts INTEGER NOT NULL,
        actor TEXT NOT NULL,
        action TEXT NOT NULL,
        risk TEXT NOT NULL,
        target TEXT,
        job_id TEXT,
        previous_hash TEXT NOT NULL,
        entry_hash TEXT NOT NULL,
        details TEXT NOT NULL DEFAULT '{}'
    );",
];

fn apply(db: &Database, migrations: &[&str]) -> Result<(), StorageError> {
    db.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL DEFAULT 0);",
    )?;
    let current: i64 = db
        .query_row("SELECT version FROM schema_version", [], |row| row.get(0))?
        .unwrap_or(0);
    if current == 0 {
        db.run("INSERT INTO schema_version (version) VALUES (0)", [])?;
    }
    for (index, sql) in migrations.iter().enumerate() {
        let version = (index + 1) as i64;
        if version <= current {
            continue;
        }
        db.execute_batch(sql)?;
        db.run("UPDATE schema_version SET version = ?1", [version])?;
        tracing::debug!(version, "applied migration");
    }
    Ok(())
}

pub fn migrate_meridian(db: &Database) -> Result<(), StorageError> {
    apply(db, MERIDIAN_MIGRATIONS)
}

pub fn migrate_sentinel(db: &Database) -> Result<(), StorageError> {
    apply(db, SENTINEL_MIGRATIONS)
}

pub fn migrate_audit(db: &Database) -> Result<(), StorageError> {
    apply(db, AUDIT_MIGRATIONS)
}

#[cfg(test)]
#[path = "migration_tests.rs"]
mod tests;

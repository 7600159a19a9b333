// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sentinel store: approval cache and stored user policy overrides.

use crate::db::Database;
use crate::error::StorageError;
use meridian_core::{ActionType, UserPolicy, Verdict};
use rusqlite::params;

/// Default approval-cache entry lifetime (1 hour).
pub const DEFAULT_APPROVAL_CACHE_TTL_MS: i64 = 3_600_000;

pub struct SentinelStore<'a> {
    db: &'a Database,
}

impl<'a> SentinelStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    // ── Approval cache ──────────────────────────────────────────────────

    /// Record that the operator approved the action behind `fingerprint`.
    pub fn cache_approval(
        &self,
        fingerprint: &str,
        now_ms: i64,
        ttl_ms: i64,
    ) -> Result<(), StorageError> {
        self.db.run(
            "INSERT INTO approval_cache (fingerprint, verdict, created_at, expires_at) \
             VALUES (?1, 'approved', ?2, ?3) \
             ON CONFLICT(fingerprint) DO UPDATE SET created_at = ?2, expires_at = ?3",
            params![fingerprint, now_ms, now_ms + ttl_ms],
        )?;
        Ok(())
    }

    /// Whether a live cache entry approves `fingerprint`.
    pub fn is_approved(&self, fingerprint: &str, now_ms: i64) -> Result<bool, StorageError> {
        let hit = self.db.query_row(
            "SELECT 1 FROM approval_cache WHERE fingerprint = ?1 AND expires_at > ?2",
            params![fingerprint, now_ms],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(hit.is_some())
    }

    pub fn prune_approval_cache(&self, now_ms: i64) -> Result<usize, StorageError> {
        let result =
            self.db.run("DELETE FROM approval_cache WHERE expires_at <= ?1", [now_ms])?;
        Ok(result.changes)
    }

    // ── User policy overrides ───────────────────────────────────────────

    /// Persist an override. Stored as-is; the policy engine enforces the
    /// stricter-only rule when applying.
    pub fn store_policy(&self, policy: UserPolicy, now_ms: i64) -> Result<(), StorageError> {
        self.db.run(
            "INSERT INTO user_policies (action_type, verdict, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(action_type) DO UPDATE SET verdict = ?2, updated_at = ?3",
            params![policy.action_type.to_string(), policy.verdict.to_string(), now_ms],
        )?;
        Ok(())
    }

    pub fn load_policies(&self) -> Result<Vec<UserPolicy>, StorageError> {
        let rows = self.db.query(
            "SELECT action_type, verdict FROM user_policies ORDER BY action_type ASC",
            [],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )?;
        let mut out = Vec::with_capacity(rows.len());
        for (action, verdict) in rows {
            let action_type = ActionType::parse(&action).ok_or_else(|| StorageError::Corrupt {
                id: action.clone(),
                reason: "bad action_type".to_string(),
            })?;
            let verdict = Verdict::parse(&verdict).ok_or_else(|| StorageError::Corrupt {
                id: action.clone(),
                reason: "bad verdict".to_string(),
            })?;
            out.push(UserPolicy { action_type, verdict });
        }
        Ok(out)
    }
}

#[cfg(test)]
#[path = "sentinel_tests.rs"]
mod tests;

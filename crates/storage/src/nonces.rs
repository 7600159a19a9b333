// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-use approval nonces.
//!
//! A nonce binds one approval decision to one job. Verification deletes the
//! row in the same statement, so a replayed nonce can never succeed twice.

use crate::db::Database;
use crate::error::StorageError;
use meridian_core::JobId;
use rand::RngCore;
use rusqlite::params;

/// Default nonce lifetime (15 minutes).
pub const DEFAULT_NONCE_TTL_MS: i64 = 900_000;

/// An issued nonce, returned once at issue time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalNonce {
    pub job_id: JobId,
    pub nonce: String,
    pub expires_at: i64,
}

pub struct NonceStore<'a> {
    db: &'a Database,
}

impl<'a> NonceStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Issue a fresh 256-bit nonce for the job, replacing any prior one.
    pub fn issue(&self, job_id: &JobId, now_ms: i64, ttl_ms: i64) -> Result<ApprovalNonce, StorageError> {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let nonce = hex::encode(bytes);
        let expires_at = now_ms + ttl_ms;
        self.db.run(
            "INSERT INTO nonces (job_id, nonce, issued_at, expires_at) VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(job_id) DO UPDATE SET nonce = ?2, issued_at = ?3, expires_at = ?4",
            params![job_id.as_str(), nonce, now_ms, expires_at],
        )?;
        Ok(ApprovalNonce { job_id: job_id.clone(), nonce, expires_at })
    }

    /// Verify and consume. Returns true exactly once per issued nonce; the
    /// delete and the check are a single atomic statement.
    pub fn consume(&self, job_id: &JobId, nonce: &str, now_ms: i64) -> Result<bool, StorageError> {
        let result = self.db.run(
            "DELETE FROM nonces WHERE job_id = ?1 AND nonce = ?2 AND expires_at > ?3",
            params![job_id.as_str(), nonce, now_ms],
        )?;
        Ok(result.changes == 1)
    }

    /// Drop nonces past their expiry.
    pub fn prune_expired(&self, now_ms: i64) -> Result<usize, StorageError> {
        let result =
            self.db.run("DELETE FROM nonces WHERE expires_at <= ?1", [now_ms])?;
        Ok(result.changes)
    }
}

#[cfg(test)]
#[path = "nonces_tests.rs"]
mod tests;

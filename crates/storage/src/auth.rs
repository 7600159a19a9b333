// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-IP brute-force accounting for the bridge's auth collaborator.
//!
//! Failures accumulate per source address; crossing the configured
//! threshold arms a lockout window sized by `lockout_attempts` minutes of
//! climbing backoff. Any successful login clears the counter.

use crate::db::Database;
use crate::error::StorageError;
use meridian_core::BruteForceConfig;
use rusqlite::params;

/// One minute per excess attempt, linear.
const LOCKOUT_STEP_MS: i64 = 60_000;

pub struct AuthGuard<'a> {
    db: &'a Database,
    config: BruteForceConfig,
}

impl<'a> AuthGuard<'a> {
    pub fn new(db: &'a Database, config: BruteForceConfig) -> Self {
        Self { db, config }
    }

    /// Record one failed attempt. Returns the updated failure count.
    pub fn record_failure(&self, ip: &str, now_ms: i64) -> Result<u32, StorageError> {
        self.db.run(
            "INSERT INTO auth_failures (ip, count) VALUES (?1, 1) \
             ON CONFLICT(ip) DO UPDATE SET count = count + 1",
            [ip],
        )?;
        let count = self
            .db
            .query_row("SELECT count FROM auth_failures WHERE ip = ?1", [ip], |row| {
                row.get::<_, u32>(0)
            })?
            .unwrap_or(0);

        if count >= self.config.threshold {
            let over = (count - self.config.threshold) as i64;
            let window =
                LOCKOUT_STEP_MS * (over + 1).min(self.config.lockout_attempts as i64);
            self.db.run(
                "UPDATE auth_failures SET locked_until = ?1 WHERE ip = ?2",
                params![now_ms + window, ip],
            )?;
            tracing::warn!(ip, count, window_ms = window, "auth lockout armed");
        }
        Ok(count)
    }

    /// Whether the address is currently locked out.
    pub fn is_locked(&self, ip: &str, now_ms: i64) -> Result<bool, StorageError> {
        let locked_until = self.db.query_row(
            "SELECT locked_until FROM auth_failures WHERE ip = ?1",
            [ip],
            |row| row.get::<_, Option<i64>>(0),
        )?;
        Ok(matches!(locked_until, Some(Some(until)) if until > now_ms))
    }

    /// Successful login clears the slate for the address.
    pub fn reset(&self, ip: &str) -> Result<(), StorageError> {
        self.db.run("DELETE FROM auth_failures WHERE ip = ?1", [ip])?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;

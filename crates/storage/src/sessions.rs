// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bridge sessions.
//!
//! The HTTP/auth surface lives outside the core; this is its durable
//! session state. Sessions expire on `expires_at` and are swept by
//! maintenance.

use crate::db::Database;
use crate::error::StorageError;
use rand::RngCore;
use rusqlite::params;

/// A live operator session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub created_at: i64,
    pub expires_at: i64,
}

pub struct SessionStore<'a> {
    db: &'a Database,
}

impl<'a> SessionStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Create a session with a random 256-bit id.
    pub fn create(
        &self,
        user_id: &str,
        now_ms: i64,
        duration_ms: i64,
    ) -> Result<Session, StorageError> {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let session = Session {
            id: hex::encode(bytes),
            user_id: user_id.to_string(),
            created_at: now_ms,
            expires_at: now_ms + duration_ms,
        };
        self.db.run(
            "INSERT INTO sessions (id, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![session.id, session.user_id, session.created_at, session.expires_at],
        )?;
        Ok(session)
    }

    /// The session behind `id`, if it exists and has not expired.
    pub fn validate(&self, id: &str, now_ms: i64) -> Result<Option<Session>, StorageError> {
        self.db.query_row(
            "SELECT id, user_id, created_at, expires_at FROM sessions \
             WHERE id = ?1 AND expires_at > ?2",
            params![id, now_ms],
            |row| {
                Ok(Session {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    created_at: row.get(2)?,
                    expires_at: row.get(3)?,
                })
            },
        )
    }

    /// Logout: delete regardless of expiry. Returns whether a row existed.
    pub fn delete(&self, id: &str) -> Result<bool, StorageError> {
        let result = self.db.run("DELETE FROM sessions WHERE id = ?1", [id])?;
        Ok(result.changes == 1)
    }

    pub fn prune_expired(&self, now_ms: i64) -> Result<usize, StorageError> {
        let result = self.db.run("DELETE FROM sessions WHERE expires_at <= ?1", [now_ms])?;
        Ok(result.changes)
    }
}

#[cfg(test)]
#[path = "sessions_tests.rs"]
mod tests;

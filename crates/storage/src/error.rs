// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage errors.

use meridian_core::{ErrorKind, Kinded};
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the embedded store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Unique-index violation or a conditional update that matched zero
    /// rows. Callers distinguish this from other failures to implement
    /// dedup and optimistic state transitions.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("corrupt row {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("audit chain broken at entry {id}")]
    ChainBroken { id: i64 },

    #[error("no backup available under {0}")]
    NoBackup(PathBuf),

    #[error("sqlite error: {0}")]
    Sqlite(rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(failure, ref message) = e {
            if failure.code == rusqlite::ErrorCode::ConstraintViolation {
                return StorageError::Conflict(
                    message.clone().unwrap_or_else(|| "constraint violation".to_string()),
                );
            }
        }
        StorageError::Sqlite(e)
    }
}

impl Kinded for StorageError {
    fn kind(&self) -> ErrorKind {
        match self {
            StorageError::Conflict(_) | StorageError::InvalidTransition { .. } => {
                ErrorKind::Conflict
            }
            StorageError::NotFound(_) | StorageError::NoBackup(_) => ErrorKind::NotFound,
            StorageError::ChainBroken { .. } => ErrorKind::Integrity,
            StorageError::Corrupt { .. }
            | StorageError::Sqlite(_)
            | StorageError::Io(_)
            | StorageError::Serde(_) => ErrorKind::Internal,
        }
    }
}

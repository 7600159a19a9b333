// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The full persisted state: meridian + sentinel databases and the audit
//! log, rooted in one data directory.

use crate::audit::AuditLog;
use crate::auth::AuthGuard;
use crate::db::Database;
use crate::error::StorageError;
use crate::jobs::JobStore;
use crate::migrations;
use crate::nonces::NonceStore;
use crate::sentinel::SentinelStore;
use crate::sessions::SessionStore;
use meridian_core::{GearId, Tier, STATE_DIR_ENV};
use rusqlite::params;
use std::path::{Path, PathBuf};

/// Resolve the data directory: env override first, then the platform state
/// dir, then a last-resort relative path.
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(STATE_DIR_ENV) {
        return PathBuf::from(dir);
    }
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .map(|d| d.join("meridian"))
        .unwrap_or_else(|| PathBuf::from(".meridian"))
}

/// All databases, opened and migrated.
pub struct Store {
    dir: PathBuf,
    pub meridian: Database,
    pub sentinel: Database,
    pub audit: AuditLog,
}

impl Store {
    /// Open every logical database under `dir` and run migrations.
    pub fn open(dir: &Path, tier: Tier, now_ms: i64) -> Result<Self, StorageError> {
        std::fs::create_dir_all(dir)?;
        let meridian = Database::open(&dir.join("meridian.db"), tier)?;
        migrations::migrate_meridian(&meridian)?;
        let sentinel = Database::open(&dir.join("sentinel.db"), tier)?;
        migrations::migrate_sentinel(&sentinel)?;
        let audit = AuditLog::open(dir, tier, now_ms)?;
        Ok(Self { dir: dir.to_path_buf(), meridian, sentinel, audit })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn jobs(&self) -> JobStore<'_> {
        JobStore::new(&self.meridian)
    }

    pub fn nonces(&self) -> NonceStore<'_> {
        NonceStore::new(&self.meridian)
    }

    pub fn sentinel(&self) -> SentinelStore<'_> {
        SentinelStore::new(&self.sentinel)
    }

    pub fn sessions(&self) -> SessionStore<'_> {
        SessionStore::new(&self.meridian)
    }

    pub fn auth(&self, config: meridian_core::BruteForceConfig) -> AuthGuard<'_> {
        AuthGuard::new(&self.meridian, config)
    }

    // ── Gear disablement (integrity failures survive restarts) ─────────

    pub fn disable_gear(
        &self,
        gear_id: &GearId,
        reason: &str,
        now_ms: i64,
    ) -> Result<(), StorageError> {
        self.meridian.run(
            "INSERT INTO disabled_gears (gear_id, reason, disabled_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(gear_id) DO UPDATE SET reason = ?2, disabled_at = ?3",
            params![gear_id.as_str(), reason, now_ms],
        )?;
        Ok(())
    }

    pub fn is_gear_disabled(&self, gear_id: &GearId) -> Result<bool, StorageError> {
        let hit = self.meridian.query_row(
            "SELECT 1 FROM disabled_gears WHERE gear_id = ?1",
            [gear_id.as_str()],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(hit.is_some())
    }

    // ── Backup / restore ────────────────────────────────────────────────

    /// Hot snapshot of both stores into `backups/<now_ms>/`.
    pub fn create_backup(&self, now_ms: i64) -> Result<PathBuf, StorageError> {
        let dest = self.dir.join("backups").join(now_ms.to_string());
        std::fs::create_dir_all(&dest)?;
        self.meridian.backup(&dest.join("meridian.db"))?;
        self.sentinel.backup(&dest.join("sentinel.db"))?;
        tracing::info!(dest = %dest.display(), "created backup");
        Ok(dest)
    }

    /// Most recent backup directory under `dir`, if any.
    pub fn latest_backup(dir: &Path) -> Result<PathBuf, StorageError> {
        let backups = dir.join("backups");
        let mut newest: Option<(i64, PathBuf)> = None;
        let entries = match std::fs::read_dir(&backups) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NoBackup(backups))
            }
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(stamp) = name.to_str().and_then(|s| s.parse::<i64>().ok()) {
                if newest.as_ref().map(|(best, _)| stamp > *best).unwrap_or(true) {
                    newest = Some((stamp, entry.path()));
                }
            }
        }
        newest.map(|(_, path)| path).ok_or(StorageError::NoBackup(backups))
    }

    /// Restore the latest backup over the live databases. Must be called
    /// while no runtime holds the store open.
    pub fn restore_latest_backup(dir: &Path) -> Result<PathBuf, StorageError> {
        let backup = Self::latest_backup(dir)?;
        for name in ["meridian.db", "sentinel.db"] {
            let src = backup.join(name);
            if !src.exists() {
                return Err(StorageError::NoBackup(backup));
            }
            // Remove WAL sidecars so the restored file is authoritative.
            for suffix in ["-wal", "-shm"] {
                let sidecar = dir.join(format!("{name}{suffix}"));
                if sidecar.exists() {
                    std::fs::remove_file(&sidecar)?;
                }
            }
            std::fs::copy(&src, dir.join(name))?;
        }
        tracing::info!(backup = %backup.display(), "restored backup");
        Ok(backup)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

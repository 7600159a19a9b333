// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job rows: creation, dedup, claiming, guarded transitions, recovery.
//!
//! The scheduler exclusively owns this table. Every status change is a
//! conditional update (`WHERE id = ? AND status = ?`); zero changed rows
//! means a concurrent modification and surfaces as a conflict.

use crate::db::Database;
use crate::error::StorageError;
use meridian_core::{
    transition_allowed, CreateJob, Job, JobId, JobSource, JobStatus, Priority, WorkerId,
};
use rusqlite::{params, Row};
use serde_json::Value;
use std::collections::HashMap;

/// Outcome of [`JobStore::create`].
#[derive(Debug)]
pub enum CreateOutcome {
    Created(Job),
    /// A non-terminal row with the same dedup hash already exists.
    Duplicate(JobId),
}

/// What startup recovery found and did.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RecoveryReport {
    /// Non-terminal rows present at startup.
    pub non_terminal: usize,
    /// Rows reset to pending (worker-owned statuses).
    pub reset: Vec<JobId>,
    /// Rows preserved in awaiting_approval.
    pub preserved: usize,
}

/// Accessor for the jobs table.
pub struct JobStore<'a> {
    db: &'a Database,
}

const SELECT_JOB: &str = "SELECT id, status, priority, source, content, user_id, created_at, \
     updated_at, completed_at, worker_id, attempts, max_attempts, timeout_ms, plan, validation, \
     result, error, revision_count, replan_count, dedup_hash, parent_id, conversation_id, \
     source_message_id, metadata FROM jobs";

impl<'a> JobStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a new pending job. When a dedup hash is set and another
    /// non-terminal row carries the same hash, the partial unique index
    /// rejects the insert and the existing row's id is returned instead.
    pub fn create(&self, opts: CreateJob, now_ms: i64) -> Result<CreateOutcome, StorageError> {
        let job = Job {
            id: JobId::generate(),
            status: JobStatus::Pending,
            priority: opts.priority,
            source: opts.source,
            content: opts.content,
            user_id: opts.user_id,
            created_at: now_ms,
            updated_at: now_ms,
            completed_at: None,
            worker_id: None,
            attempts: 0,
            max_attempts: opts.max_attempts,
            timeout_ms: opts.timeout_ms,
            plan: None,
            validation: None,
            result: None,
            error: None,
            revision_count: 0,
            replan_count: 0,
            dedup_hash: opts.dedup_hash,
            parent_id: opts.parent_id,
            conversation_id: opts.conversation_id,
            source_message_id: opts.source_message_id,
            metadata: opts.metadata,
        };

        let inserted = self.db.run(
            "INSERT INTO jobs (id, status, priority, source, content, user_id, created_at, \
             updated_at, completed_at, worker_id, attempts, max_attempts, timeout_ms, plan, \
             validation, result, error, revision_count, replan_count, dedup_hash, parent_id, \
             conversation_id, source_message_id, metadata) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, NULL, 0, ?9, ?10, NULL, NULL, NULL, \
             NULL, 0, 0, ?11, ?12, ?13, ?14, ?15)",
            params![
                job.id.as_str(),
                job.status.to_string(),
                job.priority.rank(),
                job.source.to_string(),
                job.content,
                job.user_id,
                job.created_at,
                job.updated_at,
                job.max_attempts,
                job.timeout_ms,
                job.dedup_hash,
                job.parent_id.as_ref().map(|p| p.as_str().to_string()),
                job.conversation_id,
                job.source_message_id,
                serde_json::to_string(&job.metadata)?,
            ],
        );

        match inserted {
            Ok(_) => Ok(CreateOutcome::Created(job)),
            Err(StorageError::Conflict(_)) => {
                let hash = job.dedup_hash.as_deref().unwrap_or_default();
                match self.find_duplicate(hash)? {
                    Some(existing) => Ok(CreateOutcome::Duplicate(existing)),
                    // The colliding row went terminal between insert and
                    // lookup; retrying once is the caller's decision.
                    None => Err(StorageError::Conflict("dedup race".to_string())),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Id of any non-terminal job with the given dedup hash.
    pub fn find_duplicate(&self, hash: &str) -> Result<Option<JobId>, StorageError> {
        if hash.is_empty() {
            return Ok(None);
        }
        self.db.query_row(
            "SELECT id FROM jobs WHERE dedup_hash = ?1 \
             AND status NOT IN ('completed', 'failed', 'cancelled')",
            [hash],
            |row| row.get::<_, String>(0),
        )
        .map(|opt| opt.map(JobId::from_string))
    }

    pub fn get(&self, id: &JobId) -> Result<Option<Job>, StorageError> {
        let sql = format!("{SELECT_JOB} WHERE id = ?1");
        match self.db.query(&sql, [id.as_str()], job_from_row)?.pop() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Fetch a job or fail with NotFound.
    pub fn require(&self, id: &JobId) -> Result<Job, StorageError> {
        self.get(id)?.ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    pub fn list_by_status(&self, status: JobStatus) -> Result<Vec<Job>, StorageError> {
        let sql = format!("{SELECT_JOB} WHERE status = ?1 ORDER BY created_at ASC");
        self.db
            .query(&sql, [status.to_string()], job_from_row)?
            .into_iter()
            .collect()
    }

    /// Atomically claim up to `limit` pending jobs for `worker`: select by
    /// priority then age, flip them to planning with the worker id, and
    /// return the claimed rows.
    pub fn claim(
        &self,
        worker: &WorkerId,
        limit: usize,
        now_ms: i64,
    ) -> Result<Vec<Job>, StorageError> {
        let worker = worker.clone();
        let ids: Vec<String> = self.db.transaction(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id FROM jobs WHERE status = 'pending' \
                 ORDER BY priority DESC, created_at ASC LIMIT ?1",
            )?;
            let ids = stmt
                .query_map([limit as i64], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            for id in &ids {
                conn.execute(
                    "UPDATE jobs SET status = 'planning', worker_id = ?1, updated_at = ?2 \
                     WHERE id = ?3 AND status = 'pending'",
                    params![worker.as_str(), now_ms, id],
                )?;
            }
            Ok(ids)
        })?;

        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(job) = self.get(&JobId::from_string(&id))? {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    /// Conditional transition `from -> to`. The transition must appear in
    /// the allowed table; zero changed rows means another writer got there
    /// first and surfaces as a conflict.
    ///
    /// Worker ownership follows the target status: entering a status that
    /// requires a worker keeps the current claimant, everything else clears
    /// it. Terminal targets also stamp `completed_at`.
    pub fn transition(
        &self,
        id: &JobId,
        from: JobStatus,
        to: JobStatus,
        now_ms: i64,
    ) -> Result<(), StorageError> {
        if !transition_allowed(from, to) {
            return Err(StorageError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        let sql = if to.is_terminal() {
            "UPDATE jobs SET status = ?1, updated_at = ?2, completed_at = ?2, worker_id = NULL \
             WHERE id = ?3 AND status = ?4"
        } else if to.requires_worker() {
            "UPDATE jobs SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4"
        } else {
            "UPDATE jobs SET status = ?1, updated_at = ?2, worker_id = NULL \
             WHERE id = ?3 AND status = ?4"
        };
        let result = self.db.run(
            sql,
            params![to.to_string(), now_ms, id.as_str(), from.to_string()],
        )?;
        if result.changes == 0 {
            return Err(StorageError::Conflict(format!(
                "job {id} not in {from} (transition to {to})"
            )));
        }
        Ok(())
    }

    /// Resume an approved job: awaiting_approval -> executing under a new
    /// claimant.
    pub fn claim_approved(
        &self,
        id: &JobId,
        worker: &WorkerId,
        now_ms: i64,
    ) -> Result<(), StorageError> {
        let result = self.db.run(
            "UPDATE jobs SET status = 'executing', worker_id = ?1, updated_at = ?2 \
             WHERE id = ?3 AND status = 'awaiting_approval'",
            params![worker.as_str(), now_ms, id.as_str()],
        )?;
        if result.changes == 0 {
            return Err(StorageError::Conflict(format!("job {id} not awaiting approval")));
        }
        Ok(())
    }

    /// Cancel from any non-terminal state.
    pub fn cancel(&self, id: &JobId, now_ms: i64) -> Result<(), StorageError> {
        let result = self.db.run(
            "UPDATE jobs SET status = 'cancelled', updated_at = ?1, completed_at = ?1, \
             worker_id = NULL \
             WHERE id = ?2 AND status NOT IN ('completed', 'failed', 'cancelled')",
            params![now_ms, id.as_str()],
        )?;
        if result.changes == 0 {
            return Err(StorageError::Conflict(format!("job {id} already terminal")));
        }
        Ok(())
    }

    /// Startup recovery: worker-owned rows return to pending with the
    /// claimant cleared; awaiting_approval rows are preserved unchanged.
    pub fn recover(&self, now_ms: i64) -> Result<RecoveryReport, StorageError> {
        self.db.transaction(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, status FROM jobs \
                 WHERE status NOT IN ('completed', 'failed', 'cancelled') \
                 ORDER BY created_at ASC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut reset = Vec::new();
            let mut preserved = 0usize;
            for (id, status) in &rows {
                match status.as_str() {
                    "planning" | "validating" | "executing" => {
                        conn.execute(
                            "UPDATE jobs SET status = 'pending', worker_id = NULL, \
                             updated_at = ?1 WHERE id = ?2",
                            params![now_ms, id],
                        )?;
                        reset.push(JobId::from_string(id));
                    }
                    "awaiting_approval" => preserved += 1,
                    _ => {}
                }
            }
            Ok(RecoveryReport { non_terminal: rows.len(), reset, preserved })
        })
    }

    // ── Targeted field updates ──────────────────────────────────────────

    pub fn set_plan(&self, id: &JobId, plan: &Value, now_ms: i64) -> Result<(), StorageError> {
        self.update_field(id, "plan", plan, now_ms)
    }

    pub fn set_validation(
        &self,
        id: &JobId,
        validation: &Value,
        now_ms: i64,
    ) -> Result<(), StorageError> {
        self.update_field(id, "validation", validation, now_ms)
    }

    pub fn set_result(&self, id: &JobId, result: &Value, now_ms: i64) -> Result<(), StorageError> {
        self.update_field(id, "result", result, now_ms)
    }

    pub fn set_error(&self, id: &JobId, error: &Value, now_ms: i64) -> Result<(), StorageError> {
        self.update_field(id, "error", error, now_ms)
    }

    fn update_field(
        &self,
        id: &JobId,
        column: &str,
        value: &Value,
        now_ms: i64,
    ) -> Result<(), StorageError> {
        // Column names come from the fixed setter list above, never input.
        let sql =
            format!("UPDATE jobs SET {column} = ?1, updated_at = ?2 WHERE id = ?3");
        let result =
            self.db.run(&sql, params![serde_json::to_string(value)?, now_ms, id.as_str()])?;
        if result.changes == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn increment_attempts(&self, id: &JobId, now_ms: i64) -> Result<u32, StorageError> {
        self.increment(id, "attempts", now_ms)
    }

    pub fn increment_revision_count(&self, id: &JobId, now_ms: i64) -> Result<u32, StorageError> {
        self.increment(id, "revision_count", now_ms)
    }

    pub fn increment_replan_count(&self, id: &JobId, now_ms: i64) -> Result<u32, StorageError> {
        self.increment(id, "replan_count", now_ms)
    }

    fn increment(&self, id: &JobId, column: &str, now_ms: i64) -> Result<u32, StorageError> {
        let sql = format!(
            "UPDATE jobs SET {column} = {column} + 1, updated_at = ?1 WHERE id = ?2"
        );
        let result = self.db.run(&sql, params![now_ms, id.as_str()])?;
        if result.changes == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        let sql = format!("SELECT {column} FROM jobs WHERE id = ?1");
        self.db
            .query_row(&sql, [id.as_str()], |row| row.get::<_, u32>(0))?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    /// Clear dedup hashes whose quantum has elapsed so stale fingerprints
    /// never block a fresh request after the window moved on.
    pub fn expire_dedup_hashes(
        &self,
        now_ms: i64,
        window_ms: i64,
    ) -> Result<usize, StorageError> {
        let window = window_ms.max(1);
        let quantum_start = now_ms - now_ms.rem_euclid(window);
        let result = self.db.run(
            "UPDATE jobs SET dedup_hash = NULL \
             WHERE dedup_hash IS NOT NULL AND created_at < ?1",
            [quantum_start],
        )?;
        Ok(result.changes)
    }
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<Result<Job, StorageError>> {
    Ok(read_job(row))
}

fn read_job(row: &Row<'_>) -> Result<Job, StorageError> {
    let id: String = row.get("id")?;
    let status: String = row.get("status")?;
    let priority: i64 = row.get("priority")?;
    let source: String = row.get("source")?;

    let corrupt = |reason: &str| StorageError::Corrupt { id: id.clone(), reason: reason.to_string() };

    Ok(Job {
        id: JobId::from_string(&id),
        status: JobStatus::parse(&status).ok_or_else(|| corrupt("bad status"))?,
        priority: match priority {
            0 => Priority::Low,
            1 => Priority::Normal,
            2 => Priority::High,
            3 => Priority::Critical,
            _ => return Err(corrupt("bad priority")),
        },
        source: JobSource::parse(&source).ok_or_else(|| corrupt("bad source"))?,
        content: row.get("content")?,
        user_id: row.get("user_id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        completed_at: row.get("completed_at")?,
        worker_id: row.get::<_, Option<String>>("worker_id")?.map(WorkerId::new),
        attempts: row.get("attempts")?,
        max_attempts: row.get("max_attempts")?,
        timeout_ms: row.get("timeout_ms")?,
        plan: parse_json(row.get("plan")?)?,
        validation: parse_json(row.get("validation")?)?,
        result: parse_json(row.get("result")?)?,
        error: parse_json(row.get("error")?)?,
        revision_count: row.get("revision_count")?,
        replan_count: row.get("replan_count")?,
        dedup_hash: row.get("dedup_hash")?,
        parent_id: row.get::<_, Option<String>>("parent_id")?.map(JobId::from_string),
        conversation_id: row.get("conversation_id")?,
        source_message_id: row.get("source_message_id")?,
        metadata: row
            .get::<_, Option<String>>("metadata")?
            .map(|text| serde_json::from_str::<HashMap<String, Value>>(&text))
            .transpose()?
            .unwrap_or_default(),
    })
}

fn parse_json(text: Option<String>) -> Result<Option<Value>, StorageError> {
    text.map(|t| serde_json::from_str(&t)).transpose().map_err(StorageError::from)
}

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler facade: job intake, dedup, cancellation tokens, recovery.
//!
//! The scheduler exclusively owns job rows. Workers and the approval
//! router go through it for every state change so auditing and token
//! bookkeeping stay in one place.

use crate::error::RuntimeError;
use meridian_core::{
    compute_dedup_hash, Clock, CreateJob, Job, JobId, JobStatus, RiskLevel, RuntimeConfig,
    WorkerId,
};
use meridian_storage::{AuditEvent, CreateOutcome, RecoveryReport, Store};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Result of a submit call.
#[derive(Debug)]
pub struct SubmitOutcome {
    pub job: Job,
    /// True when an identical in-flight request absorbed this one.
    pub deduplicated: bool,
}

pub struct Scheduler<C: Clock> {
    store: Arc<Store>,
    config: RuntimeConfig,
    clock: C,
    /// Per-job cancellation tokens, children of the shutdown token.
    tokens: Mutex<HashMap<JobId, CancellationToken>>,
    approved_tx: mpsc::UnboundedSender<JobId>,
    approved_rx: Mutex<mpsc::UnboundedReceiver<JobId>>,
    shutdown: CancellationToken,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(
        store: Arc<Store>,
        config: RuntimeConfig,
        clock: C,
        shutdown: CancellationToken,
    ) -> Self {
        let (approved_tx, approved_rx) = mpsc::unbounded_channel();
        Self {
            store,
            config,
            clock,
            tokens: Mutex::new(HashMap::new()),
            approved_tx,
            approved_rx: Mutex::new(approved_rx),
            shutdown,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Submit a job. Requests without an explicit dedup hash get the
    /// window fingerprint regardless of source; an identical in-flight
    /// request returns the existing row instead of inserting.
    pub fn submit(&self, mut opts: CreateJob) -> Result<SubmitOutcome, RuntimeError> {
        let now = self.clock.epoch_ms();
        if opts.dedup_hash.is_none() {
            opts.dedup_hash = Some(compute_dedup_hash(
                &opts.user_id,
                &opts.content,
                now,
                self.config.dedup_window_ms,
            ));
        }

        match self.store.jobs().create(opts, now)? {
            CreateOutcome::Created(job) => {
                self.audit(
                    AuditEvent::new("scheduler", "job.created")
                        .job_id(job.id)
                        .details(serde_json::json!({
                            "source": job.source.to_string(),
                            "priority": job.priority.to_string(),
                        })),
                );
                tracing::info!(job_id = %job.id, source = %job.source, "job created");
                Ok(SubmitOutcome { job, deduplicated: false })
            }
            CreateOutcome::Duplicate(id) => {
                let job = self.require(&id)?;
                tracing::info!(job_id = %id, "request deduplicated onto existing job");
                Ok(SubmitOutcome { job, deduplicated: true })
            }
        }
    }

    pub fn job(&self, id: &JobId) -> Result<Option<Job>, RuntimeError> {
        Ok(self.store.jobs().get(id)?)
    }

    pub fn require(&self, id: &JobId) -> Result<Job, RuntimeError> {
        self.store.jobs().get(id)?.ok_or(RuntimeError::JobNotFound(*id))
    }

    /// Claim up to `limit` pending jobs for a worker.
    pub fn claim(&self, worker: &WorkerId, limit: usize) -> Result<Vec<Job>, RuntimeError> {
        let jobs = self.store.jobs().claim(worker, limit, self.clock.epoch_ms())?;
        for job in &jobs {
            self.audit_transition(&job.id, JobStatus::Pending, JobStatus::Planning);
        }
        Ok(jobs)
    }

    /// Guarded transition plus audit entry.
    pub fn transition(
        &self,
        id: &JobId,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<(), RuntimeError> {
        self.store.jobs().transition(id, from, to, self.clock.epoch_ms())?;
        self.audit_transition(id, from, to);
        Ok(())
    }

    /// Cancel a job from any non-terminal state: row first, then the
    /// token, so an executing sandbox observes the trip.
    pub fn cancel_job(&self, id: &JobId, reason: &str) -> Result<(), RuntimeError> {
        self.store.jobs().cancel(id, self.clock.epoch_ms())?;
        self.store.jobs().set_error(
            id,
            &serde_json::json!({ "kind": "cancelled", "message": reason }),
            self.clock.epoch_ms(),
        )?;
        self.audit(
            AuditEvent::new("scheduler", "job.cancelled")
                .job_id(*id)
                .details(serde_json::json!({ "reason": reason })),
        );
        self.trip_token(id);
        tracing::info!(job_id = %id, reason, "job cancelled");
        Ok(())
    }

    /// The cancellation token for a job, created on first use as a child
    /// of the shutdown token.
    pub fn token(&self, id: &JobId) -> CancellationToken {
        self.tokens
            .lock()
            .entry(*id)
            .or_insert_with(|| self.shutdown.child_token())
            .clone()
    }

    pub fn trip_token(&self, id: &JobId) {
        if let Some(token) = self.tokens.lock().get(id) {
            token.cancel();
        }
    }

    pub fn release_token(&self, id: &JobId) {
        self.tokens.lock().remove(id);
    }

    // ── Approval wake-ups ───────────────────────────────────────────────

    /// Queue an approved job for execution pickup.
    pub fn wake_approved(&self, id: JobId) {
        let _ = self.approved_tx.send(id);
    }

    /// Next approved job waiting for a worker, if any.
    pub fn next_approved(&self) -> Option<JobId> {
        self.approved_rx.lock().try_recv().ok()
    }

    /// Resume an approved job under this worker: awaiting_approval →
    /// executing.
    pub fn claim_approved(&self, id: &JobId, worker: &WorkerId) -> Result<Job, RuntimeError> {
        self.store.jobs().claim_approved(id, worker, self.clock.epoch_ms())?;
        self.audit_transition(id, JobStatus::AwaitingApproval, JobStatus::Executing);
        self.require(id)
    }

    // ── Recovery ────────────────────────────────────────────────────────

    /// Startup recovery: reset worker-owned rows, preserve
    /// awaiting_approval, and re-enqueue rows whose approval was granted
    /// before the crash.
    pub fn recover(&self) -> Result<RecoveryReport, RuntimeError> {
        let report = self.store.jobs().recover(self.clock.epoch_ms())?;
        self.audit(
            AuditEvent::new("scheduler", "recovery").details(serde_json::json!({
                "non_terminal": report.non_terminal,
                "reset": report.reset.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
            })),
        );

        for job in self.store.jobs().list_by_status(JobStatus::AwaitingApproval)? {
            let approved = job
                .validation
                .as_ref()
                .and_then(|v| v.get("approved"))
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            if approved {
                tracing::info!(job_id = %job.id, "re-enqueueing approved job after restart");
                self.wake_approved(job.id);
            }
        }
        Ok(report)
    }

    // ── Audit ───────────────────────────────────────────────────────────

    pub fn audit(&self, event: AuditEvent) {
        if let Err(e) = self.store.audit.append(event, self.clock.epoch_ms()) {
            tracing::error!(error = %e, "audit append failed");
        }
    }

    pub fn audit_transition(&self, id: &JobId, from: JobStatus, to: JobStatus) {
        let risk = if to == JobStatus::Failed { RiskLevel::Medium } else { RiskLevel::Low };
        self.audit(
            AuditEvent::new("scheduler", "job.transition")
                .job_id(*id)
                .risk(risk)
                .details(serde_json::json!({
                    "from": from.to_string(),
                    "to": to.to_string(),
                })),
        );
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The state-machine driver: carries one claimed job from planning to a
//! terminal state.

use crate::approval::ApprovalRouter;
use crate::error::RuntimeError;
use crate::notify::Notifier;
use crate::scheduler::Scheduler;
use meridian_bus::MessageBus;
use meridian_core::{
    Clock, ComponentId, ErrorKind, ExecutionPlan, Job, JobId, JobStatus, Kinded, MessageBody,
    ValidationResult, Verdict,
};
use meridian_policy::{strip_plan, PlanContext, PolicyEngine, StrippedPlan};
use meridian_sandbox::{GearRegistry, SandboxHost};
use meridian_storage::AuditEvent;
use std::sync::Arc;
use std::time::Duration;

/// Base backoff between step retries; doubles per attempt, capped.
const RETRY_BACKOFF_MS: u64 = 500;
const RETRY_BACKOFF_CAP_MS: u64 = 10_000;

pub struct Driver<C: Clock> {
    pub scheduler: Arc<Scheduler<C>>,
    pub bus: Arc<MessageBus<C>>,
    pub engine: Arc<PolicyEngine>,
    pub host: Arc<SandboxHost<C>>,
    pub registry: Arc<dyn GearRegistry>,
    pub approval: Arc<ApprovalRouter<C>>,
    pub notifier: Arc<dyn Notifier>,
}

impl<C: Clock + 'static> Driver<C> {
    /// Drive a claimed job until it parks or terminates. Every phase
    /// re-reads the row so concurrent cancellation is observed at the
    /// next boundary.
    pub async fn drive(&self, id: &JobId) {
        // Job timeout arms at planning entry.
        if let Ok(job) = self.scheduler.require(id) {
            if job.status == JobStatus::Planning {
                self.arm_timeout(&job);
            }
        }

        loop {
            let job = match self.scheduler.require(id) {
                Ok(job) => job,
                Err(e) => {
                    tracing::error!(job_id = %id, error = %e, "job vanished mid-drive");
                    return;
                }
            };

            let phase = match job.status {
                JobStatus::Planning => self.plan_phase(&job).await,
                JobStatus::Validating => self.validate_phase(&job).await,
                JobStatus::Executing => self.execute_phase(&job).await,
                JobStatus::AwaitingApproval => return,
                JobStatus::Pending
                | JobStatus::Completed
                | JobStatus::Failed
                | JobStatus::Cancelled => {
                    self.scheduler.release_token(id);
                    return;
                }
            };

            if let Err(e) = phase {
                self.settle_failure(&job, e).await;
                return;
            }
        }
    }

    /// Best-effort push onto the bridge's status stream.
    async fn notify_bridge(&self, id: &JobId, status: JobStatus, detail: Option<String>) {
        if !self.bus.is_registered(&ComponentId::Bridge) {
            return;
        }
        let body = MessageBody::JobStatusChanged { job_id: *id, status, detail };
        if let Err(e) = self
            .bus
            .request(
                ComponentId::Scheduler,
                ComponentId::Bridge,
                body,
                Some(*id),
                &tokio_util::sync::CancellationToken::new(),
            )
            .await
        {
            tracing::debug!(job_id = %id, error = %e, "bridge status push failed");
        }
    }

    fn arm_timeout(&self, job: &Job) {
        let Some(timeout_ms) = job.timeout_ms else { return };
        let scheduler = self.scheduler.clone();
        let id = job.id;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(timeout_ms.max(0) as u64)).await;
            // A terminal row rejects the cancel; that is the happy case.
            if scheduler.cancel_job(&id, "job timeout elapsed").is_ok() {
                tracing::warn!(job_id = %id, timeout_ms, "job timed out");
            }
        });
    }

    // ── Planning ────────────────────────────────────────────────────────

    async fn plan_phase(&self, job: &Job) -> Result<(), RuntimeError> {
        let token = self.scheduler.token(&job.id);
        let revisions = job
            .validation
            .as_ref()
            .and_then(|v| v.get("suggested_revisions"))
            .and_then(|v| v.as_array())
            .map(|list| {
                list.iter().filter_map(|v| v.as_str().map(str::to_string)).collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let body = MessageBody::PlanRequest {
            job_id: job.id,
            content: job.content.clone(),
            context: job.metadata.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            revisions,
        };
        let response = self
            .bus
            .request(ComponentId::Scheduler, ComponentId::Planner, body, Some(job.id), &token)
            .await;

        match response {
            Ok(message) => {
                let MessageBody::PlanResponse { plan } = message.body else {
                    return Err(RuntimeError::BadPlan(format!(
                        "unexpected {} from planner",
                        message.body.tag()
                    )));
                };
                if plan.job_id != job.id {
                    return Err(RuntimeError::BadPlan("plan for a different job".to_string()));
                }
                let now = self.scheduler.clock().epoch_ms();
                self.scheduler
                    .store()
                    .jobs()
                    .set_plan(&job.id, &serde_json::to_value(&plan).map_err(
                        meridian_storage::StorageError::from,
                    )?, now)?;
                self.scheduler.transition(&job.id, JobStatus::Planning, JobStatus::Validating)?;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::Cancelled => Err(RuntimeError::Cancelled),
            Err(e) if e.kind().is_retriable() => {
                let count = self
                    .scheduler
                    .store()
                    .jobs()
                    .increment_replan_count(&job.id, self.scheduler.clock().epoch_ms())?;
                let limit = self.scheduler.config().max_replan;
                if count > limit {
                    return Err(RuntimeError::ReplanLimit { job_id: job.id, limit });
                }
                tracing::warn!(job_id = %job.id, attempt = count, error = %e, "replanning after planner failure");
                tokio::time::sleep(backoff(count)).await;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    // ── Validation ──────────────────────────────────────────────────────

    async fn validate_phase(&self, job: &Job) -> Result<(), RuntimeError> {
        let plan = parse_plan(job)?;
        let stripped = strip_plan(&plan);
        let ctx = self.plan_context(&stripped);
        let result = self.engine.validate(&stripped, &ctx);

        let now = self.scheduler.clock().epoch_ms();
        let mut validation = serde_json::to_value(&result)
            .map_err(meridian_storage::StorageError::from)?;
        if let Some(map) = validation.as_object_mut() {
            map.insert(
                "suggested_revisions".to_string(),
                serde_json::json!(result.suggested_revisions),
            );
        }
        self.scheduler.store().jobs().set_validation(&job.id, &validation, now)?;
        self.scheduler.audit(
            AuditEvent::new("validator", "policy.verdict")
                .job_id(job.id)
                .risk(result.overall_risk)
                .details(serde_json::json!({
                    "verdict": result.verdict.to_string(),
                    "composites": result
                        .composite_risks
                        .iter()
                        .map(|c| c.to_string())
                        .collect::<Vec<_>>(),
                })),
        );

        match result.verdict {
            Verdict::Approved => {
                self.scheduler.transition(&job.id, JobStatus::Validating, JobStatus::Executing)
            }
            Verdict::NeedsRevision => self.route_revision(job, &result),
            Verdict::NeedsUserApproval => {
                if self.approval.covered_by_cache(&result, &stripped)? {
                    self.scheduler.audit(
                        AuditEvent::new("approval", "approval.cached").job_id(job.id),
                    );
                    tracing::info!(job_id = %job.id, "approval satisfied from cache");
                    return self
                        .scheduler
                        .transition(&job.id, JobStatus::Validating, JobStatus::Executing);
                }
                self.approval.park(job, &result, approval_summary(job, &result)).await
            }
            Verdict::Rejected => {
                let reason = rejection_reason(&result);
                Err(RuntimeError::BadPlan(reason))
            }
        }
    }

    fn route_revision(&self, job: &Job, result: &ValidationResult) -> Result<(), RuntimeError> {
        let now = self.scheduler.clock().epoch_ms();
        let count = self.scheduler.store().jobs().increment_revision_count(&job.id, now)?;
        let limit = self.scheduler.config().max_revision_count;
        if count > limit {
            return Err(RuntimeError::RevisionLimit {
                job_id: job.id,
                limit,
                last_suggestions: result.suggested_revisions.join("; "),
            });
        }
        tracing::info!(job_id = %job.id, round = count, "plan needs revision");
        self.scheduler.transition(&job.id, JobStatus::Validating, JobStatus::Planning)
    }

    fn plan_context(&self, stripped: &StrippedPlan) -> PlanContext {
        let mut ctx = PlanContext::default();
        for step in &stripped.steps {
            if self.registry.is_disabled(&step.gear) {
                ctx.disabled_gears.insert(step.gear);
            }
            if let Some(manifest) = self.registry.manifest(&step.gear) {
                ctx.manifests.insert(step.gear, manifest);
            }
        }
        ctx
    }

    // ── Execution ───────────────────────────────────────────────────────

    async fn execute_phase(&self, job: &Job) -> Result<(), RuntimeError> {
        let token = self.scheduler.token(&job.id);
        let plan = parse_plan(job)?;
        let steps = plan.ordered_steps();

        let mut results = Vec::with_capacity(steps.len());
        let mut index = 0usize;
        while index < steps.len() {
            let step = steps[index];
            if token.is_cancelled() {
                return Err(RuntimeError::Cancelled);
            }

            self.scheduler.audit(
                AuditEvent::new("sandbox", "gear.invoke")
                    .job_id(job.id)
                    .target(step.gear.to_string())
                    .details(serde_json::json!({ "action": step.action })),
            );

            match self
                .host
                .invoke(&step.gear, &step.action, step.parameters.clone(), &token)
                .await
            {
                Ok(tagged) => {
                    results.push(
                        serde_json::to_value(&tagged)
                            .map_err(meridian_storage::StorageError::from)?,
                    );
                    index += 1;
                }
                Err(e) if e.kind() == ErrorKind::Cancelled => {
                    return Err(RuntimeError::Cancelled)
                }
                Err(e) if e.kind() == ErrorKind::Integrity => {
                    self.scheduler.audit(
                        AuditEvent::new("sandbox", "gear.integrity_failure")
                            .job_id(job.id)
                            .target(step.gear.to_string())
                            .risk(meridian_core::RiskLevel::Critical),
                    );
                    return Err(e.into());
                }
                Err(e) if e.kind().is_retriable() => {
                    if e.kind() == ErrorKind::Timeout {
                        self.scheduler.audit(
                            AuditEvent::new("sandbox", "gear.kill")
                                .job_id(job.id)
                                .target(step.gear.to_string())
                                .details(serde_json::json!({ "reason": "timeout" })),
                        );
                    }
                    let now = self.scheduler.clock().epoch_ms();
                    let attempts =
                        self.scheduler.store().jobs().increment_attempts(&job.id, now)?;
                    if attempts >= job.max_attempts {
                        tracing::warn!(
                            job_id = %job.id,
                            attempts,
                            "retry budget exhausted"
                        );
                        return Err(e.into());
                    }
                    tracing::warn!(
                        job_id = %job.id,
                        step = %step.id,
                        attempts,
                        error = %e,
                        "retrying step"
                    );
                    tokio::time::sleep(backoff(attempts)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let now = self.scheduler.clock().epoch_ms();
        if job.attempts == 0 {
            // First execution round counts as an attempt.
            self.scheduler.store().jobs().increment_attempts(&job.id, now)?;
        }
        self.scheduler.store().jobs().set_result(
            &job.id,
            &serde_json::json!({ "steps": results }),
            now,
        )?;
        self.scheduler.transition(&job.id, JobStatus::Executing, JobStatus::Completed)?;
        self.scheduler.release_token(&job.id);
        self.notify_bridge(&job.id, JobStatus::Completed, None).await;
        tracing::info!(job_id = %job.id, steps = results.len(), "job completed");
        Ok(())
    }

    // ── Failure routing ─────────────────────────────────────────────────

    /// Convert a phase error into the job's terminal state. Cancellation
    /// lands in `cancelled`; everything else captures the reason and moves
    /// to `failed`.
    async fn settle_failure(&self, job: &Job, error: RuntimeError) {
        let id = job.id;
        if error.kind() == ErrorKind::Cancelled {
            // The row usually went terminal already via cancel_job; make
            // sure stragglers land there too.
            let _ = self.scheduler.cancel_job(&id, "cancelled during execution");
            self.scheduler.release_token(&id);
            return;
        }

        let current = self.scheduler.job(&id).ok().flatten().map(|j| j.status);
        let Some(from) = current else {
            self.scheduler.release_token(&id);
            return;
        };
        if from.is_terminal() {
            // A concurrent cancel won the race; nothing to record.
            self.scheduler.release_token(&id);
            return;
        }

        let now = self.scheduler.clock().epoch_ms();
        if let Err(e) =
            self.scheduler.store().jobs().set_error(&id, &error.to_error_blob(), now)
        {
            tracing::error!(job_id = %id, error = %e, "failed to record job error");
        }
        if let Err(e) = self.scheduler.transition(&id, from, JobStatus::Failed) {
            tracing::error!(job_id = %id, error = %e, "failed to mark job failed");
        }
        self.scheduler.release_token(&id);
        self.notify_bridge(&id, JobStatus::Failed, Some(error.to_string())).await;
        self.notifier.notify("Job failed", &format!("{id}: {error}"));
        tracing::warn!(job_id = %id, error = %error, "job failed");
    }
}

fn parse_plan(job: &Job) -> Result<ExecutionPlan, RuntimeError> {
    let value = job
        .plan
        .clone()
        .ok_or_else(|| RuntimeError::BadPlan("job has no stored plan".to_string()))?;
    serde_json::from_value(value).map_err(|e| RuntimeError::BadPlan(e.to_string()))
}

fn backoff(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(5);
    let ms = RETRY_BACKOFF_MS.saturating_mul(1 << exp);
    Duration::from_millis(ms.min(RETRY_BACKOFF_CAP_MS))
}

fn approval_summary(job: &Job, result: &ValidationResult) -> String {
    let gated = result
        .step_results
        .iter()
        .filter(|s| s.verdict >= Verdict::NeedsUserApproval)
        .count();
    let composites = if result.composite_risks.is_empty() {
        String::new()
    } else {
        format!(
            " (patterns: {})",
            result
                .composite_risks
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )
    };
    format!(
        "Job {} needs approval: {gated} of {} steps are gated, overall risk {}{composites}",
        job.id.short(8),
        result.step_results.len(),
        result.overall_risk,
    )
}

fn rejection_reason(result: &ValidationResult) -> String {
    let reasons: Vec<String> = result
        .step_results
        .iter()
        .filter(|s| s.verdict == Verdict::Rejected)
        .map(|s| {
            s.reason
                .clone()
                .unwrap_or_else(|| format!("{} rejected by policy", s.action_type))
        })
        .collect();
    if reasons.is_empty() {
        "plan rejected by policy".to_string()
    } else {
        reasons.join("; ")
    }
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;

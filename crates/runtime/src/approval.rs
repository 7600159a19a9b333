// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Approval routing: nonces, operator decisions, and the approval cache.

use crate::error::RuntimeError;
use crate::notify::Notifier;
use crate::scheduler::Scheduler;
use meridian_bus::MessageBus;
use meridian_core::{
    Clock, ComponentId, Job, JobId, JobStatus, MessageBody, RiskLevel, ValidationResult,
};
use meridian_policy::StrippedPlan;
use meridian_storage::{AuditEvent, DEFAULT_APPROVAL_CACHE_TTL_MS, DEFAULT_NONCE_TTL_MS};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct ApprovalRouter<C: Clock> {
    scheduler: Arc<Scheduler<C>>,
    bus: Arc<MessageBus<C>>,
    notifier: Arc<dyn Notifier>,
}

impl<C: Clock> ApprovalRouter<C> {
    pub fn new(
        scheduler: Arc<Scheduler<C>>,
        bus: Arc<MessageBus<C>>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { scheduler, bus, notifier }
    }

    /// Whether every approval-gated step of this validation is covered by
    /// a live approval-cache entry.
    pub fn covered_by_cache(
        &self,
        result: &ValidationResult,
        stripped: &StrippedPlan,
    ) -> Result<bool, RuntimeError> {
        let now = self.scheduler.clock().epoch_ms();
        let sentinel = self.scheduler.store().sentinel();
        for step_result in &result.step_results {
            if step_result.verdict != meridian_core::Verdict::NeedsUserApproval {
                continue;
            }
            let Some(step) = stripped.steps.iter().find(|s| s.id == step_result.step_id) else {
                return Ok(false);
            };
            if !sentinel.is_approved(&step.fingerprint(), now)? {
                return Ok(false);
            }
        }
        // Composite escalations have no cacheable single step; only a
        // fully step-covered plan skips the operator.
        Ok(result.composite_risks.is_empty())
    }

    /// Park a job for operator approval: fresh single-use nonce, audit
    /// entry, bridge notification, desktop ping.
    pub async fn park(
        &self,
        job: &Job,
        result: &ValidationResult,
        summary: String,
    ) -> Result<(), RuntimeError> {
        let now = self.scheduler.clock().epoch_ms();
        let nonce =
            self.scheduler.store().nonces().issue(&job.id, now, DEFAULT_NONCE_TTL_MS)?;
        self.scheduler.transition(&job.id, JobStatus::Validating, JobStatus::AwaitingApproval)?;
        self.scheduler.audit(
            AuditEvent::new("approval", "nonce.issued")
                .job_id(job.id)
                .risk(result.overall_risk)
                .details(serde_json::json!({ "expires_at": nonce.expires_at })),
        );

        let steps: Vec<serde_json::Value> = result
            .step_results
            .iter()
            .map(|s| {
                serde_json::json!({
                    "step_id": s.step_id.as_str(),
                    "action_type": s.action_type.to_string(),
                    "verdict": s.verdict.to_string(),
                    "risk": s.assessed_risk.to_string(),
                    "reason": s.reason,
                })
            })
            .collect();

        // Best-effort push to the bridge's status stream.
        if self.bus.is_registered(&ComponentId::Bridge) {
            let body = MessageBody::ApprovalRequired {
                job_id: job.id,
                summary: summary.clone(),
                steps,
                nonce: nonce.nonce.clone(),
                expires_at: nonce.expires_at,
            };
            if let Err(e) = self
                .bus
                .request(
                    ComponentId::Scheduler,
                    ComponentId::Bridge,
                    body,
                    Some(job.id),
                    &CancellationToken::new(),
                )
                .await
            {
                tracing::warn!(job_id = %job.id, error = %e, "bridge approval push failed");
            }
        }

        self.notifier.notify("Approval required", &summary);
        tracing::info!(job_id = %job.id, risk = %result.overall_risk, "job awaiting approval");
        Ok(())
    }

    /// Operator approval. The nonce is single-use: verification deletes it
    /// atomically, so a replay cannot succeed twice. The grant is
    /// persisted into the validation blob before the job is woken, so a
    /// crash between the two cannot lose it.
    pub fn approve(&self, job_id: &JobId, nonce: &str) -> Result<(), RuntimeError> {
        let now = self.scheduler.clock().epoch_ms();
        if !self.scheduler.store().nonces().consume(job_id, nonce, now)? {
            self.scheduler.audit(
                AuditEvent::new("approval", "nonce.rejected")
                    .job_id(*job_id)
                    .risk(RiskLevel::Medium),
            );
            return Err(RuntimeError::InvalidNonce(*job_id));
        }

        let job = self.scheduler.require(job_id)?;
        if job.status != JobStatus::AwaitingApproval {
            return Err(RuntimeError::InvalidNonce(*job_id));
        }

        // Record the grant and cache the approved fingerprints.
        let mut validation = job.validation.clone().unwrap_or_else(|| serde_json::json!({}));
        if let Some(map) = validation.as_object_mut() {
            map.insert("approved".to_string(), serde_json::json!(true));
            map.insert("approved_at".to_string(), serde_json::json!(now));
        }
        self.scheduler.store().jobs().set_validation(job_id, &validation, now)?;
        self.cache_fingerprints(&job, now);

        self.scheduler.audit(
            AuditEvent::new("approval", "nonce.consumed").job_id(*job_id).details(
                serde_json::json!({ "decision": "approved" }),
            ),
        );
        self.scheduler.wake_approved(*job_id);
        tracing::info!(job_id = %job_id, "approval granted");
        Ok(())
    }

    /// Operator rejection. Consumes the nonce and cancels the job with the
    /// captured reason.
    pub fn reject(&self, job_id: &JobId, nonce: &str, reason: &str) -> Result<(), RuntimeError> {
        let now = self.scheduler.clock().epoch_ms();
        if !self.scheduler.store().nonces().consume(job_id, nonce, now)? {
            return Err(RuntimeError::InvalidNonce(*job_id));
        }
        self.scheduler.audit(
            AuditEvent::new("approval", "nonce.consumed").job_id(*job_id).details(
                serde_json::json!({ "decision": "rejected", "reason": reason }),
            ),
        );
        self.scheduler.cancel_job(job_id, reason)?;
        Ok(())
    }

    /// Remember which concrete steps the operator approved so an
    /// identical step inside the cache TTL skips the prompt.
    fn cache_fingerprints(&self, job: &Job, now: i64) {
        let Some(plan_value) = job.plan.clone() else { return };
        let Ok(plan) = serde_json::from_value::<meridian_core::ExecutionPlan>(plan_value) else {
            return;
        };
        let stripped = meridian_policy::strip_plan(&plan);
        let sentinel = self.scheduler.store().sentinel();
        for step in &stripped.steps {
            if let Err(e) = sentinel.cache_approval(
                &step.fingerprint(),
                now,
                DEFAULT_APPROVAL_CACHE_TTL_MS,
            ) {
                tracing::warn!(error = %e, "approval cache write failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "approval_tests.rs"]
mod tests;

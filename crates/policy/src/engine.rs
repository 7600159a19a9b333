// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The deterministic policy engine.
//!
//! Input is a stripped plan plus a [`PlanContext`] snapshot of gear state.
//! Output is a [`ValidationResult`]. No I/O, no clock, no randomness: the
//! same inputs always produce the same verdict.

use crate::classify::classify;
use crate::paths::{host_allowed, host_of, inside_workspace};
use crate::strip::{StrippedPlan, StrippedStep};
use meridian_core::{
    ActionType, CompositeRisk, GearId, GearManifest, RiskLevel, StepVerdict, UserPolicy,
    ValidationResult, Verdict,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Static policy inputs, fixed at engine construction.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    pub workspace_root: PathBuf,
    pub allowlisted_domains: Vec<String>,
    pub max_transaction_amount_usd: Option<f64>,
    /// Stricter-only per-action overrides. Entries that would weaken the
    /// default verdict are ignored at application time.
    pub overrides: Vec<UserPolicy>,
}

/// Per-validation snapshot of gear state.
#[derive(Debug, Clone, Default)]
pub struct PlanContext {
    pub disabled_gears: HashSet<GearId>,
    pub manifests: HashMap<GearId, GearManifest>,
}

impl PlanContext {
    pub fn manifest(&self, gear: &GearId) -> Option<&GearManifest> {
        self.manifests.get(gear)
    }
}

/// Parameter keys treated as filesystem targets.
const PATH_PARAMS: &[&str] = &["path", "file", "dir", "target", "source", "dest"];

pub struct PolicyEngine {
    config: PolicyConfig,
}

impl PolicyEngine {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Validate a stripped plan.
    pub fn validate(&self, plan: &StrippedPlan, ctx: &PlanContext) -> ValidationResult {
        // Structural problems are the planner's to fix; they route back to
        // planning rather than to the operator.
        if let Some(revisions) = structural_problems(plan) {
            return ValidationResult {
                plan_id: plan.id,
                verdict: Verdict::NeedsRevision,
                step_results: Vec::new(),
                overall_risk: RiskLevel::Low,
                composite_risks: Vec::new(),
                reasoning: Some("plan structure is invalid".to_string()),
                suggested_revisions: revisions,
                metadata: serde_json::Map::new(),
            };
        }

        let mut step_results = Vec::with_capacity(plan.steps.len());
        let mut divergences = Vec::new();
        for step in &plan.steps {
            let assessed = self.evaluate_step(step, ctx);
            if (step.risk_level.rank() - assessed.assessed_risk.rank()).abs() > 1 {
                divergences.push(serde_json::json!({
                    "step_id": step.id.as_str(),
                    "declared": step.risk_level.to_string(),
                    "assessed": assessed.assessed_risk.to_string(),
                }));
            }
            step_results.push(assessed);
        }

        let composite_risks = detect_composites(&step_results);
        let mut verdict = ValidationResult::fold_verdicts(&step_results);
        let mut overall_risk = step_results
            .iter()
            .map(|s| s.assessed_risk)
            .max()
            .unwrap_or(RiskLevel::Low);
        if !composite_risks.is_empty() {
            verdict = verdict.max(Verdict::NeedsUserApproval);
            overall_risk = overall_risk.max(RiskLevel::High);
        }

        let reasoning = build_reasoning(&step_results, &composite_risks);
        let mut metadata = serde_json::Map::new();
        if !divergences.is_empty() {
            metadata.insert("divergences".to_string(), Value::Array(divergences));
        }

        ValidationResult {
            plan_id: plan.id,
            verdict,
            step_results,
            overall_risk,
            composite_risks,
            reasoning,
            suggested_revisions: Vec::new(),
            metadata,
        }
    }

    fn evaluate_step(&self, step: &StrippedStep, ctx: &PlanContext) -> StepVerdict {
        if ctx.disabled_gears.contains(&step.gear) {
            return StepVerdict {
                step_id: step.id,
                action_type: ActionType::Unknown,
                verdict: Verdict::Rejected,
                assessed_risk: RiskLevel::High,
                reason: Some(format!("gear {} is disabled", step.gear)),
            };
        }

        let action_type = classify(step);
        let (verdict, assessed_risk, reason) = self.default_verdict(step, action_type, ctx);
        let verdict = self.apply_override(action_type, verdict);

        StepVerdict { step_id: step.id, action_type, verdict, assessed_risk, reason }
    }

    /// The default verdict table.
    fn default_verdict(
        &self,
        step: &StrippedStep,
        action_type: ActionType,
        ctx: &PlanContext,
    ) -> (Verdict, RiskLevel, Option<String>) {
        match action_type {
            ActionType::ReadFiles => self.file_verdict(step, RiskLevel::Low),
            ActionType::WriteFiles => {
                // Same containment rule as reads, one risk level up.
                let (verdict, risk, reason) = self.file_verdict(step, RiskLevel::Low);
                (verdict, risk.elevated(), reason)
            }
            ActionType::DeleteFiles => {
                (Verdict::NeedsUserApproval, RiskLevel::High, Some("deletion requires approval".to_string()))
            }
            ActionType::NetworkGet => self.network_get_verdict(step),
            ActionType::NetworkMutate => (
                Verdict::NeedsUserApproval,
                RiskLevel::Medium,
                Some("mutating network call".to_string()),
            ),
            ActionType::ShellExecute => (
                Verdict::NeedsUserApproval,
                RiskLevel::High,
                Some("shell execution requires approval".to_string()),
            ),
            ActionType::CredentialUsage => self.credential_verdict(step, ctx),
            ActionType::FinancialTransaction => self.financial_verdict(step),
            ActionType::SendMessage => (
                Verdict::NeedsUserApproval,
                RiskLevel::Medium,
                Some("outbound message".to_string()),
            ),
            ActionType::SystemConfig => (
                Verdict::NeedsUserApproval,
                RiskLevel::High,
                Some("system configuration change".to_string()),
            ),
            ActionType::Unknown => (
                Verdict::NeedsUserApproval,
                RiskLevel::Medium,
                Some(format!("unrecognized action {:?}", step.action)),
            ),
        }
    }

    /// Approved iff every referenced path lands inside the workspace root
    /// after lexical normalization. Relative paths and missing targets
    /// fail safe.
    fn file_verdict(
        &self,
        step: &StrippedStep,
        inside_risk: RiskLevel,
    ) -> (Verdict, RiskLevel, Option<String>) {
        let paths = referenced_paths(step);
        if paths.is_empty() {
            return (
                Verdict::NeedsUserApproval,
                inside_risk.elevated(),
                Some("no target path declared".to_string()),
            );
        }
        for path in &paths {
            if !inside_workspace(&self.config.workspace_root, Path::new(path)) {
                return (
                    Verdict::NeedsUserApproval,
                    inside_risk.elevated(),
                    Some(format!("path outside workspace: {path}")),
                );
            }
        }
        (Verdict::Approved, inside_risk, None)
    }

    fn network_get_verdict(&self, step: &StrippedStep) -> (Verdict, RiskLevel, Option<String>) {
        let host = step
            .parameters
            .get("url")
            .or_else(|| step.parameters.get("host"))
            .and_then(Value::as_str)
            .and_then(host_of);
        match host {
            Some(host) if host_allowed(&self.config.allowlisted_domains, &host) => {
                (Verdict::Approved, RiskLevel::Low, None)
            }
            Some(host) => (
                Verdict::NeedsUserApproval,
                RiskLevel::Medium,
                Some(format!("host not allowlisted: {host}")),
            ),
            None => (
                Verdict::NeedsUserApproval,
                RiskLevel::Medium,
                Some("no resolvable host".to_string()),
            ),
        }
    }

    /// Credential use is approval-gated unless the gear's manifest declares
    /// the credential; either way it lands in the audit trail.
    fn credential_verdict(
        &self,
        step: &StrippedStep,
        ctx: &PlanContext,
    ) -> (Verdict, RiskLevel, Option<String>) {
        let name = step
            .parameters
            .get("credential")
            .or_else(|| step.parameters.get("secret"))
            .or_else(|| step.parameters.get("name"))
            .and_then(Value::as_str);
        if let (Some(name), Some(manifest)) = (name, ctx.manifest(&step.gear)) {
            if manifest.declares_secret(name) {
                tracing::info!(gear = %step.gear, credential = name, "declared credential use");
                return (
                    Verdict::Approved,
                    RiskLevel::Medium,
                    Some(format!("credential {name} declared by manifest")),
                );
            }
        }
        (
            Verdict::NeedsUserApproval,
            RiskLevel::High,
            Some("undeclared credential use".to_string()),
        )
    }

    fn financial_verdict(&self, step: &StrippedStep) -> (Verdict, RiskLevel, Option<String>) {
        let amount = step
            .parameters
            .get("amount_usd")
            .or_else(|| step.parameters.get("amount"))
            .and_then(Value::as_f64);
        if let (Some(amount), Some(cap)) = (amount, self.config.max_transaction_amount_usd) {
            if amount > cap {
                return (
                    Verdict::Rejected,
                    RiskLevel::Critical,
                    Some(format!("amount {amount:.2} exceeds cap {cap:.2}")),
                );
            }
        }
        (
            Verdict::NeedsUserApproval,
            RiskLevel::High,
            Some("financial transaction requires approval".to_string()),
        )
    }

    /// Apply a stored override iff it is stricter than the computed
    /// verdict. Weakening entries are ignored, which keeps the hard floors
    /// immutable by construction.
    fn apply_override(&self, action_type: ActionType, verdict: Verdict) -> Verdict {
        let stored = self
            .config
            .overrides
            .iter()
            .find(|o| o.action_type == action_type)
            .map(|o| o.verdict);
        match stored {
            Some(override_verdict) if override_verdict.strictness() > verdict.strictness() => {
                override_verdict
            }
            _ => verdict,
        }
    }
}

/// Paths a step refers to: the scalar path-ish params plus any `paths`
/// array of strings.
fn referenced_paths(step: &StrippedStep) -> Vec<String> {
    let mut out = Vec::new();
    for key in PATH_PARAMS {
        if let Some(value) = step.parameters.get(*key).and_then(Value::as_str) {
            out.push(value.to_string());
        }
    }
    if let Some(list) = step.parameters.get("paths").and_then(Value::as_array) {
        out.extend(list.iter().filter_map(Value::as_str).map(str::to_string));
    }
    out
}

/// Minimum delete_files steps for the mass-deletion pattern.
const MASS_DELETION_THRESHOLD: usize = 3;

/// Inspect the multiset of step classifications for dangerous
/// combinations.
fn detect_composites(steps: &[StepVerdict]) -> Vec<CompositeRisk> {
    let has = |t: ActionType| steps.iter().any(|s| s.action_type == t);
    let network = steps.iter().any(|s| s.action_type.is_network());
    let deletions = steps.iter().filter(|s| s.action_type == ActionType::DeleteFiles).count();

    let mut out = Vec::new();
    if has(ActionType::CredentialUsage) && network {
        out.push(CompositeRisk::CredentialExfiltration);
    }
    if has(ActionType::ReadFiles) && has(ActionType::SendMessage) {
        out.push(CompositeRisk::DataLeak);
    }
    if has(ActionType::ReadFiles) && network {
        out.push(CompositeRisk::FileExfiltration);
    }
    if deletions >= MASS_DELETION_THRESHOLD {
        out.push(CompositeRisk::MassDeletion);
    }
    out
}

/// Structural checks that send the plan back to the planner.
fn structural_problems(plan: &StrippedPlan) -> Option<Vec<String>> {
    let mut revisions = Vec::new();
    if plan.steps.is_empty() {
        revisions.push("plan has no steps".to_string());
    }
    let mut seen = HashSet::new();
    for step in &plan.steps {
        if !seen.insert(step.id) {
            revisions.push(format!("duplicate step id {}", step.id));
        }
        if step.action.trim().is_empty() {
            revisions.push(format!("step {} has an empty action", step.id));
        }
        if step.gear.is_empty() {
            revisions.push(format!("step {} names no gear", step.id));
        }
    }
    if revisions.is_empty() {
        None
    } else {
        Some(revisions)
    }
}

fn build_reasoning(steps: &[StepVerdict], composites: &[CompositeRisk]) -> Option<String> {
    let mut parts: Vec<String> = steps
        .iter()
        .filter(|s| s.verdict != Verdict::Approved)
        .filter_map(|s| s.reason.as_ref().map(|r| format!("{}: {r}", s.action_type)))
        .collect();
    parts.extend(composites.iter().map(|c| format!("composite risk: {c}")));
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;

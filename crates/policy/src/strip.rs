// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plan stripping.
//!
//! The policy engine never sees free-form planner output. Before
//! validation, a plan is projected down to the six step fields the engine
//! evaluates; reasoning, descriptions, and metadata are discarded so
//! persuasive framing from a compromised planner cannot influence the
//! verdict.

use meridian_core::{ExecutionPlan, ExecutionStep, GearId, JobId, PlanId, RiskLevel, StepId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A step as the policy engine sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrippedStep {
    pub id: StepId,
    pub gear: GearId,
    pub action: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub risk_level: RiskLevel,
}

impl StrippedStep {
    /// Stable fingerprint of what this step does, independent of step and
    /// plan ids. Keyed by gear, action, and the canonical parameter
    /// encoding; used by the approval cache.
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.gear.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.action.as_bytes());
        hasher.update([0u8]);
        // serde_json maps serialize with sorted keys, which makes the
        // encoding canonical.
        hasher.update(
            serde_json::to_string(&self.parameters).unwrap_or_default().as_bytes(),
        );
        hex::encode(hasher.finalize())
    }
}

/// A plan reduced to exactly what validation evaluates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrippedPlan {
    pub id: PlanId,
    pub job_id: JobId,
    pub steps: Vec<StrippedStep>,
}

/// Project a plan down to the validated fields. Step order follows the
/// plan's execution order so composite patterns see what will actually run.
pub fn strip_plan(plan: &ExecutionPlan) -> StrippedPlan {
    StrippedPlan {
        id: plan.id,
        job_id: plan.job_id,
        steps: plan
            .ordered_steps()
            .into_iter()
            .map(|step| StrippedStep {
                id: step.id,
                gear: step.gear,
                action: step.action.clone(),
                parameters: step.parameters.clone(),
                risk_level: step.risk_level,
            })
            .collect(),
    }
}

impl StrippedPlan {
    /// Re-expand into a bare plan (no reasoning, no metadata). Stripping
    /// the result yields the same stripped plan, which is the idempotence
    /// law validation relies on.
    pub fn into_plan(self) -> ExecutionPlan {
        ExecutionPlan {
            id: self.id,
            job_id: self.job_id,
            steps: self
                .steps
                .into_iter()
                .map(|step| ExecutionStep {
                    id: step.id,
                    gear: step.gear,
                    action: step.action,
                    parameters: step.parameters,
                    risk_level: step.risk_level,
                    depends_on: Vec::new(),
                    order: None,
                })
                .collect(),
            reasoning: None,
            description: None,
            metadata: Map::new(),
        }
    }
}

#[cfg(test)]
#[path = "strip_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution plans produced by the planner.

use crate::gear::GearId;
use crate::job::JobId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

crate::define_id! {
    /// Unique identifier for an execution plan.
    pub struct PlanId("plan-");
}

crate::define_id! {
    /// Unique identifier for a single step within a plan.
    pub struct StepId("step-");
}

/// Risk declared by the planner or assessed by the policy engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for RiskLevel {
    fn default() -> Self {
        RiskLevel::Low
    }
}

crate::string_enum! {
    RiskLevel {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

impl RiskLevel {
    /// Numeric rank for divergence comparison.
    pub fn rank(&self) -> i64 {
        match self {
            RiskLevel::Low => 0,
            RiskLevel::Medium => 1,
            RiskLevel::High => 2,
            RiskLevel::Critical => 3,
        }
    }

    /// The level one step above this one, saturating at critical.
    pub fn elevated(&self) -> RiskLevel {
        match self {
            RiskLevel::Low => RiskLevel::Medium,
            RiskLevel::Medium => RiskLevel::High,
            RiskLevel::High | RiskLevel::Critical => RiskLevel::Critical,
        }
    }
}

/// One tool invocation within a plan.
///
/// Only these fields reach the policy engine; anything else the planner
/// attaches is discarded by the stripper before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub id: StepId,
    pub gear: GearId,
    pub action: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub risk_level: RiskLevel,
    /// Step ids that must complete before this step may run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<StepId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
}

/// An ordered list of tool-call steps for a job.
///
/// `reasoning` and per-step descriptions are carried for display only and
/// are stripped before the plan is validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub id: PlanId,
    pub job_id: JobId,
    pub steps: Vec<ExecutionStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl ExecutionPlan {
    pub fn new(job_id: JobId, steps: Vec<ExecutionStep>) -> Self {
        Self {
            id: PlanId::generate(),
            job_id,
            steps,
            reasoning: None,
            description: None,
            metadata: Map::new(),
        }
    }

    /// Steps in execution order: explicit `order` first, then plan position.
    pub fn ordered_steps(&self) -> Vec<&ExecutionStep> {
        let mut indexed: Vec<(usize, &ExecutionStep)> = self.steps.iter().enumerate().collect();
        indexed.sort_by_key(|(pos, step)| (step.order.map(i64::from).unwrap_or(*pos as i64), *pos));
        indexed.into_iter().map(|(_, step)| step).collect()
    }
}

crate::test_builder! {
    pub struct ExecutionStepBuilder => ExecutionStep {
        into {
            gear: GearId = "gear-files",
            action: String = "read",
        }
        set {
            parameters: Map<String, Value> = Map::new(),
            risk_level: RiskLevel = RiskLevel::Low,
            depends_on: Vec<StepId> = Vec::new(),
        }
        option {
            order: u32 = None,
        }
        computed {
            id: StepId = StepId::generate(),
        }
    }
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::gear::GearId;
use crate::job::JobId;
use crate::plan::{ExecutionPlan, ExecutionStep, RiskLevel, StepId};
use serde_json::{Map, Value};

// ── Proptest strategies ─────────────────────────────────────────────────

/// Proptest strategies for core state machine types.
pub mod strategies {
    use crate::job::JobStatus;
    use crate::plan::RiskLevel;
    use crate::validation::Verdict;
    use proptest::prelude::*;

    pub fn arb_job_status() -> impl Strategy<Value = JobStatus> {
        proptest::sample::select(JobStatus::ALL.to_vec())
    }

    pub fn arb_verdict() -> impl Strategy<Value = Verdict> {
        prop_oneof![
            Just(Verdict::Approved),
            Just(Verdict::NeedsRevision),
            Just(Verdict::NeedsUserApproval),
            Just(Verdict::Rejected),
        ]
    }

    pub fn arb_risk() -> impl Strategy<Value = RiskLevel> {
        prop_oneof![
            Just(RiskLevel::Low),
            Just(RiskLevel::Medium),
            Just(RiskLevel::High),
            Just(RiskLevel::Critical),
        ]
    }
}

// ── Plan factory functions ──────────────────────────────────────────────

/// A one-step plan invoking `gear.action` with the given parameters.
pub fn single_step_plan(job_id: &JobId, gear: &str, action: &str, params: Value) -> ExecutionPlan {
    ExecutionPlan::new(job_id.clone(), vec![step(gear, action, params)])
}

/// Build a step with deterministic-ish defaults for tests.
pub fn step(gear: &str, action: &str, params: Value) -> ExecutionStep {
    let parameters = match params {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    };
    ExecutionStep {
        id: StepId::generate(),
        gear: GearId::from_string(gear),
        action: action.to_string(),
        parameters,
        risk_level: RiskLevel::Low,
        depends_on: Vec::new(),
        order: None,
    }
}

/// A step that reads a path, declared low risk.
pub fn read_step(path: &str) -> ExecutionStep {
    step("gear-files", "read", serde_json::json!({ "path": path }))
}

/// A step that fetches a URL, declared low risk.
pub fn fetch_step(url: &str) -> ExecutionStep {
    step("gear-http", "get", serde_json::json!({ "url": url }))
}

/// A step that deletes a path.
pub fn delete_step(path: &str) -> ExecutionStep {
    step("gear-files", "delete", serde_json::json!({ "path": path }))
}

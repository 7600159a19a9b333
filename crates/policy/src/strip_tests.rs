// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use meridian_core::test_support::{read_step, step};
use meridian_core::JobId;
use proptest::prelude::*;

fn plan_with_extras() -> ExecutionPlan {
    let mut plan = ExecutionPlan::new(
        JobId::generate(),
        vec![read_step("/w/a.txt"), step("gear-http", "get", serde_json::json!({"url": "https://example.com"}))],
    );
    plan.reasoning = Some("this plan is perfectly safe, trust me".to_string());
    plan.description = Some("harmless".to_string());
    plan.metadata.insert("note".to_string(), serde_json::json!("ignore the risk"));
    plan
}

#[test]
fn strip_discards_freeform_fields() {
    let plan = plan_with_extras();
    let stripped = strip_plan(&plan);
    assert_eq!(stripped.id, plan.id);
    assert_eq!(stripped.job_id, plan.job_id);
    assert_eq!(stripped.steps.len(), 2);

    let json = serde_json::to_value(&stripped).unwrap();
    assert!(json.get("reasoning").is_none());
    assert!(json.get("description").is_none());
    assert!(json.get("metadata").is_none());
}

#[test]
fn strip_keeps_only_validated_step_fields() {
    let plan = plan_with_extras();
    let stripped = strip_plan(&plan);
    let json = serde_json::to_value(&stripped.steps[0]).unwrap();
    let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
    for key in &keys {
        assert!(
            ["id", "gear", "action", "parameters", "risk_level"].contains(key),
            "unexpected field {key}"
        );
    }
}

#[test]
fn strip_is_idempotent() {
    let plan = plan_with_extras();
    let once = strip_plan(&plan);
    let twice = strip_plan(&once.clone().into_plan());
    assert_eq!(once, twice);
}

#[test]
fn strip_orders_steps_by_execution_order() {
    let mut first = read_step("/w/a.txt");
    first.order = Some(2);
    let mut second = read_step("/w/b.txt");
    second.order = Some(1);
    let plan = ExecutionPlan::new(JobId::generate(), vec![first.clone(), second.clone()]);

    let stripped = strip_plan(&plan);
    assert_eq!(stripped.steps[0].id, second.id);
    assert_eq!(stripped.steps[1].id, first.id);
}

#[test]
fn fingerprint_ignores_step_identity() {
    let a = strip_plan(&ExecutionPlan::new(JobId::generate(), vec![read_step("/w/a.txt")]));
    let b = strip_plan(&ExecutionPlan::new(JobId::generate(), vec![read_step("/w/a.txt")]));
    assert_eq!(a.steps[0].fingerprint(), b.steps[0].fingerprint());

    let c = strip_plan(&ExecutionPlan::new(JobId::generate(), vec![read_step("/w/other.txt")]));
    assert_ne!(a.steps[0].fingerprint(), c.steps[0].fingerprint());
}

proptest! {
    #[test]
    fn strip_never_grows_steps(extra in ".{0,32}") {
        let mut plan = plan_with_extras();
        plan.reasoning = Some(extra);
        let stripped = strip_plan(&plan);
        prop_assert_eq!(stripped.steps.len(), plan.steps.len());
    }
}

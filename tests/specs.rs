// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end runtime scenarios: a real store, real workers, real child
//! processes for gears, and a scripted planner.

use async_trait::async_trait;
use meridian_bus::{BusError, Handler};
use meridian_core::test_support::{delete_step, fetch_step, read_step};
use meridian_core::{
    ComponentId, CreateJob, ExecutionPlan, GearManifest, JobId, JobSource, JobStatus, Message,
    MessageBody, RuntimeConfig, SandboxMode, Tier,
};
use meridian_runtime::{DenyAllVault, NullNotifier, Runtime, RuntimeDeps};
use meridian_storage::Store;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

// ── Fixtures ────────────────────────────────────────────────────────────

/// A gear that completes the signed v1 handshake/request/response cycle.
const GEAR_SCRIPT: &str = r#"#!/usr/bin/env python3
import sys, json, hmac, hashlib

def canon(obj):
    return json.dumps(obj, sort_keys=True, separators=(",", ":")).encode()

handshake = json.loads(sys.stdin.readline())
key = bytes.fromhex(handshake["key"])
request = json.loads(sys.stdin.readline())
response = {
    "type": "response",
    "correlation_id": request["correlation_id"],
    "result": {"ok": True, "action": request["action"]},
}
response["signature"] = hmac.new(key, canon(response), hashlib.sha256).hexdigest()
sys.stdout.write(json.dumps(response) + "\n")
sys.stdout.flush()
"#;

fn write_gear_script(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join("gear-entry.py");
    std::fs::write(&path, GEAR_SCRIPT).unwrap();
    let mut permissions = std::fs::metadata(&path).unwrap().permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(&path, permissions).unwrap();
    path
}

fn gear_manifest(id: &str, entry: &Path) -> GearManifest {
    let checksum = meridian_sandbox::file_checksum(entry).unwrap();
    GearManifest::builder()
        .id(id)
        .entry(entry.to_path_buf())
        .checksum(checksum)
        .build()
}

fn config() -> RuntimeConfig {
    RuntimeConfig {
        workers: 2,
        dedup_window_ms: 3_600_000,
        max_revision_count: 3,
        max_replan: 2,
        workspace_path: PathBuf::from("/w"),
        allowlisted_domains: vec!["example.com".to_string()],
        max_transaction_amount_usd: Some(100.0),
        user_policies: Vec::new(),
        sandbox_mode: SandboxMode::V1,
        session_duration_ms: 86_400_000,
        brute_force: Default::default(),
        tier: Tier::Desktop,
    }
}

/// Planner answering every request with a plan built by the closure.
struct ScriptedPlanner {
    build: Box<dyn Fn(&JobId) -> ExecutionPlan + Send + Sync>,
}

impl ScriptedPlanner {
    fn new(build: impl Fn(&JobId) -> ExecutionPlan + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self { build: Box::new(build) })
    }
}

#[async_trait]
impl Handler for ScriptedPlanner {
    async fn handle(&self, message: Message) -> Result<Message, BusError> {
        let MessageBody::PlanRequest { job_id, .. } = &message.body else {
            return Err(BusError::handler(
                meridian_core::ErrorKind::Validation,
                "not a plan request",
            ));
        };
        let plan = (self.build)(job_id);
        Ok(Message {
            id: "planner-resp".to_string(),
            correlation_id: message.correlation_id.clone(),
            timestamp: message.timestamp,
            from: ComponentId::Planner,
            to: message.from.clone(),
            body: MessageBody::PlanResponse { plan },
            job_id: Some(*job_id),
            signature: None,
        })
    }
}

fn deps_with_planner(
    planner: Arc<dyn Handler>,
    manifests: Vec<GearManifest>,
) -> RuntimeDeps {
    RuntimeDeps {
        planner: Some(planner),
        journal: None,
        bridge: None,
        vault: Arc::new(DenyAllVault),
        notifier: Arc::new(NullNotifier),
        manifests,
    }
}

async fn wait_for<F: Fn(&meridian_core::Job) -> bool>(
    runtime: &Runtime,
    id: &JobId,
    what: &str,
    predicate: F,
) -> meridian_core::Job {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    loop {
        if let Ok(Some(job)) = runtime.job(id) {
            if predicate(&job) {
                return job;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("timed out waiting for {what}; job is {}", job.status);
            }
        } else if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}; job missing");
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

fn read_nonce(store: &Store, id: &JobId) -> Option<String> {
    store
        .meridian
        .query_row("SELECT nonce FROM nonces WHERE job_id = ?1", [id.as_str()], |row| {
            row.get(0)
        })
        .unwrap()
}

// ── Scenario 1: happy path ──────────────────────────────────────────────

#[tokio::test]
async fn happy_path_runs_one_step_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let entry = write_gear_script(dir.path());
    let planner = ScriptedPlanner::new(|job_id| {
        ExecutionPlan::new(*job_id, vec![read_step("/w/notes.txt")])
    });
    let runtime = Runtime::start(
        config(),
        dir.path(),
        deps_with_planner(planner, vec![gear_manifest("gear-files", &entry)]),
    )
    .await
    .unwrap();

    let id = runtime.submit(CreateJob::new("operator", "summarize x")).unwrap().job.id;
    let job = wait_for(&runtime, &id, "completion", |j| j.status.is_terminal()).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.attempts, 1);
    assert_eq!(job.revision_count, 0);
    assert!(job.completed_at.is_some());

    // Provenance-tagged step result
    let steps = job.result.as_ref().unwrap()["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0]["source"], "gear:gear-files");
    assert_eq!(steps[0]["result"]["ok"], true);

    // Audit shows the transitions in order, and the chain verifies
    let entries = runtime.store().audit.entries().unwrap();
    let transitions: Vec<String> = entries
        .iter()
        .filter(|e| e.action == "job.transition" && e.job_id.as_ref() == Some(&id))
        .map(|e| e.details["to"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(transitions, vec!["planning", "validating", "executing", "completed"]);
    assert!(matches!(
        runtime.store().audit.verify().unwrap(),
        meridian_storage::ChainStatus::Intact { .. }
    ));

    runtime.shutdown().await;
}

// ── Scenario 2: dedup inside the window ─────────────────────────────────

#[tokio::test]
async fn dedup_collapses_identical_requests_until_terminal() {
    let dir = tempfile::tempdir().unwrap();
    // No gears needed: the job parks on approval and stays non-terminal
    let planner = ScriptedPlanner::new(|job_id| {
        ExecutionPlan::new(*job_id, vec![delete_step("/w/old.txt")])
    });
    let runtime = Runtime::start(config(), dir.path(), deps_with_planner(planner, vec![]))
        .await
        .unwrap();

    let first = runtime.submit(CreateJob::new("u1", "clean up downloads")).unwrap();
    assert!(!first.deduplicated);
    let second = runtime.submit(CreateJob::new("u1", "clean up downloads")).unwrap();
    assert!(second.deduplicated);
    assert_eq!(second.job.id, first.job.id);

    // Different user or content: new rows
    assert!(!runtime.submit(CreateJob::new("u2", "clean up downloads")).unwrap().deduplicated);
    assert!(!runtime.submit(CreateJob::new("u1", "clean up photos")).unwrap().deduplicated);

    // Non-user sources collapse the same way
    let hook = runtime
        .submit(CreateJob::new("feed", "ingest the daily digest").source(JobSource::Webhook))
        .unwrap();
    assert!(!hook.deduplicated);
    let hook_again = runtime
        .submit(CreateJob::new("feed", "ingest the daily digest").source(JobSource::Webhook))
        .unwrap();
    assert!(hook_again.deduplicated);
    assert_eq!(hook_again.job.id, hook.job.id);

    // Once the job is terminal the fingerprint is free again
    runtime.cancel(&first.job.id, "test cleanup").unwrap();
    let third = runtime.submit(CreateJob::new("u1", "clean up downloads")).unwrap();
    assert!(!third.deduplicated);
    assert_ne!(third.job.id, first.job.id);

    runtime.shutdown().await;
}

// ── Scenario 3: crash recovery ──────────────────────────────────────────

#[tokio::test]
async fn recovery_resets_worker_owned_rows_and_preserves_parked_ones() {
    let dir = tempfile::tempdir().unwrap();

    let (a, b, c, d) = {
        let store = Store::open(dir.path(), Tier::Desktop, 1_000).unwrap();
        let jobs = store.jobs();
        let worker = meridian_core::WorkerId::new("worker-X");
        let mut ids = Vec::new();
        for content in ["a", "b", "c", "d"] {
            match jobs.create(CreateJob::new("u", content), 1_000).unwrap() {
                meridian_storage::CreateOutcome::Created(job) => ids.push(job.id),
                meridian_storage::CreateOutcome::Duplicate(_) => unreachable!(),
            }
        }
        jobs.claim(&worker, 4, 1_100).unwrap();
        // A: executing; B: planning; C: awaiting_approval; D: completed
        jobs.transition(&ids[0], JobStatus::Planning, JobStatus::Validating, 1_200).unwrap();
        jobs.transition(&ids[0], JobStatus::Validating, JobStatus::Executing, 1_201).unwrap();
        jobs.transition(&ids[2], JobStatus::Planning, JobStatus::Validating, 1_202).unwrap();
        jobs.transition(&ids[2], JobStatus::Validating, JobStatus::AwaitingApproval, 1_203)
            .unwrap();
        jobs.transition(&ids[3], JobStatus::Planning, JobStatus::Validating, 1_204).unwrap();
        jobs.transition(&ids[3], JobStatus::Validating, JobStatus::Executing, 1_205).unwrap();
        jobs.transition(&ids[3], JobStatus::Executing, JobStatus::Completed, 1_206).unwrap();
        (ids[0], ids[1], ids[2], ids[3])
    };

    // Recovery runs before workers, so park the planner on empty plans
    let planner = ScriptedPlanner::new(|job_id| ExecutionPlan::new(*job_id, Vec::new()));
    let runtime = Runtime::start(config(), dir.path(), deps_with_planner(planner, vec![]))
        .await
        .unwrap();

    let report = runtime.recovery_report();
    assert_eq!(report.non_terminal, 3);
    let mut reset: Vec<String> = report.reset.iter().map(|id| id.to_string()).collect();
    reset.sort();
    let mut expected = vec![a.to_string(), b.to_string()];
    expected.sort();
    assert_eq!(reset, expected);

    assert_eq!(runtime.job(&c).unwrap().unwrap().status, JobStatus::AwaitingApproval);
    assert_eq!(runtime.job(&d).unwrap().unwrap().status, JobStatus::Completed);

    runtime.shutdown().await;
}

// ── Scenario 4: composite risk and the approval nonce ───────────────────

#[tokio::test]
async fn composite_risk_parks_and_nonce_approval_resumes() {
    let dir = tempfile::tempdir().unwrap();
    let entry = write_gear_script(dir.path());
    let planner = ScriptedPlanner::new(|job_id| {
        ExecutionPlan::new(
            *job_id,
            vec![read_step("/w/notes.txt"), fetch_step("https://example.com/data")],
        )
    });
    let manifests = vec![
        gear_manifest("gear-files", &entry),
        gear_manifest("gear-http", &entry),
    ];
    let runtime =
        Runtime::start(config(), dir.path(), deps_with_planner(planner, manifests))
            .await
            .unwrap();

    let id = runtime.submit(CreateJob::new("u1", "summarize and fetch")).unwrap().job.id;
    let parked =
        wait_for(&runtime, &id, "approval park", |j| j.status == JobStatus::AwaitingApproval)
            .await;

    // Per-step approved, composite file-exfiltration escalated the plan
    let validation = parked.validation.unwrap();
    assert_eq!(validation["verdict"], "needs_user_approval");
    assert_eq!(validation["composite_risks"][0], "file_exfiltration");
    let risk = validation["overall_risk"].as_str().unwrap().to_string();
    assert!(risk == "high" || risk == "critical");

    let nonce = read_nonce(runtime.store(), &id).expect("nonce issued");
    runtime.approve(&id, &nonce).unwrap();

    let done = wait_for(&runtime, &id, "completion", |j| j.status.is_terminal()).await;
    assert_eq!(done.status, JobStatus::Completed);

    // The nonce is gone: replaying it fails
    let err = runtime.approve(&id, &nonce).unwrap_err();
    assert!(matches!(err, meridian_runtime::RuntimeError::InvalidNonce(_)));

    runtime.shutdown().await;
}

// ── Scenario 5: integrity failure disables the gear ─────────────────────

#[tokio::test]
async fn integrity_failure_disables_gear_and_blocks_future_plans() {
    let dir = tempfile::tempdir().unwrap();
    let entry = write_gear_script(dir.path());
    let mut manifest = gear_manifest("gear-files", &entry);
    manifest.checksum = "00".repeat(32);

    let planner = ScriptedPlanner::new(|job_id| {
        ExecutionPlan::new(*job_id, vec![read_step("/w/notes.txt")])
    });
    let runtime =
        Runtime::start(config(), dir.path(), deps_with_planner(planner, vec![manifest]))
            .await
            .unwrap();

    let id = runtime.submit(CreateJob::new("u1", "first attempt")).unwrap().job.id;
    let failed = wait_for(&runtime, &id, "failure", |j| j.status.is_terminal()).await;
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.error.as_ref().unwrap()["kind"], "integrity");

    // The gear is now disabled: the validator rejects the next plan
    let second = runtime.submit(CreateJob::new("u1", "second attempt")).unwrap().job.id;
    let rejected = wait_for(&runtime, &second, "failure", |j| j.status.is_terminal()).await;
    assert_eq!(rejected.status, JobStatus::Failed);
    let message = rejected.error.as_ref().unwrap()["message"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(message.contains("disabled"), "unexpected failure message: {message}");

    runtime.shutdown().await;
}

// ── Scenario 6: revision bound ──────────────────────────────────────────

#[tokio::test]
async fn repeated_revision_verdicts_exhaust_the_budget() {
    let dir = tempfile::tempdir().unwrap();
    let planner = ScriptedPlanner::new(|job_id| ExecutionPlan::new(*job_id, Vec::new()));
    let runtime = Runtime::start(config(), dir.path(), deps_with_planner(planner, vec![]))
        .await
        .unwrap();

    let id = runtime.submit(CreateJob::new("u1", "impossible request")).unwrap().job.id;
    let job = wait_for(&runtime, &id, "failure", |j| j.status.is_terminal()).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.revision_count, config().max_revision_count + 1);
    let message = job.error.as_ref().unwrap()["message"].as_str().unwrap().to_string();
    assert!(
        message.contains("plan has no steps"),
        "failure should carry the last suggested revisions, got: {message}"
    );

    runtime.shutdown().await;
}

// ── Cancellation during execution ───────────────────────────────────────

#[tokio::test]
async fn cancelling_an_executing_job_kills_the_sandbox() {
    let dir = tempfile::tempdir().unwrap();
    // A gear that never responds keeps the job in executing
    let entry = {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.path().join("stuck-gear.sh");
        std::fs::write(&path, "#!/bin/sh\nwhile read line; do :; done\n").unwrap();
        let mut permissions = std::fs::metadata(&path).unwrap().permissions();
        permissions.set_mode(0o755);
        std::fs::set_permissions(&path, permissions).unwrap();
        path
    };
    let planner = ScriptedPlanner::new(|job_id| {
        ExecutionPlan::new(*job_id, vec![read_step("/w/notes.txt")])
    });
    let runtime = Runtime::start(
        config(),
        dir.path(),
        deps_with_planner(planner, vec![gear_manifest("gear-files", &entry)]),
    )
    .await
    .unwrap();

    let id = runtime.submit(CreateJob::new("u1", "long haul")).unwrap().job.id;
    wait_for(&runtime, &id, "execution", |j| j.status == JobStatus::Executing).await;

    runtime.cancel(&id, "operator cancelled").unwrap();
    let job = wait_for(&runtime, &id, "cancellation", |j| j.status.is_terminal()).await;
    assert_eq!(job.status, JobStatus::Cancelled);

    runtime.shutdown().await;
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::gears::DenyAllVault;
use crate::notify::NullNotifier;
use crate::test_support::test_config;
use meridian_core::{JobStatus, Tier, WorkerId};

fn deps() -> RuntimeDeps {
    RuntimeDeps {
        planner: None,
        journal: None,
        bridge: None,
        vault: Arc::new(DenyAllVault),
        notifier: Arc::new(NullNotifier),
        manifests: Vec::new(),
    }
}

#[tokio::test]
async fn startup_reaches_ready_and_shutdown_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Runtime::start(test_config(), dir.path(), deps()).await.unwrap();
    assert!(runtime.is_live());
    assert!(runtime.is_ready());

    runtime.shutdown().await;
    assert!(!runtime.is_live());
    assert!(!runtime.is_ready());
    // Second stop is a no-op
    runtime.shutdown().await;
}

#[tokio::test]
async fn double_start_on_the_same_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let first = Runtime::start(test_config(), dir.path(), deps()).await.unwrap();
    let second = Runtime::start(test_config(), dir.path(), deps()).await;
    assert!(matches!(second.unwrap_err(), RuntimeError::LockFailed(_)));
    first.shutdown().await;
}

#[tokio::test]
async fn restart_after_stop_is_permitted() {
    let dir = tempfile::tempdir().unwrap();
    let first = Runtime::start(test_config(), dir.path(), deps()).await.unwrap();
    first.shutdown().await;

    let second = Runtime::start(test_config(), dir.path(), deps()).await.unwrap();
    assert!(second.is_ready());
    second.shutdown().await;
}

#[tokio::test]
async fn recovery_resets_worker_owned_rows_and_reports() {
    let dir = tempfile::tempdir().unwrap();

    // Pre-seed rows the way a crashed instance would have left them:
    // A(executing, worker=X), B(planning, worker=X), C(awaiting_approval),
    // D(completed).
    let (a, b, c, d) = {
        let store = Store::open(dir.path(), Tier::Desktop, 1_000).unwrap();
        let jobs = store.jobs();
        let worker = WorkerId::new("worker-X");

        let mut created = Vec::new();
        for content in ["a", "b", "c", "d"] {
            match jobs.create(meridian_core::CreateJob::new("u", content), 1_000).unwrap() {
                meridian_storage::CreateOutcome::Created(job) => created.push(job.id),
                meridian_storage::CreateOutcome::Duplicate(_) => unreachable!(),
            }
        }
        let (a, b, c, d) = (created[0], created[1], created[2], created[3]);

        jobs.claim(&worker, 4, 1_100).unwrap();
        jobs.transition(&a, JobStatus::Planning, JobStatus::Validating, 1_200).unwrap();
        jobs.transition(&a, JobStatus::Validating, JobStatus::Executing, 1_201).unwrap();
        jobs.transition(&c, JobStatus::Planning, JobStatus::Validating, 1_202).unwrap();
        jobs.transition(&c, JobStatus::Validating, JobStatus::AwaitingApproval, 1_203)
            .unwrap();
        jobs.transition(&d, JobStatus::Planning, JobStatus::Validating, 1_204).unwrap();
        jobs.transition(&d, JobStatus::Validating, JobStatus::Executing, 1_205).unwrap();
        jobs.transition(&d, JobStatus::Executing, JobStatus::Completed, 1_206).unwrap();
        (a, b, c, d)
    };

    let runtime = Runtime::start(test_config(), dir.path(), deps()).await.unwrap();
    let report = runtime.recovery_report();
    assert_eq!(report.non_terminal, 3);
    assert_eq!(report.preserved, 1);
    let mut reset = report.reset.clone();
    reset.sort_by(|x, y| x.as_str().cmp(y.as_str()));
    let mut expected = vec![a, b];
    expected.sort_by(|x, y| x.as_str().cmp(y.as_str()));
    assert_eq!(reset, expected);

    // A and B went back to the queue (workers may re-claim them at any
    // moment, so only the parked and terminal rows have stable statuses).
    assert_eq!(runtime.job(&c).unwrap().unwrap().status, JobStatus::AwaitingApproval);
    assert_eq!(runtime.job(&d).unwrap().unwrap().status, JobStatus::Completed);

    runtime.shutdown().await;
}

#[tokio::test]
async fn submit_is_refused_before_ready_and_after_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Runtime::start(test_config(), dir.path(), deps()).await.unwrap();
    runtime.shutdown().await;
    let err = runtime.submit(meridian_core::CreateJob::new("u", "late")).unwrap_err();
    assert!(matches!(err, RuntimeError::NotReady));
}

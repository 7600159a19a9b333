// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The cooperative worker pool.
//!
//! Each worker loops: resume an approved job if one is queued, otherwise
//! claim one pending job and drive it. Idle workers back off up to a
//! bounded poll interval; the shutdown token wakes them immediately.

use crate::driver::Driver;
use meridian_core::{Clock, ErrorKind, Kinded, WorkerId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const IDLE_BACKOFF_START_MS: u64 = 100;
const IDLE_BACKOFF_CAP_MS: u64 = 2_000;

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers over the shared driver. Workers hold off
    /// claiming until the ready gate flips, so jobs recovered at startup
    /// are not driven before the bus handlers exist.
    pub fn spawn<C: Clock + 'static>(
        driver: Arc<Driver<C>>,
        count: usize,
        shutdown: CancellationToken,
        ready: watch::Receiver<bool>,
    ) -> Self {
        let handles = (0..count)
            .map(|index| {
                let driver = driver.clone();
                let shutdown = shutdown.clone();
                let ready = ready.clone();
                tokio::spawn(async move {
                    worker_loop(driver, index, shutdown, ready).await;
                })
            })
            .collect();
        Self { handles }
    }

    /// Wait up to `grace` for the pool to settle, then abort stragglers.
    /// An aborted worker leaves its job in `executing` for the next
    /// recovery cycle.
    pub async fn join(self, grace: Duration) {
        let deadline = tokio::time::Instant::now() + grace;
        for mut handle in self.handles {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if tokio::time::timeout(remaining, &mut handle).await.is_err() {
                handle.abort();
            }
        }
    }
}

async fn worker_loop<C: Clock + 'static>(
    driver: Arc<Driver<C>>,
    index: usize,
    shutdown: CancellationToken,
    mut ready: watch::Receiver<bool>,
) {
    let worker_id = WorkerId::new(format!("worker-{index}"));
    let mut idle_backoff_ms = IDLE_BACKOFF_START_MS;

    while !*ready.borrow_and_update() {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            changed = ready.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
    tracing::debug!(worker = %worker_id, "worker started");

    while !shutdown.is_cancelled() {
        // Approved jobs resume ahead of fresh claims.
        if let Some(id) = driver.scheduler.next_approved() {
            match driver.scheduler.claim_approved(&id, &worker_id) {
                Ok(_) => {
                    driver.drive(&id).await;
                    idle_backoff_ms = IDLE_BACKOFF_START_MS;
                }
                Err(e) if e.kind() == ErrorKind::Conflict => {
                    // Someone else resumed it; fine.
                    tracing::debug!(job_id = %id, "approved job already resumed");
                }
                Err(e) => {
                    tracing::warn!(job_id = %id, error = %e, "approved resume failed");
                }
            }
            continue;
        }

        match driver.scheduler.claim(&worker_id, 1) {
            Ok(jobs) if !jobs.is_empty() => {
                for job in jobs {
                    driver.drive(&job.id).await;
                }
                idle_backoff_ms = IDLE_BACKOFF_START_MS;
            }
            Ok(_) => {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_millis(idle_backoff_ms)) => {}
                }
                idle_backoff_ms = (idle_backoff_ms * 2).min(IDLE_BACKOFF_CAP_MS);
            }
            Err(e) => {
                tracing::error!(worker = %worker_id, error = %e, "claim failed");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_millis(IDLE_BACKOFF_CAP_MS)) => {}
                }
            }
        }
    }
    tracing::debug!(worker = %worker_id, "worker stopped");
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;

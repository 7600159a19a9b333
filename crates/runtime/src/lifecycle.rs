// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime lifecycle: ordered startup, health flags, ordered shutdown.
//!
//! Startup: open storage and migrate → crash recovery → worker pool →
//! bus handler registration → ready. Shutdown runs the same steps in
//! reverse with a grace period for in-flight jobs; whatever does not
//! settle is left for the next recovery cycle.

use crate::approval::ApprovalRouter;
use crate::driver::Driver;
use crate::error::RuntimeError;
use crate::gears::{BusCommandHandler, GearBusHandler, SchedulerSubjobSink};
use crate::notify::Notifier;
use crate::registry::StoreBackedRegistry;
use crate::scheduler::{Scheduler, SubmitOutcome};
use crate::validator::ValidatorHandler;
use crate::worker::WorkerPool;
use fs2::FileExt;
use meridian_bus::{Handler, MessageBus};
use meridian_core::{
    ComponentId, CreateJob, GearManifest, Job, JobId, RuntimeConfig, SystemClock,
};
use meridian_policy::{PolicyConfig, PolicyEngine};
use meridian_sandbox::{SandboxDeps, SandboxHost, SecretsVault};
use meridian_storage::{RecoveryReport, Store};
use parking_lot::Mutex;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long shutdown waits for workers before abandoning them.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Maintenance sweep cadence.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// Collaborators supplied by the embedder.
pub struct RuntimeDeps {
    /// LLM planner adapter; jobs fail their replan budget without one.
    pub planner: Option<Arc<dyn Handler>>,
    /// Memory backend for `journal.*` traffic.
    pub journal: Option<Arc<dyn Handler>>,
    /// Front-end status/approval stream.
    pub bridge: Option<Arc<dyn Handler>>,
    pub vault: Arc<dyn SecretsVault>,
    pub notifier: Arc<dyn Notifier>,
    /// Gears available to plans.
    pub manifests: Vec<GearManifest>,
}

/// The assembled runtime.
pub struct Runtime {
    config: RuntimeConfig,
    store: Arc<Store>,
    scheduler: Arc<Scheduler<SystemClock>>,
    bus: Arc<MessageBus<SystemClock>>,
    approval: Arc<ApprovalRouter<SystemClock>>,
    host: Arc<SandboxHost<SystemClock>>,
    registry: Arc<StoreBackedRegistry<SystemClock>>,
    recovery: RecoveryReport,
    shutdown_token: CancellationToken,
    workers: Mutex<Option<WorkerPool>>,
    maintenance: Mutex<Option<JoinHandle<()>>>,
    live: AtomicBool,
    ready: AtomicBool,
    stopped: AtomicBool,
    /// Flips once startup completes; workers wait on it before claiming.
    ready_gate: tokio::sync::watch::Sender<bool>,
    // Held for the lifetime of the runtime to fail a concurrent start.
    #[allow(dead_code)]
    lock_file: File,
    lock_path: PathBuf,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime").finish_non_exhaustive()
    }
}

impl Runtime {
    /// Run all startup phases in order and return the ready runtime.
    pub async fn start(
        config: RuntimeConfig,
        data_dir: &Path,
        deps: RuntimeDeps,
    ) -> Result<Arc<Self>, RuntimeError> {
        let clock = SystemClock;
        let now = clock_now(&clock);

        // Phase 0: single-instance lock. Double-start is an error.
        std::fs::create_dir_all(data_dir)?;
        let lock_path = data_dir.join("meridian.lock");
        let lock_file = File::create(&lock_path)?;
        lock_file.try_lock_exclusive().map_err(RuntimeError::LockFailed)?;

        // Phase 1: storage + migrations.
        let store = Arc::new(Store::open(data_dir, config.tier, now)?);

        // Phase 2: crash recovery.
        let shutdown_token = CancellationToken::new();
        let scheduler = Arc::new(Scheduler::new(
            store.clone(),
            config.clone(),
            clock.clone(),
            shutdown_token.clone(),
        ));
        let recovery = scheduler.recover()?;
        tracing::info!(
            non_terminal = recovery.non_terminal,
            reset = recovery.reset.len(),
            preserved = recovery.preserved,
            "crash recovery complete"
        );

        // Assemble the control plane.
        let bus = Arc::new(MessageBus::new(clock.clone()));
        let registry = Arc::new(StoreBackedRegistry::new(store.clone(), clock.clone()));
        for manifest in deps.manifests {
            registry.install(manifest);
        }
        let engine = Arc::new(PolicyEngine::new(PolicyConfig {
            workspace_root: config.workspace_path.clone(),
            allowlisted_domains: config.allowlisted_domains.clone(),
            max_transaction_amount_usd: config.max_transaction_amount_usd,
            overrides: merged_overrides(&config, &store)?,
        }));
        let host = Arc::new(SandboxHost::new(
            SandboxDeps {
                registry: registry.clone(),
                vault: deps.vault,
                subjobs: Arc::new(SchedulerSubjobSink::new(scheduler.clone())),
                commands: Arc::new(BusCommandHandler::new(bus.clone())),
            },
            clock.clone(),
            config.sandbox_mode,
        ));
        let approval =
            Arc::new(ApprovalRouter::new(scheduler.clone(), bus.clone(), deps.notifier.clone()));
        let driver = Arc::new(Driver {
            scheduler: scheduler.clone(),
            bus: bus.clone(),
            engine: engine.clone(),
            host: host.clone(),
            registry: registry.clone(),
            approval: approval.clone(),
            notifier: deps.notifier.clone(),
        });

        // Phase 3: worker pool. Claiming is gated on the ready flag so
        // recovered jobs wait for the handler registrations below.
        let (ready_gate, ready_rx) = tokio::sync::watch::channel(false);
        let workers =
            WorkerPool::spawn(driver, config.workers, shutdown_token.clone(), ready_rx);

        // Phase 4: bus handlers for built-in components and collaborators.
        bus.register(
            ComponentId::Validator,
            Arc::new(ValidatorHandler::new(engine.clone(), registry.clone(), clock.clone())),
        );
        let gear_handler = Arc::new(GearBusHandler::new(host.clone(), clock.clone()));
        for gear in registry.gear_ids() {
            bus.register(ComponentId::Gear(gear), gear_handler.clone());
        }
        if let Some(planner) = deps.planner {
            bus.register(ComponentId::Planner, planner);
        } else {
            tracing::warn!("no planner registered; jobs will exhaust their replan budget");
        }
        if let Some(journal) = deps.journal {
            bus.register(ComponentId::Journal, journal);
        }
        if let Some(bridge) = deps.bridge {
            bus.register(ComponentId::Bridge, bridge);
        }

        let runtime = Arc::new(Self {
            config,
            store,
            scheduler,
            bus,
            approval,
            host,
            registry,
            recovery,
            shutdown_token,
            workers: Mutex::new(Some(workers)),
            maintenance: Mutex::new(None),
            live: AtomicBool::new(true),
            ready: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            ready_gate,
            lock_file,
            lock_path,
        });

        // Maintenance loop.
        let maintenance = {
            let runtime = runtime.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(MAINTENANCE_INTERVAL);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = runtime.shutdown_token.cancelled() => break,
                        _ = ticker.tick() => {
                            let now = clock_now(&SystemClock);
                            if let Err(e) = meridian_storage::prune(
                                &runtime.store,
                                now,
                                runtime.config.dedup_window_ms,
                            ) {
                                tracing::error!(error = %e, "maintenance sweep failed");
                            }
                        }
                    }
                }
            })
        };
        *runtime.maintenance.lock() = Some(maintenance);

        // Phase 5: ready.
        runtime.ready.store(true, Ordering::SeqCst);
        let _ = runtime.ready_gate.send(true);
        tracing::info!(workers = runtime.config.workers, "runtime ready");
        Ok(runtime)
    }

    // ── Health ──────────────────────────────────────────────────────────

    /// Liveness: the process is not stopping.
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Readiness: startup phases completed.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// What recovery found and reset at startup.
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery
    }

    // ── Bridge contract ─────────────────────────────────────────────────

    pub fn submit(&self, opts: CreateJob) -> Result<SubmitOutcome, RuntimeError> {
        if !self.is_ready() {
            return Err(RuntimeError::NotReady);
        }
        self.scheduler.submit(opts)
    }

    pub fn job(&self, id: &JobId) -> Result<Option<Job>, RuntimeError> {
        self.scheduler.job(id)
    }

    pub fn cancel(&self, id: &JobId, reason: &str) -> Result<(), RuntimeError> {
        self.scheduler.cancel_job(id, reason)
    }

    pub fn approve(&self, id: &JobId, nonce: &str) -> Result<(), RuntimeError> {
        self.approval.approve(id, nonce)
    }

    pub fn reject(&self, id: &JobId, nonce: &str, reason: &str) -> Result<(), RuntimeError> {
        self.approval.reject(id, nonce, reason)
    }

    pub fn bus(&self) -> &MessageBus<SystemClock> {
        &self.bus
    }

    pub fn registry(&self) -> &StoreBackedRegistry<SystemClock> {
        &self.registry
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    // ── Shutdown ────────────────────────────────────────────────────────

    /// Ordered shutdown. Idempotent; restart via a fresh [`Runtime::start`]
    /// is permitted afterwards.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("runtime shutting down");

        // Stop intake, then trip every in-flight token.
        self.ready.store(false, Ordering::SeqCst);
        self.shutdown_token.cancel();

        // Give workers the grace period to settle.
        let pool = self.workers.lock().take();
        if let Some(pool) = pool {
            pool.join(SHUTDOWN_GRACE).await;
        }

        // Tear down any sandbox that survived its token.
        self.host.kill_all();

        // Deregister handlers.
        for gear in self.registry.gear_ids() {
            self.bus.unregister(&ComponentId::Gear(gear));
        }
        for id in [
            ComponentId::Validator,
            ComponentId::Planner,
            ComponentId::Journal,
            ComponentId::Bridge,
        ] {
            self.bus.unregister(&id);
        }

        if let Some(task) = self.maintenance.lock().take() {
            task.abort();
        }

        // Release the instance lock last; key material in the sandbox
        // host zeroed when its invocations tore down.
        let _ = self.lock_file.unlock();
        let _ = std::fs::remove_file(&self.lock_path);
        self.live.store(false, Ordering::SeqCst);
        tracing::info!("runtime shutdown complete");
    }
}

/// Config-file overrides merged with stored sentinel overrides; the
/// stored copy wins on conflicts because it reflects the operator's most
/// recent decision.
fn merged_overrides(
    config: &RuntimeConfig,
    store: &Store,
) -> Result<Vec<meridian_core::UserPolicy>, RuntimeError> {
    let mut merged: Vec<meridian_core::UserPolicy> = config.user_policies.clone();
    for stored in store.sentinel().load_policies()? {
        merged.retain(|p| p.action_type != stored.action_type);
        merged.push(stored);
    }
    Ok(merged)
}

fn clock_now(clock: &SystemClock) -> i64 {
    use meridian_core::Clock;
    clock.epoch_ms()
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;

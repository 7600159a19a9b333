// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for runtime tests.

use crate::approval::ApprovalRouter;
use crate::driver::Driver;
use crate::gears::{BusCommandHandler, SchedulerSubjobSink};
use crate::notify::Notifier;
use crate::registry::StoreBackedRegistry;
use crate::scheduler::Scheduler;
use async_trait::async_trait;
use meridian_bus::{BusError, Handler, MessageBus};
use meridian_core::{
    ComponentId, ErrorKind, ExecutionPlan, FakeClock, JobId, Message, MessageBody, RuntimeConfig,
    SandboxMode, Tier,
};
use meridian_policy::{PolicyConfig, PolicyEngine};
use meridian_sandbox::{SandboxDeps, SandboxHost};
use meridian_storage::Store;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything a driver test needs, wired over a temp store.
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub clock: FakeClock,
    pub store: Arc<Store>,
    pub scheduler: Arc<Scheduler<FakeClock>>,
    pub bus: Arc<MessageBus<FakeClock>>,
    pub registry: Arc<StoreBackedRegistry<FakeClock>>,
    pub driver: Arc<Driver<FakeClock>>,
    pub approval: Arc<ApprovalRouter<FakeClock>>,
    pub notifications: Arc<RecordingNotifier>,
    pub shutdown: CancellationToken,
}

pub fn test_config() -> RuntimeConfig {
    RuntimeConfig {
        workers: 1,
        dedup_window_ms: 60_000,
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

pub fn fixture() -> Fixture {
    fixture_with_config(test_config())
}

pub fn fixture_with_config(config: RuntimeConfig) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let store = Arc::new(Store::open(dir.path(), config.tier, 1_000_000).unwrap());
    let shutdown = CancellationToken::new();
    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        config.clone(),
        clock.clone(),
        shutdown.clone(),
    ));
    let bus = Arc::new(MessageBus::new(clock.clone()));
    let registry = Arc::new(StoreBackedRegistry::new(store.clone(), clock.clone()));
    let engine = Arc::new(PolicyEngine::new(PolicyConfig {
        workspace_root: config.workspace_path.clone(),
        allowlisted_domains: config.allowlisted_domains.clone(),
        max_transaction_amount_usd: config.max_transaction_amount_usd,
        overrides: config.user_policies.clone(),
    }));
    let host = Arc::new(SandboxHost::new(
        SandboxDeps {
            registry: registry.clone(),
            vault: Arc::new(crate::gears::DenyAllVault),
            subjobs: Arc::new(SchedulerSubjobSink::new(scheduler.clone())),
            commands: Arc::new(BusCommandHandler::new(bus.clone())),
        },
        clock.clone(),
        config.sandbox_mode,
    ));
    let notifications = Arc::new(RecordingNotifier::default());
    let approval = Arc::new(ApprovalRouter::new(
        scheduler.clone(),
        bus.clone(),
        notifications.clone(),
    ));
    let driver = Arc::new(Driver {
        scheduler: scheduler.clone(),
        bus: bus.clone(),
        engine,
        host,
        registry: registry.clone(),
        approval: approval.clone(),
        notifier: notifications.clone(),
    });
    Fixture {
        dir,
        clock,
        store,
        scheduler,
        bus,
        registry,
        driver,
        approval,
        notifications,
        shutdown,
    }
}

/// Notifier that records what the operator would have seen.
#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<(String, String)>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, title: &str, message: &str) {
        self.messages.lock().push((title.to_string(), message.to_string()));
    }
}

/// A planner that produces plans from a scripted closure.
pub struct ScriptedPlanner {
    #[allow(clippy::type_complexity)]
    pub build: Box<dyn Fn(&JobId) -> ExecutionPlan + Send + Sync>,
}

impl ScriptedPlanner {
    pub fn new(build: impl Fn(&JobId) -> ExecutionPlan + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self { build: Box::new(build) })
    }
}

#[async_trait]
impl Handler for ScriptedPlanner {
    async fn handle(&self, message: Message) -> Result<Message, BusError> {
        let MessageBody::PlanRequest { job_id, .. } = &message.body else {
            return Err(BusError::handler(ErrorKind::Validation, "not a plan request"));
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

/// A planner that always fails with the given error kind.
pub struct FailingPlanner {
    pub kind: ErrorKind,
}

#[async_trait]
impl Handler for FailingPlanner {
    async fn handle(&self, _message: Message) -> Result<Message, BusError> {
        Err(BusError::handler(self.kind, "planner unavailable"))
    }
}


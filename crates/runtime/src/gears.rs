// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bus-facing gear plumbing: the `gear:<id>` handler, the sub-job sink,
//! and host-side servicing of child `command` messages.

use crate::scheduler::Scheduler;
use async_trait::async_trait;
use meridian_bus::{BusError, Handler, MessageBus};
use meridian_core::{
    Clock, ComponentId, CreateJob, ErrorKind, GearId, JobSource, Kinded, Message, MessageBody,
    Priority, SandboxMode,
};
use meridian_sandbox::{CommandHandler, KeyMaterial, SandboxError, SandboxHost, SubjobSink};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Bus handler serving every `gear:<id>` address through the sandbox
/// host. Replies carry a signature over the canonical result encoding
/// under a host-lifetime key so non-host consumers can verify provenance.
pub struct GearBusHandler<C: Clock> {
    host: Arc<SandboxHost<C>>,
    clock: C,
    bus_key: KeyMaterial,
}

impl<C: Clock> GearBusHandler<C> {
    pub fn new(host: Arc<SandboxHost<C>>, clock: C) -> Self {
        Self { host, clock, bus_key: KeyMaterial::generate(SandboxMode::V1) }
    }

    /// Verify the signature this handler attached to a reply.
    pub fn verify_reply(&self, message: &Message) -> bool {
        let Some(signature) = message.signature.as_deref() else {
            return false;
        };
        let Ok(payload) = serde_json::to_vec(&message.body) else {
            return false;
        };
        self.bus_key.verify(&payload, signature)
    }
}

#[async_trait]
impl<C: Clock + 'static> Handler for GearBusHandler<C> {
    async fn handle(&self, message: Message) -> Result<Message, BusError> {
        let ComponentId::Gear(gear) = message.to.clone() else {
            return Err(BusError::handler(ErrorKind::Validation, "not a gear address"));
        };
        let MessageBody::GearInvoke { action, parameters } = message.body.clone() else {
            return Err(BusError::handler(
                ErrorKind::Validation,
                format!("gear handler cannot service {}", message.body.tag()),
            ));
        };

        let cancel = CancellationToken::new();
        let tagged = self
            .host
            .invoke(&gear, &action, parameters, &cancel)
            .await
            .map_err(|e| BusError::handler(e.kind(), e.to_string()))?;

        let body = MessageBody::GearResult {
            result: serde_json::to_value(&tagged)
                .map_err(|e| BusError::handler(ErrorKind::Internal, e.to_string()))?,
        };
        let signature = serde_json::to_vec(&body)
            .map(|payload| self.bus_key.sign(&payload))
            .ok();

        Ok(Message {
            id: Uuid::new_v4().to_string(),
            correlation_id: message.correlation_id,
            timestamp: self.clock.epoch_ms(),
            from: ComponentId::Gear(gear),
            to: message.from,
            body,
            job_id: message.job_id,
            signature,
        })
    }
}

/// Sub-job requests from gears become real jobs with the parent recorded.
pub struct SchedulerSubjobSink<C: Clock> {
    scheduler: Arc<Scheduler<C>>,
}

impl<C: Clock> SchedulerSubjobSink<C> {
    pub fn new(scheduler: Arc<Scheduler<C>>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl<C: Clock + 'static> SubjobSink for SchedulerSubjobSink<C> {
    async fn submit(&self, parent: &GearId, content: String, metadata: Map<String, Value>) {
        let opts = CreateJob::new(format!("gear:{parent}"), content)
            .source(JobSource::SubJob)
            .priority(Priority::Normal)
            .metadata(metadata.into_iter().collect());
        match self.scheduler.submit(opts) {
            Ok(outcome) => {
                tracing::info!(parent = %parent, job_id = %outcome.job.id, "sub-job created");
            }
            Err(e) => {
                tracing::warn!(parent = %parent, error = %e, "sub-job creation failed");
            }
        }
    }
}

/// Services `command` messages from children by routing them over the
/// bus. Only journal traffic is recognized; the host bounds every call.
pub struct BusCommandHandler<C: Clock> {
    bus: Arc<MessageBus<C>>,
}

impl<C: Clock> BusCommandHandler<C> {
    pub fn new(bus: Arc<MessageBus<C>>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl<C: Clock + 'static> CommandHandler for BusCommandHandler<C> {
    async fn run(
        &self,
        gear: &GearId,
        command: &str,
        parameters: Map<String, Value>,
    ) -> Result<Value, SandboxError> {
        let body = match command {
            "journal.query" => MessageBody::JournalQuery {
                text: parameters
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                filters: parameters
                    .get("filters")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default(),
            },
            "journal.store" => MessageBody::JournalStore {
                entry: parameters.get("entry").cloned().unwrap_or(Value::Null),
            },
            other => {
                return Err(SandboxError::Command {
                    command: other.to_string(),
                    message: "unsupported host command".to_string(),
                })
            }
        };

        let response = self
            .bus
            .request(
                ComponentId::Gear(*gear),
                ComponentId::Journal,
                body,
                None,
                &CancellationToken::new(),
            )
            .await
            .map_err(|e| SandboxError::Command {
                command: command.to_string(),
                message: e.to_string(),
            })?;

        match response.body {
            MessageBody::JournalResult { entries } => Ok(Value::Array(entries)),
            MessageBody::Ack => Ok(Value::Null),
            other => Err(SandboxError::Command {
                command: command.to_string(),
                message: format!("unexpected journal reply {}", other.tag()),
            }),
        }
    }
}

/// A vault for deployments with no secret backend: every retrieval is
/// denied, which keeps undeclared credential paths fail-safe.
pub struct DenyAllVault;

impl meridian_sandbox::SecretsVault for DenyAllVault {
    fn retrieve(
        &self,
        name: &str,
        gear: &GearId,
    ) -> Result<zeroize::Zeroizing<Vec<u8>>, SandboxError> {
        Err(SandboxError::SecretDenied { gear: *gear, name: name.to_string() })
    }
}

#[cfg(test)]
#[path = "gears_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `validator` bus component: stateless plan validation on request.
//!
//! The worker pipeline validates plans in-process; this handler exposes
//! the same engine to bus peers (the bridge pre-checks plans before
//! surfacing them, tests probe verdicts without a job).

use async_trait::async_trait;
use meridian_bus::{BusError, Handler};
use meridian_core::{Clock, ComponentId, ErrorKind, Message, MessageBody};
use meridian_policy::{strip_plan, PlanContext, PolicyEngine};
use meridian_sandbox::GearRegistry;
use std::sync::Arc;
use uuid::Uuid;

pub struct ValidatorHandler<C: Clock> {
    engine: Arc<PolicyEngine>,
    registry: Arc<dyn GearRegistry>,
    clock: C,
}

impl<C: Clock> ValidatorHandler<C> {
    pub fn new(engine: Arc<PolicyEngine>, registry: Arc<dyn GearRegistry>, clock: C) -> Self {
        Self { engine, registry, clock }
    }
}

#[async_trait]
impl<C: Clock + 'static> Handler for ValidatorHandler<C> {
    async fn handle(&self, message: Message) -> Result<Message, BusError> {
        let MessageBody::PlanResponse { plan } = &message.body else {
            return Err(BusError::handler(
                ErrorKind::Validation,
                format!("validator cannot service {}", message.body.tag()),
            ));
        };

        let stripped = strip_plan(plan);
        let mut ctx = PlanContext::default();
        for step in &stripped.steps {
            if self.registry.is_disabled(&step.gear) {
                ctx.disabled_gears.insert(step.gear);
            }
            if let Some(manifest) = self.registry.manifest(&step.gear) {
                ctx.manifests.insert(step.gear, manifest);
            }
        }
        let result = self.engine.validate(&stripped, &ctx);

        Ok(Message {
            id: Uuid::new_v4().to_string(),
            correlation_id: message.correlation_id.clone(),
            timestamp: self.clock.epoch_ms(),
            from: ComponentId::Validator,
            to: message.from.clone(),
            body: MessageBody::ValidationCompleted { result },
            job_id: message.job_id,
            signature: None,
        })
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;

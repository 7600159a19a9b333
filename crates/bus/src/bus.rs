// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry and dispatch.

use crate::error::BusError;
use async_trait::async_trait;
use meridian_core::{Clock, ComponentId, JobId, Message, MessageBody};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A registered message recipient. Handlers run in the sender's task; a
/// handler that performs I/O is a suspension point for the caller.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, message: Message) -> Result<Message, BusError>;
}

/// The in-process message bus.
pub struct MessageBus<C: Clock> {
    registry: RwLock<HashMap<ComponentId, Arc<dyn Handler>>>,
    clock: C,
}

impl<C: Clock> MessageBus<C> {
    pub fn new(clock: C) -> Self {
        Self { registry: RwLock::new(HashMap::new()), clock }
    }

    /// Register a handler. One handler per id; re-registration replaces.
    pub fn register(&self, id: ComponentId, handler: Arc<dyn Handler>) {
        let replaced = self.registry.write().insert(id.clone(), handler).is_some();
        if replaced {
            tracing::debug!(component = %id, "replaced bus handler");
        }
    }

    pub fn unregister(&self, id: &ComponentId) {
        self.registry.write().remove(id);
    }

    pub fn is_registered(&self, id: &ComponentId) -> bool {
        self.registry.read().contains_key(id)
    }

    /// Dispatch a fully-formed message to its recipient, observing the
    /// cancellation token. For a fixed `(from, to, correlation_id)` the
    /// request precedes the response because the response is produced by
    /// this very call.
    pub async fn send(
        &self,
        message: Message,
        cancel: &CancellationToken,
    ) -> Result<Message, BusError> {
        let to = message.to.clone();
        let handler = self
            .registry
            .read()
            .get(&to)
            .cloned()
            .ok_or_else(|| BusError::Unregistered(to.clone()))?;

        tracing::trace!(
            from = %message.from,
            to = %to,
            tag = message.body.tag(),
            correlation_id = %message.correlation_id,
            "bus send"
        );

        tokio::select! {
            _ = cancel.cancelled() => Err(BusError::Cancelled(to)),
            result = handler.handle(message) => result,
        }
    }

    /// Build an envelope around `body`, send it, and check the response
    /// correlation. Most callers want this instead of raw [`send`].
    pub async fn request(
        &self,
        from: ComponentId,
        to: ComponentId,
        body: MessageBody,
        job_id: Option<JobId>,
        cancel: &CancellationToken,
    ) -> Result<Message, BusError> {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        let message = Message {
            id: uuid::Uuid::new_v4().to_string(),
            correlation_id: correlation_id.clone(),
            timestamp: self.clock.epoch_ms(),
            from,
            to,
            body,
            job_id,
            signature: None,
        };
        let response = self.send(message, cancel).await?;
        if response.correlation_id != correlation_id {
            return Err(BusError::CorrelationMismatch {
                expected: correlation_id,
                got: response.correlation_id,
            });
        }
        Ok(response)
    }

    /// Build the response envelope for `request` with `body`, preserving
    /// the correlation id.
    pub fn reply(&self, request: &Message, body: MessageBody) -> Message {
        Message {
            id: uuid::Uuid::new_v4().to_string(),
            correlation_id: request.correlation_id.clone(),
            timestamp: self.clock.epoch_ms(),
            from: request.to.clone(),
            to: request.from.clone(),
            body,
            job_id: request.job_id.clone(),
            signature: None,
        }
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;

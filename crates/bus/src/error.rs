// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bus errors.

use meridian_core::{ComponentId, ErrorKind, Kinded};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("no handler registered for {0}")]
    Unregistered(ComponentId),

    #[error("send to {0} cancelled")]
    Cancelled(ComponentId),

    #[error("response correlation mismatch: expected {expected}, got {got}")]
    CorrelationMismatch { expected: String, got: String },

    /// A handler failed. The kind is preserved so boundaries can route
    /// retry/fail/cancel without string matching.
    #[error("{kind} error from handler: {message}")]
    Handler { kind: ErrorKind, message: String },
}

impl BusError {
    pub fn handler(kind: ErrorKind, message: impl Into<String>) -> Self {
        BusError::Handler { kind, message: message.into() }
    }
}

impl Kinded for BusError {
    fn kind(&self) -> ErrorKind {
        match self {
            BusError::Unregistered(_) => ErrorKind::NotFound,
            BusError::Cancelled(_) => ErrorKind::Cancelled,
            BusError::CorrelationMismatch { .. } => ErrorKind::Internal,
            BusError::Handler { kind, .. } => *kind,
        }
    }
}

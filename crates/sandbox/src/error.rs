// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sandbox errors.

use meridian_core::{ErrorKind, GearId, Kinded};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    /// Entry-file checksum did not match the stored manifest checksum.
    /// Always disables the gear.
    #[error("integrity failure for {gear}: checksum mismatch")]
    Integrity { gear: GearId },

    /// The terminal response's signature failed verification.
    #[error("signature verification failed for {gear}")]
    SignatureInvalid { gear: GearId },

    #[error("gear {gear} produced no terminal response within {timeout_ms}ms")]
    Timeout { gear: GearId, timeout_ms: u64 },

    #[error("sandbox call cancelled")]
    Cancelled,

    #[error("gear {gear} not found in registry")]
    UnknownGear { gear: GearId },

    #[error("gear {gear} is disabled")]
    Disabled { gear: GearId },

    #[error("gear {gear} exited before responding (status {status:?})")]
    ChildExited { gear: GearId, status: Option<i32> },

    #[error("failed to spawn gear {gear}: {source}")]
    SpawnFailed {
        gear: GearId,
        #[source]
        source: std::io::Error,
    },

    #[error("secret {name} denied for gear {gear}")]
    SecretDenied { gear: GearId, name: String },

    #[error("host command {command} failed: {message}")]
    Command { command: String, message: String },

    #[error("the gear reported an error: {message}")]
    GearFailure { message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Kinded for SandboxError {
    fn kind(&self) -> ErrorKind {
        match self {
            SandboxError::Integrity { .. } | SandboxError::SignatureInvalid { .. } => {
                ErrorKind::Integrity
            }
            SandboxError::Timeout { .. } => ErrorKind::Timeout,
            SandboxError::Cancelled => ErrorKind::Cancelled,
            SandboxError::UnknownGear { .. } => ErrorKind::NotFound,
            SandboxError::Disabled { .. } | SandboxError::SecretDenied { .. } => {
                ErrorKind::Auth
            }
            SandboxError::ChildExited { .. }
            | SandboxError::GearFailure { .. }
            | SandboxError::Command { .. } => ErrorKind::Upstream,
            SandboxError::SpawnFailed { .. } | SandboxError::Io(_) => ErrorKind::Internal,
        }
    }
}

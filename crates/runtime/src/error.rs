// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime errors.

use meridian_core::{ErrorKind, JobId, Kinded};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("storage error: {0}")]
    Storage(#[from] meridian_storage::StorageError),

    #[error("bus error: {0}")]
    Bus(#[from] meridian_bus::BusError),

    #[error("sandbox error: {0}")]
    Sandbox(#[from] meridian_sandbox::SandboxError),

    #[error("config error: {0}")]
    Config(#[from] meridian_core::ConfigError),

    #[error("job {0} not found")]
    JobNotFound(JobId),

    #[error("job {job_id} exhausted its revision budget ({limit}); last suggestions: {last_suggestions}")]
    RevisionLimit { job_id: JobId, limit: u32, last_suggestions: String },

    #[error("job {job_id} exhausted its replan budget ({limit})")]
    ReplanLimit { job_id: JobId, limit: u32 },

    #[error("approval nonce invalid or already used for job {0}")]
    InvalidNonce(JobId),

    #[error("planner returned an unusable response: {0}")]
    BadPlan(String),

    #[error("runtime already started")]
    AlreadyStarted,

    #[error("runtime is not ready")]
    NotReady,

    #[error("failed to lock state directory (another instance running?): {0}")]
    LockFailed(std::io::Error),

    #[error("cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Kinded for RuntimeError {
    fn kind(&self) -> ErrorKind {
        match self {
            RuntimeError::Storage(e) => e.kind(),
            RuntimeError::Bus(e) => e.kind(),
            RuntimeError::Sandbox(e) => e.kind(),
            RuntimeError::Config(_) | RuntimeError::BadPlan(_) => ErrorKind::Validation,
            RuntimeError::JobNotFound(_) => ErrorKind::NotFound,
            RuntimeError::InvalidNonce(_) => ErrorKind::Auth,
            RuntimeError::RevisionLimit { .. } | RuntimeError::ReplanLimit { .. } => {
                ErrorKind::Validation
            }
            RuntimeError::Cancelled => ErrorKind::Cancelled,
            RuntimeError::AlreadyStarted
            | RuntimeError::NotReady
            | RuntimeError::LockFailed(_)
            | RuntimeError::Io(_) => ErrorKind::Internal,
        }
    }
}

impl RuntimeError {
    /// User-visible `error` blob for the job row. Internal paths and
    /// secrets never appear here.
    pub fn to_error_blob(&self) -> serde_json::Value {
        serde_json::json!({
            "kind": self.kind().to_string(),
            "message": self.to_string(),
        })
    }
}

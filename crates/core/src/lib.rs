// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! meridian-core: shared domain types for the Meridian agentic task runtime

pub mod macros;

pub mod clock;
pub mod config;
pub mod dedup;
pub mod error;
pub mod gear;
pub mod id;
pub mod job;
pub mod message;
pub mod plan;
pub mod validation;
pub mod worker;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{
    BruteForceConfig, ConfigError, RuntimeConfig, SandboxMode, Tier, UserPolicy, STATE_DIR_ENV,
};
pub use dedup::{compute_dedup_hash, DEFAULT_DEDUP_WINDOW_MS};
pub use error::{ErrorKind, Kinded};
pub use gear::{GearId, GearManifest, GearOrigin, GearPermissions, GearResources};
#[cfg(any(test, feature = "test-support"))]
pub use gear::GearManifestBuilder;
pub use id::{short, IdBuf};
#[cfg(any(test, feature = "test-support"))]
pub use job::JobBuilder;
pub use job::{
    transition_allowed, CreateJob, Job, JobId, JobSource, JobStatus, Priority,
    DEFAULT_MAX_ATTEMPTS,
};
pub use message::{ComponentId, Message, MessageBody};
#[cfg(any(test, feature = "test-support"))]
pub use plan::ExecutionStepBuilder;
pub use plan::{ExecutionPlan, ExecutionStep, PlanId, RiskLevel, StepId};
pub use validation::{
    ActionType, CompositeRisk, StepVerdict, ValidationResult, Verdict,
};
pub use worker::WorkerId;

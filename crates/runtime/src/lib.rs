// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! meridian-runtime: the control plane.
//!
//! Ties storage, policy, sandbox, and bus together: a worker pool drives
//! each job through planning, validation, approval routing, and sandboxed
//! execution, with crash recovery and ordered startup/shutdown around it.

#[cfg(test)]
mod test_support;

pub mod approval;
pub mod driver;
pub mod error;
pub mod gears;
pub mod lifecycle;
pub mod notify;
pub mod registry;
pub mod scheduler;
pub mod validator;
pub mod worker;

pub use approval::ApprovalRouter;
pub use driver::Driver;
pub use error::RuntimeError;
pub use gears::{BusCommandHandler, DenyAllVault, GearBusHandler, SchedulerSubjobSink};
pub use lifecycle::{Runtime, RuntimeDeps, SHUTDOWN_GRACE};
pub use notify::{DesktopNotifier, Notifier, NullNotifier};
pub use registry::StoreBackedRegistry;
pub use scheduler::{Scheduler, SubmitOutcome};
pub use validator::ValidatorHandler;
pub use worker::WorkerPool;

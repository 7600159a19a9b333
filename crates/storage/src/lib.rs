// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! meridian-storage: embedded durable state for the Meridian runtime.
//!
//! SQLite in WAL mode with per-database write serialization. Logical
//! databases: `meridian` (jobs, nonces, sessions, gear state), `sentinel`
//! (approval cache, policy overrides), and monthly `audit-YYYY-MM`
//! partitions.

pub mod audit;
pub mod auth;
pub mod db;
pub mod error;
pub mod jobs;
pub mod maintenance;
pub mod migrations;
pub mod nonces;
pub mod sentinel;
pub mod sessions;
pub mod store;

pub use audit::{month_of, AuditEntry, AuditEvent, AuditLog, ChainStatus, GENESIS_HASH};
pub use auth::AuthGuard;
pub use db::{Database, RunResult};
pub use error::StorageError;
pub use jobs::{CreateOutcome, JobStore, RecoveryReport};
pub use maintenance::{prune, PruneReport};
pub use nonces::{ApprovalNonce, NonceStore, DEFAULT_NONCE_TTL_MS};
pub use sentinel::{SentinelStore, DEFAULT_APPROVAL_CACHE_TTL_MS};
pub use sessions::{Session, SessionStore};
pub use store::{data_dir, Store};

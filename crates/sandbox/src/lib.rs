// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! meridian-sandbox: integrity-checked tool execution.
//!
//! Each action runs in its own child process with a restricted
//! environment. The IPC is newline-delimited JSON signed with
//! per-invocation key material (HMAC-SHA256 in v1 mode, ephemeral Ed25519
//! in v2); results are provenance-tagged before anything downstream sees
//! them.

pub mod codec;
pub mod error;
pub mod host;
pub mod integrity;
pub mod keys;
pub mod provenance;
pub mod traits;

pub use codec::{
    encode_line, parse_line, read_wire_line, signing_payload, GearMessage, WireLine,
    HOST_COMMAND_TIMEOUT_MS, KILL_GRACE_MS, MAX_LINE_BYTES,
};
pub use error::SandboxError;
pub use host::{SandboxDeps, SandboxHost};
pub use integrity::{file_checksum, verify_checksum};
pub use keys::KeyMaterial;
pub use provenance::{ProvenanceTag, TaggedResult};
pub use traits::{CommandHandler, GearRegistry, SecretsVault, SubjobSink};

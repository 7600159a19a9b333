// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Collaborator traits the host depends on.

use crate::error::SandboxError;
use async_trait::async_trait;
use meridian_core::{GearId, GearManifest};
use serde_json::{Map, Value};
use zeroize::Zeroizing;

/// The gear registry: manifests, stored checksums, and disablement.
pub trait GearRegistry: Send + Sync {
    fn manifest(&self, gear: &GearId) -> Option<GearManifest>;

    /// The checksum recorded at install time, authoritative for the
    /// integrity gate.
    fn stored_checksum(&self, gear: &GearId) -> Option<String>;

    fn is_disabled(&self, gear: &GearId) -> bool;

    /// Take a gear out of rotation. Integrity failures call this before
    /// the step fails.
    fn disable(&self, gear: &GearId, reason: &str);
}

/// The secrets vault. Buffers zero themselves when dropped; the host drops
/// them as soon as the handshake line is written.
pub trait SecretsVault: Send + Sync {
    /// ACL-gated retrieval: the gear must declare the secret in its
    /// manifest for the call to succeed.
    fn retrieve(&self, name: &str, gear: &GearId) -> Result<Zeroizing<Vec<u8>>, SandboxError>;
}

/// Sink for child-initiated sub-job requests (fire-and-forget).
#[async_trait]
pub trait SubjobSink: Send + Sync {
    async fn submit(&self, parent: &GearId, content: String, metadata: Map<String, Value>);
}

/// Services `command` messages a child sends while an action runs. The
/// host bounds each call; implementations must not block indefinitely.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn run(
        &self,
        gear: &GearId,
        command: &str,
        parameters: Map<String, Value>,
    ) -> Result<Value, SandboxError>;
}

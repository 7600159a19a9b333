// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gear manifests: the signed description of a sandboxed tool plug-in.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

crate::define_id! {
    /// Unique identifier for a gear (a sandboxed tool plug-in).
    pub struct GearId("gear-");
}

/// Where a gear came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GearOrigin {
    Builtin,
    Local,
    Marketplace,
}

crate::string_enum! {
    GearOrigin {
        Builtin => "builtin",
        Local => "local",
        Marketplace => "marketplace",
    }
}

/// Capabilities a gear declares up front. Anything not declared is denied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GearPermissions {
    /// Filesystem paths the gear may touch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fs: Vec<PathBuf>,
    /// Network hosts the gear may reach.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub net: Vec<String>,
    /// Secret names the gear may request from the vault.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<String>,
    /// Whether the gear may run shell commands.
    #[serde(default)]
    pub shell: bool,
    /// Environment variables passed through to the child process.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
}

/// Resource limits applied to the gear's child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GearResources {
    pub mem_mb: u32,
    pub cpu_pct: u32,
    pub timeout_ms: u64,
}

/// Sandbox call timeout when the manifest does not set one.
pub const DEFAULT_GEAR_TIMEOUT_MS: u64 = 30_000;

impl Default for GearResources {
    fn default() -> Self {
        Self { mem_mb: 256, cpu_pct: 50, timeout_ms: DEFAULT_GEAR_TIMEOUT_MS }
    }
}

/// Manifest describing a gear: identity, integrity checksum, the actions it
/// exposes, and the permissions and resources it is granted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GearManifest {
    pub id: GearId,
    pub version: String,
    /// SHA-256 of the gear's entry file, hex-encoded. Recomputed before
    /// every spawn; a mismatch disables the gear.
    pub checksum: String,
    /// Path to the executable entry point.
    pub entry: PathBuf,
    pub actions: Vec<String>,
    #[serde(default)]
    pub permissions: GearPermissions,
    #[serde(default)]
    pub resources: GearResources,
    pub origin: GearOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl GearManifest {
    /// The effective sandbox-call timeout for this gear.
    pub fn timeout_ms(&self) -> u64 {
        if self.resources.timeout_ms == 0 {
            DEFAULT_GEAR_TIMEOUT_MS
        } else {
            self.resources.timeout_ms
        }
    }

    /// Whether the manifest declares the named credential.
    pub fn declares_secret(&self, name: &str) -> bool {
        self.permissions.secrets.iter().any(|s| s == name)
    }
}

crate::test_builder! {
    pub struct GearManifestBuilder => GearManifest {
        into {
            id: GearId = "gear-files",
            version: String = "1.0.0",
            checksum: String = "",
            entry: PathBuf = "/opt/gears/files/main",
        }
        set {
            actions: Vec<String> = vec!["read".to_string(), "write".to_string()],
            permissions: GearPermissions = GearPermissions::default(),
            resources: GearResources = GearResources::default(),
            origin: GearOrigin = GearOrigin::Builtin,
        }
        option {
            signature: String = None,
        }
    }
}

#[cfg(test)]
#[path = "gear_tests.rs"]
mod tests;

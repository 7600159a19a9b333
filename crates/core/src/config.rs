// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime configuration.
//!
//! Loaded once at startup from a TOML file; everything has a default so an
//! empty file is a valid configuration. The only environment variable the
//! system reads is `MERIDIAN_STATE_DIR`, which overrides the storage data
//! directory.

use crate::dedup::DEFAULT_DEDUP_WINDOW_MS;
use crate::validation::{ActionType, Verdict};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable overriding the storage data directory.
pub const STATE_DIR_ENV: &str = "MERIDIAN_STATE_DIR";

/// Storage sizing hint for the host class the runtime is deployed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Pi,
    Desktop,
    Vps,
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Desktop
    }
}

crate::string_enum! {
    Tier {
        Pi => "pi",
        Desktop => "desktop",
        Vps => "vps",
    }
}

/// Sandbox IPC signing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxMode {
    /// Per-process HMAC-SHA256 key.
    V1,
    /// Ephemeral Ed25519 keypair per action.
    V2,
}

impl Default for SandboxMode {
    fn default() -> Self {
        SandboxMode::V2
    }
}

crate::string_enum! {
    SandboxMode {
        V1 => "v1",
        V2 => "v2",
    }
}

/// A stored per-action override. Applied only when stricter than the
/// default verdict; hard-floor actions ignore it entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPolicy {
    pub action_type: ActionType,
    pub verdict: Verdict,
}

/// Brute-force lockout thresholds for the bridge's auth collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BruteForceConfig {
    pub threshold: u32,
    pub lockout_attempts: u32,
}

impl Default for BruteForceConfig {
    fn default() -> Self {
        Self { threshold: 5, lockout_attempts: 10 }
    }
}

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_MAX_REVISION_COUNT: u32 = 3;
pub const DEFAULT_MAX_REPLAN: u32 = 2;
pub const DEFAULT_SESSION_DURATION_MS: i64 = 86_400_000;

/// Top-level runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Worker-pool size.
    pub workers: usize,
    /// Dedup hash window quantum in milliseconds.
    pub dedup_window_ms: i64,
    /// Revision round bound before a job fails.
    pub max_revision_count: u32,
    /// Re-plan bound before a job fails.
    pub max_replan: u32,
    /// Filesystem allowlist root; must be absolute.
    pub workspace_path: PathBuf,
    /// Hosts allowed for network_get (exact or `*.domain`).
    pub allowlisted_domains: Vec<String>,
    /// Hard cap for financial_transaction amounts; above it the step is
    /// rejected outright.
    pub max_transaction_amount_usd: Option<f64>,
    /// Stricter-only per-action overrides.
    pub user_policies: Vec<UserPolicy>,
    pub sandbox_mode: SandboxMode,
    pub session_duration_ms: i64,
    pub brute_force: BruteForceConfig,
    pub tier: Tier,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            dedup_window_ms: DEFAULT_DEDUP_WINDOW_MS,
            max_revision_count: DEFAULT_MAX_REVISION_COUNT,
            max_replan: DEFAULT_MAX_REPLAN,
            workspace_path: PathBuf::from("/var/lib/meridian/workspace"),
            allowlisted_domains: Vec::new(),
            max_transaction_amount_usd: None,
            user_policies: Vec::new(),
            sandbox_mode: SandboxMode::default(),
            session_duration_ms: DEFAULT_SESSION_DURATION_MS,
            brute_force: BruteForceConfig::default(),
            tier: Tier::default(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("workspace_path must be absolute: {0}")]
    RelativeWorkspace(PathBuf),

    #[error("workers must be at least 1")]
    NoWorkers,
}

impl RuntimeConfig {
    /// Parse a TOML document and validate it.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::Read { path: path.to_path_buf(), source: e }),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.workspace_path.is_absolute() {
            return Err(ConfigError::RelativeWorkspace(self.workspace_path.clone()));
        }
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

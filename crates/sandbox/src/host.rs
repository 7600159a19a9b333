// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The sandbox host: one integrity-checked child process per action
//! invocation, speaking signed newline-delimited JSON over stdio.

use crate::codec::{
    encode_line, parse_line, read_wire_line, signing_payload, GearMessage, WireLine,
    HOST_COMMAND_TIMEOUT_MS, KILL_GRACE_MS,
};
use crate::error::SandboxError;
use crate::integrity::verify_checksum;
use crate::keys::KeyMaterial;
use crate::provenance::TaggedResult;
use crate::traits::{CommandHandler, GearRegistry, SecretsVault, SubjobSink};
use meridian_core::{Clock, GearId, GearManifest, SandboxMode};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

/// Collaborators the host is constructed with.
pub struct SandboxDeps {
    pub registry: Arc<dyn GearRegistry>,
    pub vault: Arc<dyn SecretsVault>,
    pub subjobs: Arc<dyn SubjobSink>,
    pub commands: Arc<dyn CommandHandler>,
}

/// In-memory record of a live sandbox, keyed by correlation id.
#[derive(Debug, Clone)]
struct ActiveSandbox {
    gear: GearId,
    pid: Option<u32>,
}

/// The sandboxed tool-execution host.
pub struct SandboxHost<C: Clock> {
    registry: Arc<dyn GearRegistry>,
    vault: Arc<dyn SecretsVault>,
    subjobs: Arc<dyn SubjobSink>,
    commands: Arc<dyn CommandHandler>,
    clock: C,
    mode: SandboxMode,
    active: Mutex<HashMap<String, ActiveSandbox>>,
}

impl<C: Clock> SandboxHost<C> {
    pub fn new(deps: SandboxDeps, clock: C, mode: SandboxMode) -> Self {
        Self {
            registry: deps.registry,
            vault: deps.vault,
            subjobs: deps.subjobs,
            commands: deps.commands,
            clock,
            mode,
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn mode(&self) -> SandboxMode {
        self.mode
    }

    /// Number of currently live sandboxes.
    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Run one action in a fresh sandbox.
    ///
    /// Integrity check → key material → restricted spawn → signed IPC →
    /// verified terminal response → provenance wrap → teardown. The
    /// cancellation token and the manifest timeout both trigger the
    /// SIGTERM/grace/SIGKILL sequence.
    pub async fn invoke(
        &self,
        gear: &GearId,
        action: &str,
        parameters: Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<TaggedResult, SandboxError> {
        if self.registry.is_disabled(gear) {
            return Err(SandboxError::Disabled { gear: *gear });
        }
        let manifest = self
            .registry
            .manifest(gear)
            .ok_or(SandboxError::UnknownGear { gear: *gear })?;

        // Phase 1: integrity. A mismatch disables the gear before failing.
        let stored = self
            .registry
            .stored_checksum(gear)
            .unwrap_or_else(|| manifest.checksum.clone());
        if let Err(e) = verify_checksum(gear, &manifest.entry, &stored) {
            if matches!(e, SandboxError::Integrity { .. }) {
                self.registry.disable(gear, "entry checksum mismatch");
            }
            return Err(e);
        }

        // Phase 2: per-invocation key material.
        let keys = KeyMaterial::generate(self.mode);

        // Phase 3: spawn with a restricted environment.
        let mut child = spawn_child(&manifest).map_err(|source| SandboxError::SpawnFailed {
            gear: *gear,
            source,
        })?;
        let correlation_id = uuid::Uuid::new_v4().to_string();
        self.active.lock().insert(
            correlation_id.clone(),
            ActiveSandbox { gear: *gear, pid: child.id() },
        );
        tracing::info!(gear = %gear, action, correlation_id, pid = ?child.id(), "sandbox spawned");

        let timeout_ms = manifest.timeout_ms();
        let outcome = self
            .converse(&manifest, &mut child, &keys, gear, action, parameters, &correlation_id, timeout_ms, cancel)
            .await;

        // Phase 9: destroy. Pipes close, the child is reaped, and the key
        // material zeroes itself when `keys` drops.
        destroy_child(&mut child).await;
        self.active.lock().remove(&correlation_id);
        tracing::debug!(gear = %gear, correlation_id, "sandbox destroyed");

        // A forged or missing response signature is an integrity incident,
        // and integrity incidents take the gear out of rotation.
        if matches!(outcome, Err(SandboxError::SignatureInvalid { .. })) {
            self.registry.disable(gear, "response signature verification failed");
        }

        let result = outcome?;
        Ok(TaggedResult::new(gear, action, &correlation_id, self.clock.epoch_ms(), result))
    }

    /// Kill every live sandbox (shutdown path).
    pub fn kill_all(&self) {
        let active = self.active.lock();
        for (correlation_id, sandbox) in active.iter() {
            tracing::warn!(gear = %sandbox.gear, correlation_id, "killing sandbox on shutdown");
            if let Some(pid) = sandbox.pid {
                signal_pid(pid, nix::sys::signal::Signal::SIGKILL);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn converse(
        &self,
        manifest: &GearManifest,
        child: &mut Child,
        keys: &KeyMaterial,
        gear: &GearId,
        action: &str,
        parameters: Map<String, Value>,
        correlation_id: &str,
        timeout_ms: u64,
        cancel: &CancellationToken,
    ) -> Result<Value, SandboxError> {
        let mut stdin = child.stdin.take().ok_or_else(|| {
            SandboxError::SpawnFailed {
                gear: *gear,
                source: std::io::Error::other("child stdin unavailable"),
            }
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            SandboxError::SpawnFailed {
                gear: *gear,
                source: std::io::Error::other("child stdout unavailable"),
            }
        })?;

        // Child stderr feeds the daemon log, never the result. It gets
        // the same line bound as stdout.
        if let Some(stderr) = child.stderr.take() {
            let gear_for_log = *gear;
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr);
                let mut buf = Vec::new();
                loop {
                    match read_wire_line(&mut reader, &mut buf).await {
                        Ok(WireLine::Line(line)) => {
                            tracing::debug!(gear = %gear_for_log, line, "gear stderr");
                        }
                        Ok(WireLine::Oversized) => {
                            tracing::debug!(gear = %gear_for_log, "dropped oversized stderr line");
                        }
                        Ok(WireLine::Eof) | Err(_) => break,
                    }
                }
            });
        }

        // Secrets are fetched ACL-gated, handed over in the handshake, and
        // the plaintext buffers are zeroed as soon as the line is written.
        let mut secrets = Map::new();
        for name in &manifest.permissions.secrets {
            let bytes = self.vault.retrieve(name, gear)?;
            secrets.insert(name.clone(), Value::String(hex::encode(bytes.as_slice())));
        }

        let conversation = drive_conversation(ConversationCtx {
            gear,
            action,
            correlation_id,
            keys,
            parameters,
            secrets,
            subjobs: &self.subjobs,
            commands: &self.commands,
            timeout_ms,
            cancel,
        }, BufReader::new(stdout), &mut stdin);

        let result = conversation.await;

        if matches!(result, Err(SandboxError::Timeout { .. }) | Err(SandboxError::Cancelled)) {
            graceful_kill(child).await;
        }
        result
    }
}

fn spawn_child(manifest: &GearManifest) -> std::io::Result<Child> {
    let mut command = Command::new(&manifest.entry);
    command
        .env_clear()
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Only declared environment variables pass through.
    for key in &manifest.permissions.env {
        if let Ok(value) = std::env::var(key) {
            command.env(key, value);
        }
    }
    command.spawn()
}

struct ConversationCtx<'a> {
    gear: &'a GearId,
    action: &'a str,
    correlation_id: &'a str,
    keys: &'a KeyMaterial,
    parameters: Map<String, Value>,
    secrets: Map<String, Value>,
    subjobs: &'a Arc<dyn SubjobSink>,
    commands: &'a Arc<dyn CommandHandler>,
    timeout_ms: u64,
    cancel: &'a CancellationToken,
}

/// Run the wire conversation: handshake, signed request, then demux child
/// messages until the matching terminal response, the deadline, or the
/// cancellation token settles the call.
async fn drive_conversation<R, W>(
    ctx: ConversationCtx<'_>,
    mut reader: BufReader<R>,
    writer: &mut W,
) -> Result<Value, SandboxError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let gear = *ctx.gear;

    // Handshake first: mode, signing secret, injected secrets. The encoded
    // line zeroes itself after the write.
    let handshake = Zeroizing::new(
        encode_line(&GearMessage::Handshake {
            mode: ctx.keys.mode().to_string(),
            key: ctx.keys.handshake_secret().to_string(),
            secrets: ctx.secrets,
        })
        .map_err(|e| SandboxError::GearFailure { message: e.to_string() })?,
    );
    writer.write_all(handshake.as_bytes()).await?;

    // The request, signed over its canonical encoding.
    let mut request = GearMessage::Request {
        correlation_id: ctx.correlation_id.to_string(),
        action: ctx.action.to_string(),
        parameters: ctx.parameters,
        signature: None,
    };
    let payload = signing_payload(&request)
        .map_err(|e| SandboxError::GearFailure { message: e.to_string() })?;
    let signature = ctx.keys.sign(&payload);
    if let GearMessage::Request { signature: ref mut slot, .. } = request {
        *slot = Some(signature);
    }
    let line = encode_line(&request)
        .map_err(|e| SandboxError::GearFailure { message: e.to_string() })?;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;

    let deadline = tokio::time::Instant::now() + Duration::from_millis(ctx.timeout_ms);
    let mut line_buf = Vec::new();

    loop {
        let wire = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(SandboxError::Cancelled),
            _ = tokio::time::sleep_until(deadline) => {
                return Err(SandboxError::Timeout { gear, timeout_ms: ctx.timeout_ms })
            }
            wire = read_wire_line(&mut reader, &mut line_buf) => wire?,
        };
        let line = match wire {
            // EOF: the child exited without a terminal response.
            WireLine::Eof => return Err(SandboxError::ChildExited { gear, status: None }),
            WireLine::Oversized => {
                tracing::warn!(gear = %gear, "discarding over-length gear output line");
                continue;
            }
            WireLine::Line(line) => line,
        };

        let Some(message) = parse_line(&line) else {
            tracing::warn!(gear = %gear, bytes = line.len(), "discarding unparseable gear output");
            continue;
        };

        match message {
            GearMessage::Response { ref correlation_id, .. }
                if correlation_id.as_str() != ctx.correlation_id =>
            {
                tracing::warn!(
                    gear = %gear,
                    got = %correlation_id,
                    "discarding response with foreign correlation id"
                );
            }
            GearMessage::Response { result, error, signature, .. } => {
                // Only a correctly signed terminal response settles the
                // call. Recompute the payload without the signature field.
                let unsigned = GearMessage::Response {
                    correlation_id: ctx.correlation_id.to_string(),
                    result: result.clone(),
                    error: error.clone(),
                    signature: None,
                };
                let payload = signing_payload(&unsigned)
                    .map_err(|e| SandboxError::GearFailure { message: e.to_string() })?;
                let valid = signature
                    .as_deref()
                    .map(|sig| ctx.keys.verify(&payload, sig))
                    .unwrap_or(false);
                if !valid {
                    return Err(SandboxError::SignatureInvalid { gear });
                }
                if let Some(message) = error {
                    return Err(SandboxError::GearFailure { message });
                }
                return Ok(result.unwrap_or(Value::Null));
            }
            GearMessage::Progress { message, percent, .. } => {
                tracing::info!(gear = %gear, message = ?message, percent = ?percent, "gear progress");
            }
            GearMessage::Log { level, message } => match level.as_str() {
                "error" => tracing::error!(gear = %gear, message, "gear log"),
                "warn" => tracing::warn!(gear = %gear, message, "gear log"),
                _ => tracing::debug!(gear = %gear, message, "gear log"),
            },
            GearMessage::Subjob { content, metadata } => {
                ctx.subjobs.submit(&gear, content, metadata).await;
            }
            GearMessage::Command { request_id, command, parameters } => {
                // The host side of a child command is bounded; a stuck
                // handler answers with an error instead of wedging the
                // conversation.
                let outcome = tokio::time::timeout(
                    Duration::from_millis(HOST_COMMAND_TIMEOUT_MS),
                    ctx.commands.run(&gear, &command, parameters),
                )
                .await;
                let reply = match outcome {
                    Ok(Ok(result)) => GearMessage::CommandResponse {
                        request_id,
                        result: Some(result),
                        error: None,
                    },
                    Ok(Err(e)) => GearMessage::CommandResponse {
                        request_id,
                        result: None,
                        error: Some(e.to_string()),
                    },
                    Err(_) => GearMessage::CommandResponse {
                        request_id,
                        result: None,
                        error: Some("host command timed out".to_string()),
                    },
                };
                let line = encode_line(&reply)
                    .map_err(|e| SandboxError::GearFailure { message: e.to_string() })?;
                writer.write_all(line.as_bytes()).await?;
                writer.flush().await?;
            }
            GearMessage::Handshake { .. }
            | GearMessage::Request { .. }
            | GearMessage::CommandResponse { .. } => {
                tracing::warn!(gear = %gear, tag = message.tag(), "discarding unexpected gear message");
            }
        }
    }
}

/// SIGTERM, wait out the grace period, then SIGKILL.
async fn graceful_kill(child: &mut Child) {
    if let Some(pid) = child.id() {
        signal_pid(pid, nix::sys::signal::Signal::SIGTERM);
        if tokio::time::timeout(Duration::from_millis(KILL_GRACE_MS), child.wait())
            .await
            .is_ok()
        {
            return;
        }
        tracing::warn!(pid, "gear ignored SIGTERM, sending SIGKILL");
    }
    let _ = child.kill().await;
}

/// Close pipes and reap the child, killing it if it is still running.
async fn destroy_child(child: &mut Child) {
    drop(child.stdin.take());
    match child.try_wait() {
        Ok(Some(_)) => {}
        _ => {
            let _ = child.kill().await;
            let _ = child.wait().await;
        }
    }
}

fn signal_pid(pid: u32, signal: nix::sys::signal::Signal) {
    let pid = nix::unistd::Pid::from_raw(pid as i32);
    if let Err(e) = nix::sys::signal::kill(pid, signal) {
        tracing::debug!(?pid, ?signal, error = %e, "signal delivery failed");
    }
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;

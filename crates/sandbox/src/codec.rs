// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sandbox IPC wire format.
//!
//! UTF-8 JSON, newline-delimited, one object per line over the child's
//! stdin/stdout. Line length is enforced while reading
//! ([`read_wire_line`] never buffers more than [`MAX_LINE_BYTES`]);
//! non-JSON lines are logged and discarded by the reader. Signatures
//! cover the canonical encoding of every field except `signature`
//! itself.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Upper bound for one wire line, newline included.
pub const MAX_LINE_BYTES: usize = 262_144;

/// Grace between SIGTERM and SIGKILL when tearing a child down.
pub const KILL_GRACE_MS: u64 = 2_000;

/// Bound for servicing one child-issued `command` on the host side.
pub const HOST_COMMAND_TIMEOUT_MS: u64 = 10_000;

/// Messages crossing the sandbox boundary, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GearMessage {
    /// Host → child, first line. Secrets travel here, never as process
    /// environment.
    Handshake {
        mode: String,
        key: String,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        secrets: Map<String, Value>,
    },

    /// Host → child: invoke an action.
    Request {
        correlation_id: String,
        action: String,
        #[serde(default)]
        parameters: Map<String, Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },

    /// Child → host: the terminal response for a request.
    Response {
        correlation_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },

    /// Child → host: progress notification (fire-and-forget).
    Progress {
        correlation_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        percent: Option<f64>,
    },

    /// Child → host: log line (fire-and-forget).
    Log {
        #[serde(default)]
        level: String,
        message: String,
    },

    /// Child → host: request creation of a sub-job (fire-and-forget).
    Subjob {
        content: String,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        metadata: Map<String, Value>,
    },

    /// Child → host: request/response correlated by `request_id`.
    Command {
        request_id: String,
        command: String,
        #[serde(default)]
        parameters: Map<String, Value>,
    },

    /// Host → child: answer to a `command`.
    CommandResponse {
        request_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl GearMessage {
    pub fn tag(&self) -> &'static str {
        match self {
            GearMessage::Handshake { .. } => "handshake",
            GearMessage::Request { .. } => "request",
            GearMessage::Response { .. } => "response",
            GearMessage::Progress { .. } => "progress",
            GearMessage::Log { .. } => "log",
            GearMessage::Subjob { .. } => "subjob",
            GearMessage::Command { .. } => "command",
            GearMessage::CommandResponse { .. } => "command_response",
        }
    }
}

/// Encode one message as a wire line (newline included).
pub fn encode_line(message: &GearMessage) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

/// Parse one wire line. Oversized or non-JSON input yields `None`; the
/// caller logs and discards it.
pub fn parse_line(line: &str) -> Option<GearMessage> {
    if line.len() > MAX_LINE_BYTES {
        return None;
    }
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

/// One read from a bounded wire stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireLine {
    Line(String),
    /// The line exceeded [`MAX_LINE_BYTES`]; its bytes were drained while
    /// streaming, never materialized.
    Oversized,
    Eof,
}

/// Read one newline-terminated line, holding at most [`MAX_LINE_BYTES`]
/// in memory at any point.
///
/// A child that emits an oversized or never-terminated line cannot make
/// the host buffer it: once the running length crosses the bound, the
/// accumulator is dropped and the stream is drained to the next newline
/// (or EOF), reporting [`WireLine::Oversized`]. `buf` is a scratch
/// buffer the caller reuses across reads.
pub async fn read_wire_line<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> std::io::Result<WireLine>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let mut oversized = false;
    loop {
        let mut consume = 0;
        let mut done = None;
        {
            let chunk = reader.fill_buf().await?;
            if chunk.is_empty() {
                done = Some(if oversized {
                    WireLine::Oversized
                } else if buf.is_empty() {
                    WireLine::Eof
                } else {
                    // Final line without a trailing newline
                    WireLine::Line(String::from_utf8_lossy(buf).into_owned())
                });
            } else if let Some(pos) = chunk.iter().position(|&b| b == b'\n') {
                consume = pos + 1;
                if oversized || buf.len() + pos > MAX_LINE_BYTES {
                    done = Some(WireLine::Oversized);
                } else {
                    buf.extend_from_slice(&chunk[..pos]);
                    done = Some(WireLine::Line(String::from_utf8_lossy(buf).into_owned()));
                }
            } else if oversized || buf.len() + chunk.len() > MAX_LINE_BYTES {
                consume = chunk.len();
                oversized = true;
                buf.clear();
            } else {
                consume = chunk.len();
                buf.extend_from_slice(chunk);
            }
        }
        reader.consume(consume);
        if let Some(line) = done {
            return Ok(line);
        }
    }
}

/// Canonical signing payload: the message as a JSON object with the
/// `signature` field removed, serialized with sorted keys (serde_json's
/// default map ordering).
pub fn signing_payload(message: &GearMessage) -> Result<Vec<u8>, serde_json::Error> {
    let mut value = serde_json::to_value(message)?;
    if let Value::Object(ref mut map) = value {
        map.remove("signature");
    }
    Ok(serde_json::to_string(&value)?.into_bytes())
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;

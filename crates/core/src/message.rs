// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed messages routed between components.

use crate::gear::GearId;
use crate::job::{JobId, JobStatus};
use crate::plan::ExecutionPlan;
use crate::validation::ValidationResult;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Addressable component on the bus: a fixed built-in symbol or `gear:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ComponentId {
    Planner,
    Validator,
    Journal,
    Bridge,
    Scheduler,
    Gear(GearId),
}

impl ComponentId {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "planner" => Some(ComponentId::Planner),
            "validator" => Some(ComponentId::Validator),
            "journal" => Some(ComponentId::Journal),
            "bridge" => Some(ComponentId::Bridge),
            "scheduler" => Some(ComponentId::Scheduler),
            _ => s.strip_prefix("gear:").map(|id| ComponentId::Gear(GearId::from_string(id))),
        }
    }
}

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentId::Planner => f.write_str("planner"),
            ComponentId::Validator => f.write_str("validator"),
            ComponentId::Journal => f.write_str("journal"),
            ComponentId::Bridge => f.write_str("bridge"),
            ComponentId::Scheduler => f.write_str("scheduler"),
            ComponentId::Gear(id) => write!(f, "gear:{id}"),
        }
    }
}

impl From<ComponentId> for String {
    fn from(id: ComponentId) -> String {
        id.to_string()
    }
}

impl TryFrom<String> for ComponentId {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        ComponentId::parse(&s).ok_or_else(|| format!("unknown component id: {s:?}"))
    }
}

/// Message payload, discriminated by the wire `type` tag.
///
/// Serializes with `{"type": "plan.request", ...fields}` format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MessageBody {
    // -- planner --
    #[serde(rename = "plan.request")]
    PlanRequest {
        job_id: JobId,
        content: String,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        context: Map<String, Value>,
        /// Present when the job is re-planned after a needs_revision verdict.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        revisions: Vec<String>,
    },

    #[serde(rename = "plan.response")]
    PlanResponse { plan: ExecutionPlan },

    // -- journal --
    #[serde(rename = "journal.store")]
    JournalStore { entry: Value },

    #[serde(rename = "journal.query")]
    JournalQuery {
        text: String,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        filters: Map<String, Value>,
    },

    #[serde(rename = "journal.result")]
    JournalResult { entries: Vec<Value> },

    // -- gear --
    #[serde(rename = "gear.invoke")]
    GearInvoke {
        action: String,
        #[serde(default)]
        parameters: Map<String, Value>,
    },

    #[serde(rename = "gear.result")]
    GearResult { result: Value },

    // -- bridge --
    #[serde(rename = "approval.required")]
    ApprovalRequired {
        job_id: JobId,
        summary: String,
        /// Per-step plain-language risk table.
        steps: Vec<Value>,
        nonce: String,
        expires_at: i64,
    },

    #[serde(rename = "job.status")]
    JobStatusChanged {
        job_id: JobId,
        status: JobStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },

    #[serde(rename = "validation.result")]
    ValidationCompleted { result: ValidationResult },

    /// Acknowledgement with no payload.
    #[serde(rename = "ack")]
    Ack,
}

impl MessageBody {
    /// Wire tag for log spans.
    pub fn tag(&self) -> &'static str {
        match self {
            MessageBody::PlanRequest { .. } => "plan.request",
            MessageBody::PlanResponse { .. } => "plan.response",
            MessageBody::JournalStore { .. } => "journal.store",
            MessageBody::JournalQuery { .. } => "journal.query",
            MessageBody::JournalResult { .. } => "journal.result",
            MessageBody::GearInvoke { .. } => "gear.invoke",
            MessageBody::GearResult { .. } => "gear.result",
            MessageBody::ApprovalRequired { .. } => "approval.required",
            MessageBody::JobStatusChanged { .. } => "job.status",
            MessageBody::ValidationCompleted { .. } => "validation.result",
            MessageBody::Ack => "ack",
        }
    }
}

/// Envelope carried by every message on the bus.
///
/// `correlation_id` joins a request with its response; for a fixed
/// `(from, to, correlation_id)` tuple the request precedes the response.
/// Messages to or from a gear additionally carry a signature over the
/// canonical encoding of the non-signature fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub correlation_id: String,
    pub timestamp: i64,
    pub from: ComponentId,
    pub to: ComponentId,
    #[serde(flatten)]
    pub body: MessageBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;

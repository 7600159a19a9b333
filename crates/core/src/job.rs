// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job record and state machine.

use crate::worker::WorkerId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

crate::define_id! {
    /// Unique identifier for a job.
    ///
    /// Each submitted request gets a unique ID that tracks it through
    /// planning, validation, execution, and the audit trail.
    pub struct JobId("job-");
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting for a worker to claim it
    Pending,
    /// A worker is obtaining a plan
    Planning,
    /// The plan is being checked by the policy engine
    Validating,
    /// Parked until the operator approves or rejects
    AwaitingApproval,
    /// Steps are running in sandboxes
    Executing,
    /// Finished successfully (terminal)
    Completed,
    /// Finished with an error (terminal)
    Failed,
    /// Cancelled by the operator or a timeout (terminal)
    Cancelled,
}

crate::string_enum! {
    JobStatus {
        Pending => "pending",
        Planning => "planning",
        Validating => "validating",
        AwaitingApproval => "awaiting_approval",
        Executing => "executing",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl JobStatus {
    /// Terminal statuses are final; no transition leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }

    /// Statuses during which a worker must own the row.
    pub fn requires_worker(&self) -> bool {
        matches!(self, JobStatus::Planning | JobStatus::Validating | JobStatus::Executing)
    }

    /// All statuses, for table-driven tests and SQL IN-lists.
    pub const ALL: [JobStatus; 8] = [
        JobStatus::Pending,
        JobStatus::Planning,
        JobStatus::Validating,
        JobStatus::AwaitingApproval,
        JobStatus::Executing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];
}

/// Whether `from → to` appears in the allowed-transition table.
///
/// Cancellation is representable from any non-terminal status. Everything
/// else follows the planning pipeline:
/// pending → planning → validating → {awaiting_approval, executing, planning}
/// → executing → {completed, failed}.
pub fn transition_allowed(from: JobStatus, to: JobStatus) -> bool {
    use JobStatus::*;
    if from.is_terminal() {
        return false;
    }
    if to == Cancelled {
        return true;
    }
    matches!(
        (from, to),
        (Pending, Planning)
            | (Planning, Validating)
            | (Planning, Failed)
            | (Validating, AwaitingApproval)
            | (Validating, Executing)
            | (Validating, Planning)
            | (Validating, Failed)
            | (AwaitingApproval, Executing)
            | (Executing, Completed)
            | (Executing, Failed)
    )
}

/// Scheduling priority. Claim order is priority first, then age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

crate::string_enum! {
    Priority {
        Low => "low",
        Normal => "normal",
        High => "high",
        Critical => "critical",
    }
}

impl Priority {
    /// Numeric rank used for `ORDER BY priority DESC`.
    pub fn rank(&self) -> i64 {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
            Priority::Critical => 3,
        }
    }
}

/// Where a job came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobSource {
    User,
    Schedule,
    Webhook,
    SubJob,
}

crate::string_enum! {
    JobSource {
        User => "user",
        Schedule => "schedule",
        Webhook => "webhook",
        SubJob => "sub_job",
    }
}

/// A durable unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub priority: Priority,
    pub source: JobSource,
    /// Natural-language request content handed to the planner.
    pub content: String,
    /// Requesting operator; part of the dedup identity.
    pub user_id: String,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    /// Current claimant; non-null exactly while planning/validating/executing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<WorkerId>,
    pub attempts: u32,
    pub max_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    /// Times a needs_revision verdict sent the job back to planning.
    pub revision_count: u32,
    /// Times the planner was re-invoked after a plan-level failure.
    pub replan_count: u32,
    /// Unique only among non-terminal rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedup_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Options for creating a job. Everything beyond the request content and
/// requesting user is optional and typed.
#[derive(Debug, Clone)]
pub struct CreateJob {
    pub content: String,
    pub user_id: String,
    pub priority: Priority,
    pub source: JobSource,
    pub max_attempts: u32,
    pub timeout_ms: Option<i64>,
    pub dedup_hash: Option<String>,
    pub parent_id: Option<JobId>,
    pub conversation_id: Option<String>,
    pub source_message_id: Option<String>,
    pub metadata: HashMap<String, Value>,
}

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

impl CreateJob {
    pub fn new(user_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            user_id: user_id.into(),
            priority: Priority::Normal,
            source: JobSource::User,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            timeout_ms: None,
            dedup_hash: None,
            parent_id: None,
            conversation_id: None,
            source_message_id: None,
            metadata: HashMap::new(),
        }
    }

    crate::setters! {
        set {
            priority: Priority,
            source: JobSource,
            max_attempts: u32,
            metadata: HashMap<String, Value>,
        }
        option {
            timeout_ms: i64,
            dedup_hash: String,
            parent_id: JobId,
            conversation_id: String,
            source_message_id: String,
        }
    }
}

crate::test_builder! {
    pub struct JobBuilder => Job {
        into {
            content: String = "summarize the quarterly notes",
            user_id: String = "operator",
        }
        set {
            status: JobStatus = JobStatus::Pending,
            priority: Priority = Priority::Normal,
            source: JobSource = JobSource::User,
            created_at: i64 = 1_000_000,
            updated_at: i64 = 1_000_000,
            attempts: u32 = 0,
            max_attempts: u32 = DEFAULT_MAX_ATTEMPTS,
            revision_count: u32 = 0,
            replan_count: u32 = 0,
            metadata: HashMap<String, Value> = HashMap::new(),
        }
        option {
            completed_at: i64 = None,
            worker_id: WorkerId = None,
            timeout_ms: i64 = None,
            plan: Value = None,
            validation: Value = None,
            result: Value = None,
            error: Value = None,
            dedup_hash: String = None,
            parent_id: JobId = None,
            conversation_id: String = None,
            source_message_id: String = None,
        }
        computed {
            id: JobId = JobId::generate(),
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;

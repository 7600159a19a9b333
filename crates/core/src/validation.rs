// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Verdicts, action classification, and validation results.

use crate::plan::{PlanId, RiskLevel, StepId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Classification of what a step actually does, derived from its gear,
/// action name, and parameters. Unrecognized combinations land on `Unknown`,
/// which routes to user approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    ReadFiles,
    WriteFiles,
    DeleteFiles,
    NetworkGet,
    NetworkMutate,
    ShellExecute,
    CredentialUsage,
    FinancialTransaction,
    SendMessage,
    SystemConfig,
    Unknown,
}

crate::string_enum! {
    ActionType {
        ReadFiles => "read_files",
        WriteFiles => "write_files",
        DeleteFiles => "delete_files",
        NetworkGet => "network_get",
        NetworkMutate => "network_mutate",
        ShellExecute => "shell_execute",
        CredentialUsage => "credential_usage",
        FinancialTransaction => "financial_transaction",
        SendMessage => "send_message",
        SystemConfig => "system_config",
        Unknown => "unknown",
    }
}

impl ActionType {
    /// Hard-floor actions: no user override can weaken their verdict below
    /// needs_user_approval.
    pub fn is_hard_floor(&self) -> bool {
        matches!(
            self,
            ActionType::DeleteFiles
                | ActionType::ShellExecute
                | ActionType::FinancialTransaction
                | ActionType::SystemConfig
        )
    }

    /// True for both network classifications.
    pub fn is_network(&self) -> bool {
        matches!(self, ActionType::NetworkGet | ActionType::NetworkMutate)
    }
}

/// The policy engine's decision on a step or a whole plan.
///
/// Ordering is strictness: approved < needs_revision < needs_user_approval
/// < rejected. Overrides may only move a verdict to the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    NeedsRevision,
    NeedsUserApproval,
    Rejected,
}

crate::string_enum! {
    Verdict {
        Approved => "approved",
        NeedsRevision => "needs_revision",
        NeedsUserApproval => "needs_user_approval",
        Rejected => "rejected",
    }
}

impl Verdict {
    /// Strictness rank; higher dominates when folding step verdicts.
    pub fn strictness(&self) -> i64 {
        match self {
            Verdict::Approved => 0,
            Verdict::NeedsRevision => 1,
            Verdict::NeedsUserApproval => 2,
            Verdict::Rejected => 3,
        }
    }
}

/// Per-step outcome within a [`ValidationResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepVerdict {
    pub step_id: StepId,
    pub action_type: ActionType,
    pub verdict: Verdict,
    pub assessed_risk: RiskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Composite patterns detected across the whole plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeRisk {
    CredentialExfiltration,
    DataLeak,
    FileExfiltration,
    MassDeletion,
}

crate::string_enum! {
    CompositeRisk {
        CredentialExfiltration => "credential_exfiltration",
        DataLeak => "data_leak",
        FileExfiltration => "file_exfiltration",
        MassDeletion => "mass_deletion",
    }
}

/// The policy engine's verdict on a stripped plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub plan_id: PlanId,
    pub verdict: Verdict,
    pub step_results: Vec<StepVerdict>,
    pub overall_risk: RiskLevel,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub composite_risks: Vec<CompositeRisk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_revisions: Vec<String>,
    /// Observability side-channel: planner/policy risk divergences and
    /// anything else worth surfacing without changing the verdict.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, Value>,
}

impl ValidationResult {
    /// Fold step verdicts to the overall verdict: rejected dominates
    /// needs_user_approval dominates needs_revision dominates approved.
    pub fn fold_verdicts(steps: &[StepVerdict]) -> Verdict {
        steps
            .iter()
            .map(|s| s.verdict)
            .max()
            .unwrap_or(Verdict::Approved)
    }
}

#[cfg(test)]
#[path = "validation_tests.rs"]
mod tests;

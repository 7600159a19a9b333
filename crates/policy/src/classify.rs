// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Action classification.
//!
//! Deterministic mapping from `(gear, action, parameters)` to an
//! [`ActionType`]. Anything the tables do not recognize is `Unknown`,
//! which the verdict table routes to user approval.

use crate::strip::StrippedStep;
use meridian_core::ActionType;

const READ_ACTIONS: &[&str] = &["read", "list", "stat", "glob", "search", "head_file", "tail"];
const WRITE_ACTIONS: &[&str] =
    &["write", "append", "create", "mkdir", "copy", "move", "rename", "touch"];
const DELETE_ACTIONS: &[&str] = &["delete", "remove", "rmdir", "unlink", "truncate", "purge"];
const GET_ACTIONS: &[&str] = &["get", "fetch", "head", "download"];
const MUTATE_ACTIONS: &[&str] = &["post", "put", "patch", "upload", "submit", "delete_remote"];
const SHELL_ACTIONS: &[&str] = &["exec", "shell", "run", "spawn", "command", "script"];
const CREDENTIAL_ACTIONS: &[&str] =
    &["authenticate", "login", "use_credential", "sign", "decrypt"];
const FINANCIAL_ACTIONS: &[&str] =
    &["pay", "transfer", "charge", "refund", "purchase", "withdraw"];
const MESSAGE_ACTIONS: &[&str] = &["send", "email", "message", "notify", "post_message", "reply"];
const SYSTEM_ACTIONS: &[&str] =
    &["configure", "set_config", "install", "uninstall", "enable", "disable", "restart"];

/// Parameter keys that imply credential material regardless of the action
/// verb.
const CREDENTIAL_PARAMS: &[&str] = &["credential", "secret", "token", "api_key"];

/// Classify one stripped step.
pub fn classify(step: &StrippedStep) -> ActionType {
    let action = step.action.as_str();

    // Credential material in parameters dominates the verb: a fetch that
    // carries a secret is credential usage, not a plain GET.
    if CREDENTIAL_PARAMS.iter().any(|key| step.parameters.contains_key(*key)) {
        return ActionType::CredentialUsage;
    }

    if FINANCIAL_ACTIONS.contains(&action) || step.parameters.contains_key("amount_usd") {
        return ActionType::FinancialTransaction;
    }
    if SHELL_ACTIONS.contains(&action) {
        return ActionType::ShellExecute;
    }
    if CREDENTIAL_ACTIONS.contains(&action) {
        return ActionType::CredentialUsage;
    }
    if SYSTEM_ACTIONS.contains(&action) {
        return ActionType::SystemConfig;
    }
    if DELETE_ACTIONS.contains(&action) {
        return ActionType::DeleteFiles;
    }
    if READ_ACTIONS.contains(&action) {
        return ActionType::ReadFiles;
    }
    if WRITE_ACTIONS.contains(&action) {
        return ActionType::WriteFiles;
    }
    if MESSAGE_ACTIONS.contains(&action) {
        return ActionType::SendMessage;
    }
    if GET_ACTIONS.contains(&action) {
        return ActionType::NetworkGet;
    }
    if MUTATE_ACTIONS.contains(&action) {
        return ActionType::NetworkMutate;
    }

    ActionType::Unknown
}

#[cfg(test)]
#[path = "classify_tests.rs"]
mod tests;

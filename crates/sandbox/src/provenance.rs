// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provenance tagging of gear output.

use meridian_core::GearId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Server-side stamp wrapping every tool result so downstream consumers
/// can trace where a value came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceTag {
    /// `gear:<id>`
    pub source: String,
    pub action: String,
    pub correlation_id: String,
    pub timestamp: i64,
}

/// A gear result with its provenance tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedResult {
    #[serde(flatten)]
    pub tag: ProvenanceTag,
    pub result: Value,
}

impl TaggedResult {
    pub fn new(
        gear: &GearId,
        action: &str,
        correlation_id: &str,
        timestamp: i64,
        result: Value,
    ) -> Self {
        Self {
            tag: ProvenanceTag {
                source: format!("gear:{gear}"),
                action: action.to_string(),
                correlation_id: correlation_id.to_string(),
                timestamp,
            },
            result,
        }
    }
}

#[cfg(test)]
#[path = "provenance_tests.rs"]
mod tests;

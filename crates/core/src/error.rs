// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared across component boundaries.
//!
//! Every crate's error type exposes a [`kind`](Kinded::kind) so the state
//! machine can route failures uniformly: retry, fail, or cancel.

use serde::{Deserialize, Serialize};

/// The kind of failure, independent of which component produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Input violated a schema or invariant; not retriable.
    Validation,
    /// Concurrent modification or duplicate; retriable where sensible.
    Conflict,
    /// Referenced row absent.
    NotFound,
    /// Missing or invalid session, CSRF, nonce, or ACL failure.
    Auth,
    /// Checksum or signature mismatch; always disables the offending gear.
    Integrity,
    /// A sandbox or job timer expired.
    Timeout,
    /// Cancellation token tripped; propagated, never swallowed.
    Cancelled,
    /// External provider unreachable; retriable with backoff.
    Upstream,
    /// Invariant violation inside the runtime.
    Internal,
}

crate::string_enum! {
    ErrorKind {
        Validation => "validation",
        Conflict => "conflict",
        NotFound => "not_found",
        Auth => "auth",
        Integrity => "integrity",
        Timeout => "timeout",
        Cancelled => "cancelled",
        Upstream => "upstream",
        Internal => "internal",
    }
}

impl ErrorKind {
    /// Whether a step failure of this kind may be retried under the job's
    /// attempt budget.
    pub fn is_retriable(&self) -> bool {
        matches!(self, ErrorKind::Timeout | ErrorKind::Upstream | ErrorKind::Conflict)
    }
}

/// Implemented by every component error so boundaries can classify it.
pub trait Kinded {
    fn kind(&self) -> ErrorKind;
}

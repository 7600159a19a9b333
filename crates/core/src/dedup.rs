// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request-fingerprint deduplication.
//!
//! Identical requests from the same user inside one time quantum hash to
//! the same value and collapse onto a single non-terminal job row.

use sha2::{Digest, Sha256};

/// Default dedup window quantum (5 minutes).
pub const DEFAULT_DEDUP_WINDOW_MS: i64 = 300_000;

/// Compute the dedup fingerprint for `(user_id, content)` at `now_ms`.
///
/// The hash input is `user_id \0 content \0 floor(now_ms / window_ms)`.
/// The NUL delimiter keeps `("abc", "def")` and `("ab", "cdef")` distinct;
/// the quantum index makes the window boundary a hard cut.
pub fn compute_dedup_hash(user_id: &str, content: &str, now_ms: i64, window_ms: i64) -> String {
    let window = window_ms.max(1);
    let quantum = now_ms.div_euclid(window);
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(content.as_bytes());
    hasher.update([0u8]);
    hasher.update(quantum.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
#[path = "dedup_tests.rs"]
mod tests;

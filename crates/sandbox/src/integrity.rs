// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Entry-file integrity gate.

use crate::error::SandboxError;
use meridian_core::GearId;
use sha2::{Digest, Sha256};
use std::path::Path;

/// SHA-256 of a file, hex-encoded. Streams in chunks so large entry files
/// do not land in memory at once.
pub fn file_checksum(path: &Path) -> Result<String, SandboxError> {
    use std::io::Read;
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Recompute the entry checksum and compare against the stored value.
pub fn verify_checksum(
    gear: &GearId,
    entry: &Path,
    stored: &str,
) -> Result<(), SandboxError> {
    let actual = file_checksum(entry)?;
    if actual != stored {
        tracing::error!(gear = %gear, expected = stored, actual, "gear checksum mismatch");
        return Err(SandboxError::Integrity { gear: *gear });
    }
    Ok(())
}

#[cfg(test)]
#[path = "integrity_tests.rs"]
mod tests;

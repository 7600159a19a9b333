// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn timeout_falls_back_to_default() {
    let mut manifest = GearManifest::builder().build();
    manifest.resources.timeout_ms = 0;
    assert_eq!(manifest.timeout_ms(), DEFAULT_GEAR_TIMEOUT_MS);

    manifest.resources.timeout_ms = 5_000;
    assert_eq!(manifest.timeout_ms(), 5_000);
}

#[test]
fn declares_secret_checks_permissions() {
    let mut manifest = GearManifest::builder().build();
    assert!(!manifest.declares_secret("API_TOKEN"));
    manifest.permissions.secrets.push("API_TOKEN".to_string());
    assert!(manifest.declares_secret("API_TOKEN"));
    assert!(!manifest.declares_secret("OTHER"));
}

#[test]
fn manifest_serde_round_trips() {
    let manifest = GearManifest::builder()
        .id("gear-http")
        .checksum("ab".repeat(32))
        .build();
    let json = serde_json::to_string(&manifest).unwrap();
    let parsed: GearManifest = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, manifest);
}

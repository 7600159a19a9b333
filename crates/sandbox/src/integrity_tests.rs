// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn checksum_matches_known_vector() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("entry");
    std::fs::write(&path, b"hello world").unwrap();
    // sha256("hello world")
    assert_eq!(
        file_checksum(&path).unwrap(),
        "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
    );
}

#[test]
fn verify_accepts_matching_checksum() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("entry");
    std::fs::write(&path, b"#!/bin/sh\nexit 0\n").unwrap();
    let checksum = file_checksum(&path).unwrap();
    verify_checksum(&GearId::from_string("gear-x"), &path, &checksum).unwrap();
}

#[test]
fn verify_rejects_modified_entry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("entry");
    std::fs::write(&path, b"original").unwrap();
    let checksum = file_checksum(&path).unwrap();

    std::fs::write(&path, b"tampered").unwrap();
    let err = verify_checksum(&GearId::from_string("gear-x"), &path, &checksum).unwrap_err();
    assert!(matches!(err, SandboxError::Integrity { .. }));
}

#[test]
fn missing_entry_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = verify_checksum(
        &GearId::from_string("gear-x"),
        &dir.path().join("absent"),
        "00",
    )
    .unwrap_err();
    assert!(matches!(err, SandboxError::Io(_)));
}

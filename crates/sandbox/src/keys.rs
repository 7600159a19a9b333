// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signing key material for sandbox IPC.
//!
//! One [`KeyMaterial`] lives for exactly one action invocation. In v1 mode
//! it is an HMAC-SHA256 key shared with the child over the handshake; in
//! v2 it is an ephemeral Ed25519 keypair whose private half is shared the
//! same way. Either way the secret bytes are zeroed when the material is
//! dropped.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hmac::{Hmac, Mac};
use meridian_core::SandboxMode;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// Per-invocation signing key material.
pub enum KeyMaterial {
    /// v1: shared HMAC-SHA256 key.
    Hmac(Zeroizing<[u8; 32]>),
    /// v2: ephemeral Ed25519 keypair. `SigningKey` zeroizes on drop.
    Ed25519 { signing: Box<SigningKey>, verifying: VerifyingKey },
}

impl KeyMaterial {
    pub fn generate(mode: SandboxMode) -> Self {
        match mode {
            SandboxMode::V1 => {
                let mut key = Zeroizing::new([0u8; 32]);
                OsRng.fill_bytes(key.as_mut());
                KeyMaterial::Hmac(key)
            }
            SandboxMode::V2 => {
                let signing = SigningKey::generate(&mut OsRng);
                let verifying = signing.verifying_key();
                KeyMaterial::Ed25519 { signing: Box::new(signing), verifying }
            }
        }
    }

    /// Reconstruct key material from a handshake secret. This is the
    /// child-side entry point; gears written in Rust use it to sign their
    /// responses with the key the host shared.
    pub fn from_handshake(mode: SandboxMode, secret_hex: &str) -> Option<Self> {
        let bytes = Zeroizing::new(hex::decode(secret_hex).ok()?);
        match mode {
            SandboxMode::V1 => {
                let key: [u8; 32] = bytes.as_slice().try_into().ok()?;
                Some(KeyMaterial::Hmac(Zeroizing::new(key)))
            }
            SandboxMode::V2 => {
                let key: [u8; 32] = bytes.as_slice().try_into().ok()?;
                let signing = SigningKey::from_bytes(&key);
                let verifying = signing.verifying_key();
                Some(KeyMaterial::Ed25519 { signing: Box::new(signing), verifying })
            }
        }
    }

    pub fn mode(&self) -> SandboxMode {
        match self {
            KeyMaterial::Hmac(_) => SandboxMode::V1,
            KeyMaterial::Ed25519 { .. } => SandboxMode::V2,
        }
    }

    /// Hex signature over `payload`.
    pub fn sign(&self, payload: &[u8]) -> String {
        match self {
            KeyMaterial::Hmac(key) => {
                let mut mac = match HmacSha256::new_from_slice(key.as_ref()) {
                    Ok(mac) => mac,
                    // 32-byte keys are always accepted by HMAC
                    Err(_) => unreachable!("fixed-size hmac key rejected"),
                };
                mac.update(payload);
                hex::encode(mac.finalize().into_bytes())
            }
            KeyMaterial::Ed25519 { signing, .. } => hex::encode(signing.sign(payload).to_bytes()),
        }
    }

    /// Verify a hex signature over `payload`.
    pub fn verify(&self, payload: &[u8], signature_hex: &str) -> bool {
        match self {
            KeyMaterial::Hmac(key) => {
                // Constant-time via Mac::verify_slice.
                let Ok(bytes) = hex::decode(signature_hex) else {
                    return false;
                };
                let mut mac = match HmacSha256::new_from_slice(key.as_ref()) {
                    Ok(mac) => mac,
                    Err(_) => return false,
                };
                mac.update(payload);
                mac.verify_slice(&bytes).is_ok()
            }
            KeyMaterial::Ed25519 { verifying, .. } => {
                let Ok(bytes) = hex::decode(signature_hex) else {
                    return false;
                };
                let Ok(bytes) = <[u8; 64]>::try_from(bytes.as_slice()) else {
                    return false;
                };
                verifying.verify(payload, &Signature::from_bytes(&bytes)).is_ok()
            }
        }
    }

    /// The secret half handed to the child in the handshake, hex-encoded.
    /// The returned buffer zeroes itself on drop.
    pub fn handshake_secret(&self) -> Zeroizing<String> {
        match self {
            KeyMaterial::Hmac(key) => Zeroizing::new(hex::encode(key.as_ref())),
            KeyMaterial::Ed25519 { signing, .. } => {
                Zeroizing::new(hex::encode(signing.to_bytes()))
            }
        }
    }

    /// The public half (v2 only), for the in-memory sandbox handle.
    pub fn public_key_hex(&self) -> Option<String> {
        match self {
            KeyMaterial::Hmac(_) => None,
            KeyMaterial::Ed25519 { verifying, .. } => Some(hex::encode(verifying.to_bytes())),
        }
    }
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gear registry backed by in-memory manifests plus durable disablement.
//!
//! Manifests are loaded at startup (or installed by tests); the disabled
//! set lives in the meridian database so an integrity incident survives
//! restarts.

use meridian_core::{Clock, GearId, GearManifest, SystemClock};
use meridian_sandbox::GearRegistry;
use meridian_storage::Store;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

pub struct StoreBackedRegistry<C: Clock = SystemClock> {
    manifests: RwLock<HashMap<GearId, GearManifest>>,
    store: Arc<Store>,
    clock: C,
}

impl<C: Clock> StoreBackedRegistry<C> {
    pub fn new(store: Arc<Store>, clock: C) -> Self {
        Self { manifests: RwLock::new(HashMap::new()), store, clock }
    }

    /// Install or replace a manifest.
    pub fn install(&self, manifest: GearManifest) {
        self.manifests.write().insert(manifest.id, manifest);
    }

    pub fn gear_ids(&self) -> Vec<GearId> {
        self.manifests.read().keys().copied().collect()
    }
}

impl<C: Clock> GearRegistry for StoreBackedRegistry<C> {
    fn manifest(&self, gear: &GearId) -> Option<GearManifest> {
        self.manifests.read().get(gear).cloned()
    }

    fn stored_checksum(&self, gear: &GearId) -> Option<String> {
        self.manifests.read().get(gear).map(|m| m.checksum.clone())
    }

    fn is_disabled(&self, gear: &GearId) -> bool {
        self.store.is_gear_disabled(gear).unwrap_or_else(|e| {
            // Fail safe: if the flag cannot be read, treat as disabled.
            tracing::error!(gear = %gear, error = %e, "disabled-gear lookup failed");
            true
        })
    }

    fn disable(&self, gear: &GearId, reason: &str) {
        tracing::warn!(gear = %gear, reason, "disabling gear");
        if let Err(e) = self.store.disable_gear(gear, reason, self.clock.epoch_ms()) {
            tracing::error!(gear = %gear, error = %e, "failed to persist gear disablement");
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

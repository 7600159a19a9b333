// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator notification.

/// Delivers operator-facing notifications: approval requests, job
/// failures, integrity incidents.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str);
}

/// Desktop notifications for the single-operator deployment.
#[derive(Default)]
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, message: &str) {
        if let Err(e) = notify_rust::Notification::new().summary(title).body(message).show() {
            tracing::debug!(error = %e, "desktop notification failed");
        }
    }
}

/// Swallows notifications; used headless and in tests.
#[derive(Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _title: &str, _message: &str) {}
}

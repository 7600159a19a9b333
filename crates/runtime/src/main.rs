// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! meridiand: the Meridian daemon.
//!
//! Loads configuration, starts the runtime, and runs until interrupted.
//! Planner, journal, and bridge adapters register over the bus from the
//! embedding deployment; a bare daemon still schedules, validates, and
//! recovers jobs.

use meridian_core::RuntimeConfig;
use meridian_runtime::{DenyAllVault, DesktopNotifier, Runtime, RuntimeDeps};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn init_tracing(data_dir: &std::path::Path) -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(data_dir.join("logs"), "meridiand.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new("info")
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();
    guard
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("meridian.toml"));
    let config = match RuntimeConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("meridiand: {e}");
            std::process::exit(1);
        }
    };

    let data_dir = meridian_storage::data_dir();
    let _guard = init_tracing(&data_dir);
    tracing::info!(config = %config_path.display(), data_dir = %data_dir.display(), "starting");

    let deps = RuntimeDeps {
        planner: None,
        journal: None,
        bridge: None,
        vault: Arc::new(DenyAllVault),
        notifier: Arc::new(DesktopNotifier),
        manifests: Vec::new(),
    };

    let runtime = match Runtime::start(config, &data_dir, deps).await {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            eprintln!("meridiand: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "signal wait failed");
    }
    runtime.shutdown().await;
}

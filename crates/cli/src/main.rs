// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! meridian-admin: the update/rollback helper.
//!
//! `meridian-admin rollback` restores the most recent pre-update backup
//! of the state databases. Run it only while the daemon is stopped.

use meridian_storage::data_dir;

const USAGE: &str = "usage: meridian-admin rollback";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let command = args.next();
    if args.next().is_some() {
        eprintln!("{USAGE}");
        std::process::exit(1);
    }

    match command.as_deref() {
        Some("rollback") => {
            let dir = data_dir();
            match meridian_storage::Store::restore_latest_backup(&dir) {
                Ok(backup) => {
                    println!("restored {}", backup.display());
                    std::process::exit(0);
                }
                Err(e) => {
                    eprintln!("rollback failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;

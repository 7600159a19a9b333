// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lexical path containment and domain allowlist matching.
//!
//! Path checks never touch the filesystem: `.` and `..` components are
//! resolved textually, so a symlink-free answer is available before any
//! sandbox exists. Relative paths fail the check outright.

use std::path::{Component, Path, PathBuf};

/// Resolve `.` and `..` lexically. Returns None for relative paths and for
/// paths that escape above the root.
pub fn normalize(path: &Path) -> Option<PathBuf> {
    if !path.is_absolute() {
        return None;
    }
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
                // Popping the root itself means the path escaped
                if out.as_os_str().is_empty() {
                    return None;
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    Some(out)
}

/// Whether `path` resolves inside `root` after normalization. Fail-safe:
/// relative or escaping paths are never inside.
pub fn inside_workspace(root: &Path, path: &Path) -> bool {
    let Some(resolved) = normalize(path) else {
        return false;
    };
    let Some(root) = normalize(root) else {
        return false;
    };
    resolved.starts_with(&root)
}

/// Extract the host from a URL-ish string without guessing schemes beyond
/// the `://` split. Strips userinfo, port, path, query, and fragment.
pub fn host_of(url: &str) -> Option<String> {
    let rest = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let rest = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    let rest = rest.rsplit_once('@').map(|(_, host)| host).unwrap_or(rest);
    let host = rest.split(':').next().unwrap_or(rest);
    if host.is_empty() {
        None
    } else {
        Some(host.to_ascii_lowercase())
    }
}

/// Match a host against the allowlist. Entries are exact hostnames or
/// `*.domain` wildcards; a wildcard matches subdomains only, not the bare
/// domain.
pub fn host_allowed(allowlist: &[String], host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    allowlist.iter().any(|entry| {
        let entry = entry.to_ascii_lowercase();
        match entry.strip_prefix("*.") {
            Some(domain) => {
                host.len() > domain.len() + 1 && host.ends_with(&format!(".{domain}"))
            }
            None => host == entry,
        }
    })
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;

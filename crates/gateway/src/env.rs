// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the gateway crate.

use std::path::{Path, PathBuf};

pub const DEFAULT_GATEWAY_PORT: u16 = 6767;

/// Whether this process runs inside the sandbox (`IS_SANDBOX=1`).
pub fn is_sandbox() -> bool {
    std::env::var("IS_SANDBOX").map(|v| v == "1").unwrap_or(false)
}

/// Gateway URL for the sandbox client.
pub fn gateway_url() -> String {
    std::env::var("DEV_SESSIONS_GATEWAY_URL")
        .unwrap_or_else(|_| format!("http://host.docker.internal:{DEFAULT_GATEWAY_PORT}"))
}

/// Bind port for the gateway server.
pub fn gateway_port() -> u16 {
    std::env::var("DEV_SESSIONS_GATEWAY_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_GATEWAY_PORT)
}

fn host_path() -> Option<PathBuf> {
    std::env::var("HOST_PATH").ok().map(PathBuf::from)
}

fn container_workspace() -> PathBuf {
    std::env::var("CONTAINER_WORKSPACE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/workspace"))
}

/// Rewrite a container workspace path to its host equivalent before it
/// crosses the boundary. Applies only in sandbox mode with `HOST_PATH`
/// set; any other path is sent unchanged.
pub fn translate_workspace_path(path: &Path) -> PathBuf {
    if !is_sandbox() {
        return path.to_path_buf();
    }
    let Some(host_root) = host_path() else {
        return path.to_path_buf();
    };
    match path.strip_prefix(container_workspace()) {
        Ok(suffix) => host_root.join(suffix),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;

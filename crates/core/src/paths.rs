// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk layout under `~/.dev-sessions` and transcript path derivation.

use std::path::{Path, PathBuf};

/// State directory for registry, daemon state, and logs.
///
/// `DEV_SESSIONS_STATE_DIR` overrides the default `$HOME/.dev-sessions`.
pub fn state_dir() -> PathBuf {
    crate::env::state_dir_override().unwrap_or_else(|| crate::env::home_dir().join(".dev-sessions"))
}

/// Path of the session registry file.
pub fn registry_path() -> PathBuf {
    state_dir().join("sessions.json")
}

/// Path of the shared Codex daemon state file.
pub fn daemon_state_path() -> PathBuf {
    state_dir().join("rpc-daemon.json")
}

/// Path of the shared Codex daemon's append-only log.
pub fn daemon_log_path() -> PathBuf {
    state_dir().join("rpc-daemon.log")
}

/// Path of the gateway daemon log.
pub fn gateway_log_path() -> PathBuf {
    state_dir().join("gateway.log")
}

/// Root directory holding Claude transcripts (`$HOME/.claude` unless
/// `CLAUDE_CONFIG_DIR` is set, matching Claude Code itself).
pub fn claude_config_dir() -> PathBuf {
    crate::env::claude_config_dir_override()
        .unwrap_or_else(|| crate::env::home_dir().join(".claude"))
}

/// Claude Code's project directory name for a workspace path: every byte
/// outside `[A-Za-z0-9]` becomes `-`.
pub fn sanitize_workspace_path(path: &Path) -> String {
    path.to_string_lossy()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

/// Transcript path for a session:
/// `{claude_config_dir}/projects/{sanitized_workspace}/{internal_id}.jsonl`.
pub fn transcript_path(workspace_path: &Path, internal_id: &str) -> PathBuf {
    claude_config_dir()
        .join("projects")
        .join(sanitize_workspace_path(workspace_path))
        .join(format!("{internal_id}.jsonl"))
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;

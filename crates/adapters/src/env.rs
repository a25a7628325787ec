// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the adapters crate.

use std::time::Duration;

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Claude Code binary for tmux sessions (default: `claude`).
pub fn claude_bin() -> String {
    std::env::var("DEV_SESSIONS_CLAUDE_BIN").unwrap_or_else(|_| "claude".to_string())
}

/// Codex binary used to spawn the shared app-server (default: `codex`).
pub fn codex_bin() -> String {
    std::env::var("DEV_SESSIONS_CODEX_BIN").unwrap_or_else(|_| "codex".to_string())
}

/// Container wrapper binary for `container` launch mode.
pub fn sandbox_bin() -> String {
    std::env::var("DEV_SESSIONS_SANDBOX_BIN").unwrap_or_else(|_| "claude-sandbox".to_string())
}

/// How long to wait for a fresh session's transcript file to appear
/// (default: 30s).
pub fn transcript_timeout() -> Duration {
    parse_duration_ms("DEV_SESSIONS_TRANSCRIPT_TIMEOUT_MS").unwrap_or(Duration::from_secs(30))
}

/// Poll interval while waiting for the transcript file (default: 250ms).
pub fn transcript_poll_interval() -> Duration {
    parse_duration_ms("DEV_SESSIONS_TRANSCRIPT_POLL_MS").unwrap_or(Duration::from_millis(250))
}

/// Fixed startup delay before acknowledging the container wrapper's
/// initial prompt (default: 3s).
pub fn container_startup_delay() -> Duration {
    parse_duration_ms("DEV_SESSIONS_CONTAINER_STARTUP_MS").unwrap_or(Duration::from_secs(3))
}

/// How long a fire-and-forget send watches for an immediate turn
/// completion (default: 3s).
pub fn fast_capture_window() -> Duration {
    parse_duration_ms("DEV_SESSIONS_FAST_CAPTURE_MS").unwrap_or(Duration::from_secs(3))
}

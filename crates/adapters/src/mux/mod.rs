// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal multiplexer adapters

mod tmux;

pub use tmux::TmuxAdapter;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeMux, FakeMuxAdapter, MuxCall};

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Errors from multiplexer operations
#[derive(Debug, Error)]
pub enum MuxError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("command failed: {0}")]
    CommandFailed(String),
}

impl MuxError {
    /// Whether this error means the session or the multiplexer server is
    /// simply gone ("no such session", "no server running", ...).
    pub fn is_gone(&self) -> bool {
        let text = self.to_string().to_lowercase();
        ["no such session", "no server", "server not found", "session not found"]
            .iter()
            .any(|p| text.contains(p))
    }
}

/// Adapter for driving agent sessions inside a terminal multiplexer.
#[async_trait]
pub trait MuxAdapter: Clone + Send + Sync + 'static {
    /// Spawn a detached session named `name` running `cmd` in `cwd`.
    async fn spawn(&self, name: &str, cwd: &Path, cmd: &str) -> Result<(), MuxError>;

    /// Send a named key (e.g. `Enter`, `Escape`) to the session's pane.
    async fn send_key(&self, name: &str, key: &str) -> Result<(), MuxError>;

    /// Deliver text into the pane literally, without the multiplexer
    /// interpreting control characters or key names.
    async fn send_literal(&self, name: &str, text: &str) -> Result<(), MuxError>;

    /// Kill a session.
    async fn kill(&self, name: &str) -> Result<(), MuxError>;

    /// Check if a session is alive.
    async fn is_alive(&self, name: &str) -> Result<bool, MuxError>;

    /// Check whether something other than a shell/login/multiplexer
    /// process is running on the session's pane TTYs.
    async fn is_agent_running(&self, name: &str) -> Result<bool, MuxError>;

    /// Capture the last `lines` of pane output, for diagnostics.
    async fn capture_output(&self, name: &str, lines: u32) -> Result<String, MuxError>;
}

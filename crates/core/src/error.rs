// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared across backends, manager, and gateway.

use thiserror::Error;

/// Errors surfaced by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),

    /// Socket-level failures (WebSocket open/close, ECONNREFUSED, EPIPE).
    /// The Codex backend retries these once after resetting the daemon.
    #[error("transport error: {0}")]
    Transport(String),

    /// JSON-RPC error responses or malformed results.
    #[error("{0}")]
    Protocol(String),

    #[error("Codex turn failed: {0}")]
    TurnFailed(String),

    #[error("{method} timed out after {}s", .timeout.as_secs())]
    Timeout {
        method: String,
        timeout: std::time::Duration,
    },

    #[error("could not find an available session handle after {0} attempts")]
    ExhaustedIdSpace(u32),

    #[error("registry error: {0}")]
    Store(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("{0}")]
    Backend(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Whether this error belongs to the transport-failure family that
    /// warrants a daemon reset + single retry.
    pub fn is_transport(&self) -> bool {
        matches!(self, SessionError::Transport(_))
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session records as persisted in the registry file.

use crate::status::TurnOutcome;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which agent backend owns a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    /// Claude Code in a tmux pane, observed via its JSONL transcript.
    Claude,
    /// Codex driven over JSON-RPC WebSocket to the shared app-server.
    Codex,
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionKind::Claude => write!(f, "claude"),
            SessionKind::Codex => write!(f, "codex"),
        }
    }
}

/// How the agent process is launched.
///
/// The first three are tmux launch flavors for Claude sessions; Codex
/// sessions always use [`LaunchMode::Daemon`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LaunchMode {
    /// Plain interactive launch.
    Interactive,
    /// Launch with permission prompts disabled.
    SkipPermissions,
    /// Launch inside the container wrapper.
    Container,
    /// Attached to the shared app-server daemon.
    Daemon,
}

impl std::fmt::Display for LaunchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LaunchMode::Interactive => write!(f, "interactive"),
            LaunchMode::SkipPermissions => write!(f, "skip-permissions"),
            LaunchMode::Container => write!(f, "container"),
            LaunchMode::Daemon => write!(f, "daemon"),
        }
    }
}

/// Registry-level session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Inactive,
}

/// One session as stored in `sessions.json`.
///
/// `handle` is the external identity; `internal_id` is backend-specific
/// (transcript UUID for Claude, thread id for Codex). Optional fields are
/// omitted from the wire when unset so records stay small and forward
/// compatible.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub handle: String,
    pub internal_id: String,
    pub kind: SessionKind,
    pub mode: LaunchMode,
    pub workspace_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daemon_pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daemon_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_in_progress: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_turn_completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term_baseline_completion_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_turn_outcome: Option<TurnOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_turn_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_assistant_messages: Option<Vec<String>>,
    pub created_at: String,
    pub last_used: String,
}

impl SessionRecord {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

/// A partial update to a session record.
///
/// Backends return patches; the manager merges them into the canonical
/// record under the registry lock. `Some(inner)` sets the field; for the
/// doubly-optional fields, `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub internal_id: Option<String>,
    pub status: Option<SessionStatus>,
    pub daemon_pid: Option<Option<u32>>,
    pub daemon_port: Option<Option<u16>>,
    pub model: Option<Option<String>>,
    pub turn_in_progress: Option<Option<bool>>,
    pub last_turn_completed_at: Option<Option<String>>,
    pub term_baseline_completion_count: Option<Option<u64>>,
    pub last_turn_outcome: Option<Option<TurnOutcome>>,
    pub last_turn_error: Option<Option<String>>,
    pub last_assistant_messages: Option<Option<Vec<String>>>,
    pub last_used: Option<String>,
}

impl SessionPatch {
    pub fn is_empty(&self) -> bool {
        self.internal_id.is_none()
            && self.status.is_none()
            && self.daemon_pid.is_none()
            && self.daemon_port.is_none()
            && self.model.is_none()
            && self.turn_in_progress.is_none()
            && self.last_turn_completed_at.is_none()
            && self.term_baseline_completion_count.is_none()
            && self.last_turn_outcome.is_none()
            && self.last_turn_error.is_none()
            && self.last_assistant_messages.is_none()
            && self.last_used.is_none()
    }

    /// Apply this patch to a record in place.
    pub fn apply_to(&self, record: &mut SessionRecord) {
        if let Some(v) = &self.internal_id {
            record.internal_id = v.clone();
        }
        if let Some(v) = self.status {
            record.status = v;
        }
        if let Some(v) = self.daemon_pid {
            record.daemon_pid = v;
        }
        if let Some(v) = self.daemon_port {
            record.daemon_port = v;
        }
        if let Some(v) = &self.model {
            record.model = v.clone();
        }
        if let Some(v) = self.turn_in_progress {
            record.turn_in_progress = v;
        }
        if let Some(v) = &self.last_turn_completed_at {
            record.last_turn_completed_at = v.clone();
        }
        if let Some(v) = self.term_baseline_completion_count {
            record.term_baseline_completion_count = v;
        }
        if let Some(v) = self.last_turn_outcome {
            record.last_turn_outcome = v;
        }
        if let Some(v) = &self.last_turn_error {
            record.last_turn_error = v.clone();
        }
        if let Some(v) = &self.last_assistant_messages {
            record.last_assistant_messages = v.clone();
        }
        if let Some(v) = &self.last_used {
            record.last_used = v.clone();
        }
    }
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;

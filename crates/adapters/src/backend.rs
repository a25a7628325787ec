// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The backend capability seam.
//!
//! Every backend exposes the same capability set; the session manager
//! dispatches on a record's `kind` and merges the returned partial
//! updates into the registry under its lock. Backends never touch the
//! registry themselves.

use async_trait::async_trait;
use ds_core::{
    ConversationState, LaunchMode, Liveness, SessionError, SessionKind, SessionPatch,
    SessionRecord, TurnOutcome, WaitParams, WaitResult,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What `list_sessions` does with a record whose backend reports `Dead`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadSessionPolicy {
    /// Remove the record entirely (tmux sessions leave nothing to resume).
    Prune,
    /// Flip to `inactive`, keeping thread id and metadata recoverable.
    Deactivate,
}

/// Inputs to `create`.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub handle: String,
    pub workspace_path: PathBuf,
    pub mode: LaunchMode,
    pub description: Option<String>,
    pub model: Option<String>,
}

/// What a backend reports back from `create`; the manager turns this
/// into the persisted record.
#[derive(Debug, Clone)]
pub struct CreateResult {
    pub internal_id: String,
    pub mode: LaunchMode,
    pub daemon_pid: Option<u32>,
    pub daemon_port: Option<u16>,
    pub model: Option<String>,
}

/// Status plus any store update / deferred error it produced.
#[derive(Debug)]
pub struct StatusOutcome {
    pub state: ConversationState,
    pub patch: SessionPatch,
    pub error_to_throw: Option<SessionError>,
}

impl StatusOutcome {
    pub fn state_only(state: ConversationState) -> Self {
        Self {
            state,
            patch: SessionPatch::default(),
            error_to_throw: None,
        }
    }
}

/// Wait result plus any store update / deferred error.
///
/// The error is thrown by the manager *after* the patch is persisted, so
/// a failed turn is recorded even when the caller sees the error.
#[derive(Debug)]
pub struct WaitOutcome {
    pub result: WaitResult,
    pub patch: SessionPatch,
    pub error_to_throw: Option<SessionError>,
}

/// One conversation turn for `get_logs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnEntry {
    pub role: TurnRole,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    Human,
    Assistant,
}

/// Uniform capability set implemented by each backend.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    fn kind(&self) -> SessionKind;

    fn dead_session_policy(&self) -> DeadSessionPolicy;

    /// Whether a prospective handle collides with this backend's live
    /// namespace (tmux session names, Codex thread ids).
    async fn is_handle_taken(&self, handle: &str) -> bool;

    async fn create(&self, request: &CreateRequest) -> Result<CreateResult, SessionError>;

    /// Fields to persist *before* `send` runs, so a `wait` racing a very
    /// short turn still has its baseline.
    async fn pre_send_fields(&self, record: &SessionRecord) -> SessionPatch;

    async fn send(&self, record: &SessionRecord, text: &str)
        -> Result<SessionPatch, SessionError>;

    /// Fields to persist when `send` failed.
    fn on_send_error(&self, record: &SessionRecord, error: &SessionError) -> SessionPatch {
        let _ = record;
        SessionPatch {
            turn_in_progress: Some(None),
            last_turn_outcome: Some(Some(TurnOutcome::Failed)),
            last_turn_error: Some(Some(error.to_string())),
            ..Default::default()
        }
    }

    async fn status(&self, record: &SessionRecord) -> Result<StatusOutcome, SessionError>;

    async fn wait(&self, record: &SessionRecord, params: WaitParams) -> WaitOutcome;

    async fn exists(&self, record: &SessionRecord) -> Liveness;

    async fn get_logs(&self, record: &SessionRecord) -> Result<Vec<TurnEntry>, SessionError>;

    async fn get_last_messages(
        &self,
        record: &SessionRecord,
        n: usize,
    ) -> Result<Vec<String>, SessionError>;

    async fn kill(&self, record: &SessionRecord) -> Result<(), SessionError>;

    /// Invoked after a kill with the sessions still active registry-wide.
    async fn after_kill(&self, remaining_active: &[SessionRecord]) {
        let _ = remaining_active;
    }
}

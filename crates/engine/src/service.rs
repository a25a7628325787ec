// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The session-service surface.
//!
//! Implemented by the local [`crate::SessionManager`] and, inside a
//! sandbox, by the gateway HTTP client, so callers never care which side
//! of the boundary they are on.

use async_trait::async_trait;
use ds_adapters::TurnEntry;
use ds_core::{
    ConversationState, LaunchMode, SessionError, SessionKind, SessionRecord, WaitParams,
    WaitResult,
};
use std::path::PathBuf;

/// Inputs to `create_session`.
#[derive(Debug, Clone)]
pub struct CreateSessionOptions {
    pub workspace_path: PathBuf,
    pub kind: SessionKind,
    pub mode: Option<LaunchMode>,
    pub description: Option<String>,
    pub model: Option<String>,
}

/// Everything an operator can do with sessions.
#[async_trait]
pub trait SessionService: Send + Sync {
    async fn create_session(
        &self,
        opts: CreateSessionOptions,
    ) -> Result<SessionRecord, SessionError>;

    async fn send_message(&self, handle: &str, text: &str) -> Result<(), SessionError>;

    async fn kill_session(&self, handle: &str) -> Result<(), SessionError>;

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, SessionError>;

    async fn get_session_status(&self, handle: &str)
        -> Result<ConversationState, SessionError>;

    async fn wait_for_session(
        &self,
        handle: &str,
        params: WaitParams,
    ) -> Result<WaitResult, SessionError>;

    async fn get_last_messages(
        &self,
        handle: &str,
        n: usize,
    ) -> Result<Vec<String>, SessionError>;

    async fn get_logs(&self, handle: &str) -> Result<Vec<TurnEntry>, SessionError>;

    async fn inspect_session(&self, handle: &str) -> Result<SessionRecord, SessionError>;
}

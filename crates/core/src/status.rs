// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared status enums for sessions, turns, and liveness probes.

use serde::{Deserialize, Serialize};

/// What the conversation is currently doing, as far as the backend can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Idle,
    Working,
    WaitingForInput,
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationState::Idle => write!(f, "idle"),
            ConversationState::Working => write!(f, "working"),
            ConversationState::WaitingForInput => write!(f, "waiting_for_input"),
        }
    }
}

/// Runtime status of a Codex thread as reported by the app-server.
///
/// The server is transitioning its `thread.status` shape; an absent status
/// means idle, an object with an `active` key means a turn is running, and
/// anything unrecognized maps to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeStatus {
    Idle,
    Active,
    NotLoaded,
    SystemError,
    Unknown,
}

/// Outcome of the most recent turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnOutcome {
    Completed,
    Failed,
    Interrupted,
}

impl TurnOutcome {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(TurnOutcome::Completed),
            "failed" => Some(TurnOutcome::Failed),
            "interrupted" => Some(TurnOutcome::Interrupted),
            _ => None,
        }
    }
}

/// Result of a backend liveness probe.
///
/// `Unknown` means the probe itself failed; callers log and keep the
/// record rather than applying the dead-session policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Dead,
    Unknown,
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory multiplexer adapter for tests.

use super::{MuxAdapter, MuxError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One recorded adapter call, for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuxCall {
    Spawn { name: String, cwd: PathBuf, cmd: String },
    SendKey { name: String, key: String },
    SendLiteral { name: String, text: String },
    Kill { name: String },
}

/// State of one fake session.
#[derive(Debug, Clone, Default)]
pub struct FakeMux {
    pub alive: bool,
    pub agent_running: bool,
    pub pane_output: String,
}

/// Scriptable in-memory adapter. Spawn marks a session alive with the
/// agent running; tests flip the flags to simulate deaths.
#[derive(Clone, Default)]
pub struct FakeMuxAdapter {
    sessions: Arc<Mutex<HashMap<String, FakeMux>>>,
    calls: Arc<Mutex<Vec<MuxCall>>>,
    fail_liveness: Arc<Mutex<bool>>,
}

impl FakeMuxAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<MuxCall> {
        self.calls.lock().clone()
    }

    pub fn set_session(&self, name: &str, state: FakeMux) {
        self.sessions.lock().insert(name.to_string(), state);
    }

    pub fn mark_dead(&self, name: &str) {
        if let Some(s) = self.sessions.lock().get_mut(name) {
            s.alive = false;
            s.agent_running = false;
        }
    }

    /// Make `is_alive` error, simulating an unreachable tmux server.
    pub fn fail_liveness(&self, fail: bool) {
        *self.fail_liveness.lock() = fail;
    }

    fn record(&self, call: MuxCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl MuxAdapter for FakeMuxAdapter {
    async fn spawn(&self, name: &str, cwd: &Path, cmd: &str) -> Result<(), MuxError> {
        self.record(MuxCall::Spawn {
            name: name.to_string(),
            cwd: cwd.to_path_buf(),
            cmd: cmd.to_string(),
        });
        self.sessions.lock().insert(
            name.to_string(),
            FakeMux {
                alive: true,
                agent_running: true,
                pane_output: String::new(),
            },
        );
        Ok(())
    }

    async fn send_key(&self, name: &str, key: &str) -> Result<(), MuxError> {
        self.record(MuxCall::SendKey {
            name: name.to_string(),
            key: key.to_string(),
        });
        if !self.sessions.lock().get(name).map(|s| s.alive).unwrap_or(false) {
            return Err(MuxError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn send_literal(&self, name: &str, text: &str) -> Result<(), MuxError> {
        self.record(MuxCall::SendLiteral {
            name: name.to_string(),
            text: text.to_string(),
        });
        if !self.sessions.lock().get(name).map(|s| s.alive).unwrap_or(false) {
            return Err(MuxError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn kill(&self, name: &str) -> Result<(), MuxError> {
        self.record(MuxCall::Kill {
            name: name.to_string(),
        });
        match self.sessions.lock().remove(name) {
            Some(_) => Ok(()),
            None => Err(MuxError::CommandFailed(format!(
                "can't find session: no such session: {name}"
            ))),
        }
    }

    async fn is_alive(&self, name: &str) -> Result<bool, MuxError> {
        if *self.fail_liveness.lock() {
            return Err(MuxError::CommandFailed("tmux unreachable".into()));
        }
        Ok(self.sessions.lock().get(name).map(|s| s.alive).unwrap_or(false))
    }

    async fn is_agent_running(&self, name: &str) -> Result<bool, MuxError> {
        let sessions = self.sessions.lock();
        match sessions.get(name) {
            Some(s) if s.alive => Ok(s.agent_running),
            Some(_) | None => Err(MuxError::NotFound(name.to_string())),
        }
    }

    async fn capture_output(&self, name: &str, _lines: u32) -> Result<String, MuxError> {
        let sessions = self.sessions.lock();
        match sessions.get(name) {
            Some(s) if s.alive => Ok(s.pane_output.clone()),
            Some(_) | None => Err(MuxError::NotFound(name.to_string())),
        }
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fakes for gateway tests.

use async_trait::async_trait;
use ds_adapters::{TurnEntry, TurnRole};
use ds_core::{
    ConversationState, LaunchMode, SessionError, SessionKind, SessionRecord, SessionStatus,
    WaitParams, WaitResult,
};
use ds_engine::{CreateSessionOptions, SessionService};
use parking_lot::Mutex;
use std::sync::Arc;

/// A call observed by the fake service, for assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceCall {
    Create { path: String, kind: SessionKind },
    Send { handle: String, text: String },
    Kill { handle: String },
    List,
    Status { handle: String },
    Wait { handle: String, timeout_secs: u64 },
    LastMessages { handle: String, n: usize },
    Logs { handle: String },
    Inspect { handle: String },
}

#[derive(Default)]
pub struct FakeServiceState {
    pub calls: Vec<ServiceCall>,
    /// Handles the service knows about.
    pub known: Vec<String>,
    /// When set, waits report a timeout instead of completion.
    pub wait_times_out: bool,
}

/// In-memory session service for exercising the HTTP relay.
#[derive(Clone, Default)]
pub struct FakeService {
    pub state: Arc<Mutex<FakeServiceState>>,
}

impl FakeService {
    pub fn with_session(handle: &str) -> Self {
        let fake = Self::default();
        fake.state.lock().known.push(handle.to_string());
        fake
    }

    fn check_known(&self, handle: &str) -> Result<(), SessionError> {
        if self.state.lock().known.iter().any(|h| h == handle) {
            Ok(())
        } else {
            Err(SessionError::NotFound(handle.to_string()))
        }
    }

    pub fn record_for(handle: &str, path: &str) -> SessionRecord {
        SessionRecord {
            handle: handle.into(),
            internal_id: format!("internal-{handle}"),
            kind: SessionKind::Claude,
            mode: LaunchMode::Interactive,
            workspace_path: path.into(),
            description: None,
            status: SessionStatus::Active,
            daemon_pid: None,
            daemon_port: None,
            model: None,
            turn_in_progress: None,
            last_turn_completed_at: None,
            term_baseline_completion_count: None,
            last_turn_outcome: None,
            last_turn_error: None,
            last_assistant_messages: None,
            created_at: "2026-08-01T10:00:00.000Z".into(),
            last_used: "2026-08-01T10:00:00.000Z".into(),
        }
    }
}

#[async_trait]
impl SessionService for FakeService {
    async fn create_session(
        &self,
        opts: CreateSessionOptions,
    ) -> Result<SessionRecord, SessionError> {
        let path = opts.workspace_path.to_string_lossy().into_owned();
        self.state.lock().calls.push(ServiceCall::Create {
            path: path.clone(),
            kind: opts.kind,
        });
        self.state.lock().known.push("fizz-top".into());
        Ok(Self::record_for("fizz-top", &path))
    }

    async fn send_message(&self, handle: &str, text: &str) -> Result<(), SessionError> {
        self.check_known(handle)?;
        self.state.lock().calls.push(ServiceCall::Send {
            handle: handle.into(),
            text: text.into(),
        });
        Ok(())
    }

    async fn kill_session(&self, handle: &str) -> Result<(), SessionError> {
        self.check_known(handle)?;
        let mut state = self.state.lock();
        state.calls.push(ServiceCall::Kill {
            handle: handle.into(),
        });
        state.known.retain(|h| h != handle);
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, SessionError> {
        let mut state = self.state.lock();
        state.calls.push(ServiceCall::List);
        Ok(state
            .known
            .iter()
            .map(|h| Self::record_for(h, "/tmp/proj"))
            .collect())
    }

    async fn get_session_status(
        &self,
        handle: &str,
    ) -> Result<ConversationState, SessionError> {
        self.check_known(handle)?;
        self.state.lock().calls.push(ServiceCall::Status {
            handle: handle.into(),
        });
        Ok(ConversationState::Idle)
    }

    async fn wait_for_session(
        &self,
        handle: &str,
        params: WaitParams,
    ) -> Result<WaitResult, SessionError> {
        self.check_known(handle)?;
        let times_out = {
            let mut state = self.state.lock();
            state.calls.push(ServiceCall::Wait {
                handle: handle.into(),
                timeout_secs: params.timeout.as_secs(),
            });
            state.wait_times_out
        };
        Ok(if times_out {
            WaitResult::timed_out(params.timeout.as_millis() as u64)
        } else {
            WaitResult::completed(42)
        })
    }

    async fn get_last_messages(
        &self,
        handle: &str,
        n: usize,
    ) -> Result<Vec<String>, SessionError> {
        self.check_known(handle)?;
        self.state.lock().calls.push(ServiceCall::LastMessages {
            handle: handle.into(),
            n,
        });
        Ok(vec!["PONG".into()])
    }

    async fn get_logs(&self, handle: &str) -> Result<Vec<TurnEntry>, SessionError> {
        self.check_known(handle)?;
        self.state.lock().calls.push(ServiceCall::Logs {
            handle: handle.into(),
        });
        Ok(vec![
            TurnEntry {
                role: TurnRole::Human,
                text: "Reply PONG".into(),
            },
            TurnEntry {
                role: TurnRole::Assistant,
                text: "PONG".into(),
            },
        ])
    }

    async fn inspect_session(&self, handle: &str) -> Result<SessionRecord, SessionError> {
        self.check_known(handle)?;
        self.state.lock().calls.push(ServiceCall::Inspect {
            handle: handle.into(),
        });
        Ok(Self::record_for(handle, "/tmp/proj"))
    }
}

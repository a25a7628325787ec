// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Codex backend: thread lifecycle over the shared app-server.
//!
//! Every operation opens its own connection, does the work, and closes.
//! That keeps cross-thread notification interleaving bounded, forces a
//! fresh `thread/resume` subscription per operation, and makes
//! retry-after-reset a local decision here.

use super::client::RpcClient;
use super::daemon::{DaemonManager, DaemonState};
use super::{matches_any, THREAD_GONE_PATTERNS, TRANSPORT_PATTERNS, UNMATERIALIZED_PATTERNS};
use crate::backend::{
    CreateRequest, CreateResult, DeadSessionPolicy, SessionBackend, StatusOutcome, TurnEntry,
    TurnRole, WaitOutcome,
};
use crate::transcript;
use async_trait::async_trait;
use ds_core::{
    ConversationState, LaunchMode, Liveness, RuntimeStatus, SessionError, SessionKind,
    SessionPatch, SessionRecord, TurnOutcome, WaitParams, WaitResult,
};
use serde_json::{json, Value};
use std::time::{Duration, Instant};

/// Cap on the cached assistant-message history per session.
const MESSAGE_CACHE_LIMIT: usize = 20;

/// `thread/read` / existence-check errors meaning the thread is gone.
const EXISTS_DEAD_PATTERNS: &[&str] = &["not loaded", "not found", "no rollout"];

struct Connection {
    client: RpcClient,
    state: DaemonState,
}

/// Backend driving Codex threads over JSON-RPC WebSocket.
#[derive(Clone, Default)]
pub struct CodexBackend {
    daemon: DaemonManager,
}

impl CodexBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// For tests: a backend whose daemon state lives at explicit paths.
    pub fn with_daemon(daemon: DaemonManager) -> Self {
        Self { daemon }
    }

    pub fn daemon(&self) -> &DaemonManager {
        &self.daemon
    }

    /// Ensure the daemon, connect, and shake hands. A connect-phase
    /// failure in the transport family resets the daemon and retries
    /// exactly once.
    async fn connect(&self) -> Result<Connection, SessionError> {
        let state = self.daemon.ensure_server().await?;
        match open_client(&state).await {
            Ok(client) => Ok(Connection { client, state }),
            Err(e) if is_transport_family(&e) => {
                tracing::warn!(error = %e, pid = state.pid, "connect failed, resetting daemon and retrying once");
                self.daemon.reset_server(Some((state.pid, state.port)));
                let state = self.daemon.ensure_server().await?;
                let client = open_client(&state).await?;
                Ok(Connection { client, state })
            }
            Err(e) => Err(e),
        }
    }

    /// `thread/resume` with our fixed policy parameters.
    async fn resume(
        &self,
        client: &RpcClient,
        thread_id: &str,
        record: &SessionRecord,
    ) -> Result<Value, SessionError> {
        client
            .request(
                "thread/resume",
                json!({
                    "threadId": thread_id,
                    "cwd": record.workspace_path,
                    "model": record.model,
                    "approvalPolicy": "never",
                    "sandbox": "danger-full-access",
                    "persistExtendedHistory": true,
                }),
            )
            .await
    }

    async fn read_thread(
        &self,
        client: &RpcClient,
        thread_id: &str,
        include_turns: bool,
    ) -> Result<Value, SessionError> {
        client
            .request(
                "thread/read",
                json!({"threadId": thread_id, "includeTurns": include_turns}),
            )
            .await
    }

    /// Runtime status of a thread as the server reports it, via a
    /// single resume cycle.
    pub async fn get_thread_runtime_status(
        &self,
        record: &SessionRecord,
    ) -> Result<RuntimeStatus, SessionError> {
        let conn = self.connect().await?;
        let resumed = self.resume(&conn.client, &record.internal_id, record).await;
        conn.client.close().await;
        Ok(runtime_status(resumed?.get("thread").unwrap_or(&Value::Null)))
    }

    /// Public wait entry point with an optional precise turn id; the
    /// capability-trait `wait` calls this without one.
    pub async fn wait_for_thread(
        &self,
        record: &SessionRecord,
        params: WaitParams,
        expected_turn_id: Option<&str>,
    ) -> WaitOutcome {
        match self.wait_inner(record, params, expected_turn_id).await {
            Ok(outcome) => outcome,
            Err(e) => WaitOutcome {
                result: WaitResult {
                    completed: false,
                    timed_out: false,
                    error: Some(e.to_string()),
                    ..Default::default()
                },
                patch: SessionPatch::default(),
                error_to_throw: Some(e),
            },
        }
    }

    async fn wait_inner(
        &self,
        record: &SessionRecord,
        params: WaitParams,
        expected_turn_id: Option<&str>,
    ) -> Result<WaitOutcome, SessionError> {
        let thread_id = record.internal_id.clone();
        if thread_id.is_empty() {
            return Err(SessionError::Validation(format!(
                "session {} has no thread id to wait on",
                record.handle
            )));
        }

        let start = Instant::now();
        let deadline = start + params.timeout;

        // Precise path: the caller knows exactly which turn it cares
        // about, so a single subscribe-and-wait cycle suffices.
        if let Some(turn_id) = expected_turn_id {
            let conn = self.connect().await?;
            if let Err(e) = self.resume(&conn.client, &thread_id, record).await {
                conn.client.close().await;
                return Err(e);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            let tw = conn
                .client
                .wait_for_turn_completion(remaining, Some(&thread_id), Some(turn_id))
                .await;
            conn.client.close().await;
            return Ok(turn_wait_outcome(record, tw, start.elapsed()));
        }

        // Loop path: the server's thread-status flag is the only hint.
        // A logical task may span several turns, so a completed turn
        // sends us around again until the thread settles at idle.
        let mut saw_active = false;
        let mut assistant_text = String::new();

        loop {
            if Instant::now() >= deadline {
                return Ok(WaitOutcome {
                    result: WaitResult::timed_out(start.elapsed().as_millis() as u64),
                    patch: SessionPatch::default(),
                    error_to_throw: None,
                });
            }

            let conn = self.connect().await?;
            let thread = match self.resume(&conn.client, &thread_id, record).await {
                Ok(v) => v,
                Err(e) => {
                    conn.client.close().await;
                    return Err(e);
                }
            };

            match runtime_status(thread.get("thread").unwrap_or(&Value::Null)) {
                RuntimeStatus::Active => {
                    saw_active = true;
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    let tw = conn
                        .client
                        .wait_for_turn_completion(remaining, Some(&thread_id), None)
                        .await;
                    conn.client.close().await;

                    if !tw.assistant_text.is_empty() {
                        assistant_text = tw.assistant_text.clone();
                    }
                    if tw.timed_out {
                        return Ok(WaitOutcome {
                            result: WaitResult::timed_out(start.elapsed().as_millis() as u64),
                            patch: SessionPatch::default(),
                            error_to_throw: None,
                        });
                    }
                    match tw.status {
                        TurnOutcome::Completed if tw.error.is_none() => continue,
                        _ => return Ok(turn_wait_outcome(record, tw, start.elapsed())),
                    }
                }
                RuntimeStatus::SystemError => {
                    conn.client.close().await;
                    return Ok(failed_outcome(
                        "Codex thread is in systemError state",
                        start.elapsed(),
                    ));
                }
                RuntimeStatus::Unknown => {
                    conn.client.close().await;
                    return Ok(failed_outcome(
                        "Unable to determine Codex thread status",
                        start.elapsed(),
                    ));
                }
                RuntimeStatus::Idle | RuntimeStatus::NotLoaded => {
                    conn.client.close().await;
                    let elapsed_ms = if saw_active {
                        start.elapsed().as_millis() as u64
                    } else {
                        0
                    };
                    let mut patch = SessionPatch {
                        turn_in_progress: Some(None),
                        ..Default::default()
                    };
                    let mut result = WaitResult::completed(elapsed_ms);
                    if saw_active {
                        patch.last_turn_outcome = Some(Some(TurnOutcome::Completed));
                        patch.last_turn_error = Some(None);
                        patch.last_turn_completed_at = Some(Some(ds_core::now_iso()));
                        if !assistant_text.is_empty() {
                            patch.last_assistant_messages =
                                Some(Some(append_cached_message(record, &assistant_text)));
                            result.assistant_text = Some(assistant_text);
                        }
                    }
                    return Ok(WaitOutcome {
                        result,
                        patch,
                        error_to_throw: None,
                    });
                }
            }
        }
    }
}

async fn open_client(state: &DaemonState) -> Result<RpcClient, SessionError> {
    let client = RpcClient::connect(&state.url).await?;
    client
        .request(
            "initialize",
            json!({
                "clientInfo": {
                    "name": "dev-sessions",
                    "title": "dev-sessions",
                    "version": env!("CARGO_PKG_VERSION"),
                }
            }),
        )
        .await?;
    client.notify("initialized", json!({}))?;
    Ok(client)
}

fn is_transport_family(e: &SessionError) -> bool {
    e.is_transport() || matches_any(&e.to_string(), TRANSPORT_PATTERNS)
}

/// Map the server's transitional `thread.status` shapes.
fn runtime_status(thread: &Value) -> RuntimeStatus {
    match thread.get("status") {
        None | Some(Value::Null) => RuntimeStatus::Idle,
        Some(Value::String(s)) => match s.as_str() {
            "idle" => RuntimeStatus::Idle,
            "notLoaded" => RuntimeStatus::NotLoaded,
            "systemError" => RuntimeStatus::SystemError,
            _ => RuntimeStatus::Unknown,
        },
        Some(Value::Object(map)) if map.contains_key("active") => RuntimeStatus::Active,
        Some(_) => RuntimeStatus::Unknown,
    }
}

/// Outcome for a terminal (non-continuing) turn wait result.
fn turn_wait_outcome(
    record: &SessionRecord,
    tw: super::client::TurnWaitResult,
    elapsed: Duration,
) -> WaitOutcome {
    let elapsed_ms = elapsed.as_millis() as u64;
    if tw.timed_out {
        // Server state stays authoritative on timeout: no outcome fields
        // are touched.
        return WaitOutcome {
            result: WaitResult::timed_out(elapsed_ms),
            patch: SessionPatch::default(),
            error_to_throw: None,
        };
    }
    match tw.status {
        TurnOutcome::Completed if tw.error.is_none() => {
            let mut patch = SessionPatch {
                turn_in_progress: Some(None),
                last_turn_outcome: Some(Some(TurnOutcome::Completed)),
                last_turn_error: Some(None),
                last_turn_completed_at: Some(Some(ds_core::now_iso())),
                ..Default::default()
            };
            let mut result = WaitResult::completed(elapsed_ms);
            if !tw.assistant_text.is_empty() {
                patch.last_assistant_messages =
                    Some(Some(append_cached_message(record, &tw.assistant_text)));
                result.assistant_text = Some(tw.assistant_text);
            }
            WaitOutcome {
                result,
                patch,
                error_to_throw: None,
            }
        }
        TurnOutcome::Failed => {
            let message = tw.error.unwrap_or_else(|| "turn failed".to_string());
            WaitOutcome {
                result: WaitResult {
                    completed: false,
                    timed_out: false,
                    elapsed_ms,
                    status: Some(TurnOutcome::Failed),
                    error: Some(message.clone()),
                    assistant_text: None,
                },
                patch: SessionPatch {
                    turn_in_progress: Some(None),
                    last_turn_outcome: Some(Some(TurnOutcome::Failed)),
                    last_turn_error: Some(Some(message.clone())),
                    ..Default::default()
                },
                error_to_throw: Some(SessionError::TurnFailed(message)),
            }
        }
        TurnOutcome::Completed | TurnOutcome::Interrupted => WaitOutcome {
            result: WaitResult {
                completed: false,
                timed_out: false,
                elapsed_ms,
                status: Some(TurnOutcome::Interrupted),
                error: tw.error.clone(),
                assistant_text: None,
            },
            patch: SessionPatch {
                turn_in_progress: Some(None),
                last_turn_outcome: Some(Some(TurnOutcome::Interrupted)),
                last_turn_error: Some(tw.error),
                ..Default::default()
            },
            error_to_throw: None,
        },
    }
}

fn failed_outcome(message: &str, elapsed: Duration) -> WaitOutcome {
    WaitOutcome {
        result: WaitResult {
            completed: false,
            timed_out: false,
            elapsed_ms: elapsed.as_millis() as u64,
            status: Some(TurnOutcome::Failed),
            error: Some(message.to_string()),
            assistant_text: None,
        },
        patch: SessionPatch {
            turn_in_progress: Some(None),
            last_turn_outcome: Some(Some(TurnOutcome::Failed)),
            last_turn_error: Some(Some(message.to_string())),
            ..Default::default()
        },
        error_to_throw: None,
    }
}

fn append_cached_message(record: &SessionRecord, text: &str) -> Vec<String> {
    let mut messages = record.last_assistant_messages.clone().unwrap_or_default();
    messages.push(text.to_string());
    if messages.len() > MESSAGE_CACHE_LIMIT {
        let drop = messages.len() - MESSAGE_CACHE_LIMIT;
        messages.drain(..drop);
    }
    messages
}

/// Flatten thread/read turns into role/text entries.
fn thread_turn_entries(thread: &Value) -> Vec<TurnEntry> {
    let mut entries = Vec::new();
    let turns = thread
        .get("thread")
        .and_then(|t| t.get("turns"))
        .and_then(Value::as_array);
    let Some(turns) = turns else {
        return entries;
    };
    for turn in turns {
        let Some(items) = turn.get("items").and_then(Value::as_array) else {
            continue;
        };
        for item in items {
            let role = match item.get("type").and_then(Value::as_str) {
                Some("userMessage") => TurnRole::Human,
                Some("agentMessage") => TurnRole::Assistant,
                _ => continue,
            };
            let text = item
                .get("text")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| {
                    item.get("content")
                        .map(|c| transcript::extract_text(c).join("\n"))
                })
                .unwrap_or_default();
            if !text.is_empty() {
                entries.push(TurnEntry { role, text });
            }
        }
    }
    entries
}

#[async_trait]
impl SessionBackend for CodexBackend {
    fn kind(&self) -> SessionKind {
        SessionKind::Codex
    }

    fn dead_session_policy(&self) -> DeadSessionPolicy {
        DeadSessionPolicy::Deactivate
    }

    async fn is_handle_taken(&self, _handle: &str) -> bool {
        // Thread ids are server-generated; handles have no live namespace
        // on the Codex side.
        false
    }

    async fn create(&self, request: &CreateRequest) -> Result<CreateResult, SessionError> {
        let conn = self.connect().await?;
        let started = conn
            .client
            .request(
                "thread/start",
                json!({"cwd": request.workspace_path, "model": request.model}),
            )
            .await;
        conn.client.close().await;

        let thread_id = started?
            .get("thread")
            .and_then(|t| t.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                SessionError::Protocol("thread/start returned no thread id".into())
            })?;

        tracing::info!(thread_id = %thread_id, pid = conn.state.pid, "codex thread started");

        Ok(CreateResult {
            internal_id: thread_id,
            mode: LaunchMode::Daemon,
            daemon_pid: Some(conn.state.pid),
            daemon_port: Some(conn.state.port),
            model: request.model.clone(),
        })
    }

    async fn pre_send_fields(&self, _record: &SessionRecord) -> SessionPatch {
        SessionPatch {
            turn_in_progress: Some(Some(true)),
            ..Default::default()
        }
    }

    async fn send(
        &self,
        record: &SessionRecord,
        text: &str,
    ) -> Result<SessionPatch, SessionError> {
        let conn = self.connect().await?;
        let result = self.send_on(&conn, record, text).await;
        conn.client.close().await;
        result
    }

    async fn status(&self, record: &SessionRecord) -> Result<StatusOutcome, SessionError> {
        let state = match self.get_thread_runtime_status(record).await? {
            RuntimeStatus::Active => ConversationState::Working,
            RuntimeStatus::Idle | RuntimeStatus::NotLoaded => ConversationState::Idle,
            RuntimeStatus::SystemError => {
                return Ok(StatusOutcome {
                    state: ConversationState::Idle,
                    patch: SessionPatch::default(),
                    error_to_throw: Some(SessionError::Backend(
                        "Codex thread is in systemError state".into(),
                    )),
                })
            }
            RuntimeStatus::Unknown => {
                tracing::warn!(handle = %record.handle, "unrecognized thread status shape");
                ConversationState::Idle
            }
        };

        // A resume that comes back idle clears a stale in-progress flag.
        let patch = if state == ConversationState::Idle && record.turn_in_progress == Some(true) {
            SessionPatch {
                turn_in_progress: Some(None),
                ..Default::default()
            }
        } else {
            SessionPatch::default()
        };

        Ok(StatusOutcome {
            state,
            patch,
            error_to_throw: None,
        })
    }

    async fn wait(&self, record: &SessionRecord, params: WaitParams) -> WaitOutcome {
        self.wait_for_thread(record, params, None).await
    }

    async fn exists(&self, record: &SessionRecord) -> Liveness {
        if !self.daemon.is_server_running(record.daemon_pid) {
            return Liveness::Dead;
        }
        if record.internal_id.is_empty() {
            return Liveness::Alive;
        }

        let conn = match self.connect().await {
            Ok(c) => c,
            Err(_) => return Liveness::Unknown,
        };
        let read = self
            .read_thread(&conn.client, &record.internal_id, false)
            .await;
        conn.client.close().await;

        match read {
            Ok(_) => Liveness::Alive,
            Err(e) if matches_any(&e.to_string(), EXISTS_DEAD_PATTERNS) => Liveness::Dead,
            Err(e) => {
                tracing::warn!(handle = %record.handle, error = %e, "existence check inconclusive");
                Liveness::Unknown
            }
        }
    }

    async fn get_logs(&self, record: &SessionRecord) -> Result<Vec<TurnEntry>, SessionError> {
        let conn = self.connect().await?;
        let read = self
            .read_thread(&conn.client, &record.internal_id, true)
            .await;
        conn.client.close().await;

        match read {
            Ok(thread) => Ok(thread_turn_entries(&thread)),
            Err(e) if matches_any(&e.to_string(), UNMATERIALIZED_PATTERNS) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn get_last_messages(
        &self,
        record: &SessionRecord,
        n: usize,
    ) -> Result<Vec<String>, SessionError> {
        let conn = self.connect().await?;
        let read = self
            .read_thread(&conn.client, &record.internal_id, true)
            .await;
        conn.client.close().await;

        match read {
            Ok(thread) => {
                let mut texts: Vec<String> = thread_turn_entries(&thread)
                    .into_iter()
                    .filter(|e| e.role == TurnRole::Assistant)
                    .map(|e| e.text)
                    .collect();
                let keep = n.max(1).min(texts.len());
                Ok(texts.split_off(texts.len() - keep))
            }
            Err(e) if matches_any(&e.to_string(), UNMATERIALIZED_PATTERNS) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn kill(&self, record: &SessionRecord) -> Result<(), SessionError> {
        let (Some(pid), Some(port)) = (record.daemon_pid, record.daemon_port) else {
            return Ok(());
        };
        if record.internal_id.is_empty() {
            return Ok(());
        }
        let Some(state) = self.daemon.get_server() else {
            return Ok(());
        };
        if state.pid != pid || state.port != port {
            // The daemon this thread lived in is gone; nothing to archive.
            return Ok(());
        }

        match open_client(&state).await {
            Ok(client) => {
                let res = client
                    .request("thread/archive", json!({"threadId": record.internal_id}))
                    .await;
                client.close().await;
                match res {
                    Ok(_) => Ok(()),
                    Err(e)
                        if matches_any(&e.to_string(), THREAD_GONE_PATTERNS)
                            || is_transport_family(&e) =>
                    {
                        tracing::debug!(handle = %record.handle, error = %e, "archive skipped");
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) if is_transport_family(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn after_kill(&self, remaining_active: &[SessionRecord]) {
        let codex_left = remaining_active
            .iter()
            .any(|r| r.kind == SessionKind::Codex && r.is_active());
        if !codex_left {
            tracing::info!("no active codex sessions remain; stopping shared daemon");
            self.daemon.stop_server();
        }
    }
}

impl CodexBackend {
    async fn send_on(
        &self,
        conn: &Connection,
        record: &SessionRecord,
        text: &str,
    ) -> Result<SessionPatch, SessionError> {
        let mut thread_id = record.internal_id.clone();

        if !thread_id.is_empty() {
            match self.resume(&conn.client, &thread_id, record).await {
                Ok(_) => {}
                Err(e) if matches_any(&e.to_string(), THREAD_GONE_PATTERNS) => {
                    tracing::info!(handle = %record.handle, stale = %thread_id, "thread gone, starting fresh");
                    thread_id.clear();
                }
                Err(e) => return Err(e),
            }
        }

        if thread_id.is_empty() {
            let started = conn
                .client
                .request(
                    "thread/start",
                    json!({"cwd": record.workspace_path, "model": record.model}),
                )
                .await?;
            thread_id = started
                .get("thread")
                .and_then(|t| t.get("id"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    SessionError::Protocol("thread/start returned no thread id".into())
                })?;
        }

        let turn = conn
            .client
            .request(
                "turn/start",
                json!({
                    "threadId": thread_id,
                    "input": [{"type": "text", "text": text}],
                }),
            )
            .await?;
        let turn_id = turn
            .get("turn")
            .and_then(|t| t.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SessionError::Protocol("turn/start returned no turn id".into()))?;

        let mut patch = SessionPatch {
            internal_id: Some(thread_id.clone()),
            daemon_pid: Some(Some(conn.state.pid)),
            daemon_port: Some(Some(conn.state.port)),
            ..Default::default()
        };

        // Best-effort fast capture of an immediately-finishing turn,
        // matched strictly to the turn we just started.
        let captured = conn
            .client
            .wait_for_turn_completion(
                crate::env::fast_capture_window(),
                Some(&thread_id),
                Some(&turn_id),
            )
            .await;
        if !captured.timed_out
            && captured.status == TurnOutcome::Completed
            && captured.error.is_none()
        {
            patch.turn_in_progress = Some(None);
            patch.last_turn_outcome = Some(Some(TurnOutcome::Completed));
            patch.last_turn_error = Some(None);
            patch.last_turn_completed_at = Some(Some(ds_core::now_iso()));
            if !captured.assistant_text.is_empty() {
                patch.last_assistant_messages =
                    Some(Some(append_cached_message(record, &captured.assistant_text)));
            }
        } else {
            patch.turn_in_progress = Some(Some(true));
        }

        Ok(patch)
    }
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;

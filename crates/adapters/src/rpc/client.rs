// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One JSON-RPC 2.0 connection to the Codex app-server.
//!
//! A client owns exactly one WebSocket: one request-id space, one
//! accumulator for streamed assistant deltas, one set of turn waiters.
//! Frames are one JSON object per text frame, newline-terminated on the
//! wire. Writes are serialized through a channel to a single writer
//! task; responses and notifications are routed concurrently by a
//! single reader task.

use ds_core::{SessionError, TurnOutcome};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

/// Per-request deadline.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// Grace period for a clean WebSocket close before forced termination.
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// What a turn waiter resolves with.
#[derive(Debug, Clone)]
pub struct TurnWaitResult {
    pub status: TurnOutcome,
    pub error: Option<String>,
    pub timed_out: bool,
    pub assistant_text: String,
    pub thread_id: Option<String>,
    pub turn_id: Option<String>,
}

struct Pending {
    method: String,
    tx: oneshot::Sender<Result<Value, SessionError>>,
}

struct Waiter {
    id: u64,
    expected_thread_id: Option<String>,
    expected_turn_id: Option<String>,
    tx: oneshot::Sender<TurnWaitResult>,
}

/// Last observed turn activity on this connection.
#[derive(Default)]
struct TurnState {
    text: String,
    status: Option<TurnOutcome>,
    error: Option<String>,
    thread_id: Option<String>,
    turn_id: Option<String>,
}

impl TurnState {
    fn snapshot(&self, timed_out: bool) -> TurnWaitResult {
        TurnWaitResult {
            status: self.status.unwrap_or(TurnOutcome::Interrupted),
            error: self.error.clone(),
            timed_out,
            assistant_text: self.text.clone(),
            thread_id: self.thread_id.clone(),
            turn_id: self.turn_id.clone(),
        }
    }
}

struct Shared {
    next_request_id: u64,
    next_waiter_id: u64,
    pending: HashMap<u64, Pending>,
    waiters: Vec<Waiter>,
    turn: TurnState,
    closing: bool,
    closed: bool,
}

impl Shared {
    fn new() -> Self {
        Self {
            next_request_id: 1,
            next_waiter_id: 1,
            pending: HashMap::new(),
            waiters: Vec::new(),
            turn: TurnState::default(),
            closing: false,
            closed: false,
        }
    }
}

/// One WebSocket JSON-RPC connection.
pub struct RpcClient {
    shared: Arc<Mutex<Shared>>,
    out_tx: mpsc::UnboundedSender<Message>,
    tasks: Mutex<Option<(JoinHandle<()>, JoinHandle<()>)>>,
}

impl RpcClient {
    /// Open a connection to `url` (`ws://127.0.0.1:<port>`).
    pub async fn connect(url: &str) -> Result<Self, SessionError> {
        let (ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| SessionError::Transport(format!("websocket connect to {url} failed: {e}")))?;
        let (mut sink, mut stream) = ws.split();

        let shared = Arc::new(Mutex::new(Shared::new()));
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();

        let write_task = tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                if sink.send(msg).await.is_err() {
                    break;
                }
            }
        });

        let read_shared = Arc::clone(&shared);
        let read_task = tokio::spawn(async move {
            loop {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => route_frame(&read_shared, text.as_str()),
                    Some(Ok(Message::Close(_))) | None => {
                        fail_all(&read_shared, "connection closed");
                        break;
                    }
                    Some(Err(e)) => {
                        fail_all(&read_shared, &format!("websocket error: {e}"));
                        break;
                    }
                    Some(Ok(_)) => {} // Ping/Pong/Binary
                }
            }
        });

        Ok(Self {
            shared,
            out_tx,
            tasks: Mutex::new(Some((read_task, write_task))),
        })
    }

    /// Send a request and await its correlated response.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, SessionError> {
        let (id, rx) = {
            let mut shared = self.shared.lock();
            if shared.closed || shared.closing {
                return Err(SessionError::Transport(format!(
                    "{method}: connection closed"
                )));
            }
            let id = shared.next_request_id;
            shared.next_request_id += 1;
            let (tx, rx) = oneshot::channel();
            shared.pending.insert(
                id,
                Pending {
                    method: method.to_string(),
                    tx,
                },
            );
            (id, rx)
        };

        self.send_frame(json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))?;

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SessionError::Transport(format!(
                "{method}: connection closed"
            ))),
            Err(_) => {
                self.shared.lock().pending.remove(&id);
                Err(SessionError::Timeout {
                    method: method.to_string(),
                    timeout: REQUEST_TIMEOUT,
                })
            }
        }
    }

    /// Send a notification (no id, no response).
    pub fn notify(&self, method: &str, params: Value) -> Result<(), SessionError> {
        self.send_frame(json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        }))
    }

    fn send_frame(&self, frame: Value) -> Result<(), SessionError> {
        let mut payload = frame.to_string();
        payload.push('\n');
        self.out_tx
            .send(Message::text(payload))
            .map_err(|_| SessionError::Transport("connection closed".into()))
    }

    /// Wait for a `turn/completed` matching the expectations (an absent
    /// expectation matches anything). Returns immediately if a matching
    /// completion was already observed on this connection.
    ///
    /// On timeout the turn is marked interrupted and the result carries
    /// `timed_out: true`.
    pub async fn wait_for_turn_completion(
        &self,
        timeout: Duration,
        expected_thread_id: Option<&str>,
        expected_turn_id: Option<&str>,
    ) -> TurnWaitResult {
        let (waiter_id, rx) = {
            let mut shared = self.shared.lock();
            if shared.closed || shared.closing {
                return failure_result(&shared.turn, "connection closed");
            }
            if shared.turn.status.is_some() {
                let thread_ok = expected_thread_id
                    .is_none_or(|e| shared.turn.thread_id.as_deref() == Some(e));
                let turn_ok =
                    expected_turn_id.is_none_or(|e| shared.turn.turn_id.as_deref() == Some(e));
                if thread_ok && turn_ok {
                    return shared.turn.snapshot(false);
                }
            }
            let id = shared.next_waiter_id;
            shared.next_waiter_id += 1;
            let (tx, rx) = oneshot::channel();
            shared.waiters.push(Waiter {
                id,
                expected_thread_id: expected_thread_id.map(str::to_string),
                expected_turn_id: expected_turn_id.map(str::to_string),
                tx,
            });
            (id, rx)
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                let shared = self.shared.lock();
                failure_result(&shared.turn, "connection closed")
            }
            Err(_) => {
                let mut shared = self.shared.lock();
                shared.waiters.retain(|w| w.id != waiter_id);
                shared.turn.status = Some(TurnOutcome::Interrupted);
                shared.turn.error = Some(format!(
                    "Timed out waiting for turn completion after {}s",
                    timeout.as_secs()
                ));
                shared.turn.snapshot(true)
            }
        }
    }

    /// Graceful close with a hard deadline before forced termination.
    pub async fn close(&self) {
        self.shared.lock().closing = true;
        let _ = self.out_tx.send(Message::Close(None));

        let tasks = self.tasks.lock().take();
        if let Some((mut read_task, write_task)) = tasks {
            if tokio::time::timeout(CLOSE_GRACE, &mut read_task).await.is_err() {
                read_task.abort();
            }
            write_task.abort();
        }
        self.shared.lock().closed = true;
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        if let Some((read_task, write_task)) = self.tasks.lock().take() {
            read_task.abort();
            write_task.abort();
        }
    }
}

fn failure_result(turn: &TurnState, reason: &str) -> TurnWaitResult {
    TurnWaitResult {
        status: TurnOutcome::Failed,
        error: Some(reason.to_string()),
        timed_out: false,
        assistant_text: turn.text.clone(),
        thread_id: turn.thread_id.clone(),
        turn_id: turn.turn_id.clone(),
    }
}

/// Route one incoming text frame: a correlated response, or a
/// notification. Parse errors and unknown ids are dropped.
fn route_frame(shared: &Arc<Mutex<Shared>>, text: &str) {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return;
    }
    let Ok(frame) = serde_json::from_str::<Value>(trimmed) else {
        tracing::debug!("dropping unparseable frame");
        return;
    };

    if let Some(id) = frame.get("id").and_then(Value::as_u64) {
        if frame.get("result").is_some() || frame.get("error").is_some() {
            route_response(shared, id, &frame);
        }
        // Server-initiated requests (id + method) are not part of this
        // client's surface; drop them.
        return;
    }

    let Some(method) = frame.get("method").and_then(Value::as_str) else {
        return;
    };
    let params = frame.get("params").cloned().unwrap_or(Value::Null);
    route_notification(shared, method, &params);
}

fn route_response(shared: &Arc<Mutex<Shared>>, id: u64, frame: &Value) {
    let Some(pending) = shared.lock().pending.remove(&id) else {
        tracing::debug!(id, "response for unknown request id");
        return;
    };

    let outcome = match frame.get("error") {
        Some(error) => {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            Err(SessionError::Protocol(format!(
                "{} failed: {message}",
                pending.method
            )))
        }
        None => Ok(frame.get("result").cloned().unwrap_or(Value::Null)),
    };
    let _ = pending.tx.send(outcome);
}

fn route_notification(shared: &Arc<Mutex<Shared>>, method: &str, params: &Value) {
    match method {
        "item/agentMessage/delta" => {
            if let Some(delta) = params.get("delta").and_then(Value::as_str) {
                shared.lock().turn.text.push_str(delta);
            }
        }
        "turn/started" => {
            let mut state = shared.lock();
            state.turn = TurnState {
                thread_id: params
                    .get("threadId")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                turn_id: params
                    .get("turn")
                    .and_then(|t| t.get("id"))
                    .or_else(|| params.get("turnId"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                ..Default::default()
            };
        }
        "turn/completed" => {
            let thread_id = params
                .get("threadId")
                .and_then(Value::as_str)
                .map(str::to_string);
            let turn = params.get("turn").cloned().unwrap_or(Value::Null);
            let turn_id = turn.get("id").and_then(Value::as_str).map(str::to_string);
            let status = turn
                .get("status")
                .and_then(Value::as_str)
                .and_then(TurnOutcome::parse)
                .unwrap_or(TurnOutcome::Completed);
            let error = turn
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string);

            let mut state = shared.lock();
            state.turn.status = Some(status);
            state.turn.error = error;
            state.turn.thread_id = thread_id.clone();
            state.turn.turn_id = turn_id.clone();

            // Resolve only waiters whose expectations match; a completion
            // for some other thread on this daemon connection must not
            // release them.
            let snapshot = state.turn.snapshot(false);
            let mut kept = Vec::new();
            for waiter in state.waiters.drain(..) {
                let thread_ok = waiter
                    .expected_thread_id
                    .as_deref()
                    .is_none_or(|e| thread_id.as_deref() == Some(e));
                let turn_ok = waiter
                    .expected_turn_id
                    .as_deref()
                    .is_none_or(|e| turn_id.as_deref() == Some(e));
                if thread_ok && turn_ok {
                    let _ = waiter.tx.send(snapshot.clone());
                } else {
                    kept.push(waiter);
                }
            }
            state.waiters = kept;
        }
        _ => {}
    }
}

/// Reject every pending request and resolve every waiter with a failure.
fn fail_all(shared: &Arc<Mutex<Shared>>, reason: &str) {
    let mut state = shared.lock();
    state.closed = true;

    for (_, pending) in state.pending.drain() {
        let _ = pending.tx.send(Err(SessionError::Transport(format!(
            "{}: {reason}",
            pending.method
        ))));
    }

    let text = state.turn.text.clone();
    let thread_id = state.turn.thread_id.clone();
    let turn_id = state.turn.turn_id.clone();
    for waiter in state.waiters.drain(..) {
        let _ = waiter.tx.send(TurnWaitResult {
            status: TurnOutcome::Failed,
            error: Some(reason.to_string()),
            timed_out: false,
            assistant_text: text.clone(),
            thread_id: thread_id.clone(),
            turn_id: turn_id.clone(),
        });
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

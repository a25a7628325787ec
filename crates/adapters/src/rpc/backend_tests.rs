// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ds_core::SessionStatus;
use futures_util::{SinkExt, StreamExt};
use serial_test::serial;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type ServerWs = WebSocketStream<TcpStream>;

/// One scripted exchange on a server connection.
#[derive(Clone)]
enum Step {
    /// Expect a request for `method`, reply with this result.
    Reply(&'static str, Value),
    /// Expect a request for `method`, reply with this error message.
    ReplyError(&'static str, &'static str),
    /// Expect a notification for `method` (no reply).
    Expect(&'static str),
    /// Push a notification frame to the client.
    Push(Value),
    /// Pause, letting the client observe earlier frames.
    Sleep(u64),
}

fn handshake() -> Vec<Step> {
    vec![Step::Reply("initialize", json!({})), Step::Expect("initialized")]
}

async fn recv_frame(ws: &mut ServerWs) -> Value {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                return serde_json::from_str(text.as_str().trim()).unwrap()
            }
            Some(Ok(Message::Close(_))) | None => panic!("connection closed mid-script"),
            Some(Ok(_)) => continue,
            Some(Err(e)) => panic!("server read error: {e}"),
        }
    }
}

async fn send_frame(ws: &mut ServerWs, frame: Value) {
    let mut payload = frame.to_string();
    payload.push('\n');
    ws.send(Message::text(payload)).await.unwrap();
}

async fn run_script(mut ws: ServerWs, script: Vec<Step>) {
    for step in script {
        match step {
            Step::Reply(method, result) => {
                let req = recv_frame(&mut ws).await;
                assert_eq!(req["method"], method, "unexpected request order");
                send_frame(
                    &mut ws,
                    json!({"jsonrpc": "2.0", "id": req["id"], "result": result}),
                )
                .await;
            }
            Step::ReplyError(method, message) => {
                let req = recv_frame(&mut ws).await;
                assert_eq!(req["method"], method, "unexpected request order");
                send_frame(
                    &mut ws,
                    json!({"jsonrpc": "2.0", "id": req["id"],
                           "error": {"code": -32000, "message": message}}),
                )
                .await;
            }
            Step::Expect(method) => {
                let note = recv_frame(&mut ws).await;
                assert_eq!(note["method"], method, "unexpected notification");
            }
            Step::Push(frame) => send_frame(&mut ws, frame).await,
            Step::Sleep(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
        }
    }
    // Drain until the client closes.
    while let Some(Ok(msg)) = ws.next().await {
        if matches!(msg, Message::Close(_)) {
            break;
        }
    }
}

/// Serve one scripted connection per accept, in order.
async fn spawn_script_server(scripts: Vec<Vec<Step>>) -> (u16, JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        for script in scripts {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            run_script(ws, script).await;
        }
    });
    (port, handle)
}

/// Backend whose daemon state points at the scripted server.
fn backend_for(dir: &tempfile::TempDir, port: u16) -> CodexBackend {
    let state = DaemonState {
        version: 1,
        pid: std::process::id(),
        port,
        url: format!("ws://127.0.0.1:{port}"),
        started_at: "2026-08-01T10:00:00.000Z".into(),
    };
    let state_path = dir.path().join("rpc-daemon.json");
    std::fs::write(&state_path, serde_json::to_vec(&state).unwrap()).unwrap();
    CodexBackend::with_daemon(DaemonManager::at(
        state_path,
        dir.path().join("rpc-daemon.log"),
    ))
}

fn codex_record(thread_id: &str, port: u16) -> SessionRecord {
    SessionRecord {
        handle: "bold-star".into(),
        internal_id: thread_id.into(),
        kind: SessionKind::Codex,
        mode: LaunchMode::Daemon,
        workspace_path: "/tmp/proj".into(),
        description: None,
        status: SessionStatus::Active,
        daemon_pid: Some(std::process::id()),
        daemon_port: Some(port),
        model: Some("gpt-5-codex".into()),
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

fn wait_params(secs: u64) -> WaitParams {
    WaitParams {
        timeout: Duration::from_secs(secs),
        poll_interval: Duration::from_millis(50),
    }
}

#[tokio::test]
async fn create_starts_a_thread_and_reports_daemon_identity() {
    let dir = tempfile::tempdir().unwrap();
    let mut script = handshake();
    script.push(Step::Reply("thread/start", json!({"thread": {"id": "thr_new"}})));
    let (port, server) = spawn_script_server(vec![script]).await;
    let backend = backend_for(&dir, port);

    let result = backend
        .create(&CreateRequest {
            handle: "bold-star".into(),
            workspace_path: "/tmp/proj".into(),
            mode: LaunchMode::Daemon,
            description: None,
            model: Some("gpt-5-codex".into()),
        })
        .await
        .unwrap();

    assert_eq!(result.internal_id, "thr_new");
    assert_eq!(result.daemon_port, Some(port));
    assert_eq!(result.daemon_pid, Some(std::process::id()));
    assert_eq!(result.model.as_deref(), Some("gpt-5-codex"));
    server.await.unwrap();
}

// Spec scenario: the daemon answers resume with "no rollout", the send
// falls back to a fresh thread and the record is repointed at it.
#[tokio::test]
#[serial(ds_env)]
async fn send_falls_back_to_thread_start_when_resume_finds_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut script = handshake();
    script.extend([
        Step::ReplyError(
            "thread/resume",
            "no rollout found for thread id stale-thread",
        ),
        Step::Reply("thread/start", json!({"thread": {"id": "thr_new"}})),
        Step::Reply("turn/start", json!({"turn": {"id": "turn_1"}})),
        Step::Push(json!({"jsonrpc": "2.0", "method": "turn/started",
                          "params": {"threadId": "thr_new", "turn": {"id": "turn_1"}}})),
        Step::Push(json!({"jsonrpc": "2.0", "method": "item/agentMessage/delta",
                          "params": {"delta": "Hel"}})),
        Step::Push(json!({"jsonrpc": "2.0", "method": "item/agentMessage/delta",
                          "params": {"delta": "lo"}})),
        Step::Push(json!({"jsonrpc": "2.0", "method": "turn/completed",
                          "params": {"threadId": "thr_new",
                                     "turn": {"id": "turn_1", "status": "completed"}}})),
    ]);
    let (port, server) = spawn_script_server(vec![script]).await;
    let backend = backend_for(&dir, port);
    let record = codex_record("stale-thread", port);

    let patch = backend.send(&record, "say hi").await.unwrap();

    assert_eq!(patch.internal_id.as_deref(), Some("thr_new"));
    assert_eq!(patch.turn_in_progress, Some(None));
    assert_eq!(patch.last_turn_outcome, Some(Some(TurnOutcome::Completed)));
    assert_eq!(
        patch.last_assistant_messages,
        Some(Some(vec!["Hello".to_string()]))
    );
    server.await.unwrap();
}

#[tokio::test]
#[serial(ds_env)]
async fn send_without_fast_completion_leaves_turn_in_progress() {
    std::env::set_var("DEV_SESSIONS_FAST_CAPTURE_MS", "100");
    let dir = tempfile::tempdir().unwrap();
    let mut script = handshake();
    script.extend([
        Step::Reply("thread/resume", json!({"thread": {"id": "thr_1"}})),
        Step::Reply("turn/start", json!({"turn": {"id": "turn_9"}})),
    ]);
    let (port, server) = spawn_script_server(vec![script]).await;
    let backend = backend_for(&dir, port);
    let record = codex_record("thr_1", port);

    let patch = backend.send(&record, "long task").await.unwrap();
    std::env::remove_var("DEV_SESSIONS_FAST_CAPTURE_MS");

    assert_eq!(patch.turn_in_progress, Some(Some(true)));
    assert_eq!(patch.last_turn_outcome, None);
    server.await.unwrap();
}

// Spec scenario: a logical task spans two turns; wait keeps cycling
// until the thread settles at idle.
#[tokio::test]
async fn wait_continues_across_turns_until_idle() {
    let dir = tempfile::tempdir().unwrap();

    let active_cycle = |text: &'static str| {
        let mut s = handshake();
        s.extend([
            Step::Reply(
                "thread/resume",
                json!({"thread": {"id": "thr_1", "status": {"active": {}}}}),
            ),
            Step::Sleep(50),
            Step::Push(json!({"jsonrpc": "2.0", "method": "item/agentMessage/delta",
                              "params": {"delta": text}})),
            Step::Push(json!({"jsonrpc": "2.0", "method": "turn/completed",
                              "params": {"threadId": "thr_1",
                                         "turn": {"id": "x", "status": "completed"}}})),
        ]);
        s
    };
    let mut idle_cycle = handshake();
    idle_cycle.push(Step::Reply(
        "thread/resume",
        json!({"thread": {"id": "thr_1", "status": "idle"}}),
    ));

    let (port, server) =
        spawn_script_server(vec![active_cycle("part one"), active_cycle("part two"), idle_cycle])
            .await;
    let backend = backend_for(&dir, port);
    let record = codex_record("thr_1", port);

    let outcome = backend.wait(&record, wait_params(15)).await;

    assert!(outcome.result.completed);
    assert_eq!(outcome.result.status, Some(TurnOutcome::Completed));
    assert_eq!(outcome.result.assistant_text.as_deref(), Some("part two"));
    assert!(outcome.result.elapsed_ms > 0);
    assert_eq!(outcome.patch.turn_in_progress, Some(None));
    assert!(outcome.error_to_throw.is_none());
    server.await.unwrap();
}

#[tokio::test]
async fn wait_on_idle_thread_returns_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let mut script = handshake();
    // Absent status also reads as idle
    script.push(Step::Reply("thread/resume", json!({"thread": {"id": "thr_1"}})));
    let (port, server) = spawn_script_server(vec![script]).await;
    let backend = backend_for(&dir, port);
    let record = codex_record("thr_1", port);

    let outcome = backend.wait(&record, wait_params(15)).await;

    assert!(outcome.result.completed);
    assert_eq!(outcome.result.elapsed_ms, 0);
    server.await.unwrap();
}

#[tokio::test]
async fn wait_surfaces_failed_turn_as_error_after_patch() {
    let dir = tempfile::tempdir().unwrap();
    let mut script = handshake();
    script.extend([
        Step::Reply(
            "thread/resume",
            json!({"thread": {"id": "thr_1", "status": {"active": {}}}}),
        ),
        Step::Sleep(50),
        Step::Push(json!({"jsonrpc": "2.0", "method": "turn/completed",
                          "params": {"threadId": "thr_1",
                                     "turn": {"id": "x", "status": "failed",
                                              "error": {"message": "model exploded"}}}})),
    ]);
    let (port, server) = spawn_script_server(vec![script]).await;
    let backend = backend_for(&dir, port);
    let record = codex_record("thr_1", port);

    let outcome = backend.wait(&record, wait_params(15)).await;

    assert!(!outcome.result.completed);
    assert_eq!(outcome.patch.last_turn_outcome, Some(Some(TurnOutcome::Failed)));
    assert_eq!(
        outcome.patch.last_turn_error,
        Some(Some("model exploded".to_string()))
    );
    let err = outcome.error_to_throw.unwrap();
    assert_eq!(err.to_string(), "Codex turn failed: model exploded");
    server.await.unwrap();
}

#[tokio::test]
async fn wait_reports_system_error_state() {
    let dir = tempfile::tempdir().unwrap();
    let mut script = handshake();
    script.push(Step::Reply(
        "thread/resume",
        json!({"thread": {"id": "thr_1", "status": "systemError"}}),
    ));
    let (port, server) = spawn_script_server(vec![script]).await;
    let backend = backend_for(&dir, port);
    let record = codex_record("thr_1", port);

    let outcome = backend.wait(&record, wait_params(15)).await;

    assert!(!outcome.result.completed);
    assert_eq!(
        outcome.result.error.as_deref(),
        Some("Codex thread is in systemError state")
    );
    server.await.unwrap();
}

#[tokio::test]
async fn precise_wait_ignores_foreign_turn_completions() {
    let dir = tempfile::tempdir().unwrap();
    let mut script = handshake();
    script.extend([
        Step::Reply("thread/resume", json!({"thread": {"id": "thr_1"}})),
        Step::Push(json!({"jsonrpc": "2.0", "method": "turn/completed",
                          "params": {"threadId": "thr_1",
                                     "turn": {"id": "other-turn", "status": "completed"}}})),
        Step::Sleep(100),
        Step::Push(json!({"jsonrpc": "2.0", "method": "turn/completed",
                          "params": {"threadId": "thr_1",
                                     "turn": {"id": "turn_42", "status": "completed"}}})),
    ]);
    let (port, server) = spawn_script_server(vec![script]).await;
    let backend = backend_for(&dir, port);
    let record = codex_record("thr_1", port);

    let outcome = backend
        .wait_for_thread(&record, wait_params(15), Some("turn_42"))
        .await;

    assert!(outcome.result.completed);
    assert_eq!(outcome.result.status, Some(TurnOutcome::Completed));
    server.await.unwrap();
}

#[tokio::test]
async fn status_maps_runtime_states_and_clears_stale_flag() {
    let dir = tempfile::tempdir().unwrap();
    let mut script = handshake();
    script.push(Step::Reply(
        "thread/resume",
        json!({"thread": {"id": "thr_1", "status": "idle"}}),
    ));
    let (port, server) = spawn_script_server(vec![script]).await;
    let backend = backend_for(&dir, port);
    let mut record = codex_record("thr_1", port);
    record.turn_in_progress = Some(true);

    let outcome = backend.status(&record).await.unwrap();

    assert_eq!(outcome.state, ds_core::ConversationState::Idle);
    assert_eq!(outcome.patch.turn_in_progress, Some(None));
    server.await.unwrap();
}

#[tokio::test]
async fn last_messages_flatten_thread_read() {
    let dir = tempfile::tempdir().unwrap();
    let thread = json!({
        "thread": {
            "id": "thr_1",
            "turns": [
                {"items": [
                    {"type": "userMessage", "content": "say hi"},
                    {"type": "agentMessage", "text": "Hello"},
                ]},
                {"items": [
                    {"type": "userMessage", "text": "more"},
                    {"type": "agentMessage", "text": "World"},
                    {"type": "reasoning", "text": "ignored"},
                ]},
            ],
        }
    });
    let mut script = handshake();
    script.push(Step::Reply("thread/read", thread.clone()));
    let mut script2 = handshake();
    script2.push(Step::Reply("thread/read", thread));
    let (port, server) = spawn_script_server(vec![script, script2]).await;
    let backend = backend_for(&dir, port);
    let record = codex_record("thr_1", port);

    let last = backend.get_last_messages(&record, 1).await.unwrap();
    assert_eq!(last, vec!["World"]);

    let logs = backend.get_logs(&record).await.unwrap();
    assert_eq!(logs.len(), 4);
    assert_eq!(logs[0].role, TurnRole::Human);
    assert_eq!(logs[0].text, "say hi");
    assert_eq!(logs[3].text, "World");
    server.await.unwrap();
}

#[tokio::test]
async fn unmaterialized_thread_reads_as_empty_history() {
    let dir = tempfile::tempdir().unwrap();
    let mut script = handshake();
    script.push(Step::ReplyError(
        "thread/read",
        "includeTurns is unavailable before first user message",
    ));
    let (port, server) = spawn_script_server(vec![script]).await;
    let backend = backend_for(&dir, port);
    let record = codex_record("thr_1", port);

    let last = backend.get_last_messages(&record, 3).await.unwrap();
    assert!(last.is_empty());
    server.await.unwrap();
}

#[tokio::test]
async fn exists_maps_read_outcomes_to_liveness() {
    let dir = tempfile::tempdir().unwrap();
    let mut alive = handshake();
    alive.push(Step::Reply("thread/read", json!({"thread": {"id": "thr_1"}})));
    let mut gone = handshake();
    gone.push(Step::ReplyError("thread/read", "thread not found: thr_1"));
    let (port, server) = spawn_script_server(vec![alive, gone]).await;
    let backend = backend_for(&dir, port);
    let record = codex_record("thr_1", port);

    assert_eq!(backend.exists(&record).await, Liveness::Alive);
    assert_eq!(backend.exists(&record).await, Liveness::Dead);
    server.await.unwrap();
}

#[tokio::test]
async fn exists_is_dead_when_daemon_is_gone() {
    let dir = tempfile::tempdir().unwrap();
    // No daemon state file at all
    let backend = CodexBackend::with_daemon(DaemonManager::at(
        dir.path().join("rpc-daemon.json"),
        dir.path().join("rpc-daemon.log"),
    ));
    let mut record = codex_record("thr_1", 1);
    record.daemon_pid = None;

    assert_eq!(backend.exists(&record).await, Liveness::Dead);
}

#[tokio::test]
async fn kill_archives_thread_when_daemon_matches() {
    let dir = tempfile::tempdir().unwrap();
    let mut script = handshake();
    script.push(Step::Reply("thread/archive", json!({})));
    let (port, server) = spawn_script_server(vec![script]).await;
    let backend = backend_for(&dir, port);
    let record = codex_record("thr_1", port);

    backend.kill(&record).await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn kill_skips_archive_when_daemon_identity_differs() {
    let dir = tempfile::tempdir().unwrap();
    // State file names a different port than the record: no connection
    // is attempted (there is no server to talk to, so an attempt would
    // hang or error).
    let (port, server) = spawn_script_server(vec![]).await;
    let backend = backend_for(&dir, port);
    let mut record = codex_record("thr_1", port);
    record.daemon_port = Some(port.wrapping_add(1));

    backend.kill(&record).await.unwrap();
    server.abort();
}

#[tokio::test]
async fn after_kill_stops_daemon_only_when_no_codex_sessions_remain() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("rpc-daemon.json");
    let state = DaemonState {
        version: 1,
        pid: {
            // Already-dead pid so stop_server signals nothing real
            let mut child = std::process::Command::new("true").spawn().unwrap();
            let pid = child.id();
            let _ = child.wait();
            pid
        },
        port: 1,
        url: "ws://127.0.0.1:1".into(),
        started_at: "2026-08-01T10:00:00.000Z".into(),
    };
    std::fs::write(&state_path, serde_json::to_vec(&state).unwrap()).unwrap();
    let backend = CodexBackend::with_daemon(DaemonManager::at(
        state_path.clone(),
        dir.path().join("rpc-daemon.log"),
    ));

    // A codex session remains: daemon state untouched
    let remaining = vec![codex_record("thr_other", 1)];
    backend.after_kill(&remaining).await;
    assert!(state_path.exists());

    // Only claude sessions remain: daemon stopped, state cleared
    let mut claude_only = codex_record("thr_x", 1);
    claude_only.kind = SessionKind::Claude;
    backend.after_kill(&[claude_only]).await;
    assert!(!state_path.exists());
}

#[test]
fn runtime_status_mapping() {
    assert_eq!(runtime_status(&json!({})), RuntimeStatus::Idle);
    assert_eq!(runtime_status(&json!({"status": null})), RuntimeStatus::Idle);
    assert_eq!(runtime_status(&json!({"status": "idle"})), RuntimeStatus::Idle);
    assert_eq!(
        runtime_status(&json!({"status": "notLoaded"})),
        RuntimeStatus::NotLoaded
    );
    assert_eq!(
        runtime_status(&json!({"status": "systemError"})),
        RuntimeStatus::SystemError
    );
    assert_eq!(
        runtime_status(&json!({"status": {"active": {"turnId": "t"}}})),
        RuntimeStatus::Active
    );
    assert_eq!(
        runtime_status(&json!({"status": "wat"})),
        RuntimeStatus::Unknown
    );
    assert_eq!(
        runtime_status(&json!({"status": 42})),
        RuntimeStatus::Unknown
    );
}

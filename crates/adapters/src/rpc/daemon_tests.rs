// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

fn manager(dir: &tempfile::TempDir) -> DaemonManager {
    DaemonManager::at(
        dir.path().join("rpc-daemon.json"),
        dir.path().join("rpc-daemon.log"),
    )
}

fn state(pid: u32, port: u16) -> DaemonState {
    DaemonState {
        version: 1,
        pid,
        port,
        url: format!("ws://127.0.0.1:{port}"),
        started_at: "2026-08-01T10:00:00.000Z".into(),
    }
}

/// A pid that is guaranteed dead: a child that already exited and was
/// reaped.
fn dead_pid() -> u32 {
    let mut child = std::process::Command::new("true")
        .spawn()
        .expect("spawn true");
    let pid = child.id();
    let _ = child.wait();
    pid
}

#[yare::parameterized(
    plain = { "codex app-server listening on ws://127.0.0.1:43125", Some(43125) },
    embedded = { "line1\n2026-08-01 INFO listening ws://127.0.0.1:8080 ready\n", Some(8080) },
    picks_last = { "ws://127.0.0.1:1111\nws://127.0.0.1:2222", Some(2222) },
    missing = { "nothing to see here", None },
    malformed_port = { "ws://127.0.0.1:notaport", None },
)]
fn listen_url_extraction(log: &str, expected_port: Option<u16>) {
    let found = find_listen_url(log);
    assert_eq!(found.map(|(_, p)| p), expected_port);
    if let Some(port) = expected_port {
        let (url, _) = find_listen_url(log).unwrap();
        assert_eq!(url, format!("ws://127.0.0.1:{port}"));
    }
}

#[test]
fn get_server_returns_live_state_and_clears_dead() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(&dir);

    // No state file yet
    assert!(mgr.get_server().is_none());

    // Live state (our own pid is definitely alive)
    let live = state(std::process::id(), 4321);
    std::fs::write(
        dir.path().join("rpc-daemon.json"),
        serde_json::to_vec(&live).unwrap(),
    )
    .unwrap();
    let got = mgr.get_server().unwrap();
    assert_eq!(got.port, 4321);
    assert_eq!(got.url, "ws://127.0.0.1:4321");

    // Dead pid: state is cleared on read
    let dead = state(dead_pid(), 4321);
    std::fs::write(
        dir.path().join("rpc-daemon.json"),
        serde_json::to_vec(&dead).unwrap(),
    )
    .unwrap();
    assert!(mgr.get_server().is_none());
    assert!(!dir.path().join("rpc-daemon.json").exists());
}

#[test]
fn unreadable_state_file_reads_as_absent() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(&dir);
    std::fs::write(dir.path().join("rpc-daemon.json"), b"{ nope").unwrap();
    assert!(mgr.get_server().is_none());
}

#[test]
fn reset_server_with_mismatched_target_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(&dir);

    let live = state(std::process::id(), 5000);
    std::fs::write(
        dir.path().join("rpc-daemon.json"),
        serde_json::to_vec(&live).unwrap(),
    )
    .unwrap();

    // Target names a different daemon: file must survive
    mgr.reset_server(Some((live.pid, 5001)));
    assert!(dir.path().join("rpc-daemon.json").exists());
}

#[test]
fn reset_server_without_target_removes_state() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(&dir);

    // Dead pid so reset doesn't signal anything real
    let gone = state(dead_pid(), 5000);
    std::fs::write(
        dir.path().join("rpc-daemon.json"),
        serde_json::to_vec(&gone).unwrap(),
    )
    .unwrap();

    mgr.stop_server();
    assert!(!dir.path().join("rpc-daemon.json").exists());
}

#[test]
fn is_server_running_prefers_explicit_pid() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(&dir);

    assert!(mgr.is_server_running(Some(std::process::id())));
    assert!(!mgr.is_server_running(Some(dead_pid())));
    // Falls back to (absent) state file
    assert!(!mgr.is_server_running(None));
}

#[test]
fn process_alive_probe() {
    assert!(process_alive(std::process::id()));
    assert!(!process_alive(dead_pid()));
}

#[tokio::test]
#[serial(ds_env)]
async fn ensure_server_surfaces_spawn_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(&dir);
    std::env::set_var("DEV_SESSIONS_CODEX_BIN", "definitely-not-a-real-codex");

    let err = mgr.ensure_server().await.unwrap_err();
    std::env::remove_var("DEV_SESSIONS_CODEX_BIN");
    assert!(err.to_string().contains("failed to spawn"), "{err}");
}

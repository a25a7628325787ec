// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;

/// Random prefix for this test run to avoid conflicts with parallel runs.
static TEST_PREFIX: LazyLock<String> = LazyLock::new(|| {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    format!("dstest{:04x}", nanos & 0xFFFF)
});

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

fn unique_name(suffix: &str) -> String {
    let id = SESSION_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}-{}", *TEST_PREFIX, suffix, id)
}

/// Check if tmux is available on this system.
fn tmux_available() -> bool {
    std::process::Command::new("tmux")
        .arg("-V")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

macro_rules! skip_without_tmux {
    () => {
        if !tmux_available() {
            eprintln!("skipping: tmux not available");
            return;
        }
    };
}

#[tokio::test]
#[serial(tmux)]
async fn spawn_send_literal_and_kill() {
    skip_without_tmux!();
    let adapter = TmuxAdapter::new();
    let name = unique_name("roundtrip");

    adapter
        .spawn(&name, Path::new("/tmp"), "cat > /dev/null")
        .await
        .unwrap();
    assert!(adapter.is_alive(&name).await.unwrap());

    // Literal text with characters send-keys would otherwise interpret
    adapter
        .send_literal(&name, "Enter C-c 'quoted' $VAR")
        .await
        .unwrap();
    adapter.send_key(&name, "Enter").await.unwrap();

    adapter.kill(&name).await.unwrap();
    assert!(!adapter.is_alive(&name).await.unwrap());
}

#[tokio::test]
#[serial(tmux)]
async fn spawn_rejects_missing_cwd() {
    skip_without_tmux!();
    let adapter = TmuxAdapter::new();
    let err = adapter
        .spawn(&unique_name("nocwd"), Path::new("/definitely/not/here"), "sleep 1")
        .await
        .unwrap_err();
    assert!(matches!(err, MuxError::SpawnFailed(_)));
}

#[tokio::test]
#[serial(tmux)]
async fn kill_missing_session_reports_gone_family() {
    skip_without_tmux!();
    let adapter = TmuxAdapter::new();
    let err = adapter.kill(&unique_name("ghost")).await.unwrap_err();
    assert!(err.is_gone(), "unexpected error text: {err}");
}

#[tokio::test]
#[serial(tmux)]
async fn agent_detection_distinguishes_shell_from_process() {
    skip_without_tmux!();
    let adapter = TmuxAdapter::new();
    let name = unique_name("agent");

    // A pane running something that is not a shell
    adapter
        .spawn(&name, Path::new("/tmp"), "sleep 30")
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    assert!(adapter.is_agent_running(&name).await.unwrap());
    adapter.kill(&name).await.unwrap();
}

#[test]
fn gone_family_matching() {
    assert!(MuxError::CommandFailed("no such session: ds-x".into()).is_gone());
    assert!(MuxError::CommandFailed("no server running on /tmp/tmux-1000/default".into()).is_gone());
    assert!(!MuxError::CommandFailed("permission denied".into()).is_gone());
}

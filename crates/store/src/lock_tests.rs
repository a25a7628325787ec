// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

fn target(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("sessions.json")
}

fn quick_opts() -> LockOptions {
    LockOptions {
        timeout: Duration::from_millis(300),
        stale_age: Duration::from_secs(30),
    }
}

#[tokio::test]
async fn acquire_creates_and_drop_removes_lock_dir() {
    let dir = tempfile::tempdir().unwrap();
    let target = target(&dir);
    let lock_dir = dir.path().join("sessions.json.lock");

    let guard = acquire(&target, quick_opts()).await.unwrap();
    assert!(lock_dir.is_dir());
    drop(guard);
    assert!(!lock_dir.exists());
}

#[tokio::test]
async fn second_acquire_blocks_until_release() {
    let dir = tempfile::tempdir().unwrap();
    let target = target(&dir);

    let guard = acquire(&target, quick_opts()).await.unwrap();

    // Release shortly after; the contender should then get through.
    let release = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(guard);
    });

    let opts = LockOptions {
        timeout: Duration::from_secs(2),
        stale_age: Duration::from_secs(30),
    };
    let second = acquire(&target, opts).await;
    assert!(second.is_ok());
    release.await.unwrap();
}

#[tokio::test]
async fn acquire_times_out_when_lock_is_held() {
    let dir = tempfile::tempdir().unwrap();
    let target = target(&dir);

    let _guard = acquire(&target, quick_opts()).await.unwrap();
    let err = acquire(&target, quick_opts()).await.unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
}

#[tokio::test]
async fn stale_lock_is_taken_over() {
    let dir = tempfile::tempdir().unwrap();
    let target = target(&dir);

    // A lock left behind by a dead process: the dir exists but nobody
    // will ever remove it.
    std::fs::create_dir(dir.path().join("sessions.json.lock")).unwrap();

    let opts = LockOptions {
        timeout: Duration::from_secs(2),
        stale_age: Duration::from_millis(50),
    };
    tokio::time::sleep(Duration::from_millis(120)).await;

    let guard = acquire(&target, opts).await;
    assert!(guard.is_ok(), "stale lock should be broken");
}

#[tokio::test]
async fn fresh_lock_is_not_treated_as_stale() {
    let dir = tempfile::tempdir().unwrap();
    let target = target(&dir);

    std::fs::create_dir(dir.path().join("sessions.json.lock")).unwrap();

    // Stale threshold far in the future: acquisition must time out
    // instead of stealing.
    let err = acquire(&target, quick_opts()).await.unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
}

#[tokio::test]
async fn acquire_creates_missing_parent_directory() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("nested/deeper/sessions.json");

    let guard = acquire(&target, quick_opts()).await;
    assert!(guard.is_ok());
}

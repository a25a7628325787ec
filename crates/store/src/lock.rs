// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inter-process advisory lock backed by a lock directory.
//!
//! `mkdir` is atomic on every platform we care about, so exclusive-create
//! of `<path>.lock/` doubles as a cross-process mutex. A lock whose mtime
//! is older than the stale threshold is assumed to belong to a dead
//! process and is forcibly removed.

use rand::Rng;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

/// Tunables for lock acquisition. Production callers use the defaults;
/// tests shrink them.
#[derive(Debug, Clone, Copy)]
pub struct LockOptions {
    /// Give up acquiring after this long.
    pub timeout: Duration,
    /// A lock directory older than this is considered abandoned.
    pub stale_age: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            stale_age: Duration::from_secs(30),
        }
    }
}

/// Held lock; releases the lock directory on drop.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to release lock");
            }
        }
    }
}

/// Acquire the lock directory for `target` (the file being protected).
///
/// Retries with bounded exponential backoff plus jitter so that many
/// processes hammering the same registry don't retry in lockstep.
pub async fn acquire(target: &Path, opts: LockOptions) -> io::Result<LockGuard> {
    let lock_path = lock_path_for(target);
    let deadline = Instant::now() + opts.timeout;
    let mut backoff = Duration::from_millis(10);

    loop {
        match std::fs::create_dir(&lock_path) {
            Ok(()) => return Ok(LockGuard { path: lock_path }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // Parent missing on first use; create it and retry at once.
                if let Some(parent) = lock_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if is_stale(&lock_path, opts.stale_age) {
                    tracing::warn!(
                        path = %lock_path.display(),
                        "removing stale lock (holder presumed dead)"
                    );
                    // Racing removers are fine: remove_dir failing just
                    // sends us around the loop again.
                    let _ = std::fs::remove_dir(&lock_path);
                    continue;
                }
                if Instant::now() >= deadline {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("timed out acquiring lock {}", lock_path.display()),
                    ));
                }
                tokio::time::sleep(with_jitter(backoff)).await;
                backoff = (backoff * 2).min(Duration::from_millis(250));
            }
            Err(e) => return Err(e),
        }
    }
}

fn lock_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    target.with_file_name(name)
}

fn is_stale(lock_path: &Path, stale_age: Duration) -> bool {
    let Ok(meta) = std::fs::metadata(lock_path) else {
        return false;
    };
    let Ok(mtime) = meta.modified() else {
        return false;
    };
    SystemTime::now()
        .duration_since(mtime)
        .map(|age| age > stale_age)
        .unwrap_or(false)
}

fn with_jitter(base: Duration) -> Duration {
    let mut rng = rand::rng();
    let jitter_ms = rng.random_range(0..=base.as_millis().max(1) as u64 / 2);
    base + Duration::from_millis(jitter_ms)
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;

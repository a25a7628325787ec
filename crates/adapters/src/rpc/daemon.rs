// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle of the single shared Codex app-server per host.
//!
//! The daemon's identity lives in `~/.dev-sessions/rpc-daemon.json`.
//! There is deliberately no lock around it: the file is written with an
//! atomic rename and consulted together with a signal-0 liveness probe,
//! which is enough for a process that is stateless with respect to the
//! file itself.

use ds_core::SessionError;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// How long daemon startup may take: log URL discovery and the TCP
/// connect check each get this budget.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(15);
const STARTUP_POLL: Duration = Duration::from_millis(200);

const STATE_VERSION: u32 = 1;

/// Contents of `rpc-daemon.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonState {
    pub version: u32,
    pub pid: u32,
    pub port: u16,
    pub url: String,
    pub started_at: String,
}

/// Manages the one shared app-server process for this host.
#[derive(Debug, Clone)]
pub struct DaemonManager {
    state_path: PathBuf,
    log_path: PathBuf,
}

impl Default for DaemonManager {
    fn default() -> Self {
        Self {
            state_path: ds_core::daemon_state_path(),
            log_path: ds_core::daemon_log_path(),
        }
    }
}

impl DaemonManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// For tests: a manager rooted at explicit paths.
    pub fn at(state_path: PathBuf, log_path: PathBuf) -> Self {
        Self {
            state_path,
            log_path,
        }
    }

    /// Return a live daemon, spawning one if necessary.
    pub async fn ensure_server(&self) -> Result<DaemonState, SessionError> {
        if let Some(state) = self.get_server() {
            return Ok(state);
        }

        if let Some(parent) = self.log_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        let log_offset = log.metadata().map(|m| m.len()).unwrap_or(0);

        let codex = crate::env::codex_bin();
        let child = std::process::Command::new(&codex)
            .arg("app-server")
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::from(log.try_clone()?))
            .stderr(std::process::Stdio::from(log))
            .spawn()
            .map_err(|e| {
                SessionError::Backend(format!("failed to spawn {codex} app-server: {e}"))
            })?;
        let pid = child.id();
        tracing::info!(pid, %codex, "spawned codex app-server");

        let (url, port) = self.discover_url(log_offset).await?;
        verify_tcp(port).await?;

        let state = DaemonState {
            version: STATE_VERSION,
            pid,
            port,
            url,
            started_at: ds_core::now_iso(),
        };
        self.write_state(&state)?;
        Ok(state)
    }

    /// Cached daemon if its pid is alive; otherwise clears the state file
    /// and returns `None`.
    pub fn get_server(&self) -> Option<DaemonState> {
        let state = self.read_state()?;
        if process_alive(state.pid) {
            Some(state)
        } else {
            tracing::info!(pid = state.pid, "cached daemon is dead, clearing state file");
            let _ = fs::remove_file(&self.state_path);
            None
        }
    }

    /// Terminate the daemon and clear the state file.
    ///
    /// With a `target`, only a daemon matching that `(pid, port)` is
    /// touched; a daemon restarted by another process survives.
    pub fn reset_server(&self, target: Option<(u32, u16)>) {
        if let Some(state) = self.read_state() {
            let matches = match target {
                Some((pid, port)) => state.pid == pid && state.port == port,
                None => true,
            };
            if matches {
                terminate(state.pid);
                let _ = fs::remove_file(&self.state_path);
            }
        }
    }

    pub fn stop_server(&self) {
        self.reset_server(None);
    }

    /// Daemon liveness. With a pid, only that process is probed; without
    /// one the cached state decides.
    pub fn is_server_running(&self, pid: Option<u32>) -> bool {
        match pid {
            Some(pid) => process_alive(pid),
            None => self.get_server().is_some(),
        }
    }

    fn read_state(&self) -> Option<DaemonState> {
        let contents = fs::read_to_string(&self.state_path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::warn!(path = %self.state_path.display(), error = %e, "unreadable daemon state file");
                None
            }
        }
    }

    fn write_state(&self, state: &DaemonState) -> Result<(), SessionError> {
        if let Some(parent) = self.state_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.state_path.with_extension("json.tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(serde_json::to_string_pretty(state).map_err(to_protocol)?.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.state_path)?;
        Ok(())
    }

    /// Watch the daemon log (from `offset`) for its listen URL.
    async fn discover_url(&self, offset: u64) -> Result<(String, u16), SessionError> {
        let deadline = Instant::now() + STARTUP_TIMEOUT;
        while Instant::now() < deadline {
            if let Ok(bytes) = fs::read(&self.log_path) {
                let fresh = String::from_utf8_lossy(bytes.get(offset as usize..).unwrap_or(&[]));
                if let Some((url, port)) = find_listen_url(&fresh) {
                    return Ok((url, port));
                }
            }
            tokio::time::sleep(STARTUP_POLL).await;
        }
        Err(SessionError::Backend(format!(
            "daemon did not report a listen URL within {}s (see {})",
            STARTUP_TIMEOUT.as_secs(),
            self.log_path.display()
        )))
    }
}

fn to_protocol(e: serde_json::Error) -> SessionError {
    SessionError::Protocol(e.to_string())
}

/// Extract the last `ws://127.0.0.1:<port>` occurrence from log text.
fn find_listen_url(text: &str) -> Option<(String, u16)> {
    const NEEDLE: &str = "ws://127.0.0.1:";
    let at = text.rfind(NEEDLE)?;
    let rest = &text[at + NEEDLE.len()..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    let port: u16 = digits.parse().ok()?;
    Some((format!("{NEEDLE}{port}"), port))
}

/// Confirm something is accepting connections on the discovered port.
async fn verify_tcp(port: u16) -> Result<(), SessionError> {
    let deadline = Instant::now() + STARTUP_TIMEOUT;
    while Instant::now() < deadline {
        if tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            return Ok(());
        }
        tokio::time::sleep(STARTUP_POLL).await;
    }
    Err(SessionError::Transport(format!(
        "daemon port {port} did not accept connections within {}s",
        STARTUP_TIMEOUT.as_secs()
    )))
}

/// Signal-0 probe; EPERM counts as alive (the process exists, we just
/// can't signal it).
pub(crate) fn process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::EPERM) => true,
        Err(_) => false,
    }
}

fn terminate(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) => tracing::info!(pid, "sent SIGTERM to daemon"),
        Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pid, error = %e, "failed to signal daemon"),
    }
}

#[cfg(test)]
#[path = "daemon_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tmux multiplexer adapter

use super::{MuxAdapter, MuxError};
use async_trait::async_trait;
use base64::Engine;
use std::path::Path;
use tokio::process::Command;

/// Command-line patterns that mean "this pane is only running a shell",
/// i.e. the agent process itself is not (or no longer) there.
const SHELL_PATTERNS: &[&str] = &[
    "bash", "-bash", "zsh", "-zsh", "sh", "-sh", "fish", "login", "tmux",
];

/// Tmux-based multiplexer adapter
#[derive(Clone, Default)]
pub struct TmuxAdapter;

impl TmuxAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MuxAdapter for TmuxAdapter {
    async fn spawn(&self, name: &str, cwd: &Path, cmd: &str) -> Result<(), MuxError> {
        // Precondition: cwd must exist
        if !cwd.exists() {
            return Err(MuxError::SpawnFailed(format!(
                "working directory does not exist: {}",
                cwd.display()
            )));
        }

        // Handles are collision-checked before spawn, but a leftover
        // session with the same name would shadow the new one.
        let existing = Command::new("tmux")
            .args(["has-session", "-t", name])
            .output()
            .await;
        if existing.map(|o| o.status.success()).unwrap_or(false) {
            tracing::warn!(session = name, "session already exists, killing first");
            let _ = Command::new("tmux")
                .args(["kill-session", "-t", name])
                .output()
                .await;
        }

        let output = Command::new("tmux")
            .arg("new-session")
            .arg("-d")
            .arg("-s")
            .arg(name)
            .arg("-c")
            .arg(cwd)
            .arg(cmd)
            .output()
            .await
            .map_err(|e| MuxError::SpawnFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(session = name, stderr = %stderr, "tmux spawn failed");
            return Err(MuxError::SpawnFailed(stderr.to_string()));
        }

        Ok(())
    }

    async fn send_key(&self, name: &str, key: &str) -> Result<(), MuxError> {
        let output = Command::new("tmux")
            .args(["send-keys", "-t", name, key])
            .output()
            .await
            .map_err(|e| MuxError::CommandFailed(e.to_string()))?;

        if !output.status.success() {
            return Err(MuxError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn send_literal(&self, name: &str, text: &str) -> Result<(), MuxError> {
        // Route the payload through base64 so the text reaches send-keys
        // byte-for-byte: no shell word splitting, no key-name
        // interpretation (-l), no option parsing (--).
        let encoded = base64::engine::general_purpose::STANDARD.encode(text);
        let script = format!(
            "tmux send-keys -t '{name}' -l -- \"$(printf '%s' '{encoded}' | base64 -d)\""
        );
        let output = Command::new("sh")
            .arg("-c")
            .arg(script)
            .output()
            .await
            .map_err(|e| MuxError::CommandFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MuxError::CommandFailed(format!(
                "literal send failed: {}",
                stderr.trim()
            )));
        }
        Ok(())
    }

    async fn kill(&self, name: &str) -> Result<(), MuxError> {
        let output = Command::new("tmux")
            .args(["kill-session", "-t", name])
            .output()
            .await
            .map_err(|e| MuxError::CommandFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MuxError::CommandFailed(stderr.trim().to_string()));
        }
        Ok(())
    }

    async fn is_alive(&self, name: &str) -> Result<bool, MuxError> {
        let output = Command::new("tmux")
            .args(["has-session", "-t", name])
            .output()
            .await
            .map_err(|e| MuxError::CommandFailed(e.to_string()))?;

        Ok(output.status.success())
    }

    async fn capture_output(&self, name: &str, lines: u32) -> Result<String, MuxError> {
        let output = Command::new("tmux")
            .args(["capture-pane", "-t", name, "-p", "-S"])
            .arg(format!("-{lines}"))
            .output()
            .await
            .map_err(|e| MuxError::CommandFailed(e.to_string()))?;

        if !output.status.success() {
            return Err(MuxError::NotFound(name.to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn is_agent_running(&self, name: &str) -> Result<bool, MuxError> {
        // Collect the pane TTYs, then read the command lines attached to
        // them. A pane showing only shell/login/tmux processes means the
        // agent is gone even though the session lives on.
        let output = Command::new("tmux")
            .args(["list-panes", "-t", name, "-F", "#{pane_tty}"])
            .output()
            .await
            .map_err(|e| MuxError::CommandFailed(e.to_string()))?;

        if !output.status.success() {
            return Err(MuxError::NotFound(name.to_string()));
        }

        for tty in String::from_utf8_lossy(&output.stdout).lines() {
            let tty = tty.trim().trim_start_matches("/dev/");
            if tty.is_empty() {
                continue;
            }
            let ps = Command::new("ps")
                .args(["-t", tty, "-o", "command="])
                .output()
                .await
                .map_err(|e| MuxError::CommandFailed(e.to_string()))?;
            if !ps.status.success() {
                continue;
            }
            for line in String::from_utf8_lossy(&ps.stdout).lines() {
                let command = line.trim();
                if command.is_empty() {
                    continue;
                }
                let binary = command
                    .split_whitespace()
                    .next()
                    .map(|w| w.rsplit('/').next().unwrap_or(w))
                    .unwrap_or("");
                if !SHELL_PATTERNS.contains(&binary) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
#[path = "tmux_tests.rs"]
mod tests;

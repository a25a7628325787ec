// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Claude-in-tmux backend.
//!
//! Creates the agent inside a detached tmux session and observes turn
//! completion by counting `system` entries in the JSONL transcript. The
//! count baseline is snapshotted at send time so a turn that finishes
//! before `wait` starts is still detected.

use crate::backend::{
    CreateRequest, CreateResult, DeadSessionPolicy, SessionBackend, StatusOutcome, TurnEntry,
    WaitOutcome,
};
use crate::mux::{MuxAdapter, TmuxAdapter};
use crate::transcript;
use async_trait::async_trait;
use ds_core::{
    to_multiplexer_name, LaunchMode, Liveness, SessionError, SessionKind, SessionPatch,
    SessionRecord, SessionStatus, WaitParams, WaitResult,
};
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime};
use tokio::process::Command;

/// Check multiplexer liveness every Nth wait poll.
const LIVENESS_CHECK_EVERY: u64 = 10;

/// Pauses around the Enter keypresses that submit a message. The TUI
/// needs a beat to register the literal text before Enter, and some
/// terminal states swallow the first Enter.
const PRE_ENTER_PAUSE: Duration = Duration::from_millis(75);
const BETWEEN_ENTER_PAUSE: Duration = Duration::from_millis(150);

/// Backend driving Claude Code inside a terminal multiplexer.
#[derive(Clone, Default)]
pub struct TermBackend<M: MuxAdapter = TmuxAdapter> {
    mux: M,
}

impl TermBackend<TmuxAdapter> {
    pub fn new() -> Self {
        Self {
            mux: TmuxAdapter::new(),
        }
    }
}

impl<M: MuxAdapter> TermBackend<M> {
    pub fn with_mux(mux: M) -> Self {
        Self { mux }
    }

    fn transcript_path(record: &SessionRecord) -> PathBuf {
        ds_core::transcript_path(&record.workspace_path, &record.internal_id)
    }

    /// Agent command line for a launch mode.
    fn agent_command(mode: LaunchMode, internal_id: &str) -> Result<String, SessionError> {
        let claude = crate::env::claude_bin();
        let base = format!("{claude} --session-id {internal_id}");
        Ok(match mode {
            LaunchMode::Interactive => base,
            LaunchMode::SkipPermissions => format!("{base} --dangerously-skip-permissions"),
            LaunchMode::Container => {
                format!("{} {base} --dangerously-skip-permissions", crate::env::sandbox_bin())
            }
            LaunchMode::Daemon => {
                return Err(SessionError::Validation(
                    "daemon mode is not a tmux launch flavor".into(),
                ))
            }
        })
    }

    async fn wait_for_transcript(&self, record_path: &std::path::Path, mux_name: &str) {
        let deadline = Instant::now() + crate::env::transcript_timeout();
        while Instant::now() < deadline {
            if record_path.exists() {
                return;
            }
            tokio::time::sleep(crate::env::transcript_poll_interval()).await;
        }
        tracing::warn!(
            session = mux_name,
            transcript = %record_path.display(),
            "transcript did not appear before deadline; continuing anyway"
        );
    }
}

/// Whether a binary resolves on PATH.
async fn binary_on_path(bin: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {bin}"))
        .output()
        .await
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[async_trait]
impl<M: MuxAdapter> SessionBackend for TermBackend<M> {
    fn kind(&self) -> SessionKind {
        SessionKind::Claude
    }

    fn dead_session_policy(&self) -> DeadSessionPolicy {
        DeadSessionPolicy::Prune
    }

    async fn is_handle_taken(&self, handle: &str) -> bool {
        self.mux
            .is_alive(&to_multiplexer_name(handle))
            .await
            .unwrap_or(false)
    }

    async fn create(&self, request: &CreateRequest) -> Result<CreateResult, SessionError> {
        let mode = request.mode;
        if mode == LaunchMode::Container && !binary_on_path(&crate::env::sandbox_bin()).await {
            return Err(SessionError::Validation(format!(
                "{} is required for container mode but was not found on PATH",
                crate::env::sandbox_bin()
            )));
        }

        let internal_id = uuid::Uuid::new_v4().to_string();
        let mux_name = to_multiplexer_name(&request.handle);
        let command = format!("exec {}", Self::agent_command(mode, &internal_id)?);

        self.mux
            .spawn(&mux_name, &request.workspace_path, &command)
            .await
            .map_err(|e| SessionError::Backend(e.to_string()))?;

        tracing::info!(session = %mux_name, %internal_id, %mode, "claude session spawned");

        if mode == LaunchMode::Container {
            // The wrapper opens with a confirmation prompt; give it time
            // to render, then acknowledge.
            tokio::time::sleep(crate::env::container_startup_delay()).await;
            self.mux
                .send_key(&mux_name, "Enter")
                .await
                .map_err(|e| SessionError::Backend(e.to_string()))?;
        } else {
            let path = ds_core::transcript_path(&request.workspace_path, &internal_id);
            self.wait_for_transcript(&path, &mux_name).await;
        }

        Ok(CreateResult {
            internal_id,
            mode,
            daemon_pid: None,
            daemon_port: None,
            model: None,
        })
    }

    async fn pre_send_fields(&self, record: &SessionRecord) -> SessionPatch {
        let entries = transcript::read_transcript(&Self::transcript_path(record));
        SessionPatch {
            term_baseline_completion_count: Some(Some(transcript::count_system(&entries))),
            ..Default::default()
        }
    }

    async fn send(
        &self,
        record: &SessionRecord,
        text: &str,
    ) -> Result<SessionPatch, SessionError> {
        let mux_name = to_multiplexer_name(&record.handle);

        let running = self
            .mux
            .is_agent_running(&mux_name)
            .await
            .map_err(|e| SessionError::Backend(e.to_string()))?;
        if !running {
            // Attach the pane tail so the operator can see what the
            // agent left behind before it exited.
            let tail = self
                .mux
                .capture_output(&mux_name, 10)
                .await
                .unwrap_or_default();
            let tail = tail.trim();
            let mut message = format!(
                "agent is not running in session {mux_name}; only a shell is left in the pane"
            );
            if !tail.is_empty() {
                message.push_str(&format!("\nlast pane output:\n{tail}"));
            }
            return Err(SessionError::Backend(message));
        }

        self.mux
            .send_literal(&mux_name, text)
            .await
            .map_err(|e| SessionError::Backend(e.to_string()))?;
        tokio::time::sleep(PRE_ENTER_PAUSE).await;
        self.mux
            .send_key(&mux_name, "Enter")
            .await
            .map_err(|e| SessionError::Backend(e.to_string()))?;
        tokio::time::sleep(BETWEEN_ENTER_PAUSE).await;
        self.mux
            .send_key(&mux_name, "Enter")
            .await
            .map_err(|e| SessionError::Backend(e.to_string()))?;

        Ok(SessionPatch::default())
    }

    async fn status(&self, record: &SessionRecord) -> Result<StatusOutcome, SessionError> {
        let entries = transcript::read_transcript(&Self::transcript_path(record));
        Ok(StatusOutcome::state_only(transcript::infer_status(&entries)))
    }

    async fn wait(&self, record: &SessionRecord, params: WaitParams) -> WaitOutcome {
        let mux_name = to_multiplexer_name(&record.handle);
        let path = Self::transcript_path(record);
        let start = Instant::now();

        let mut baseline = record.term_baseline_completion_count;
        let mut last_mtime: Option<SystemTime> = None;
        let mut completion_count = 0u64;
        let mut poll: u64 = 0;

        loop {
            if poll % LIVENESS_CHECK_EVERY == 0 {
                match self.mux.is_alive(&mux_name).await {
                    Ok(false) => {
                        return WaitOutcome {
                            result: WaitResult {
                                completed: false,
                                timed_out: false,
                                elapsed_ms: start.elapsed().as_millis() as u64,
                                error: Some("session died during wait".into()),
                                ..Default::default()
                            },
                            patch: SessionPatch {
                                status: Some(SessionStatus::Inactive),
                                turn_in_progress: Some(None),
                                ..Default::default()
                            },
                            error_to_throw: None,
                        };
                    }
                    Ok(true) => {}
                    // Unknown liveness never fails a wait
                    Err(e) => {
                        tracing::debug!(session = %mux_name, error = %e, "liveness probe failed during wait")
                    }
                }
            }
            poll += 1;

            let mtime = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
            if mtime != last_mtime || last_mtime.is_none() {
                last_mtime = mtime;
                let entries = transcript::read_transcript(&path);
                completion_count = transcript::count_system(&entries);
                // No baseline recorded (wait without a prior send):
                // require growth from the first observation.
                if baseline.is_none() {
                    baseline = Some(completion_count);
                }
            }

            if completion_count > baseline.unwrap_or(0) {
                return WaitOutcome {
                    result: WaitResult::completed(start.elapsed().as_millis() as u64),
                    patch: SessionPatch::default(),
                    error_to_throw: None,
                };
            }

            let elapsed = start.elapsed();
            if elapsed >= params.timeout {
                return WaitOutcome {
                    result: WaitResult::timed_out(elapsed.as_millis() as u64),
                    patch: SessionPatch::default(),
                    error_to_throw: None,
                };
            }
            let remaining = params.timeout - elapsed;
            tokio::time::sleep(params.poll_interval.min(remaining)).await;
        }
    }

    async fn exists(&self, record: &SessionRecord) -> Liveness {
        match self.mux.is_alive(&to_multiplexer_name(&record.handle)).await {
            Ok(true) => Liveness::Alive,
            Ok(false) => Liveness::Dead,
            Err(_) => Liveness::Unknown,
        }
    }

    async fn get_logs(&self, record: &SessionRecord) -> Result<Vec<TurnEntry>, SessionError> {
        let entries = transcript::read_transcript(&Self::transcript_path(record));
        Ok(transcript::extract_turns(&entries))
    }

    async fn get_last_messages(
        &self,
        record: &SessionRecord,
        n: usize,
    ) -> Result<Vec<String>, SessionError> {
        let entries = transcript::read_transcript(&Self::transcript_path(record));
        let mut blocks = transcript::assistant_text(&entries);
        let keep = n.max(1).min(blocks.len());
        Ok(blocks.split_off(blocks.len() - keep))
    }

    async fn kill(&self, record: &SessionRecord) -> Result<(), SessionError> {
        match self.mux.kill(&to_multiplexer_name(&record.handle)).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_gone() => {
                tracing::debug!(handle = %record.handle, "session already gone on kill");
                Ok(())
            }
            Err(e) => Err(SessionError::Backend(e.to_string())),
        }
    }
}

#[cfg(test)]
#[path = "term_tests.rs"]
mod tests;

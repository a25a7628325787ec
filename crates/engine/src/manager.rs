// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The session manager.
//!
//! Dispatches every public operation to the backend selected by the
//! record's `kind`, then merges the backend's partial update into the
//! registry under its lock. Deferred errors (`error_to_throw`) are
//! raised only after the update is persisted, so a failed turn is
//! recorded even when the caller sees the failure.

use crate::allocator;
use crate::service::{CreateSessionOptions, SessionService};
use async_trait::async_trait;
use ds_adapters::{
    CodexBackend, CreateRequest, DeadSessionPolicy, SessionBackend, TermBackend, TurnEntry,
};
use ds_core::{
    ConversationState, LaunchMode, Liveness, SessionError, SessionKind, SessionPatch,
    SessionRecord, SessionStatus, WaitParams, WaitResult,
};
use ds_store::Registry;
use std::sync::Arc;

/// Local session manager over a registry and a set of backends.
pub struct SessionManager {
    registry: Registry,
    backends: Vec<Arc<dyn SessionBackend>>,
}

impl SessionManager {
    pub fn new(registry: Registry, backends: Vec<Arc<dyn SessionBackend>>) -> Self {
        Self { registry, backends }
    }

    /// Manager with the standard tmux-Claude and Codex backends over the
    /// default registry location.
    pub fn with_default_backends() -> Self {
        Self::new(
            Registry::open_default(),
            vec![
                Arc::new(TermBackend::new()),
                Arc::new(CodexBackend::new()),
            ],
        )
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn backend_for(&self, kind: SessionKind) -> Result<&Arc<dyn SessionBackend>, SessionError> {
        self.backends
            .iter()
            .find(|b| b.kind() == kind)
            .ok_or_else(|| SessionError::Backend(format!("no backend for kind {kind}")))
    }

    fn load(&self, handle: &str) -> Result<SessionRecord, SessionError> {
        self.registry
            .get(handle)
            .map_err(|e| SessionError::Store(e.to_string()))?
            .ok_or_else(|| SessionError::NotFound(handle.to_string()))
    }

    /// Merge a patch into a record. A concurrently-deleted record is not
    /// an error for a merge.
    async fn apply(&self, handle: &str, patch: SessionPatch) -> Result<(), SessionError> {
        if patch.is_empty() {
            return Ok(());
        }
        self.registry
            .update(handle, patch)
            .await
            .map_err(|e| SessionError::Store(e.to_string()))?;
        Ok(())
    }

    /// Merge a patch and bump `last_used`.
    async fn apply_touched(&self, handle: &str, mut patch: SessionPatch) -> Result<(), SessionError> {
        patch.last_used = Some(ds_core::now_iso());
        self.apply(handle, patch).await
    }

    fn default_mode(kind: SessionKind) -> LaunchMode {
        match kind {
            SessionKind::Claude => LaunchMode::Interactive,
            SessionKind::Codex => LaunchMode::Daemon,
        }
    }

    fn validate_mode(kind: SessionKind, mode: LaunchMode) -> Result<(), SessionError> {
        let ok = match kind {
            SessionKind::Claude => mode != LaunchMode::Daemon,
            SessionKind::Codex => mode == LaunchMode::Daemon,
        };
        if ok {
            Ok(())
        } else {
            Err(SessionError::Validation(format!(
                "mode {mode} is not valid for {kind} sessions"
            )))
        }
    }
}

#[async_trait]
impl SessionService for SessionManager {
    async fn create_session(
        &self,
        opts: CreateSessionOptions,
    ) -> Result<SessionRecord, SessionError> {
        if !opts.workspace_path.is_absolute() {
            return Err(SessionError::Validation(format!(
                "workspace path must be absolute: {}",
                opts.workspace_path.display()
            )));
        }
        let mode = opts.mode.unwrap_or_else(|| Self::default_mode(opts.kind));
        Self::validate_mode(opts.kind, mode)?;

        let backend = self.backend_for(opts.kind)?;
        let handle = allocator::find_available_handle(&self.registry, &self.backends).await?;

        let created = backend
            .create(&CreateRequest {
                handle: handle.clone(),
                workspace_path: opts.workspace_path.clone(),
                mode,
                description: opts.description.clone(),
                model: opts.model.clone(),
            })
            .await?;

        let now = ds_core::now_iso();
        let record = SessionRecord {
            handle,
            internal_id: created.internal_id,
            kind: opts.kind,
            mode: created.mode,
            workspace_path: opts.workspace_path,
            description: opts.description,
            status: SessionStatus::Active,
            daemon_pid: created.daemon_pid,
            daemon_port: created.daemon_port,
            model: created.model,
            turn_in_progress: None,
            last_turn_completed_at: None,
            term_baseline_completion_count: None,
            last_turn_outcome: None,
            last_turn_error: None,
            last_assistant_messages: None,
            created_at: now.clone(),
            last_used: now,
        };
        self.registry
            .upsert(record.clone())
            .await
            .map_err(|e| SessionError::Store(e.to_string()))?;

        tracing::info!(handle = %record.handle, kind = %record.kind, "session created");
        Ok(record)
    }

    async fn send_message(&self, handle: &str, text: &str) -> Result<(), SessionError> {
        let record = self.load(handle)?;
        let backend = self.backend_for(record.kind)?;

        // Persist the pre-send fields first so a wait racing a very
        // short turn still has its baseline.
        let pre = backend.pre_send_fields(&record).await;
        self.apply(handle, pre).await?;
        let record = self.load(handle)?;

        match backend.send(&record, text).await {
            Ok(patch) => {
                self.apply_touched(handle, patch).await?;
                Ok(())
            }
            Err(error) => {
                let patch = backend.on_send_error(&record, &error);
                if let Err(store_err) = self.apply(handle, patch).await {
                    tracing::warn!(handle, error = %store_err, "failed to record send error");
                }
                Err(error)
            }
        }
    }

    async fn kill_session(&self, handle: &str) -> Result<(), SessionError> {
        let record = self.load(handle)?;
        let backend = self.backend_for(record.kind)?;

        backend.kill(&record).await?;
        self.registry
            .delete(handle)
            .await
            .map_err(|e| SessionError::Store(e.to_string()))?;

        let remaining: Vec<SessionRecord> = self
            .registry
            .list()
            .map_err(|e| SessionError::Store(e.to_string()))?
            .into_iter()
            .filter(SessionRecord::is_active)
            .collect();
        backend.after_kill(&remaining).await;

        tracing::info!(handle, "session killed");
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, SessionError> {
        let records = self
            .registry
            .list()
            .map_err(|e| SessionError::Store(e.to_string()))?;

        let mut kept = Vec::new();
        let mut to_prune = Vec::new();

        for record in records.into_iter().filter(SessionRecord::is_active) {
            let backend = self.backend_for(record.kind)?;
            match backend.exists(&record).await {
                Liveness::Alive => kept.push(record),
                Liveness::Unknown => {
                    tracing::warn!(handle = %record.handle, "liveness unknown, keeping record");
                    kept.push(record);
                }
                Liveness::Dead => match backend.dead_session_policy() {
                    DeadSessionPolicy::Prune => {
                        tracing::info!(handle = %record.handle, "pruning dead session");
                        to_prune.push(record.handle);
                    }
                    DeadSessionPolicy::Deactivate => {
                        tracing::info!(handle = %record.handle, "deactivating dead session");
                        self.apply(
                            &record.handle,
                            SessionPatch {
                                status: Some(SessionStatus::Inactive),
                                turn_in_progress: Some(None),
                                ..Default::default()
                            },
                        )
                        .await?;
                    }
                },
            }
        }

        if !to_prune.is_empty() {
            self.registry
                .prune(&to_prune)
                .await
                .map_err(|e| SessionError::Store(e.to_string()))?;
        }
        Ok(kept)
    }

    async fn get_session_status(
        &self,
        handle: &str,
    ) -> Result<ConversationState, SessionError> {
        let record = self.load(handle)?;
        let backend = self.backend_for(record.kind)?;

        let outcome = backend.status(&record).await?;
        self.apply_touched(handle, outcome.patch).await?;
        if let Some(error) = outcome.error_to_throw {
            return Err(error);
        }
        Ok(outcome.state)
    }

    async fn wait_for_session(
        &self,
        handle: &str,
        params: WaitParams,
    ) -> Result<WaitResult, SessionError> {
        let record = self.load(handle)?;
        let backend = self.backend_for(record.kind)?;

        let outcome = backend.wait(&record, params).await;
        self.apply_touched(handle, outcome.patch).await?;
        if let Some(error) = outcome.error_to_throw {
            return Err(error);
        }
        Ok(outcome.result)
    }

    async fn get_last_messages(
        &self,
        handle: &str,
        n: usize,
    ) -> Result<Vec<String>, SessionError> {
        let record = self.load(handle)?;
        let backend = self.backend_for(record.kind)?;
        let messages = backend.get_last_messages(&record, n).await?;
        self.apply_touched(handle, SessionPatch::default()).await?;
        Ok(messages)
    }

    async fn get_logs(&self, handle: &str) -> Result<Vec<TurnEntry>, SessionError> {
        let record = self.load(handle)?;
        let backend = self.backend_for(record.kind)?;
        let logs = backend.get_logs(&record).await?;
        self.apply_touched(handle, SessionPatch::default()).await?;
        Ok(logs)
    }

    async fn inspect_session(&self, handle: &str) -> Result<SessionRecord, SessionError> {
        self.load(handle)
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;

#[cfg(test)]
#[path = "manager_scenario_tests.rs"]
mod scenario_tests;

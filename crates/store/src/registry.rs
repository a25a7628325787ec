// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The session registry: a JSON file of session records with atomic
//! writes and an inter-process lock around every mutation.
//!
//! Readers never take the lock. Because writes go through a sibling temp
//! file and an atomic rename, a concurrent reader observes either the
//! pre-write or the post-write file, never a mix.

use crate::lock::{self, LockOptions};
use ds_core::{SessionPatch, SessionRecord};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Current registry schema version, written for fresh files. Existing
/// files keep whatever version they carry.
pub const REGISTRY_VERSION: u32 = 1;

/// Errors from registry operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("registry file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct RegistryFile {
    version: u32,
    // Records are validated individually so one bad entry can't take the
    // rest of the registry down with it.
    sessions: Vec<serde_json::Value>,
}

/// Handle to a registry file. Cheap to construct; every operation opens
/// the file fresh so multiple processes can share the path.
#[derive(Debug, Clone)]
pub struct Registry {
    path: PathBuf,
    lock_opts: LockOptions,
}

impl Registry {
    /// Registry at the default location (`~/.dev-sessions/sessions.json`).
    pub fn open_default() -> Self {
        Self::open(ds_core::registry_path())
    }

    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_opts: LockOptions::default(),
        }
    }

    /// Override lock tunables (tests shrink the stale threshold).
    pub fn with_lock_options(mut self, opts: LockOptions) -> Self {
        self.lock_opts = opts;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All valid records, sorted by creation time for display.
    pub fn list(&self) -> Result<Vec<SessionRecord>, StoreError> {
        let mut records = self.load()?.1;
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    /// Look up one record by handle.
    pub fn get(&self, handle: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.load()?.1.into_iter().find(|r| r.handle == handle))
    }

    /// Insert or replace a record, keyed by handle.
    pub async fn upsert(&self, record: SessionRecord) -> Result<(), StoreError> {
        self.mutate(|sessions| {
            sessions.retain(|r| r.handle != record.handle);
            sessions.push(record);
        })
        .await
    }

    /// Apply a partial update to a record. Returns the updated record, or
    /// `None` if the handle is unknown.
    pub async fn update(
        &self,
        handle: &str,
        patch: SessionPatch,
    ) -> Result<Option<SessionRecord>, StoreError> {
        let mut updated = None;
        self.mutate(|sessions| {
            if let Some(record) = sessions.iter_mut().find(|r| r.handle == handle) {
                patch.apply_to(record);
                updated = Some(record.clone());
            }
        })
        .await?;
        Ok(updated)
    }

    /// Remove one record. Returns whether it existed.
    pub async fn delete(&self, handle: &str) -> Result<bool, StoreError> {
        let mut existed = false;
        self.mutate(|sessions| {
            let before = sessions.len();
            sessions.retain(|r| r.handle != handle);
            existed = sessions.len() != before;
        })
        .await?;
        Ok(existed)
    }

    /// Remove every record whose handle is in `handles`.
    pub async fn prune(&self, handles: &[String]) -> Result<(), StoreError> {
        self.mutate(|sessions| {
            sessions.retain(|r| !handles.iter().any(|h| h == &r.handle));
        })
        .await
    }

    /// Read-modify-write under the inter-process lock.
    async fn mutate(
        &self,
        f: impl FnOnce(&mut Vec<SessionRecord>),
    ) -> Result<(), StoreError> {
        let _guard = lock::acquire(&self.path, self.lock_opts).await?;
        let (version, mut sessions) = self.load()?;
        f(&mut sessions);
        self.write_atomic(version, &sessions)?;
        Ok(())
    }

    /// Load the file without locking. A missing file is an empty registry.
    fn load(&self) -> Result<(u32, Vec<SessionRecord>), StoreError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok((REGISTRY_VERSION, Vec::new()))
            }
            Err(e) => return Err(e.into()),
        };

        let raw: RegistryFile = serde_json::from_reader(BufReader::new(file))?;
        let mut records = Vec::with_capacity(raw.sessions.len());
        for value in raw.sessions {
            match serde_json::from_value::<SessionRecord>(value) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "dropping registry record that fails validation"
                    );
                }
            }
        }
        Ok((raw.version, records))
    }

    /// Serialize, write to the sibling temp file, fsync, rename over the
    /// primary path.
    fn write_atomic(&self, version: u32, sessions: &[SessionRecord]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let raw = RegistryFile {
            version,
            sessions: sessions
                .iter()
                .map(serde_json::to_value)
                .collect::<Result<_, _>>()?,
        };

        let tmp_path = self.path.with_extension("json.tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &raw)?;
            writer.write_all(b"\n")?;
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

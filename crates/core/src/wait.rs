// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wait parameters and results shared by backends, manager, and gateway.

use crate::status::TurnOutcome;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Caller-supplied deadline and poll cadence for a wait operation.
#[derive(Debug, Clone, Copy)]
pub struct WaitParams {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl WaitParams {
    pub fn from_secs(timeout_seconds: u64, interval_seconds: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_seconds),
            poll_interval: Duration::from_secs(interval_seconds.max(1)),
        }
    }
}

impl Default for WaitParams {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Result of waiting for a turn to finish.
///
/// A timeout is not an error: `completed=false, timed_out=true` and the
/// server-side state stays authoritative. A dead session reports
/// `completed=false, timed_out=false` with `error` set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitResult {
    pub completed: bool,
    pub timed_out: bool,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TurnOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_text: Option<String>,
}

impl WaitResult {
    pub fn completed(elapsed_ms: u64) -> Self {
        Self {
            completed: true,
            timed_out: false,
            elapsed_ms,
            status: Some(TurnOutcome::Completed),
            ..Default::default()
        }
    }

    pub fn timed_out(elapsed_ms: u64) -> Self {
        Self {
            completed: false,
            timed_out: true,
            elapsed_ms,
            ..Default::default()
        }
    }
}

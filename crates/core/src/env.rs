// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the core crate.

use std::path::PathBuf;

/// Override for the state directory (`$HOME/.dev-sessions`).
pub fn state_dir_override() -> Option<PathBuf> {
    std::env::var("DEV_SESSIONS_STATE_DIR").ok().map(PathBuf::from)
}

/// Override for the Claude transcript root (`$HOME/.claude`).
pub fn claude_config_dir_override() -> Option<PathBuf> {
    std::env::var("CLAUDE_CONFIG_DIR").ok().map(PathBuf::from)
}

/// Home directory, tolerating stripped-down environments.
pub fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"))
}

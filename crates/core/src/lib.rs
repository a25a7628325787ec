// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ds-core: Core data model for the dev-sessions (ds) session multiplexer

pub mod env;
pub mod error;
pub mod handle;
pub mod paths;
pub mod record;
pub mod status;
pub mod time;
pub mod time_fmt;
pub mod wait;

pub use error::SessionError;
pub use handle::{generate_handle, to_multiplexer_name, MUX_PREFIX};
pub use paths::{
    daemon_log_path, daemon_state_path, gateway_log_path, registry_path, sanitize_workspace_path,
    state_dir, transcript_path,
};
pub use record::{LaunchMode, SessionKind, SessionPatch, SessionRecord, SessionStatus};
pub use status::{ConversationState, Liveness, RuntimeStatus, TurnOutcome};
pub use time::now_iso;
pub use time_fmt::{format_age, format_elapsed_ms};
pub use wait::{WaitParams, WaitResult};

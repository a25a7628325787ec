// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ds-adapters: session backends for the dev-sessions multiplexer.
//!
//! Two backends share one capability seam ([`backend::SessionBackend`]):
//! Claude Code driven inside tmux and observed through its JSONL
//! transcript, and Codex driven over JSON-RPC WebSocket to the shared
//! app-server daemon.

pub mod backend;
pub mod env;
pub mod mux;
pub mod rpc;
pub mod term;
pub mod transcript;

pub use backend::{
    CreateRequest, CreateResult, DeadSessionPolicy, SessionBackend, StatusOutcome, TurnEntry,
    TurnRole, WaitOutcome,
};
pub use mux::{MuxAdapter, MuxError, TmuxAdapter};
pub use rpc::{CodexBackend, DaemonManager, DaemonState, RpcClient};
pub use term::TermBackend;

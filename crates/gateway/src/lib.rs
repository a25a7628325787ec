// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ds-gateway: loopback HTTP relay between sandboxed callers and the
//! host-side session manager.

mod client;
mod env;
mod http;
mod server;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::GatewayClient;
pub use env::{gateway_port, gateway_url, is_sandbox, translate_workspace_path};
pub use server::GatewayServer;

use ds_engine::{SessionManager, SessionService};
use std::sync::Arc;

/// The session service for this process: the HTTP client when running
/// inside a sandbox (`IS_SANDBOX=1`), the local manager otherwise.
pub fn service_from_env() -> Arc<dyn SessionService> {
    if env::is_sandbox() {
        Arc::new(GatewayClient::from_env())
    } else {
        Arc::new(SessionManager::with_default_backends())
    }
}

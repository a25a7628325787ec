// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handle allocation: draw candidates until one is free everywhere.

use ds_adapters::SessionBackend;
use ds_core::{generate_handle, SessionError};
use ds_store::Registry;
use std::sync::Arc;

const MAX_ATTEMPTS: u32 = 250;

/// Find a handle that exists neither in the registry nor in any
/// backend's live namespace.
pub async fn find_available_handle(
    registry: &Registry,
    backends: &[Arc<dyn SessionBackend>],
) -> Result<String, SessionError> {
    for _ in 0..MAX_ATTEMPTS {
        let candidate = generate_handle();
        if registry
            .get(&candidate)
            .map_err(|e| SessionError::Store(e.to_string()))?
            .is_some()
        {
            continue;
        }

        let mut taken = false;
        for backend in backends {
            if backend.is_handle_taken(&candidate).await {
                tracing::debug!(handle = %candidate, backend = %backend.kind(), "handle taken by backend");
                taken = true;
                break;
            }
        }
        if !taken {
            return Ok(candidate);
        }
    }
    Err(SessionError::ExhaustedIdSpace(MAX_ATTEMPTS))
}

#[cfg(test)]
#[path = "allocator_tests.rs"]
mod tests;

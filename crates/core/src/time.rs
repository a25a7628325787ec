// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timestamp helpers. Registry timestamps are ISO-8601 strings.

use chrono::{SecondsFormat, Utc};

/// Current time as an ISO-8601 string with millisecond precision,
/// e.g. `2026-08-01T12:34:56.789Z`. Timestamps in this format compare
/// correctly as plain strings, which is what the registry sort relies
/// on.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

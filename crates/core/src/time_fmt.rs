// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Human-readable durations and timestamp ages for CLI output.

use chrono::{DateTime, Utc};

/// Format a millisecond duration compactly: `450ms`, `2.5s`, `3m07s`.
pub fn format_elapsed_ms(ms: u64) -> String {
    if ms < 1000 {
        return format!("{ms}ms");
    }
    let total_secs = ms / 1000;
    if total_secs < 60 {
        return format!("{:.1}s", ms as f64 / 1000.0);
    }
    let mins = total_secs / 60;
    let secs = total_secs % 60;
    if mins < 60 {
        format!("{mins}m{secs:02}s")
    } else {
        format!("{}h{:02}m", mins / 60, mins % 60)
    }
}

/// Age of an ISO-8601 timestamp relative to now: `just now`, `5m ago`,
/// `3d ago`. Unparseable input renders as `-`.
pub fn format_age(iso: &str) -> String {
    let Ok(then) = DateTime::parse_from_rfc3339(iso) else {
        return "-".to_string();
    };
    let secs = (Utc::now() - then.with_timezone(&Utc)).num_seconds();
    match secs {
        i64::MIN..=9 => "just now".to_string(),
        10..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86400),
    }
}

#[cfg(test)]
#[path = "time_fmt_tests.rs"]
mod tests;

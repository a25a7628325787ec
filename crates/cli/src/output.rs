// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plain-text rendering for listings.

use ds_core::{format_age, SessionRecord, SessionStatus};

const COLUMNS: usize = 6;
const HEADERS: [&str; COLUMNS] = ["HANDLE", "CLI", "MODE", "STATUS", "LAST USED", "WORKSPACE"];

/// Fixed-width table of session records, one line per session.
pub fn render_session_table(sessions: &[SessionRecord]) -> String {
    if sessions.is_empty() {
        return "no active sessions\n".to_string();
    }

    let rows: Vec<[String; COLUMNS]> = sessions
        .iter()
        .map(|s| {
            [
                s.handle.clone(),
                s.kind.to_string(),
                s.mode.to_string(),
                match s.status {
                    SessionStatus::Active => "active".to_string(),
                    SessionStatus::Inactive => "inactive".to_string(),
                },
                format_age(&s.last_used),
                s.workspace_path.display().to_string(),
            ]
        })
        .collect();

    let mut widths: [usize; COLUMNS] = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    render_row(&mut out, &HEADERS.map(str::to_string), &widths);
    for row in &rows {
        render_row(&mut out, row, &widths);
    }
    out
}

fn render_row(out: &mut String, cells: &[String; COLUMNS], widths: &[usize; COLUMNS]) {
    for (i, (cell, width)) in cells.iter().zip(widths.iter()).enumerate() {
        if i > 0 {
            out.push_str("  ");
        }
        out.push_str(cell);
        // No padding after the final column
        if i < COLUMNS - 1 {
            for _ in cell.len()..*width {
                out.push(' ');
            }
        }
    }
    out.push('\n');
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;

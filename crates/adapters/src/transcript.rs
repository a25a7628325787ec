// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Claude Code JSONL transcript parsing.
//!
//! The transcript is append-only; entries are loose JSON objects with an
//! optional `type` and a `message.content` that may be a string, an array
//! of content blocks, or nested records containing text. Everything here
//! tolerates malformed input: bad lines are skipped, a missing file is an
//! empty transcript.

use crate::backend::{TurnEntry, TurnRole};
use ds_core::ConversationState;
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Tool names whose use means the agent is asking the operator a
/// question (matched case-insensitively).
const ASK_USER_TOOLS: &[&str] = &[
    "askuserquestion",
    "ask_user_question",
    "ask_user",
    "request_user_input",
];

/// Read and parse a transcript file. Malformed lines and non-object
/// values are dropped; a missing file yields an empty transcript.
pub fn read_transcript(path: &Path) -> Vec<Value> {
    let Ok(file) = File::open(path) else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    for line in BufReader::new(file).lines() {
        let Ok(line) = line else { break };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) if value.is_object() => entries.push(value),
            _ => {}
        }
    }
    entries
}

fn entry_type(entry: &Value) -> &str {
    entry.get("type").and_then(|v| v.as_str()).unwrap_or("")
}

fn is_user_entry(entry: &Value) -> bool {
    matches!(entry_type(entry), "human" | "user")
}

fn message_content(entry: &Value) -> Option<&Value> {
    entry.get("message").and_then(|m| m.get("content"))
}

/// Flatten a content tree into its text pieces.
///
/// Strings pass through, arrays flatten, `{type:"text", text}` blocks
/// contribute their text, other typed blocks (tool_use, thinking, ...)
/// are skipped, and untyped records recurse into `content`/`text`.
pub fn extract_text(content: &Value) -> Vec<String> {
    match content {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items.iter().flat_map(extract_text).collect(),
        Value::Object(map) => match map.get("type").and_then(|v| v.as_str()) {
            Some("text") => map
                .get("text")
                .and_then(|v| v.as_str())
                .map(|s| vec![s.to_string()])
                .unwrap_or_default(),
            Some(_) => Vec::new(),
            None => {
                if let Some(inner) = map.get("content") {
                    extract_text(inner)
                } else if let Some(inner) = map.get("text") {
                    extract_text(inner)
                } else {
                    Vec::new()
                }
            }
        },
        _ => Vec::new(),
    }
}

/// All assistant text blocks, in transcript order.
pub fn assistant_text(entries: &[Value]) -> Vec<String> {
    entries
        .iter()
        .filter(|e| entry_type(e) == "assistant")
        .filter_map(message_content)
        .flat_map(extract_text)
        .collect()
}

pub fn count_assistant(entries: &[Value]) -> u64 {
    count_type(entries, "assistant")
}

pub fn count_system(entries: &[Value]) -> u64 {
    count_type(entries, "system")
}

pub fn count_file_history_snapshot(entries: &[Value]) -> u64 {
    count_type(entries, "file-history-snapshot")
}

fn count_type(entries: &[Value], t: &str) -> u64 {
    entries.iter().filter(|e| entry_type(e) == t).count() as u64
}

/// True if an assistant entry follows the latest human/user entry (or,
/// with no user entry at all, if any assistant entry exists).
pub fn has_assistant_after_latest_user(entries: &[Value]) -> bool {
    let last_user = entries.iter().rposition(is_user_entry);
    match last_user {
        Some(idx) => entries[idx + 1..]
            .iter()
            .any(|e| entry_type(e) == "assistant"),
        None => entries.iter().any(|e| entry_type(e) == "assistant"),
    }
}

/// Infer what the conversation is doing from the transcript alone.
pub fn infer_status(entries: &[Value]) -> ConversationState {
    let last_user = entries.iter().rposition(is_user_entry);

    // An unanswered ask-user tool call wins over everything else.
    let last_ask = entries
        .iter()
        .rposition(|e| entry_type(e) == "assistant" && contains_ask_user_tool(e));
    if let Some(ask_idx) = last_ask {
        if last_user.is_none_or(|user_idx| ask_idx > user_idx) {
            return ConversationState::WaitingForInput;
        }
    }

    match entries.last() {
        Some(last) if is_user_entry(last) => ConversationState::Working,
        Some(_) => {
            if has_assistant_after_latest_user(entries) {
                ConversationState::Idle
            } else {
                ConversationState::Working
            }
        }
        None => ConversationState::Idle,
    }
}

fn contains_ask_user_tool(entry: &Value) -> bool {
    message_content(entry).is_some_and(tree_has_ask_user_tool)
}

fn tree_has_ask_user_tool(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.iter().any(tree_has_ask_user_tool),
        Value::Object(map) => {
            if map.get("type").and_then(|v| v.as_str()) == Some("tool_use") {
                if let Some(name) = map.get("name").and_then(|v| v.as_str()) {
                    let lower = name.to_lowercase();
                    if ASK_USER_TOOLS.contains(&lower.as_str()) {
                        return true;
                    }
                }
            }
            map.values().any(tree_has_ask_user_tool)
        }
        _ => false,
    }
}

/// The conversation as alternating turns, empty texts dropped.
pub fn extract_turns(entries: &[Value]) -> Vec<TurnEntry> {
    entries
        .iter()
        .filter_map(|entry| {
            let role = match entry_type(entry) {
                "human" | "user" => TurnRole::Human,
                "assistant" => TurnRole::Assistant,
                _ => return None,
            };
            let text = message_content(entry)
                .map(|c| extract_text(c).join("\n"))
                .unwrap_or_default();
            if text.is_empty() {
                None
            } else {
                Some(TurnEntry { role, text })
            }
        })
        .collect()
}

#[cfg(test)]
#[path = "transcript_tests.rs"]
mod tests;

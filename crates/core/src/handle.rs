// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Human-friendly session handles: `{adjective}-{noun}` drawn from two
//! small fixed lexicons, plus the multiplexer name mapping.

use rand::Rng;

/// Prefix for tmux session names so sweeps over `tmux ls` can be scoped
/// to sessions we own.
pub const MUX_PREFIX: &str = "ds-";

const ADJECTIVES: &[&str] = &[
    "able", "back", "bold", "busy", "calm", "cool", "cozy", "damp", "dark", "deep", "easy", "fair",
    "fast", "fine", "firm", "fizz", "flat", "fond", "free", "glad", "gold", "good", "gray", "grim",
    "half", "hard", "high", "keen", "kind", "late", "lean", "loud", "mild", "neat", "pale", "pink",
    "rare", "ripe", "safe", "slim", "soft", "tall", "tame", "tidy", "warm", "wide", "wild", "wise",
];

const NOUNS: &[&str] = &[
    "arch", "barn", "bay", "bell", "bird", "boat", "brook", "cave", "cliff", "cloud", "cove",
    "creek", "dale", "dawn", "dune", "elm", "fern", "field", "ford", "fox", "gate", "glen", "grove",
    "hill", "isle", "lake", "lark", "leaf", "moss", "oak", "path", "peak", "pine", "pond", "reef",
    "ridge", "rock", "shore", "sky", "star", "stone", "top", "trail", "vale", "wave", "well",
    "wolf", "wren",
];

/// Draw a random two-token handle, e.g. `fizz-top`.
pub fn generate_handle() -> String {
    let mut rng = rand::rng();
    let adj = ADJECTIVES[rng.random_range(0..ADJECTIVES.len())];
    let noun = NOUNS[rng.random_range(0..NOUNS.len())];
    format!("{adj}-{noun}")
}

/// Tmux session name for a handle.
pub fn to_multiplexer_name(handle: &str) -> String {
    format!("{MUX_PREFIX}{handle}")
}

/// Inverse of [`to_multiplexer_name`]; `None` when the name is not ours.
pub fn from_multiplexer_name(name: &str) -> Option<&str> {
    name.strip_prefix(MUX_PREFIX)
}

#[cfg(test)]
#[path = "handle_tests.rs"]
mod tests;

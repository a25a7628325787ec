// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn generated_handles_are_two_lexicon_tokens() {
    for _ in 0..50 {
        let handle = generate_handle();
        let mut parts = handle.splitn(2, '-');
        let adj = parts.next().unwrap();
        let noun = parts.next().unwrap();
        assert!(ADJECTIVES.contains(&adj), "unknown adjective {adj}");
        assert!(NOUNS.contains(&noun), "unknown noun {noun}");
    }
}

#[test]
fn multiplexer_name_round_trips() {
    let name = to_multiplexer_name("fizz-top");
    assert_eq!(name, "ds-fizz-top");
    assert_eq!(from_multiplexer_name(&name), Some("fizz-top"));
    assert_eq!(from_multiplexer_name("tmux-other"), None);
}

#[test]
fn lexicons_have_no_duplicates() {
    let mut adjs: Vec<_> = ADJECTIVES.to_vec();
    adjs.sort_unstable();
    adjs.dedup();
    assert_eq!(adjs.len(), ADJECTIVES.len());

    let mut nouns: Vec<_> = NOUNS.to_vec();
    nouns.sort_unstable();
    nouns.dedup();
    assert_eq!(nouns.len(), NOUNS.len());
}

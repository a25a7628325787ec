// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;
use std::path::PathBuf;
use yare::parameterized;

#[parameterized(
    plain = { "/tmp/proj", "-tmp-proj" },
    dotted = { "/home/u/my.app", "-home-u-my-app" },
    spaces = { "/Users/a b/c", "-Users-a-b-c" },
    underscores = { "/w/x_y", "-w-x-y" },
)]
fn sanitize_replaces_non_alphanumerics(input: &str, expected: &str) {
    assert_eq!(sanitize_workspace_path(Path::new(input)), expected);
}

#[test]
fn transcript_path_joins_projects_dir_and_internal_id() {
    let path = transcript_path(Path::new("/tmp/proj"), "abc-123");
    let s = path.to_string_lossy();
    assert!(s.ends_with("projects/-tmp-proj/abc-123.jsonl"), "{s}");
}

proptest! {
    // Sanitization is idempotent: output contains only [A-Za-z0-9-], so a
    // second pass changes nothing.
    #[test]
    fn sanitize_is_idempotent(input in "\\PC{0,60}") {
        let once = sanitize_workspace_path(Path::new(&input));
        let twice = sanitize_workspace_path(Path::new(&once));
        prop_assert_eq!(once, twice);
    }

    // Inputs differing only in which non-alphanumeric byte they use map to
    // the same output.
    #[test]
    fn sanitize_collapses_separator_choice(stem in "[a-z]{1,10}", tail in "[a-z]{1,10}") {
        let slash = sanitize_workspace_path(&PathBuf::from(format!("{stem}/{tail}")));
        let dot = sanitize_workspace_path(&PathBuf::from(format!("{stem}.{tail}")));
        prop_assert_eq!(slash, dot);
    }
}

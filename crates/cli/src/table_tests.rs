// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn renders_aligned_columns() {
    let rows = vec![
        vec!["backend".to_string(), "idle".to_string()],
        vec!["ui".to_string(), "busy".to_string()],
    ];
    let out = render(&["agent", "status"], &rows);
    assert_eq!(out, "AGENT    STATUS\nbackend  idle\nui       busy\n");
}

#[test]
fn header_width_wins_for_short_cells() {
    let rows = vec![vec!["x".to_string()]];
    let out = render(&["longheader"], &rows);
    assert!(out.starts_with("LONGHEADER\n"));
    assert_eq!(out.lines().nth(1), Some("x"));
}

#[test]
fn empty_rows_render_header_only() {
    let out = render(&["a", "b"], &[]);
    assert_eq!(out, "A  B\n");
}

#[test]
fn trailing_whitespace_is_trimmed() {
    let rows = vec![vec!["wide-cell".to_string(), "".to_string()]];
    let out = render(&["h", "tail"], &rows);
    for line in out.lines() {
        assert_eq!(line, line.trim_end());
    }
}

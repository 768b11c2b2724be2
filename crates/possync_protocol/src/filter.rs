//! The deduplication filter.
//!
//! Runs once on every inbound submission before anything is staged or
//! forwarded:
//!
//! 1. Alias groups are resolved on the summary and on every line.
//! 2. Lines are deduplicated by `linenum`. The first record seen for a line
//!    number is kept; later ones are dropped without error.
//!
//! The filter never fails. Lines without a readable line number are passed
//! through untouched so that validation can reject them with a precise
//! error.

use crate::alias::{resolve_aliases, LINE_ALIASES, SUMMARY_ALIASES};
use crate::decimal::parse_integer;
use crate::submission::{Fields, Submission};
use std::collections::HashSet;

/// Canonical key holding a line's number.
pub const LINE_NUMBER_FIELD: &str = "linenum";

/// Reads the line number of an alias-resolved line.
pub fn line_number(line: &Fields) -> Option<i64> {
    line.get(LINE_NUMBER_FIELD).and_then(parse_integer)
}

/// Drops every line whose number was already seen, preserving input order.
pub fn dedup_lines(lines: Vec<Fields>) -> Vec<Fields> {
    let mut seen = HashSet::with_capacity(lines.len());
    lines
        .into_iter()
        .filter(|line| match line_number(line) {
            Some(num) => seen.insert(num),
            None => true,
        })
        .collect()
}

/// Resolves line aliases and deduplicates a batch of line records.
pub fn canonicalize_lines(mut lines: Vec<Fields>) -> Vec<Fields> {
    for line in &mut lines {
        resolve_aliases(line, LINE_ALIASES);
    }
    dedup_lines(lines)
}

/// Produces the canonical form of a submission.
pub fn canonicalize(mut submission: Submission) -> Submission {
    resolve_aliases(&mut submission.summary, SUMMARY_ALIASES);
    submission.lines = canonicalize_lines(submission.lines);
    submission
}

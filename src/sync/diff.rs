//! Minimal text-change computation for buffer publishing.

use std::time::{Duration, Instant};

use similar::{Algorithm, ChangeTag, TextDiff};

use crate::document::{TextChange, TextSpan};

/// Upper bound on diff time; past it `similar` falls back to a coarser but
/// still correct result.
const DIFF_DEADLINE: Duration = Duration::from_millis(200);

/// Compute the changes turning `old` into `new`.
///
/// Changes are ordered and each is expressed against the text produced by
/// applying the previous ones, so applying them in list order with
/// [`apply_text_changes`](crate::document::apply_text_changes) reproduces
/// `new`. Adjacent deletions and insertions are merged into one replacement.
pub fn minimal_text_changes(old: &str, new: &str) -> Vec<TextChange> {
    if old == new {
        return Vec::new();
    }

    // Character granularity keeps changes small; byte offsets are tracked via
    // the UTF-8 length of each chunk.
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .deadline(Instant::now() + DIFF_DEADLINE)
        .diff_chars(old, new);

    let mut changes = Vec::new();
    let mut cursor = 0;
    let mut pending: Option<(usize, usize, String)> = None;

    for change in diff.iter_all_changes() {
        let value = change.value();
        match change.tag() {
            ChangeTag::Equal => {
                if let Some((start, deleted, inserted)) = pending.take() {
                    cursor = start + inserted.len();
                    changes.push(TextChange::new(TextSpan::new(start, deleted), inserted));
                }
                cursor += value.len();
            }
            ChangeTag::Delete => {
                let (_, deleted, _) = pending.get_or_insert_with(|| (cursor, 0, String::new()));
                *deleted += value.len();
            }
            ChangeTag::Insert => {
                let (_, _, inserted) = pending.get_or_insert_with(|| (cursor, 0, String::new()));
                inserted.push_str(value);
            }
        }
    }

    if let Some((start, deleted, inserted)) = pending {
        changes.push(TextChange::new(TextSpan::new(start, deleted), inserted));
    }
    changes
}

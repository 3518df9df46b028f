//! Remapping of backend edits (formatting, refactoring) onto the host document.
//!
//! Edits that cannot be placed safely are dropped. Losing a whitespace edit is
//! preferable to corrupting the host document.

use std::collections::HashSet;

use tower_lsp_server::ls_types::TextEdit;

use crate::document::{GeneratedDocument, TextChange, TextSpan};

use super::position::try_map_to_host_position;

/// Map a batch of generated-document edits to host-document edits.
///
/// Edits are considered in order; the returned list preserves that order and
/// omits edits that could not be mapped.
pub fn get_host_document_edits(
    generated: &GeneratedDocument,
    edits: &[TextChange],
) -> Vec<TextChange> {
    let mut broken_host_lines = HashSet::new();
    edits
        .iter()
        .filter_map(|edit| {
            let mapped = map_edit(generated, edit, &mut broken_host_lines);
            if mapped.is_none() {
                log::trace!(
                    target: "utsushi::mapping",
                    "Dropping unmappable {} edit at {}..{}",
                    generated.kind(),
                    edit.span.start,
                    edit.span.end()
                );
            }
            mapped
        })
        .collect()
}

/// LSP form of [`get_host_document_edits`].
pub fn get_host_document_text_edits(
    generated: &GeneratedDocument,
    edits: &[TextEdit],
) -> Vec<TextEdit> {
    let changes: Vec<TextChange> = edits
        .iter()
        .filter_map(|edit| {
            let span = generated.text().range_to_span(edit.range)?;
            Some(TextChange::new(span, edit.new_text.clone()))
        })
        .collect();

    let host = generated.host_text();
    get_host_document_edits(generated, &changes)
        .into_iter()
        .filter_map(|change| {
            Some(TextEdit {
                range: host.span_to_range(change.span)?,
                new_text: change.new_text,
            })
        })
        .collect()
}

fn map_edit(
    generated: &GeneratedDocument,
    edit: &TextChange,
    broken_host_lines: &mut HashSet<usize>,
) -> Option<TextChange> {
    let start = edit.span.start;
    let end = edit.span.end();
    let host_start = try_map_to_host_position(generated, start).map(|(index, _)| index);
    let host_end = try_map_to_host_position(generated, end).map(|(index, _)| index);

    match (host_start, host_end) {
        (Some(host_start), Some(host_end)) => {
            // Reordered mappings can put the endpoints out of host order.
            if host_start > host_end {
                log::debug!(
                    target: "utsushi::mapping",
                    "{} edit {}..{} inverts in host space",
                    generated.kind(),
                    start,
                    end
                );
                return None;
            }
            Some(TextChange::new(
                TextSpan::from_bounds(host_start, host_end),
                edit.new_text.clone(),
            ))
        }
        (None, Some(host_end)) => map_from_last_line(generated, edit, host_end),
        (None, None) if edit.span.is_empty() => {
            map_transition_line_insertion(generated, edit, broken_host_lines)
        }
        _ => None,
    }
}

/// Formatters often anchor a multi-line indentation edit one line early, at a
/// position with no host counterpart. Keep only the part of the edit that
/// touches the end's line.
fn map_from_last_line(
    generated: &GeneratedDocument,
    edit: &TextChange,
    host_end: usize,
) -> Option<TextChange> {
    let text = generated.text();
    let start_line = text.line_of(edit.span.start);
    let end_line = text.line_of(edit.span.end());
    if start_line == end_line {
        return None;
    }

    let last_line_start = text.line_start(end_line)?;
    let (host_start, _) = try_map_to_host_position(generated, last_line_start)?;
    if host_start > host_end {
        return None;
    }

    let new_text = match edit.new_text.rfind('\n') {
        Some(newline) => &edit.new_text[newline + 1..],
        None => edit.new_text.as_str(),
    };
    Some(TextChange::new(
        TextSpan::from_bounds(host_start, host_end),
        new_text,
    ))
}

/// A zero-width insertion on a line that is whitespace up to a mapping
/// boundary, e.g. the line opening a code block. The insertion moves to the
/// boundary on its own host line, unless that host line already received a
/// line break from an earlier edit.
fn map_transition_line_insertion(
    generated: &GeneratedDocument,
    edit: &TextChange,
    broken_host_lines: &mut HashSet<usize>,
) -> Option<TextChange> {
    let text = generated.text();
    let line_start = text.line_start(text.line_of(edit.span.start))?;
    let content = text.as_str().get(line_start..)?;

    let whitespace = content.len() - content.trim_start().len();
    let boundary = line_start + whitespace;
    if boundary < edit.span.start || boundary >= text.len() {
        return None;
    }

    let (host_index, _) = try_map_to_host_position(generated, boundary)?;
    let host = generated.host_text();
    let host_line = host.line_of(host_index);

    let new_text = if broken_host_lines.insert(host_line) {
        format!(
            "\n{}{}",
            host.indentation_of_line(host_line),
            edit.new_text
        )
    } else {
        format!(" {}", edit.new_text)
    };
    Some(TextChange::insertion(host_index, new_text))
}

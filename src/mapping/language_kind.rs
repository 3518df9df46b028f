//! Classification of host positions by owning language.

use crate::document::{CodeDocument, LanguageKind};

/// Classify `host_index` in `code_document`.
///
/// A classified span owns the indices it covers, including its end edge,
/// except when the span is a marker (transition or meta-code), accepts no
/// characters, or is empty. With `right_associative`, an index sitting exactly
/// between two spans goes to the following one; completion triggers use this
/// to see the token about to be typed.
///
/// Tag-helper spans are consulted only when no classified span claims the
/// index and never own their end edge. At end-of-document the last classified
/// span's language applies. Anything else is the host language.
pub fn get_language_kind(
    code_document: &CodeDocument,
    host_index: usize,
    right_associative: bool,
) -> LanguageKind {
    let classified = code_document.classified_spans();

    for (i, classified_span) in classified.iter().enumerate() {
        let span = classified_span.span;
        if span.absolute_index > host_index {
            break;
        }
        let end = span.end();
        if end < host_index {
            continue;
        }
        if end == host_index {
            if classified_span.kind.is_marker()
                || classified_span.accepts_none
                || span.length == 0
            {
                continue;
            }
            let next_starts_here = classified
                .get(i + 1)
                .is_some_and(|next| next.span.absolute_index == host_index);
            if right_associative && next_starts_here {
                continue;
            }
        }
        return classified_span.kind.language_kind();
    }

    let inside_tag_helper = code_document.tag_helper_spans().iter().any(|tag_helper| {
        tag_helper.span.absolute_index <= host_index && host_index < tag_helper.span.end()
    });
    if inside_tag_helper {
        return LanguageKind::Markup;
    }

    if host_index == code_document.source().len() {
        if let Some(last) = classified.last() {
            return last.kind.language_kind();
        }
    }

    LanguageKind::Host
}

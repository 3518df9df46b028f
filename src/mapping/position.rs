//! Position translation between the host document and one projection.
//!
//! A mapping owns both of its edges: a caret directly after the last mapped
//! character still resolves, which is what completion at the end of an
//! identifier needs.

use tower_lsp_server::ls_types::Position;

use crate::document::GeneratedDocument;

/// Map a host byte offset into `generated`.
///
/// Returns the generated offset and its position, or None if no mapping
/// contains `host_index`.
pub fn try_map_to_generated_position(
    generated: &GeneratedDocument,
    host_index: usize,
) -> Option<(usize, Position)> {
    map_to_generated(generated, host_index, false)
}

/// Like [`try_map_to_generated_position`], but when no mapping contains
/// `host_index`, fall back to the start of the next mapping if it begins on the
/// same host line.
///
/// Recovers the intended target when a request lands in whitespace or markup
/// just before code, e.g. `@|  Model.Name`.
pub fn try_map_to_generated_or_next_position(
    generated: &GeneratedDocument,
    host_index: usize,
) -> Option<(usize, Position)> {
    map_to_generated(generated, host_index, true)
}

fn map_to_generated(
    generated: &GeneratedDocument,
    host_index: usize,
    next_on_failure: bool,
) -> Option<(usize, Position)> {
    for mapping in generated.source_mappings() {
        let original = mapping.original_span;
        if original.absolute_index <= host_index {
            let distance = host_index - original.absolute_index;
            if distance <= original.length {
                let generated_index = mapping.generated_span.absolute_index + distance;
                return with_position(generated, generated_index);
            }
        } else {
            // Mappings are sorted by host offset, so this is the next one.
            if next_on_failure {
                let host_line = generated.host_text().line_of(host_index) as u32;
                if original.line_index == host_line {
                    return with_position(generated, mapping.generated_span.absolute_index);
                }
            }
            break;
        }
    }
    None
}

fn with_position(
    generated: &GeneratedDocument,
    generated_index: usize,
) -> Option<(usize, Position)> {
    match generated.position_of(generated_index) {
        Some(position) => Some((generated_index, position)),
        None => {
            log::warn!(
                target: "utsushi::mapping",
                "{} mapping points past the generated text (offset {}, length {})",
                generated.kind(),
                generated_index,
                generated.text().len()
            );
            None
        }
    }
}

/// Map a generated byte offset back into the host document.
///
/// Mappings are ordered by host offset, not generated offset, so every mapping
/// is scanned; the first containing one wins.
pub fn try_map_to_host_position(
    generated: &GeneratedDocument,
    generated_index: usize,
) -> Option<(usize, Position)> {
    let mapping = generated
        .source_mappings()
        .iter()
        .find(|m| m.generated_span.touches(generated_index))?;

    let distance = generated_index - mapping.generated_span.absolute_index;
    let host_index = mapping.original_span.absolute_index + distance;
    let position = generated.host_text().offset_to_position(host_index)?;
    Some((host_index, position))
}

/// Position-based form of [`try_map_to_generated_position`].
pub fn map_position_to_generated(
    generated: &GeneratedDocument,
    host_position: Position,
) -> Option<(usize, Position)> {
    let host_index = generated.host_text().position_to_offset(host_position)?;
    try_map_to_generated_position(generated, host_index)
}

/// Position-based form of [`try_map_to_host_position`].
pub fn map_position_to_host(
    generated: &GeneratedDocument,
    generated_position: Position,
) -> Option<(usize, Position)> {
    let generated_index = generated.text().position_to_offset(generated_position)?;
    try_map_to_host_position(generated, generated_index)
}

//! Range translation from a projection back to the host document.

use tower_lsp_server::ls_types::Range;

use crate::document::{GeneratedDocument, SourceMapping};

use super::position::try_map_to_host_position;

/// How tolerant range translation is of partially unmapped input.
///
/// Each policy accepts everything the previous one does and returns the same
/// result for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MappingBehavior {
    /// Both endpoints must map.
    #[default]
    Strict,
    /// One endpoint may be unmapped if exactly one mapping explains the range.
    Inclusive,
    /// Ranges between mappings are widened to the host gap after the nearest
    /// preceding mapping. Used for diagnostics in generated glue code.
    Inferred,
}

/// Map a generated range to the host document under `behavior`.
pub fn try_map_to_host_range(
    generated: &GeneratedDocument,
    generated_range: Range,
    behavior: MappingBehavior,
) -> Option<Range> {
    let text = generated.text();
    let start = text.position_to_offset(generated_range.start)?;
    let end = text.position_to_offset(generated_range.end)?;
    // Ranges come from backends and are not trusted to be ordered.
    if end < start {
        log::warn!(
            target: "utsushi::mapping",
            "Refusing inverted {} range {:?}",
            generated.kind(),
            generated_range
        );
        return None;
    }

    let (host_start, host_end) = match behavior {
        MappingBehavior::Strict => map_strict(generated, start, end),
        MappingBehavior::Inclusive => map_inclusive(generated, start, end),
        MappingBehavior::Inferred => map_inferred(generated, start, end),
    }?;

    let host = generated.host_text();
    Some(Range::new(
        host.offset_to_position(host_start)?,
        host.offset_to_position(host_end)?,
    ))
}

fn map_strict(generated: &GeneratedDocument, start: usize, end: usize) -> Option<(usize, usize)> {
    let (host_start, _) = try_map_to_host_position(generated, start)?;
    let (host_end, _) = try_map_to_host_position(generated, end)?;
    // Mappings may be reordered in generated space, so endpoints of an
    // ordered generated range can land out of order in the host.
    if host_end < host_start {
        log::debug!(
            target: "utsushi::mapping",
            "Strict mapping of {}..{} inverted in host space ({}..{})",
            start,
            end,
            host_start,
            host_end
        );
        return None;
    }
    Some((host_start, host_end))
}

fn map_inclusive(
    generated: &GeneratedDocument,
    start: usize,
    end: usize,
) -> Option<(usize, usize)> {
    let start_mapped = try_map_to_host_position(generated, start);
    let end_mapped = try_map_to_host_position(generated, end);

    if let (Some((host_start, _)), Some((host_end, _))) = (start_mapped, end_mapped) {
        if host_start <= host_end {
            return Some((host_start, host_end));
        }
    }

    let mappings = generated.source_mappings();
    let candidates: Vec<&SourceMapping> = if start_mapped.is_some() {
        mappings
            .iter()
            .filter(|m| m.generated_span.touches(start))
            .collect()
    } else if end_mapped.is_some() {
        mappings
            .iter()
            .filter(|m| m.generated_span.touches(end))
            .collect()
    } else {
        mappings
            .iter()
            .filter(|m| m.generated_span.overlaps(start, end))
            .collect()
    };

    match candidates.as_slice() {
        [only] => Some((only.original_span.absolute_index, only.original_span.end())),
        _ => None,
    }
}

fn map_inferred(generated: &GeneratedDocument, start: usize, end: usize) -> Option<(usize, usize)> {
    if let Some(mapped) = map_inclusive(generated, start, end) {
        return Some(mapped);
    }

    let mappings = generated.source_mappings();
    // Nothing is inferred before the first mapping: generated glue ahead of
    // it has no host counterpart to blame.
    let before = mappings
        .iter()
        .rposition(|m| m.generated_span.end() <= start)?;

    let host_start = mappings[before].original_span.end();
    let host_end = mappings
        .get(before + 1)
        .map(|after| after.original_span.absolute_index)
        .unwrap_or_else(|| generated.host_text().len());

    // Mappings are ordered and disjoint in host space, so the gap between
    // neighbours cannot invert unless the document was built from malformed
    // mappings.
    if host_end < host_start {
        log::warn!(
            target: "utsushi::mapping",
            "Inferred {} range {}..{} inverted in host space ({}..{})",
            generated.kind(),
            start,
            end,
            host_start,
            host_end
        );
        debug_assert!(false, "adjacent mappings out of host order");
        return None;
    }
    Some((host_start, host_end))
}

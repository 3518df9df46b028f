//! Where a request position lands: which language owns it and where it sits
//! in that language's projection.

use tower_lsp_server::ls_types::Position;

use crate::document::{CodeDocument, LanguageKind, ProjectionKind};
use crate::mapping::{
    get_language_kind, try_map_to_generated_or_next_position, try_map_to_generated_position,
};

/// A host position resolved against a [`CodeDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projection {
    pub language_kind: LanguageKind,
    pub host_position: Position,
    pub host_index: usize,
    /// Offset in the owning projection; equal to `host_index` for the host
    /// language.
    pub generated_index: usize,
    pub generated_position: Position,
}

impl Projection {
    fn host(host_position: Position, host_index: usize) -> Self {
        Self {
            language_kind: LanguageKind::Host,
            host_position,
            host_index,
            generated_index: host_index,
            generated_position: host_position,
        }
    }

    pub fn projection_kind(&self) -> Option<ProjectionKind> {
        self.language_kind.projection()
    }
}

/// Resolve `host_position` in `code_document`.
///
/// A position owned by an embedded language but absent from its projection's
/// mappings is reported as the host language, so it is answered locally and
/// never delegated. Returns None only if the position is outside the host
/// text.
pub fn compute_projection(
    code_document: &CodeDocument,
    host_position: Position,
    right_associative: bool,
    next_position_on_failure: bool,
) -> Option<Projection> {
    let host_index = code_document.source().position_to_offset(host_position)?;
    let language_kind = get_language_kind(code_document, host_index, right_associative);

    let Some(kind) = language_kind.projection() else {
        return Some(Projection::host(host_position, host_index));
    };

    let generated = code_document.generated(kind);
    let mapped = if kind == ProjectionKind::Code && next_position_on_failure {
        try_map_to_generated_or_next_position(generated, host_index)
    } else {
        try_map_to_generated_position(generated, host_index)
    };

    match mapped {
        Some((generated_index, generated_position)) => Some(Projection {
            language_kind,
            host_position,
            host_index,
            generated_index,
            generated_position,
        }),
        None => {
            log::trace!(
                target: "utsushi::delegation",
                "{:?} position {}:{} has no {} mapping; treating as host",
                language_kind,
                host_position.line,
                host_position.character,
                kind
            );
            Some(Projection::host(host_position, host_index))
        }
    }
}

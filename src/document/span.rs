//! Source-span index: spans, mappings and classifications of one host document.
//!
//! Everything here is plain immutable data produced by the compiler
//! collaborator. Lookup logic lives in `crate::mapping`.

use serde::{Deserialize, Serialize};

/// A half-open byte range `[absolute_index, absolute_index + length)` in one
/// text buffer, together with the 0-based line its start sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSpan {
    pub absolute_index: usize,
    pub length: usize,
    pub line_index: u32,
}

impl SourceSpan {
    pub const fn new(absolute_index: usize, length: usize, line_index: u32) -> Self {
        Self {
            absolute_index,
            length,
            line_index,
        }
    }

    pub const fn end(&self) -> usize {
        self.absolute_index + self.length
    }

    /// Edge-inclusive containment: both `absolute_index` and `end()` are inside.
    pub const fn touches(&self, index: usize) -> bool {
        self.absolute_index <= index && index <= self.end()
    }

    /// Whether `[start, end)` shares at least one byte with this span.
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        start.max(self.absolute_index) < end.min(self.end())
    }
}

/// A contiguous correspondence between a host-document span and a span of one
/// generated document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMapping {
    pub original_span: SourceSpan,
    pub generated_span: SourceSpan,
}

impl SourceMapping {
    pub const fn new(original_span: SourceSpan, generated_span: SourceSpan) -> Self {
        Self {
            original_span,
            generated_span,
        }
    }
}

/// Check the ordering invariant of one projection's mappings: ascending by
/// original start, no overlap in original space, no overlap in generated space.
pub fn mappings_are_well_formed(mappings: &[SourceMapping]) -> bool {
    let ordered = mappings.windows(2).all(|pair| {
        pair[0].original_span.end() <= pair[1].original_span.absolute_index
    });
    if !ordered {
        return false;
    }

    let mut generated: Vec<SourceSpan> = mappings.iter().map(|m| m.generated_span).collect();
    generated.sort_by_key(|span| span.absolute_index);
    generated
        .windows(2)
        .all(|pair| pair[0].end() <= pair[1].absolute_index)
}

/// Syntactic role of a classified host region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpanKind {
    Markup,
    Code,
    /// An explicit switch into or out of template syntax, e.g. `@`.
    Transition,
    /// Template punctuation such as the braces of a block.
    MetaCode,
    Comment,
}

impl SpanKind {
    /// Marker spans never claim the boundary they end on.
    pub const fn is_marker(self) -> bool {
        matches!(self, SpanKind::Transition | SpanKind::MetaCode)
    }

    pub const fn language_kind(self) -> LanguageKind {
        match self {
            SpanKind::Markup => LanguageKind::Markup,
            SpanKind::Code => LanguageKind::Code,
            SpanKind::Transition | SpanKind::MetaCode | SpanKind::Comment => LanguageKind::Host,
        }
    }
}

/// A host region tagged with the language that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedSpan {
    pub span: SourceSpan,
    pub kind: SpanKind,
    /// The span accepts no characters, so typing at its end belongs elsewhere.
    pub accepts_none: bool,
}

impl ClassifiedSpan {
    pub const fn new(span: SourceSpan, kind: SpanKind) -> Self {
        Self {
            span,
            kind,
            accepts_none: false,
        }
    }

    pub const fn accepting_none(mut self) -> Self {
        self.accepts_none = true;
        self
    }
}

/// A host region covered by a tag-helper element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagHelperSpan {
    pub span: SourceSpan,
    pub name: String,
}

impl TagHelperSpan {
    pub fn new(span: SourceSpan, name: impl Into<String>) -> Self {
        Self {
            span,
            name: name.into(),
        }
    }
}

/// The language owning a host position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LanguageKind {
    /// The templating language itself; answered locally, never delegated.
    Host,
    Code,
    Markup,
}

impl LanguageKind {
    /// The projection backing this language, if it has one.
    pub const fn projection(self) -> Option<ProjectionKind> {
        match self {
            LanguageKind::Host => None,
            LanguageKind::Code => Some(ProjectionKind::Code),
            LanguageKind::Markup => Some(ProjectionKind::Markup),
        }
    }
}

/// A generated document kind, each with its own backend buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectionKind {
    Code,
    Markup,
}

impl ProjectionKind {
    pub const ALL: [ProjectionKind; 2] = [ProjectionKind::Code, ProjectionKind::Markup];

    pub const fn as_str(self) -> &'static str {
        match self {
            ProjectionKind::Code => "code",
            ProjectionKind::Markup => "markup",
        }
    }

    pub const fn language_kind(self) -> LanguageKind {
        match self {
            ProjectionKind::Code => LanguageKind::Code,
            ProjectionKind::Markup => LanguageKind::Markup,
        }
    }
}

impl std::fmt::Display for ProjectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

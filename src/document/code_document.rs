//! Compiled output of one host-document snapshot.
//!
//! A [`CodeDocument`] and its two [`GeneratedDocument`]s are never mutated
//! after construction. A newer snapshot produces a whole new instance, so
//! derived tables are memoized per instance without any invalidation.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use tower_lsp_server::ls_types::Position;

use super::span::{
    ClassifiedSpan, ProjectionKind, SourceMapping, TagHelperSpan, mappings_are_well_formed,
};
use super::text::SourceText;

/// One projection of the host document (the code view or the markup view).
#[derive(Debug)]
pub struct GeneratedDocument {
    kind: ProjectionKind,
    text: SourceText,
    source_mappings: Vec<SourceMapping>,
    host: Arc<SourceText>,
}

impl GeneratedDocument {
    fn new(
        kind: ProjectionKind,
        text: String,
        source_mappings: Vec<SourceMapping>,
        host: Arc<SourceText>,
    ) -> Self {
        if !mappings_are_well_formed(&source_mappings) {
            log::warn!(
                target: "utsushi::document",
                "{} projection has unordered or overlapping source mappings",
                kind
            );
            debug_assert!(false, "{kind} projection mappings must be ordered and disjoint");
        }
        Self {
            kind,
            text: SourceText::new(text),
            source_mappings,
            host,
        }
    }

    pub fn kind(&self) -> ProjectionKind {
        self.kind
    }

    /// Generated text as seen by the backend.
    pub fn text(&self) -> &SourceText {
        &self.text
    }

    /// Mappings in ascending host order.
    pub fn source_mappings(&self) -> &[SourceMapping] {
        &self.source_mappings
    }

    /// The host text this projection was generated from.
    pub fn host_text(&self) -> &SourceText {
        &self.host
    }

    pub fn position_of(&self, offset: usize) -> Option<Position> {
        self.text.offset_to_position(offset)
    }
}

/// Immutable compiled snapshot: host text, both projections and the
/// classification of host regions.
#[derive(Debug)]
pub struct CodeDocument {
    source: Arc<SourceText>,
    code: GeneratedDocument,
    markup: GeneratedDocument,
    classified_spans: Vec<ClassifiedSpan>,
    tag_helper_spans: Vec<TagHelperSpan>,
    imports: Vec<PathBuf>,
    sorted_classified_spans: OnceLock<Vec<ClassifiedSpan>>,
    sorted_tag_helper_spans: OnceLock<Vec<TagHelperSpan>>,
}

impl CodeDocument {
    pub fn builder(host_text: impl Into<String>) -> CodeDocumentBuilder {
        CodeDocumentBuilder::new(host_text.into())
    }

    pub fn source(&self) -> &SourceText {
        &self.source
    }

    pub fn generated(&self, kind: ProjectionKind) -> &GeneratedDocument {
        match kind {
            ProjectionKind::Code => &self.code,
            ProjectionKind::Markup => &self.markup,
        }
    }

    pub fn code(&self) -> &GeneratedDocument {
        &self.code
    }

    pub fn markup(&self) -> &GeneratedDocument {
        &self.markup
    }

    /// Classified spans in ascending host order (computed once).
    pub fn classified_spans(&self) -> &[ClassifiedSpan] {
        self.sorted_classified_spans.get_or_init(|| {
            let mut spans = self.classified_spans.clone();
            spans.sort_by_key(|s| (s.span.absolute_index, s.span.length));
            spans
        })
    }

    /// Tag-helper spans in ascending host order (computed once).
    pub fn tag_helper_spans(&self) -> &[TagHelperSpan] {
        self.sorted_tag_helper_spans.get_or_init(|| {
            let mut spans = self.tag_helper_spans.clone();
            spans.sort_by_key(|s| (s.span.absolute_index, s.span.length));
            spans
        })
    }

    /// Host paths this document depends on; a change to any of them requires
    /// regenerating this document.
    pub fn imports(&self) -> &[PathBuf] {
        &self.imports
    }
}

/// Assembles a [`CodeDocument`]; used by compiler implementations.
#[derive(Debug)]
pub struct CodeDocumentBuilder {
    host_text: String,
    code: (String, Vec<SourceMapping>),
    markup: (String, Vec<SourceMapping>),
    classified_spans: Vec<ClassifiedSpan>,
    tag_helper_spans: Vec<TagHelperSpan>,
    imports: Vec<PathBuf>,
}

impl CodeDocumentBuilder {
    fn new(host_text: String) -> Self {
        Self {
            host_text,
            code: (String::new(), Vec::new()),
            markup: (String::new(), Vec::new()),
            classified_spans: Vec::new(),
            tag_helper_spans: Vec::new(),
            imports: Vec::new(),
        }
    }

    pub fn code(mut self, text: impl Into<String>, mappings: Vec<SourceMapping>) -> Self {
        self.code = (text.into(), mappings);
        self
    }

    pub fn markup(mut self, text: impl Into<String>, mappings: Vec<SourceMapping>) -> Self {
        self.markup = (text.into(), mappings);
        self
    }

    pub fn classified_spans(mut self, spans: Vec<ClassifiedSpan>) -> Self {
        self.classified_spans = spans;
        self
    }

    pub fn tag_helper_spans(mut self, spans: Vec<TagHelperSpan>) -> Self {
        self.tag_helper_spans = spans;
        self
    }

    pub fn imports(mut self, imports: Vec<PathBuf>) -> Self {
        self.imports = imports;
        self
    }

    pub fn build(self) -> CodeDocument {
        let source = Arc::new(SourceText::new(self.host_text));
        let (code_text, code_mappings) = self.code;
        let (markup_text, markup_mappings) = self.markup;
        CodeDocument {
            code: GeneratedDocument::new(
                ProjectionKind::Code,
                code_text,
                code_mappings,
                Arc::clone(&source),
            ),
            markup: GeneratedDocument::new(
                ProjectionKind::Markup,
                markup_text,
                markup_mappings,
                Arc::clone(&source),
            ),
            source,
            classified_spans: self.classified_spans,
            tag_helper_spans: self.tag_helper_spans,
            imports: self.imports,
            sorted_classified_spans: OnceLock::new(),
            sorted_tag_helper_spans: OnceLock::new(),
        }
    }
}

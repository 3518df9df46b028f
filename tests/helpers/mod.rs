//! Shared fixtures for integration tests: a small template language and a
//! buffer sink that records what it is told.
//!
//! The template language:
//! - `@import <path>` on its own line records an import
//! - `@{ ... }` is a code block
//! - `@name` is a code expression
//! - everything else is markup

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use utsushi::document::{
    ClassifiedSpan, CodeDocument, DocumentCompiler, DocumentSnapshot, ProjectionKind,
    SourceMapping, SourceSpan, SpanKind,
};
use utsushi::sync::{BufferUpdate, BufferUpdateSink};

/// Compiles the template language above and counts how often it ran.
#[derive(Debug, Default)]
pub struct TemplateCompiler {
    compiles: AtomicUsize,
}

impl TemplateCompiler {
    pub fn compile_count(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }
}

impl DocumentCompiler for TemplateCompiler {
    fn compile(&self, snapshot: &DocumentSnapshot) -> CodeDocument {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        compile_template(snapshot.text())
    }
}

fn line_at(text: &str, index: usize) -> u32 {
    text[..index].bytes().filter(|b| *b == b'\n').count() as u32
}

fn is_ident(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'.'
}

struct Compilation<'a> {
    host: &'a str,
    code: String,
    code_mappings: Vec<SourceMapping>,
    markup: Vec<u8>,
    markup_mappings: Vec<SourceMapping>,
    spans: Vec<ClassifiedSpan>,
    imports: Vec<PathBuf>,
}

impl<'a> Compilation<'a> {
    fn new(host: &'a str) -> Self {
        Self {
            host,
            code: String::new(),
            code_mappings: Vec::new(),
            // Non-markup bytes are blanked; newlines survive so lines agree.
            markup: host
                .bytes()
                .map(|b| if b == b'\n' { b'\n' } else { b' ' })
                .collect(),
            markup_mappings: Vec::new(),
            spans: Vec::new(),
            imports: Vec::new(),
        }
    }

    fn span(&self, start: usize, end: usize) -> SourceSpan {
        SourceSpan::new(start, end - start, line_at(self.host, start))
    }

    fn classify(&mut self, start: usize, end: usize, kind: SpanKind) {
        let span = self.span(start, end);
        self.spans.push(ClassifiedSpan::new(span, kind));
    }

    fn markup(&mut self, start: usize, end: usize) {
        if start == end {
            return;
        }
        self.classify(start, end, SpanKind::Markup);
        self.markup[start..end].copy_from_slice(&self.host.as_bytes()[start..end]);
        let span = self.span(start, end);
        self.markup_mappings.push(SourceMapping::new(span, span));
    }

    fn code(&mut self, start: usize, end: usize, prefix: &str, suffix: &str) {
        self.classify(start, end, SpanKind::Code);
        self.code.push_str(prefix);
        let generated_start = self.code.len();
        self.code.push_str(&self.host[start..end]);
        let original = self.span(start, end);
        let generated = SourceSpan::new(
            generated_start,
            end - start,
            line_at(&self.code, generated_start),
        );
        self.code_mappings.push(SourceMapping::new(original, generated));
        self.code.push_str(suffix);
    }

    fn finish(self) -> CodeDocument {
        let markup = String::from_utf8(self.markup).unwrap_or_default();
        CodeDocument::builder(self.host)
            .code(self.code, self.code_mappings)
            .markup(markup, self.markup_mappings)
            .classified_spans(self.spans)
            .imports(self.imports)
            .build()
    }
}

/// Compile `text` into its code and markup projections.
pub fn compile_template(text: &str) -> CodeDocument {
    let mut compilation = Compilation::new(text);
    let bytes = text.as_bytes();
    let mut markup_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let at_line_start = i == 0 || bytes[i - 1] == b'\n';
        let rest = &text[i..];

        if at_line_start && rest.starts_with("@import ") {
            compilation.markup(markup_start, i);
            let line_end = rest.find('\n').map_or(text.len(), |n| i + n);
            compilation
                .imports
                .push(PathBuf::from(text[i + "@import ".len()..line_end].trim()));
            compilation.classify(i, line_end, SpanKind::MetaCode);
            i = line_end;
            markup_start = i;
        } else if rest.starts_with("@{") {
            compilation.markup(markup_start, i);
            compilation.classify(i, i + 1, SpanKind::Transition);
            compilation.classify(i + 1, i + 2, SpanKind::MetaCode);
            let body_start = i + 2;
            let body_end = text[body_start..]
                .find('}')
                .map_or(text.len(), |n| body_start + n);
            compilation.code(body_start, body_end, "", "\n");
            if body_end < text.len() {
                compilation.classify(body_end, body_end + 1, SpanKind::MetaCode);
                i = body_end + 1;
            } else {
                i = body_end;
            }
            markup_start = i;
        } else if bytes[i] == b'@' && bytes.get(i + 1).is_some_and(|b| is_ident(*b)) {
            compilation.markup(markup_start, i);
            compilation.classify(i, i + 1, SpanKind::Transition);
            let ident_end = bytes[i + 1..]
                .iter()
                .position(|b| !is_ident(*b))
                .map_or(text.len(), |n| i + 1 + n);
            compilation.code(i + 1, ident_end, "__o = ", ";\n");
            i = ident_end;
            markup_start = i;
        } else {
            i += 1;
        }
    }
    compilation.markup(markup_start, text.len());
    compilation.finish()
}

/// Records every buffer update in publish order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<(ProjectionKind, BufferUpdate)>>,
}

impl RecordingSink {
    pub fn updates(&self) -> Vec<(ProjectionKind, BufferUpdate)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn updates_for(&self, kind: ProjectionKind) -> Vec<BufferUpdate> {
        self.updates()
            .into_iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, update)| update)
            .collect()
    }
}

impl BufferUpdateSink for RecordingSink {
    fn publish(&self, kind: ProjectionKind, update: BufferUpdate) {
        self.updates.lock().unwrap().push((kind, update));
    }
}

//! Host documents, their snapshots and compiled projections.

pub mod code_document;
pub mod snapshot;
pub mod span;
pub mod text;

pub use code_document::{CodeDocument, CodeDocumentBuilder, GeneratedDocument};
pub use snapshot::{DocumentCompiler, DocumentKey, DocumentSnapshot, ProjectKey, SnapshotId};
pub use span::{
    ClassifiedSpan, LanguageKind, ProjectionKind, SourceMapping, SourceSpan, SpanKind,
    TagHelperSpan,
};
pub use text::{SourceText, TextChange, TextSpan, apply_text_changes};

//! Text buffers with line tables, and the text-change vocabulary shared by
//! mapping and publishing.
//!
//! Offsets are byte offsets into UTF-8 text. LSP positions count UTF-16 code
//! units within a line, so every conversion goes through the per-line helpers
//! at the bottom of this module.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tower_lsp_server::ls_types::{Position, Range};

use super::span::SourceSpan;

/// An immutable text buffer with a lazily computed line table.
#[derive(Debug)]
pub struct SourceText {
    text: String,
    line_starts: OnceLock<Vec<usize>>,
}

impl SourceText {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            line_starts: OnceLock::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    fn line_starts(&self) -> &[usize] {
        self.line_starts
            .get_or_init(|| compute_line_starts(&self.text))
    }

    pub fn line_count(&self) -> usize {
        self.line_starts().len()
    }

    /// Line containing `offset`; offsets past the end clamp to the last line.
    pub fn line_of(&self, offset: usize) -> usize {
        match self.line_starts().binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line.saturating_sub(1),
        }
    }

    pub fn line_start(&self, line: usize) -> Option<usize> {
        self.line_starts().get(line).copied()
    }

    /// Byte offset of the end of `line`, excluding its line break.
    fn line_end(&self, line: usize) -> Option<usize> {
        let starts = self.line_starts();
        if line >= starts.len() {
            return None;
        }
        Some(if line + 1 < starts.len() {
            starts[line + 1] - 1
        } else {
            self.text.len()
        })
    }

    /// Text of `line` without its trailing `\n`.
    pub fn line_text(&self, line: usize) -> Option<&str> {
        let start = self.line_start(line)?;
        let end = self.line_end(line)?;
        Some(&self.text[start..end])
    }

    /// Convert a byte offset to an LSP position.
    ///
    /// Returns None for offsets past the end of the text. An offset inside a
    /// multi-byte character resolves to the start of that character.
    pub fn offset_to_position(&self, offset: usize) -> Option<Position> {
        if offset > self.text.len() {
            return None;
        }

        let line = self.line_of(offset);
        let line_text = self.line_text(line)?;
        let line_offset = offset - self.line_start(line)?;

        let character = match convert_byte_to_utf16_in_line(line_text, line_offset) {
            Some(utf16) => utf16,
            None => {
                // Past the visible line end (on the `\n`) or mid-character
                let mut valid_offset = line_offset.min(line_text.len());
                loop {
                    if let Some(utf16) = convert_byte_to_utf16_in_line(line_text, valid_offset) {
                        break utf16;
                    }
                    if valid_offset == 0 {
                        break 0;
                    }
                    valid_offset -= 1;
                }
            }
        };

        Some(Position {
            line: line as u32,
            character: character as u32,
        })
    }

    /// Convert an LSP position to a byte offset.
    ///
    /// Characters beyond the end of a line clamp to the line end; lines beyond
    /// the end of the text return None.
    pub fn position_to_offset(&self, position: Position) -> Option<usize> {
        let line = position.line as usize;
        let line_start = self.line_start(line)?;
        let line_text = self.line_text(line)?;

        match convert_utf16_to_byte_in_line(line_text, position.character as usize) {
            Some(byte_offset) => Some(line_start + byte_offset),
            None => Some(line_start + line_text.len()),
        }
    }

    pub fn range_to_span(&self, range: Range) -> Option<TextSpan> {
        let start = self.position_to_offset(range.start)?;
        let end = self.position_to_offset(range.end)?;
        (start <= end).then(|| TextSpan::from_bounds(start, end))
    }

    pub fn span_to_range(&self, span: TextSpan) -> Option<Range> {
        Some(Range {
            start: self.offset_to_position(span.start)?,
            end: self.offset_to_position(span.end())?,
        })
    }

    /// Build a [`SourceSpan`] for `[start, end)` in this text.
    pub fn source_span(&self, start: usize, end: usize) -> SourceSpan {
        SourceSpan::new(start, end.saturating_sub(start), self.line_of(start) as u32)
    }

    /// Leading spaces and tabs of `line`.
    pub fn indentation_of_line(&self, line: usize) -> &str {
        let Some(text) = self.line_text(line) else {
            return "";
        };
        let width = text.len() - text.trim_start_matches([' ', '\t']).len();
        &text[..width]
    }
}

impl From<String> for SourceText {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

impl From<&str> for SourceText {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

/// A `[start, start + length)` byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TextSpan {
    pub start: usize,
    pub length: usize,
}

impl TextSpan {
    pub fn new(start: usize, length: usize) -> Self {
        Self { start, length }
    }

    pub fn from_bounds(start: usize, end: usize) -> Self {
        Self {
            start,
            length: end.saturating_sub(start),
        }
    }

    pub fn end(&self) -> usize {
        self.start + self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// Replace the text covered by `span` with `new_text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextChange {
    pub span: TextSpan,
    pub new_text: String,
}

impl TextChange {
    pub fn new(span: TextSpan, new_text: impl Into<String>) -> Self {
        Self {
            span,
            new_text: new_text.into(),
        }
    }

    pub fn insertion(at: usize, new_text: impl Into<String>) -> Self {
        Self::new(TextSpan::new(at, 0), new_text)
    }
}

/// Apply `changes` one after another, each against the text produced by the
/// previous ones.
///
/// Returns None if a change falls outside the current text or splits a
/// character.
pub fn apply_text_changes(text: &str, changes: &[TextChange]) -> Option<String> {
    let mut buffer = text.to_string();
    for change in changes {
        let start = change.span.start;
        let end = change.span.end();
        if end > buffer.len() || !buffer.is_char_boundary(start) || !buffer.is_char_boundary(end)
        {
            return None;
        }
        buffer.replace_range(start..end, &change.new_text);
    }
    Some(buffer)
}

/// Compute line start offsets
pub fn compute_line_starts(text: &str) -> Vec<usize> {
    let mut line_starts = vec![0];
    line_starts.extend(text.match_indices('\n').map(|(index, _)| index + 1));
    line_starts
}

/// Convert UTF-16 position to byte position within a line
/// Returns None if the UTF-16 position is beyond the end of the line
#[inline(always)]
pub fn convert_utf16_to_byte_in_line(line_text: &str, utf16_pos: usize) -> Option<usize> {
    let mut byte_offset = 0;
    let mut utf16_offset = 0;

    for ch in line_text.chars() {
        if utf16_offset >= utf16_pos {
            return Some(byte_offset);
        }
        utf16_offset += ch.len_utf16();
        byte_offset += ch.len_utf8();
    }

    (utf16_offset == utf16_pos).then_some(byte_offset)
}

/// Convert byte position to UTF-16 position within a line
/// Returns None if the byte position is invalid (e.g., in the middle of a multi-byte character)
#[inline(always)]
pub fn convert_byte_to_utf16_in_line(line_text: &str, byte_pos: usize) -> Option<usize> {
    let mut utf16_offset = 0;
    let mut byte_count = 0;

    for ch in line_text.chars() {
        if byte_count == byte_pos {
            return Some(utf16_offset);
        }
        let ch_bytes = ch.len_utf8();
        if byte_count + ch_bytes > byte_pos {
            return None;
        }
        byte_count += ch_bytes;
        utf16_offset += ch.len_utf16();
    }

    (byte_count == byte_pos).then_some(utf16_offset)
}

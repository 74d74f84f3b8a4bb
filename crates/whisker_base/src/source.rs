//! Source files with lazy line indexing and snippet rendering.

use std::cell::OnceCell;

use crate::span::{SourcePosition, SourceSpan};

/// A source file held in memory.
///
/// The line index (byte offset of each line start) is built on first use and
/// cached, so constructing a `SourceFile` is free and position lookups are
/// O(log n).
#[derive(Debug)]
pub struct SourceFile {
    /// Path the file was loaded from, or a synthetic name like `<stdin>`.
    pub path: String,
    /// Full file content.
    pub content: String,
    line_starts: OnceCell<Vec<usize>>,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            line_starts: OnceCell::new(),
        }
    }

    fn line_starts(&self) -> &[usize] {
        self.line_starts.get_or_init(|| {
            let mut starts = vec![0];
            for (i, b) in self.content.bytes().enumerate() {
                if b == b'\n' {
                    starts.push(i + 1);
                }
            }
            starts
        })
    }

    /// Number of lines in the file. An empty file has one (empty) line.
    pub fn line_count(&self) -> usize {
        self.line_starts().len()
    }

    /// Returns the text of the 1-based line `n`, without the trailing
    /// newline. Returns `None` when `n` is out of range.
    pub fn line_text(&self, n: u32) -> Option<&str> {
        let starts = self.line_starts();
        let idx = (n as usize).checked_sub(1)?;
        let start = *starts.get(idx)?;
        let end = starts
            .get(idx + 1)
            .map(|next| next - 1)
            .unwrap_or(self.content.len());
        Some(self.content[start..end].trim_end_matches('\r'))
    }

    /// Computes the full position (line, column, offset) for a byte offset.
    ///
    /// Offsets past the end of the file clamp to the final position.
    pub fn position_at(&self, offset: usize) -> SourcePosition {
        let offset = offset.min(self.content.len());
        let starts = self.line_starts();
        let line_idx = match starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        let line_start = starts[line_idx];
        let mut pos = SourcePosition::new(line_idx as u32 + 1, 1, line_start);
        for ch in self.content[line_start..offset].chars() {
            pos.advance(ch);
        }
        pos
    }

    /// Renders the source lines covered by `span` in a gutter + caret form:
    ///
    /// ```text
    ///    3 | + [Go] -> Endd
    ///      |            ^^^^
    /// ```
    pub fn snippet(&self, span: SourceSpan) -> String {
        let mut out = String::new();
        let first = span.start.line;
        let last = span.end.line.max(first);
        let gutter_width = last.to_string().len().max(4);

        for line in first..=last {
            let Some(text) = self.line_text(line) else {
                continue;
            };
            out.push_str(&format!("{:>width$} | {}\n", line, text, width = gutter_width));

            let caret_start = if line == first {
                span.start.column.saturating_sub(1) as usize
            } else {
                0
            };
            let caret_end = if line == last {
                (span.end.column.saturating_sub(1) as usize).max(caret_start + 1)
            } else {
                text.chars().count().max(caret_start + 1)
            };
            out.push_str(&format!(
                "{:>width$} | {}{}\n",
                "",
                " ".repeat(caret_start),
                "^".repeat(caret_end - caret_start),
                width = gutter_width
            ));
        }

        out
    }
}

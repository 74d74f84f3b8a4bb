//! Source location tracking for diagnostics and source maps.
//!
//! A [`SourcePosition`] is a single point in a source file; a [`SourceSpan`]
//! is a contiguous region between two positions. Every token, AST node, and
//! diagnostic in whisker carries a span, enabling error messages that point
//! at the exact offending text.
//!
//! # Coordinates
//!
//! Lines and columns are 1-based (what editors display); `offset` is a
//! 0-based byte offset into the file content, matching Rust's string
//! slicing: `&source[span.start.offset..span.end.offset]` extracts the
//! spanned text.
//!
//! # Example
//!
//! ```
//! use whisker_base::SourcePosition;
//!
//! let mut pos = SourcePosition::start();
//! for ch in "ab\nc".chars() {
//!     pos.advance(ch);
//! }
//!
//! assert_eq!(pos.line, 2);
//! assert_eq!(pos.column, 2);
//! assert_eq!(pos.offset, 4);
//! ```

use serde::{Deserialize, Serialize};

/// A point in a source file.
///
/// Positions are `Copy` and cheap to pass around. [`SourcePosition::advance`]
/// steps the position over one character, keeping line, column, and byte
/// offset in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePosition {
    /// Line number (1-based).
    pub line: u32,
    /// Column number (1-based).
    pub column: u32,
    /// Byte offset into the file content (0-based).
    pub offset: usize,
}

impl SourcePosition {
    /// The position of the first character in a file: line 1, column 1,
    /// offset 0.
    pub fn start() -> Self {
        Self {
            line: 1,
            column: 1,
            offset: 0,
        }
    }

    /// Creates a position from explicit coordinates.
    pub fn new(line: u32, column: u32, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }

    /// Advances past `ch`, updating line, column, and byte offset.
    ///
    /// A newline resets the column to 1 and increments the line. A tab
    /// advances the column to the next 8-column boundary.
    pub fn advance(&mut self, ch: char) {
        self.offset += ch.len_utf8();
        match ch {
            '\n' => {
                self.line += 1;
                self.column = 1;
            }
            '\t' => {
                self.column = ((self.column - 1) / 8 + 1) * 8 + 1;
            }
            _ => {
                self.column += 1;
            }
        }
    }
}

impl Default for SourcePosition {
    fn default() -> Self {
        Self::start()
    }
}

/// A contiguous region of source text between two positions.
///
/// `start` is inclusive, `end` is exclusive. Use [`SourceSpan::merge`] to
/// build the covering span of a compound construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start: SourcePosition,
    pub end: SourcePosition,
}

impl SourceSpan {
    pub fn new(start: SourcePosition, end: SourcePosition) -> Self {
        Self { start, end }
    }

    /// A zero-width span at the given position.
    pub fn at(pos: SourcePosition) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }

    /// Returns the span covering both `self` and `other`.
    pub fn merge(self, other: SourceSpan) -> SourceSpan {
        let start = if self.start.offset <= other.start.offset {
            self.start
        } else {
            other.start
        };
        let end = if self.end.offset >= other.end.offset {
            self.end
        } else {
            other.end
        };
        SourceSpan { start, end }
    }

    /// Returns the length of the span in bytes.
    pub fn len(&self) -> usize {
        self.end.offset.saturating_sub(self.start.offset)
    }

    /// Returns `true` if this span covers no bytes.
    pub fn is_empty(&self) -> bool {
        self.start.offset >= self.end.offset
    }

    /// Returns `true` if `offset` falls inside this span.
    pub fn contains_offset(&self, offset: usize) -> bool {
        offset >= self.start.offset && offset < self.end.offset
    }
}

/// A span tied to a particular file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Path of the file the span belongs to.
    pub path: String,
    pub span: SourceSpan,
}

impl SourceLocation {
    pub fn new(path: impl Into<String>, span: SourceSpan) -> Self {
        Self {
            path: path.into(),
            span,
        }
    }
}

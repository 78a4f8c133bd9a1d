use serde::Serialize;

use crate::source::FileId;

/// A resolved position in a source file.
///
/// Lines are 1-based and columns are 0-based byte offsets into the line,
/// matching what diagnostic consumers (the shell reporter and the language
/// server) expect without further translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineCol {
    pub line: u32,
    pub col: u32,
}

impl LineCol {
    pub fn new(line: u32, col: u32) -> Self {
        debug_assert!(line >= 1, "lines are 1-based");
        Self { line, col }
    }
}

/// A resolved span inside one source file. Start is inclusive, end exclusive.
///
/// Spans in the Drift pipeline always live inside a single source line: the
/// unit of parsing is the line, and every diagnostic or argument range is a
/// column range on it. `start.line != end.line` never occurs in practice but
/// the type does not forbid it, since consumers treat the two ends
/// independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceSpan {
    pub file: FileId,
    pub start: LineCol,
    pub end: LineCol,
}

impl SourceSpan {
    pub fn new(file: FileId, start: LineCol, end: LineCol) -> Self {
        Self { file, start, end }
    }

    /// A span covering a column range on a single line.
    pub fn on_line(file: FileId, line: u32, start_col: u32, end_col: u32) -> Self {
        Self {
            file,
            start: LineCol::new(line, start_col),
            end: LineCol::new(line, end_col),
        }
    }

    /// Merge two spans into one that covers both.
    pub fn merge(self, other: SourceSpan) -> SourceSpan {
        debug_assert_eq!(self.file, other.file);
        let start = if (self.start.line, self.start.col) <= (other.start.line, other.start.col) {
            self.start
        } else {
            other.start
        };
        let end = if (self.end.line, self.end.col) >= (other.end.line, other.end.col) {
            self.end
        } else {
            other.end
        };
        SourceSpan { file: self.file, start, end }
    }
}

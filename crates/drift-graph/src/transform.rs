/// The reserved argument character. Recognized literals (strings, numbers,
/// parenthesized groups, intrinsic calls) are carved out of a line's pattern
/// text and replaced by this single character, so the surviving text can be
/// matched against the trie while the carved expressions ride along as
/// positional arguments. BEL never appears in reasonable source code.
pub const ARGUMENT_CHAR: char = '\u{7}';

/// A pattern text under transformation, with a byte-level back-mapping to the
/// columns of the originating line.
///
/// Every byte of `text` remembers which line column it came from; bytes
/// inserted by a replacement inherit the column where the replaced span
/// started. The matcher uses the mapping to recover source ranges for
/// arguments, discovered variables and sub-matches, and the whitespace
/// normalizer uses it to place its warnings.
#[derive(Debug, Clone)]
pub struct TransformedText {
    text: String,
    line_pos: Vec<u32>,
    end_col: u32,
}

impl TransformedText {
    /// Wrap `text`, which starts at line column `offset`.
    pub fn new(text: &str, offset: u32) -> Self {
        Self {
            line_pos: (0..text.len() as u32).map(|i| offset + i).collect(),
            end_col: offset + text.len() as u32,
            text: text.to_string(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// The line column a pattern byte position maps back to. The position
    /// one past the end maps to the column one past the original text.
    pub fn line_pos(&self, pattern_pos: usize) -> u32 {
        self.line_pos.get(pattern_pos).copied().unwrap_or(self.end_col)
    }

    /// Replace the pattern span corresponding to the line columns
    /// `[line_start, line_end)` with one argument character.
    pub fn replace_line(&mut self, line_start: u32, line_end: u32) {
        let start = self.line_pos.partition_point(|&col| col < line_start);
        let end = self.line_pos.partition_point(|&col| col < line_end);
        self.splice(start, end, &ARGUMENT_CHAR.to_string(), line_start);
    }

    /// Replace the pattern byte span `[start, end)` with `replacement`
    /// (an argument character when carving, a space or nothing when
    /// normalizing whitespace).
    pub fn replace_pattern(&mut self, start: usize, end: usize, replacement: &str) {
        let col = self.line_pos(start);
        self.splice(start, end, replacement, col);
    }

    fn splice(&mut self, start: usize, end: usize, replacement: &str, col: u32) {
        self.text.replace_range(start..end, replacement);
        self.line_pos
            .splice(start..end, std::iter::repeat(col).take(replacement.len()));
    }
}

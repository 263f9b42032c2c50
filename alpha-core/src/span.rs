//! Source positions attached to tokens, AST nodes and diagnostics.

use std::fmt;

/// Index of a source file inside one compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FileId(pub u32);

/// Position of the first character of a token.
///
/// `line` and `col` are zero-based; `Display` prints them one-based the way
/// editors expect (`3:14`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub file: FileId,
    pub line: u32,
    pub col: u32,
}

impl Span {
    pub const fn new(file: FileId, line: u32, col: u32) -> Self {
        Span { file, line, col }
    }

    /// One-based line number.
    pub fn line_number(&self) -> u32 {
        self.line + 1
    }

    /// One-based column number.
    pub fn column_number(&self) -> u32 {
        self.col + 1
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line_number(), self.column_number())
    }
}

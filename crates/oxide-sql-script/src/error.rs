//! Script parse errors.

use core::fmt;

/// What went wrong while scanning a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// A `'...'` literal was still open at the end of the script.
    UnterminatedStringLiteral,
    /// A `"..."`, `` `...` `` or `[...]` quoted name was still open.
    UnterminatedQuotedIdentifier,
    /// A `/* ... */` comment was still open.
    UnterminatedBlockComment,
    /// A `$tag$ ... $tag$` literal was still open.
    UnterminatedDollarQuote {
        /// The tag between the dollar signs (may be empty).
        tag: String,
    },
    /// A `q'x ... x'` literal was still open.
    UnterminatedAlternativeQuote {
        /// The character that would have closed it.
        close: char,
    },
    /// A `DELIMITER` directive named no delimiter.
    InvalidDelimiter,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnterminatedStringLiteral => f.write_str("unterminated string literal"),
            Self::UnterminatedQuotedIdentifier => f.write_str("unterminated quoted identifier"),
            Self::UnterminatedBlockComment => f.write_str("unterminated block comment"),
            Self::UnterminatedDollarQuote { tag } => {
                write!(f, "unterminated dollar-quoted block ${tag}$")
            }
            Self::UnterminatedAlternativeQuote { close } => {
                write!(f, "unterminated alternative-quoted literal (expected {close}')")
            }
            Self::InvalidDelimiter => f.write_str("DELIMITER directive without a delimiter"),
        }
    }
}

/// A script parse error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// The error kind.
    pub kind: ParseErrorKind,
    /// 1-based line where the offending construct starts.
    pub line: usize,
    /// Byte offset where the offending construct starts.
    pub offset: usize,
}

impl ParseError {
    /// Creates a new parse error.
    #[must_use]
    pub const fn new(kind: ParseErrorKind, line: usize, offset: usize) -> Self {
        Self { kind, line, offset }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} starting at line {}", self.kind, self.line)
    }
}

impl std::error::Error for ParseError {}

//! Scan states and their transitions.
//!
//! The splitter walks a script left to right. Everything that decides
//! whether a character is "code" or "inside something" lives here, as a
//! pure function from the current state and the remaining input to the
//! next state.

use crate::error::ParseErrorKind;
use crate::rules::ScriptRules;

/// Where the scanner currently is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ScanState {
    /// Plain SQL text. Delimiters only count here.
    #[default]
    Normal,
    /// Inside a comment that runs to the end of the line.
    LineComment,
    /// Inside `/* ... */`, `depth` levels deep.
    BlockComment {
        /// Nesting depth (always at least 1).
        depth: usize,
    },
    /// Inside a `'...'` literal.
    SingleQuote,
    /// Inside a `"..."` quoted name or literal.
    DoubleQuote,
    /// Inside a `` `...` `` or `[...]` quoted name.
    QuotedIdentifier {
        /// The closing character.
        close: char,
    },
    /// Inside a `$tag$ ... $tag$` literal.
    DollarQuote {
        /// The tag that must close the literal.
        tag: String,
    },
    /// Inside a `q'x ... x'` literal.
    AlternativeQuote {
        /// The character that, followed by `'`, closes the literal.
        close: char,
    },
}

/// Result of one scanning step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// State after the step.
    pub state: ScanState,
    /// Number of bytes consumed by the step.
    pub consumed: usize,
}

impl Transition {
    const fn new(state: ScanState, consumed: usize) -> Self {
        Self { state, consumed }
    }
}

/// Returns whether `c` can be part of an unquoted word.
pub(crate) fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

impl ScanState {
    /// Returns whether this state is a comment.
    #[must_use]
    pub const fn is_comment(&self) -> bool {
        matches!(self, Self::LineComment | Self::BlockComment { .. })
    }

    /// Returns the error to report if the script ends in this state.
    #[must_use]
    pub fn unterminated(&self) -> Option<ParseErrorKind> {
        match self {
            Self::Normal | Self::LineComment => None,
            Self::BlockComment { .. } => Some(ParseErrorKind::UnterminatedBlockComment),
            Self::SingleQuote => Some(ParseErrorKind::UnterminatedStringLiteral),
            Self::DoubleQuote | Self::QuotedIdentifier { .. } => {
                Some(ParseErrorKind::UnterminatedQuotedIdentifier)
            }
            Self::DollarQuote { tag } => {
                Some(ParseErrorKind::UnterminatedDollarQuote { tag: tag.clone() })
            }
            Self::AlternativeQuote { close } => {
                Some(ParseErrorKind::UnterminatedAlternativeQuote { close: *close })
            }
        }
    }

    /// Performs one scanning step.
    ///
    /// `prev` is the character just before `rest`. A step always consumes
    /// at least one character unless `rest` is empty.
    #[must_use]
    pub fn advance(&self, rules: &ScriptRules, prev: Option<char>, rest: &str) -> Transition {
        let Some(c) = rest.chars().next() else {
            return Transition::new(self.clone(), 0);
        };
        let one = c.len_utf8();

        match self {
            Self::Normal => Self::advance_normal(rules, prev, rest, c),
            Self::LineComment => {
                if c == '\n' {
                    Transition::new(Self::Normal, one)
                } else {
                    Transition::new(Self::LineComment, one)
                }
            }
            Self::BlockComment { depth } => {
                if rest.starts_with("*/") {
                    if *depth <= 1 {
                        Transition::new(Self::Normal, 2)
                    } else {
                        Transition::new(Self::BlockComment { depth: depth - 1 }, 2)
                    }
                } else if rules.nested_block_comments && rest.starts_with("/*") {
                    Transition::new(Self::BlockComment { depth: depth + 1 }, 2)
                } else {
                    Transition::new(self.clone(), one)
                }
            }
            Self::SingleQuote => quoted_step(self, rules.backslash_escapes, '\'', rest, c),
            Self::DoubleQuote => quoted_step(self, rules.backslash_escapes, '"', rest, c),
            Self::QuotedIdentifier { close } => quoted_step(self, false, *close, rest, c),
            Self::DollarQuote { tag } => {
                let closing_len = tag.len() + 2;
                let closes = rest.len() >= closing_len
                    && rest.starts_with('$')
                    && rest[1..].starts_with(tag.as_str())
                    && rest[1 + tag.len()..].starts_with('$');
                if closes {
                    Transition::new(Self::Normal, closing_len)
                } else {
                    Transition::new(self.clone(), one)
                }
            }
            Self::AlternativeQuote { close } => {
                if c == *close && rest[one..].starts_with('\'') {
                    Transition::new(Self::Normal, one + 1)
                } else {
                    Transition::new(self.clone(), one)
                }
            }
        }
    }

    fn advance_normal(rules: &ScriptRules, prev: Option<char>, rest: &str, c: char) -> Transition {
        if let Some(marker) = rules.line_comments.iter().find(|m| rest.starts_with(**m)) {
            return Transition::new(Self::LineComment, marker.len());
        }
        if rules.executable_comments && rest.starts_with("/*!") {
            return Transition::new(Self::Normal, 3);
        }
        if rest.starts_with("/*") {
            return Transition::new(Self::BlockComment { depth: 1 }, 2);
        }
        let after_word = prev.is_some_and(is_word_char);
        match c {
            '\'' => Transition::new(Self::SingleQuote, 1),
            '"' => Transition::new(Self::DoubleQuote, 1),
            '`' if rules.backtick_identifiers => {
                Transition::new(Self::QuotedIdentifier { close: '`' }, 1)
            }
            '[' if rules.bracket_identifiers => {
                Transition::new(Self::QuotedIdentifier { close: ']' }, 1)
            }
            'q' | 'Q' | 'n' | 'N' if rules.alternative_quoting && !after_word => {
                match alternative_quote_open(rest) {
                    Some((close, len)) => Transition::new(Self::AlternativeQuote { close }, len),
                    None => Transition::new(Self::Normal, 1),
                }
            }
            '$' if rules.dollar_quoting && !after_word => match dollar_tag(rest) {
                Some(tag) => {
                    let len = tag.len() + 2;
                    Transition::new(Self::DollarQuote { tag: tag.to_string() }, len)
                }
                None => Transition::new(Self::Normal, 1),
            },
            _ => Transition::new(Self::Normal, c.len_utf8()),
        }
    }
}

/// One step inside a literal closed by `close`, where a doubled `close`
/// is an escaped character.
fn quoted_step(
    state: &ScanState,
    backslash_escapes: bool,
    close: char,
    rest: &str,
    c: char,
) -> Transition {
    let one = c.len_utf8();
    if backslash_escapes && c == '\\' {
        let escaped = rest[one..].chars().next().map_or(0, char::len_utf8);
        return Transition::new(state.clone(), one + escaped);
    }
    if c == close {
        if rest[one..].starts_with(close) {
            return Transition::new(state.clone(), one + close.len_utf8());
        }
        return Transition::new(ScanState::Normal, one);
    }
    Transition::new(state.clone(), one)
}

/// Parses the tag of a `$tag$` opener at the start of `rest`.
fn dollar_tag(rest: &str) -> Option<&str> {
    let body = rest.strip_prefix('$')?;
    let end = body.find('$')?;
    let tag = &body[..end];
    let valid = tag.chars().all(is_word_char)
        && !tag.chars().next().is_some_and(|c| c.is_ascii_digit());
    valid.then_some(tag)
}

/// Returns whether `rest` starts with a `q'x` or `nq'x` opener.
pub(crate) fn starts_alternative_quote(rest: &str) -> bool {
    alternative_quote_open(rest).is_some()
}

/// Parses a `q'x` or `nq'x` opener, returning the closing character and
/// the opener length.
fn alternative_quote_open(rest: &str) -> Option<(char, usize)> {
    let lower = rest.get(..3).map(str::to_ascii_lowercase);
    let prefix_len = match lower.as_deref() {
        Some(p) if p.starts_with("nq'") => 3,
        _ if rest.get(..2).is_some_and(|p| p.eq_ignore_ascii_case("q'")) => 2,
        _ => return None,
    };
    let open = rest[prefix_len..].chars().next()?;
    if open.is_whitespace() {
        return None;
    }
    let close = match open {
        '[' => ']',
        '{' => '}',
        '(' => ')',
        '<' => '>',
        other => other,
    };
    Some((close, prefix_len + open.len_utf8()))
}

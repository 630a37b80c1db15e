//! Splits a script into executable statements.

use crate::error::{ParseError, ParseErrorKind};
use crate::rules::{CLASSIFY_WORDS, Delimiter, ScriptRules};
use crate::scanner::{ScanState, is_word_char, starts_alternative_quote};
use crate::span::Span;
use crate::statement::SqlStatement;

/// Words after `BEGIN` that make it a transaction statement, not a block.
const TRANSACTION_WORDS: &[&str] = &[
    "TRANSACTION",
    "TRAN",
    "WORK",
    "DEFERRED",
    "IMMEDIATE",
    "EXCLUSIVE",
    "DISTRIBUTED",
    "ISOLATION",
    "READ",
];

/// Words after `END` that close a construct `BEGIN`/`CASE` did not open.
const UNCOUNTED_CLOSERS: &[&str] = &["IF", "LOOP", "WHILE", "REPEAT", "FOR"];

/// The statement currently being collected.
#[derive(Debug, Default)]
struct Pending {
    /// Byte offset of the first significant character.
    start: Option<usize>,
    /// Byte offset just past the last significant character.
    end: usize,
    /// Line of the first significant character.
    line: usize,
    /// Leading words, upper-cased, for transaction classification.
    words: Vec<String>,
}

/// A single-pass statement splitter.
pub struct ScriptParser<'a> {
    /// The script text.
    input: &'a str,
    /// Scanning rules.
    rules: &'a ScriptRules,
    /// Current byte position.
    pos: usize,
    /// Current 1-based line.
    line: usize,
    /// Current scan state.
    state: ScanState,
    /// Line and offset where the current non-normal state began.
    opened_at: (usize, usize),
    /// Delimiter in effect (may be changed by a directive).
    delimiter: Delimiter,
    /// `BEGIN`/`CASE` nesting depth of the pending statement.
    depth: usize,
    pending: Pending,
    statements: Vec<SqlStatement>,
}

impl<'a> ScriptParser<'a> {
    /// Creates a new parser for the given script.
    #[must_use]
    pub fn new(input: &'a str, rules: &'a ScriptRules) -> Self {
        Self {
            input,
            rules,
            pos: 0,
            line: 1,
            state: ScanState::Normal,
            opened_at: (1, 0),
            delimiter: rules.delimiter.clone(),
            depth: 0,
            pending: Pending::default(),
            statements: Vec::new(),
        }
    }

    /// Splits the whole script.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] when a literal, quoted name or block comment
    /// is still open at the end of the script, or when a `DELIMITER`
    /// directive names no delimiter.
    pub fn parse(mut self) -> Result<Vec<SqlStatement>, ParseError> {
        while self.pos < self.input.len() {
            if self.state == ScanState::Normal {
                if self.at_line_start() {
                    if self.delimiter_directive()? || self.line_delimiter() {
                        continue;
                    }
                }
                if self.inline_delimiter() || self.word() {
                    continue;
                }
            }
            self.step();
        }

        if let Some(kind) = self.state.unterminated() {
            let (line, offset) = self.opened_at;
            return Err(ParseError::new(kind, line, offset));
        }
        self.flush();
        Ok(self.statements)
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn prev_char(&self) -> Option<char> {
        self.input[..self.pos].chars().next_back()
    }

    fn at_line_start(&self) -> bool {
        self.pos == 0 || self.input[..self.pos].ends_with('\n')
    }

    /// Returns the current line without its terminator, and the number of
    /// bytes to skip to reach the next line.
    fn current_line(&self) -> (&'a str, usize) {
        let rest = self.rest();
        match rest.find('\n') {
            Some(i) => (rest[..i].trim_end_matches('\r'), i + 1),
            None => (rest, rest.len()),
        }
    }

    fn skip_line(&mut self, len: usize) {
        if self.rest()[..len].ends_with('\n') {
            self.line += 1;
        }
        self.pos += len;
    }

    /// Handles a `DELIMITER xx` line at the start of a statement.
    fn delimiter_directive(&mut self) -> Result<bool, ParseError> {
        if !self.rules.delimiter_directive || self.pending.start.is_some() {
            return Ok(false);
        }
        let (line, len) = self.current_line();
        let trimmed = line.trim_start();
        let is_directive = trimmed
            .get(..9)
            .is_some_and(|kw| kw.eq_ignore_ascii_case("DELIMITER"))
            && !matches!(trimmed[9..].chars().next(), Some(c) if !c.is_whitespace());
        if !is_directive {
            return Ok(false);
        }
        let text = trimmed[9..].trim();
        if text.is_empty() {
            return Err(ParseError::new(
                ParseErrorKind::InvalidDelimiter,
                self.line,
                self.pos,
            ));
        }
        self.delimiter = Delimiter::new(text, false);
        self.skip_line(len);
        Ok(true)
    }

    /// Handles a delimiter that stands alone on its line.
    fn line_delimiter(&mut self) -> bool {
        let (line, len) = self.current_line();
        if !self.delimiter.matches_line(line) {
            return false;
        }
        self.flush();
        self.skip_line(len);
        true
    }

    /// Handles a delimiter inside a line.
    fn inline_delimiter(&mut self) -> bool {
        if self.delimiter.alone_on_line() || self.depth > 0 {
            return false;
        }
        let text = self.delimiter.text();
        if text.is_empty() || !self.rest().starts_with(text) {
            return false;
        }
        let len = text.len();
        self.flush();
        self.pos += len;
        true
    }

    /// Consumes an unquoted word, tracking block keywords.
    fn word(&mut self) -> bool {
        let rest = self.rest();
        let Some(first) = rest.chars().next() else {
            return false;
        };
        if !(first.is_alphabetic() || first == '_') || self.prev_char().is_some_and(is_word_char) {
            return false;
        }
        if self.rules.alternative_quoting && starts_alternative_quote(rest) {
            return false;
        }

        let len = rest.find(|c: char| !is_word_char(c)).unwrap_or(rest.len());
        let upper = rest[..len].to_ascii_uppercase();
        self.mark_significant(self.pos, len);
        self.pos += len;

        if self.rules.track_blocks {
            self.track_block_keyword(&upper);
        }
        if self.pending.words.len() < CLASSIFY_WORDS {
            self.pending.words.push(upper);
        }
        true
    }

    fn track_block_keyword(&mut self, word: &str) {
        match word {
            "CASE" => self.depth += 1,
            "BEGIN" => {
                if self.opens_block() {
                    self.depth += 1;
                }
            }
            "END" => match self.peek_word() {
                Some((next, _)) if UNCOUNTED_CLOSERS.contains(&next.as_str()) => {}
                Some((next, skip)) if next == "CASE" => {
                    self.mark_significant(self.pos, skip);
                    self.line += self.rest()[..skip].matches('\n').count();
                    self.pos += skip;
                    self.depth = self.depth.saturating_sub(1);
                }
                _ => self.depth = self.depth.saturating_sub(1),
            },
            _ => {}
        }
    }

    /// Returns whether the `BEGIN` just consumed opens a block.
    fn opens_block(&self) -> bool {
        let after = self.rest().trim_start();
        if after.is_empty() {
            return false;
        }
        let text = self.delimiter.text();
        if !self.delimiter.alone_on_line() && !text.is_empty() && after.starts_with(text) {
            return false;
        }
        !self
            .peek_word()
            .is_some_and(|(next, _)| TRANSACTION_WORDS.contains(&next.as_str()))
    }

    /// Returns the next word (upper-cased) after any whitespace, and the
    /// number of bytes up to its end.
    fn peek_word(&self) -> Option<(String, usize)> {
        let rest = self.rest();
        let start = rest.find(|c: char| !c.is_whitespace())?;
        let tail = &rest[start..];
        let len = tail.find(|c: char| !is_word_char(c)).unwrap_or(tail.len());
        (len > 0).then(|| (tail[..len].to_ascii_uppercase(), start + len))
    }

    /// Performs one state-machine step.
    fn step(&mut self) {
        let rest = self.rest();
        let transition = self.state.advance(self.rules, self.prev_char(), rest);
        let consumed = &rest[..transition.consumed];

        let significant = match &self.state {
            ScanState::Normal => {
                !transition.state.is_comment() && !consumed.trim().is_empty()
            }
            state => !state.is_comment(),
        };
        if significant {
            self.mark_significant(self.pos, transition.consumed);
        }
        if self.state == ScanState::Normal && transition.state != ScanState::Normal {
            self.opened_at = (self.line, self.pos);
        }

        self.line += consumed.matches('\n').count();
        self.pos += transition.consumed;
        self.state = transition.state;
    }

    fn mark_significant(&mut self, at: usize, len: usize) {
        if self.pending.start.is_none() {
            self.pending.start = Some(at);
            self.pending.line = self.line;
        }
        self.pending.end = at + len;
    }

    /// Emits the pending statement, if it has any content.
    fn flush(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        self.depth = 0;
        let Some(start) = pending.start else {
            return;
        };
        let span = Span::new(start, pending.end);
        self.statements.push(SqlStatement {
            text: self.input[start..pending.end].to_string(),
            span,
            line: pending.line,
            can_execute_in_transaction: self.rules.allows_transaction(&pending.words),
        });
    }
}

/// Splits `script` into statements using `rules`.
///
/// # Errors
///
/// See [`ScriptParser::parse`].
pub fn parse(script: &str, rules: &ScriptRules) -> Result<Vec<SqlStatement>, ParseError> {
    ScriptParser::new(script, rules).parse()
}

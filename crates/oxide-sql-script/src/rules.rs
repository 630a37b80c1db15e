//! Per-database scanning rules.
//!
//! Every database product quotes, comments and terminates statements a
//! little differently. [`ScriptRules`] collects those differences so the
//! splitter itself stays dialect-neutral.

use core::fmt;

/// Leading keywords that make a statement data definition.
const DDL_KEYWORDS: &[&str] = &["CREATE", "ALTER", "DROP", "RENAME", "TRUNCATE", "COMMENT"];

/// How many leading words are inspected when classifying a statement.
pub(crate) const CLASSIFY_WORDS: usize = 8;

/// A statement delimiter.
///
/// Most products end statements with `;`. Some use a batch separator that
/// must stand alone on its own line (SQL Server's `GO`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiter {
    text: String,
    alone_on_line: bool,
}

impl Delimiter {
    /// Creates a new delimiter.
    #[must_use]
    pub fn new(text: impl Into<String>, alone_on_line: bool) -> Self {
        Self {
            text: text.into(),
            alone_on_line,
        }
    }

    /// The `;` delimiter.
    #[must_use]
    pub fn semicolon() -> Self {
        Self::new(";", false)
    }

    /// Returns the delimiter text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns whether the delimiter only counts when alone on a line.
    #[must_use]
    pub const fn alone_on_line(&self) -> bool {
        self.alone_on_line
    }

    /// Returns whether `line` consists of nothing but this delimiter.
    pub(crate) fn matches_line(&self, line: &str) -> bool {
        self.alone_on_line && line.trim().eq_ignore_ascii_case(&self.text)
    }
}

impl Default for Delimiter {
    fn default() -> Self {
        Self::semicolon()
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Scanning rules for one database product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRules {
    /// Name of the product these rules describe.
    pub name: &'static str,
    /// Delimiter active at the start of every script.
    pub delimiter: Delimiter,
    /// Markers that start a comment running to the end of the line.
    pub line_comments: &'static [&'static str],
    /// Whether `/* /* */ */` nests.
    pub nested_block_comments: bool,
    /// Whether `/*! ... */` is statement text rather than a comment.
    pub executable_comments: bool,
    /// Whether `` `name` `` quotes an identifier.
    pub backtick_identifiers: bool,
    /// Whether `[name]` quotes an identifier.
    pub bracket_identifiers: bool,
    /// Whether a backslash escapes the next character inside string literals.
    pub backslash_escapes: bool,
    /// Whether `$tag$ ... $tag$` quotes a literal.
    pub dollar_quoting: bool,
    /// Whether `q'[ ... ]'` quotes a literal with a custom delimiter.
    pub alternative_quoting: bool,
    /// Whether a `DELIMITER xx` line changes the active delimiter.
    pub delimiter_directive: bool,
    /// Whether `BEGIN ... END` and `CASE ... END` keep delimiters inside them.
    pub track_blocks: bool,
    /// Whether DDL statements take part in transactions.
    pub ddl_transactional: bool,
    /// Keyword sequences of statements that can never run in a transaction.
    ///
    /// A pattern matches when its words appear, in order, among the leading
    /// words of a statement, starting with the first.
    pub non_transactional: &'static [&'static str],
}

impl ScriptRules {
    /// ANSI-flavoured rules: `;` delimiter, `--` and `/* */` comments.
    #[must_use]
    pub fn generic() -> Self {
        Self {
            name: "generic",
            delimiter: Delimiter::semicolon(),
            line_comments: &["--"],
            nested_block_comments: false,
            executable_comments: false,
            backtick_identifiers: false,
            bracket_identifiers: false,
            backslash_escapes: false,
            dollar_quoting: false,
            alternative_quoting: false,
            delimiter_directive: false,
            track_blocks: true,
            ddl_transactional: true,
            non_transactional: &[],
        }
    }

    /// SQLite rules.
    #[must_use]
    pub fn sqlite() -> Self {
        Self {
            name: "sqlite",
            backtick_identifiers: true,
            bracket_identifiers: true,
            non_transactional: &["VACUUM"],
            ..Self::generic()
        }
    }

    /// PostgreSQL rules.
    #[must_use]
    pub fn postgres() -> Self {
        Self {
            name: "postgres",
            nested_block_comments: true,
            dollar_quoting: true,
            non_transactional: &[
                "CREATE INDEX CONCURRENTLY",
                "DROP INDEX CONCURRENTLY",
                "REINDEX CONCURRENTLY",
                "VACUUM",
                "CREATE DATABASE",
                "DROP DATABASE",
                "ALTER SYSTEM",
                "CREATE TABLESPACE",
                "DROP TABLESPACE",
            ],
            ..Self::generic()
        }
    }

    /// MySQL rules. DDL commits implicitly, so it never joins a transaction,
    /// and `/*!` comments are run by the server.
    #[must_use]
    pub fn mysql() -> Self {
        Self {
            name: "mysql",
            line_comments: &["--", "#"],
            executable_comments: true,
            backtick_identifiers: true,
            backslash_escapes: true,
            delimiter_directive: true,
            ddl_transactional: false,
            ..Self::generic()
        }
    }

    /// SQL Server rules: batches are separated by `GO` on its own line.
    #[must_use]
    pub fn sqlserver() -> Self {
        Self {
            name: "sqlserver",
            delimiter: Delimiter::new("GO", true),
            bracket_identifiers: true,
            track_blocks: false,
            non_transactional: &[
                "CREATE DATABASE",
                "ALTER DATABASE",
                "DROP DATABASE",
                "BACKUP",
                "RESTORE",
                "CREATE FULLTEXT",
                "ALTER FULLTEXT",
                "DROP FULLTEXT",
            ],
            ..Self::generic()
        }
    }

    /// Sets the initial delimiter.
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: Delimiter) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Sets the line comment markers.
    #[must_use]
    pub fn with_line_comments(mut self, markers: &'static [&'static str]) -> Self {
        self.line_comments = markers;
        self
    }

    /// Enables or disables nested block comments.
    #[must_use]
    pub fn with_nested_block_comments(mut self, enabled: bool) -> Self {
        self.nested_block_comments = enabled;
        self
    }

    /// Enables or disables `/*!` executable comments.
    #[must_use]
    pub fn with_executable_comments(mut self, enabled: bool) -> Self {
        self.executable_comments = enabled;
        self
    }

    /// Enables or disables backslash escapes in string literals.
    #[must_use]
    pub fn with_backslash_escapes(mut self, enabled: bool) -> Self {
        self.backslash_escapes = enabled;
        self
    }

    /// Enables or disables `$tag$` quoting.
    #[must_use]
    pub fn with_dollar_quoting(mut self, enabled: bool) -> Self {
        self.dollar_quoting = enabled;
        self
    }

    /// Enables or disables `q'[...]'` quoting.
    #[must_use]
    pub fn with_alternative_quoting(mut self, enabled: bool) -> Self {
        self.alternative_quoting = enabled;
        self
    }

    /// Enables or disables the `DELIMITER` directive.
    #[must_use]
    pub fn with_delimiter_directive(mut self, enabled: bool) -> Self {
        self.delimiter_directive = enabled;
        self
    }

    /// Enables or disables `BEGIN ... END` block tracking.
    #[must_use]
    pub fn with_block_tracking(mut self, enabled: bool) -> Self {
        self.track_blocks = enabled;
        self
    }

    /// Declares whether DDL takes part in transactions.
    #[must_use]
    pub fn with_ddl_transactional(mut self, enabled: bool) -> Self {
        self.ddl_transactional = enabled;
        self
    }

    /// Sets the non-transactional statement patterns.
    #[must_use]
    pub fn with_non_transactional(mut self, patterns: &'static [&'static str]) -> Self {
        self.non_transactional = patterns;
        self
    }

    /// Returns whether a statement starting with `words` may run inside a
    /// transaction. `words` must be upper-case.
    #[must_use]
    pub fn allows_transaction(&self, words: &[String]) -> bool {
        let Some(first) = words.first() else {
            return true;
        };
        if !self.ddl_transactional && DDL_KEYWORDS.contains(&first.as_str()) {
            return false;
        }
        !self
            .non_transactional
            .iter()
            .any(|pattern| matches_pattern(pattern, words))
    }
}

impl Default for ScriptRules {
    fn default() -> Self {
        Self::generic()
    }
}

/// Returns whether the pattern's words occur in order among `words`, the
/// first pattern word being the first statement word.
fn matches_pattern(pattern: &str, words: &[String]) -> bool {
    let mut expected = pattern.split_whitespace();
    let Some(head) = expected.next() else {
        return false;
    };
    if words.first().map(String::as_str) != Some(head) {
        return false;
    }
    let mut rest = words.iter().skip(1).take(CLASSIFY_WORDS);
    expected.all(|want| rest.any(|word| word == want))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(sql: &str) -> Vec<String> {
        sql.split_whitespace().map(str::to_ascii_uppercase).collect()
    }

    #[test]
    fn test_delimiter_alone_on_line() {
        let go = Delimiter::new("GO", true);
        assert!(go.matches_line("  go  "));
        assert!(!go.matches_line("GO 5"));
        assert!(!Delimiter::semicolon().matches_line(";"));
    }

    #[test]
    fn test_postgres_concurrent_index_is_non_transactional() {
        let rules = ScriptRules::postgres();
        assert!(!rules.allows_transaction(&words("create unique index concurrently idx on t (a)")));
        assert!(rules.allows_transaction(&words("create index idx on t (a)")));
        assert!(!rules.allows_transaction(&words("VACUUM FULL t")));
    }

    #[test]
    fn test_mysql_ddl_is_non_transactional() {
        let rules = ScriptRules::mysql();
        assert!(!rules.allows_transaction(&words("ALTER TABLE t ADD COLUMN b INT")));
        assert!(rules.allows_transaction(&words("INSERT INTO t VALUES (1)")));
    }

    #[test]
    fn test_pattern_must_start_at_first_word() {
        assert!(!matches_pattern("VACUUM", &words("SELECT VACUUM")));
        assert!(!matches_pattern("", &words("SELECT 1")));
    }

    #[test]
    fn test_builder_overrides_preset() {
        let rules = ScriptRules::generic()
            .with_alternative_quoting(true)
            .with_delimiter(Delimiter::new("/", true));
        assert!(rules.alternative_quoting);
        assert_eq!(rules.delimiter.text(), "/");
        assert!(rules.delimiter.alone_on_line());
    }
}

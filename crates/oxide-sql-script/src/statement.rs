//! Executable statements produced by the splitter.

use crate::span::Span;

/// One executable statement of a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlStatement {
    /// Statement text without leading comments or the trailing delimiter.
    pub text: String,
    /// Where `text` sits in the script.
    pub span: Span,
    /// 1-based line of the first character of `text`.
    pub line: usize,
    /// Whether the statement may run inside a transaction.
    pub can_execute_in_transaction: bool,
}

impl SqlStatement {
    /// Returns whether every statement may run inside a transaction.
    #[must_use]
    pub fn all_transactional(statements: &[Self]) -> bool {
        statements.iter().all(|s| s.can_execute_in_transaction)
    }
}

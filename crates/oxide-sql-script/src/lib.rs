//! # oxide-sql-script
//!
//! Splits SQL migration scripts into executable statements.
//!
//! The splitter is a single left-to-right scan driven by an explicit state
//! machine ([`ScanState`]). Statement boundaries are only recognised in
//! plain SQL text, never inside literals, quoted names or comments, and the
//! quoting, comment and delimiter conventions come from [`ScriptRules`].
//!
//! ```rust
//! use oxide_sql_script::{parse, ScriptRules};
//!
//! let statements = parse("SELECT ';' AS x; SELECT 2;", &ScriptRules::generic()).unwrap();
//! assert_eq!(statements.len(), 2);
//! assert_eq!(statements[0].text, "SELECT ';' AS x");
//! ```
//!
//! Each statement also says whether it may run inside a transaction, so a
//! migration runner can decide how to wrap a whole script.

pub mod error;
pub mod parser;
pub mod rules;
pub mod scanner;
pub mod span;
pub mod statement;

pub use error::{ParseError, ParseErrorKind};
pub use parser::{ScriptParser, parse};
pub use rules::{Delimiter, ScriptRules};
pub use scanner::{ScanState, Transition};
pub use span::Span;
pub use statement::SqlStatement;

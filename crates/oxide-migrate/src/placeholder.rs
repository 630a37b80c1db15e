//! Placeholder replacement in migration scripts.
//!
//! Scripts may contain expressions like `${schema}` that are replaced with
//! configured values before the script is parsed. Checksums are computed on
//! the raw script, so changing a placeholder value does not cause drift.

use std::collections::BTreeMap;

use regex::{Captures, Regex};

use crate::error::{MigrateError, Result};

/// Default placeholder prefix.
pub const DEFAULT_PREFIX: &str = "${";

/// Default placeholder suffix.
pub const DEFAULT_SUFFIX: &str = "}";

/// Replaces `prefix name suffix` expressions with configured values.
#[derive(Debug, Clone)]
pub struct PlaceholderReplacer {
    values: BTreeMap<String, String>,
    prefix: String,
    suffix: String,
    pattern: Regex,
}

impl PlaceholderReplacer {
    /// Creates a replacer for the given values and delimiters.
    #[must_use]
    pub fn new(
        values: BTreeMap<String, String>,
        prefix: impl Into<String>,
        suffix: impl Into<String>,
    ) -> Self {
        let prefix = prefix.into();
        let suffix = suffix.into();
        let pattern_str = format!("{}(.+?){}", regex::escape(&prefix), regex::escape(&suffix));
        let pattern = Regex::new(&pattern_str).expect("escaped placeholder pattern");
        Self {
            values,
            prefix,
            suffix,
            pattern,
        }
    }

    /// Creates a replacer with the default `${` and `}` delimiters.
    #[must_use]
    pub fn with_defaults(values: BTreeMap<String, String>) -> Self {
        Self::new(values, DEFAULT_PREFIX, DEFAULT_SUFFIX)
    }

    /// Replaces every placeholder in `text`.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::UnresolvedPlaceholders`] naming every
    /// expression without a value, in order of first appearance.
    pub fn replace(&self, script: &str, text: &str) -> Result<String> {
        let mut missing: Vec<String> = Vec::new();
        let replaced = self.pattern.replace_all(text, |caps: &Captures<'_>| {
            if let Some(value) = self.values.get(&caps[1]) {
                return value.clone();
            }
            let expression = format!("{}{}{}", self.prefix, &caps[1], self.suffix);
            if !missing.contains(&expression) {
                missing.push(expression);
            }
            caps[0].to_string()
        });

        if missing.is_empty() {
            Ok(replaced.into_owned())
        } else {
            Err(MigrateError::UnresolvedPlaceholders {
                script: script.to_string(),
                placeholders: missing,
            })
        }
    }
}

#![allow(dead_code)]

use oxide_sql_script::{ParseError, ScriptRules, SqlStatement, parse};

pub fn split(sql: &str, rules: &ScriptRules) -> Vec<SqlStatement> {
    parse(sql, rules).unwrap_or_else(|e| panic!("Failed to parse: {sql}\nError: {e}"))
}

pub fn texts(sql: &str, rules: &ScriptRules) -> Vec<String> {
    split(sql, rules).into_iter().map(|s| s.text).collect()
}

pub fn split_err(sql: &str, rules: &ScriptRules) -> ParseError {
    parse(sql, rules).expect_err(&format!("Expected parse error for: {sql}"))
}

//! Dialect-specific quoting, delimiters and blocks.

mod common;
use common::*;

use oxide_sql_script::{Delimiter, ScriptRules, SqlStatement};

#[test]
fn postgres_dollar_quote_hides_semicolons() {
    assert_eq!(
        texts("DO $$ BEGIN SELECT 1; END $$;", &ScriptRules::postgres()),
        vec!["DO $$ BEGIN SELECT 1; END $$"]
    );
}

#[test]
fn postgres_tagged_dollar_quote_closes_only_on_matching_tag() {
    let sql = "CREATE FUNCTION f() RETURNS text AS $fn$ SELECT $$;$$; $fn$ LANGUAGE sql;\nSELECT 2;";
    assert_eq!(
        texts(sql, &ScriptRules::postgres()),
        vec![
            "CREATE FUNCTION f() RETURNS text AS $fn$ SELECT $$;$$; $fn$ LANGUAGE sql",
            "SELECT 2"
        ]
    );
}

#[test]
fn postgres_positional_parameters_are_not_quotes() {
    assert_eq!(
        texts("PREPARE p AS SELECT $1 + $2; EXECUTE p(1, 2);", &ScriptRules::postgres()).len(),
        2
    );
}

#[test]
fn dollar_signs_are_plain_text_without_dollar_quoting() {
    assert_eq!(texts("SELECT '$'; SELECT 2;", &ScriptRules::generic()).len(), 2);
}

#[test]
fn postgres_nested_block_comments() {
    let sql = "/* outer /* inner; */ still comment; */ SELECT 1; SELECT 2;";
    assert_eq!(
        texts(sql, &ScriptRules::postgres()),
        vec!["SELECT 1", "SELECT 2"]
    );
}

#[test]
fn postgres_concurrent_index_is_not_transactional() {
    let statements = split(
        "CREATE TABLE t (a INT);\nCREATE INDEX CONCURRENTLY idx ON t (a);",
        &ScriptRules::postgres(),
    );
    assert!(statements[0].can_execute_in_transaction);
    assert!(!statements[1].can_execute_in_transaction);
    assert!(!SqlStatement::all_transactional(&statements));
}

#[test]
fn sqlite_trigger_body_is_one_statement() {
    let sql = "CREATE TABLE t (id INTEGER);\n\
               CREATE TRIGGER trg AFTER INSERT ON t\n\
               BEGIN\n\
                 INSERT INTO log VALUES (new.id);\n\
                 UPDATE t SET id = id WHERE id = new.id;\n\
               END;\n\
               INSERT INTO t VALUES (1);";
    let statements = texts(sql, &ScriptRules::sqlite());
    assert_eq!(statements.len(), 3);
    assert!(statements[1].starts_with("CREATE TRIGGER"));
    assert!(statements[1].ends_with("END"));
}

#[test]
fn sqlite_vacuum_is_not_transactional() {
    let statements = split("VACUUM;", &ScriptRules::sqlite());
    assert!(!statements[0].can_execute_in_transaction);
}

#[test]
fn mysql_delimiter_directive_changes_boundaries() {
    let sql = "DELIMITER //\n\
               CREATE PROCEDURE p()\n\
               BEGIN\n\
                 IF 1 = 1 THEN SELECT 1; END IF;\n\
               END //\n\
               DELIMITER ;\n\
               CALL p();";
    let statements = texts(sql, &ScriptRules::mysql());
    assert_eq!(statements.len(), 2);
    assert!(statements[0].starts_with("CREATE PROCEDURE p()"));
    assert!(statements[0].ends_with("END"));
    assert_eq!(statements[1], "CALL p()");
}

#[test]
fn mysql_hash_comments_and_backslash_escapes() {
    let sql = "# setup; nothing here\nINSERT INTO t VALUES ('a\\';b'); SELECT `x;y` FROM t;";
    assert_eq!(
        texts(sql, &ScriptRules::mysql()),
        vec!["INSERT INTO t VALUES ('a\\';b')", "SELECT `x;y` FROM t"]
    );
}

#[test]
fn mysql_executable_comments_are_kept() {
    let sql = "/*!40101 SET NAMES utf8 */;\n\
               /*!40014 SET @OLD_FK=@@FOREIGN_KEY_CHECKS, FOREIGN_KEY_CHECKS=0 */;\n\
               SELECT 1;";
    assert_eq!(
        texts(sql, &ScriptRules::mysql()),
        vec![
            "/*!40101 SET NAMES utf8 */",
            "/*!40014 SET @OLD_FK=@@FOREIGN_KEY_CHECKS, FOREIGN_KEY_CHECKS=0 */",
            "SELECT 1",
        ]
    );

    // Elsewhere it is an ordinary comment.
    assert_eq!(
        texts("/*!40101 SET NAMES utf8 */;\nSELECT 1;", &ScriptRules::generic()),
        vec!["SELECT 1"]
    );
}

#[test]
fn mysql_ddl_is_not_transactional() {
    let statements = split(
        "CREATE TABLE t (a INT); INSERT INTO t VALUES (1);",
        &ScriptRules::mysql(),
    );
    assert!(!statements[0].can_execute_in_transaction);
    assert!(statements[1].can_execute_in_transaction);
}

#[test]
fn sqlserver_go_separates_batches() {
    let sql = "CREATE TABLE [a;b] (x INT);\nINSERT INTO [a;b] VALUES (1);\nGO\nSELECT 1;\n  go  \n";
    assert_eq!(
        texts(sql, &ScriptRules::sqlserver()),
        vec![
            "CREATE TABLE [a;b] (x INT);\nINSERT INTO [a;b] VALUES (1);",
            "SELECT 1;"
        ]
    );
}

#[test]
fn go_inside_a_line_is_not_a_separator() {
    let sql = "SELECT 'GO' AS go_col\nGO\n";
    assert_eq!(
        texts(sql, &ScriptRules::sqlserver()),
        vec!["SELECT 'GO' AS go_col"]
    );
}

#[test]
fn alternative_quoting_hides_quotes_and_delimiters() {
    let rules = ScriptRules::generic().with_alternative_quoting(true);
    assert_eq!(
        texts("SELECT q'[it's; here]' FROM dual; SELECT 2;", &rules),
        vec!["SELECT q'[it's; here]' FROM dual", "SELECT 2"]
    );
}

#[test]
fn custom_line_delimiter() {
    let rules = ScriptRules::generic()
        .with_block_tracking(false)
        .with_delimiter(Delimiter::new("/", true));
    let sql = "BEGIN\n  NULL;\nEND;\n/\nSELECT 1 FROM dual;\n/\n";
    assert_eq!(
        texts(sql, &rules),
        vec!["BEGIN\n  NULL;\nEND;", "SELECT 1 FROM dual;"]
    );
}

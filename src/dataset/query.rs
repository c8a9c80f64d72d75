//! # Query Executor
//!
//! Runs caller SQL against one dataset in read-only mode. Three layers keep a
//! query from writing:
//!
//! 1. the leading keyword must be `SELECT`, `WITH` or `VALUES`
//! 2. SQLite must report the prepared statement as read-only
//! 3. the connection itself is opened read-only
//!
//! Store error text is returned to the caller unchanged.

use super::errors::{DatasetError, DatasetResult};
use super::handle::{AccessMode, StoreManager};
use super::id::DatasetId;
use super::table::{collect_rows, TableData};

/// Statement kinds a query may start with
pub const ALLOWED_LEADING_KEYWORDS: &[&str] = &["SELECT", "WITH", "VALUES"];

/// Execute `sql` against the dataset and return every result row
pub fn execute(stores: &StoreManager, id: &DatasetId, sql: &str) -> DatasetResult<TableData> {
    stores.with_store(id, AccessMode::ReadOnly, |handle| {
        check_leading_keyword(sql)?;

        let conn = handle.conn()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| DatasetError::Query(e.to_string()))?;

        if !stmt.readonly() {
            return Err(DatasetError::QueryRejected(
                "only read-only statements are allowed".to_string(),
            ));
        }

        collect_rows(&mut stmt, None).map_err(|e| DatasetError::Query(e.to_string()))
    })
}

fn check_leading_keyword(sql: &str) -> DatasetResult<()> {
    match leading_keyword(sql) {
        Some(keyword)
            if ALLOWED_LEADING_KEYWORDS
                .iter()
                .any(|k| k.eq_ignore_ascii_case(&keyword)) =>
        {
            Ok(())
        }
        Some(keyword) => Err(DatasetError::QueryRejected(format!(
            "{} statements are not allowed",
            keyword.to_ascii_uppercase()
        ))),
        None => Err(DatasetError::QueryRejected("empty query".to_string())),
    }
}

/// First keyword of a statement, skipping whitespace, comments and opening
/// parentheses
pub fn leading_keyword(sql: &str) -> Option<String> {
    let mut rest = sql;
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.find('\n').map_or("", |pos| &after[pos + 1..]);
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.find("*/").map_or("", |pos| &after[pos + 2..]);
        } else {
            break;
        }
    }

    let keyword: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    (!keyword.is_empty()).then_some(keyword)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_keyword() {
        assert_eq!(leading_keyword("SELECT 1").as_deref(), Some("SELECT"));
        assert_eq!(leading_keyword("  \n select *").as_deref(), Some("select"));
        assert_eq!(leading_keyword("(SELECT 1)").as_deref(), Some("SELECT"));
        assert_eq!(
            leading_keyword("-- note\n/* block */ WITH x AS (SELECT 1) SELECT * FROM x").as_deref(),
            Some("WITH")
        );
        assert_eq!(leading_keyword("   "), None);
        assert_eq!(leading_keyword("-- only a comment"), None);
    }

    #[test]
    fn test_keyword_allowlist() {
        assert!(check_leading_keyword("select * from data").is_ok());
        assert!(check_leading_keyword("VALUES (1)").is_ok());
        assert!(matches!(
            check_leading_keyword("DELETE FROM data"),
            Err(DatasetError::QueryRejected(_))
        ));
        assert!(matches!(
            check_leading_keyword("ATTACH 'x.db' AS x"),
            Err(DatasetError::QueryRejected(_))
        ));
        assert!(matches!(
            check_leading_keyword(""),
            Err(DatasetError::QueryRejected(_))
        ));
    }
}

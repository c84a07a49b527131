//! SQL dialect handling.
//!
//! Hand-written SQL uses `[bracketed]` identifiers and `?` placeholders. The
//! dialect rewrites both for the target engine, leaving the contents of
//! single-quoted string literals untouched.

use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};

/// Target SQL dialect of a wrapper instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    PostgreSql,
    /// Includes MariaDB
    MySql,
    /// Accepts `[bracket]` identifiers natively
    Sqlite,
    /// SQL Server, the native `[bracket]` dialect
    MsSql,
}

impl SqlDialect {
    /// Detect the dialect from a connection string scheme.
    ///
    /// SQL Server also accepts ADO.NET strings such as
    /// `Server=tcp:host,1433;Database=db;User Id=sa;Password=...`.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.trim().to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSql)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySql)
        } else if lower.starts_with("sqlite:") {
            Some(Self::Sqlite)
        } else if lower.starts_with("mssql://")
            || lower.starts_with("sqlserver://")
            || is_ado_string(&lower)
        {
            Some(Self::MsSql)
        } else {
            None
        }
    }

    /// Get the display name for this dialect.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSql => "PostgreSQL",
            Self::MySql => "MySQL",
            Self::Sqlite => "SQLite",
            Self::MsSql => "SQL Server",
        }
    }

    fn quote_chars(&self) -> Option<(char, char)> {
        match self {
            Self::PostgreSql => Some(('"', '"')),
            Self::MySql => Some(('`', '`')),
            Self::Sqlite | Self::MsSql => None,
        }
    }

    /// Rewrite `[identifier]` brackets for this dialect.
    ///
    /// PostgreSQL gets double quotes and MySQL gets backticks. SQL Server and
    /// SQLite keep the brackets.
    pub fn switch_dialect(&self, sql: &str) -> String {
        let Some((open, close)) = self.quote_chars() else {
            return sql.to_string();
        };
        let mut out = String::with_capacity(sql.len());
        let mut in_literal = false;
        for c in sql.chars() {
            match c {
                '\'' => {
                    in_literal = !in_literal;
                    out.push(c);
                }
                '[' if !in_literal => out.push(open),
                ']' if !in_literal => out.push(close),
                _ => out.push(c),
            }
        }
        out
    }

    /// Quote an identifier for use in generated statements.
    pub fn quote_identifier(&self, name: &str) -> String {
        match self {
            Self::MySql => format!("`{}`", name.replace('`', "``")),
            Self::PostgreSql | Self::Sqlite => format!("\"{}\"", name.replace('"', "\"\"")),
            Self::MsSql => format!("[{}]", name.replace(']', "]]")),
        }
    }

    /// Positional placeholder for the 1-based parameter `index`.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Self::PostgreSql => format!("${index}"),
            Self::MsSql => format!("@P{index}"),
            Self::MySql | Self::Sqlite => "?".to_string(),
        }
    }

    /// Render a filter fragment for this dialect.
    ///
    /// Brackets are switched, and every `?` outside a string literal is
    /// replaced with the placeholder numbered from `first_index`. Returns the
    /// rendered SQL and the number of placeholders found.
    pub fn render_fragment(&self, fragment: &str, first_index: usize) -> (String, usize) {
        let quotes = self.quote_chars();
        let mut out = String::with_capacity(fragment.len());
        let mut in_literal = false;
        let mut count = 0;
        for c in fragment.chars() {
            match (c, quotes) {
                ('\'', _) => {
                    in_literal = !in_literal;
                    out.push(c);
                }
                ('?', _) if !in_literal => {
                    out.push_str(&self.placeholder(first_index + count));
                    count += 1;
                }
                ('[', Some((open, _))) if !in_literal => out.push(open),
                (']', Some((_, close))) if !in_literal => out.push(close),
                _ => out.push(c),
            }
        }
        (out, count)
    }

    /// `TOP (n) ` prefix for a `SELECT` list. Only SQL Server pages this way,
    /// and only when nothing is skipped.
    pub fn top_prefix(&self, top: Option<u64>, skip: Option<u64>) -> Option<String> {
        match (self, top, skip) {
            (Self::MsSql, Some(top), None) => Some(format!("TOP ({top}) ")),
            _ => None,
        }
    }

    /// SQL Server's `OFFSET` paging needs an `ORDER BY` clause.
    pub fn paging_requires_order(&self, skip: Option<u64>) -> bool {
        *self == Self::MsSql && skip.is_some()
    }

    /// Trailing paging clause, or an empty string.
    pub fn paging_clause(&self, top: Option<u64>, skip: Option<u64>) -> String {
        if *self == Self::MsSql {
            return match (top, skip) {
                (_, None) => String::new(),
                (Some(top), Some(skip)) => {
                    format!(" OFFSET {skip} ROWS FETCH NEXT {top} ROWS ONLY")
                }
                (None, Some(skip)) => format!(" OFFSET {skip} ROWS"),
            };
        }
        match (top, skip) {
            (None, None) => String::new(),
            (Some(top), None) => format!(" LIMIT {top}"),
            (Some(top), Some(skip)) => format!(" LIMIT {top} OFFSET {skip}"),
            (None, Some(skip)) => match self {
                Self::MySql => format!(" LIMIT 18446744073709551615 OFFSET {skip}"),
                Self::Sqlite => format!(" LIMIT -1 OFFSET {skip}"),
                Self::PostgreSql | Self::MsSql => format!(" OFFSET {skip}"),
            },
        }
    }

    pub fn savepoint_sql(&self, name: &str) -> String {
        match self {
            Self::MsSql => format!("SAVE TRANSACTION {name}"),
            _ => format!("SAVEPOINT {name}"),
        }
    }

    pub fn rollback_to_savepoint_sql(&self, name: &str) -> String {
        match self {
            Self::MsSql => format!("ROLLBACK TRANSACTION {name}"),
            _ => format!("ROLLBACK TO SAVEPOINT {name}"),
        }
    }

    /// SQL Server savepoints cannot be released; they end with the transaction.
    pub fn release_savepoint_sql(&self, name: &str) -> Option<String> {
        match self {
            Self::MsSql => None,
            _ => Some(format!("RELEASE SAVEPOINT {name}")),
        }
    }
}

fn is_ado_string(lower: &str) -> bool {
    lower.split(';').any(|pair| {
        let key = pair.split('=').next().unwrap_or_default().trim();
        matches!(key, "server" | "data source" | "address" | "addr")
    })
}

impl std::fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Build an `IN (...)` list from numeric ids, or `None` when empty.
pub fn convert_to_sql_in(ids: &[i64]) -> Option<String> {
    if ids.is_empty() {
        return None;
    }
    let joined = ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");
    Some(format!("IN ({joined})"))
}

/// Ensure the connection string scheme agrees with the requested dialect.
pub fn check_dialect(connection_string: &str, dialect: SqlDialect) -> DbResult<()> {
    match SqlDialect::from_connection_string(connection_string) {
        Some(detected) if detected == dialect => Ok(()),
        Some(detected) => Err(DbError::configuration(format!(
            "Connection string is for {} but the {} dialect was requested",
            detected, dialect
        ))),
        None => Err(DbError::configuration(
            "Unsupported connection string. Use postgres://, mysql://, sqlite:, \
             mssql:// or an ADO.NET string with Server=...",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_dialect() {
        let sql = "SELECT [Name] FROM [Product]";
        assert_eq!(
            SqlDialect::PostgreSql.switch_dialect(sql),
            "SELECT \"Name\" FROM \"Product\""
        );
        assert_eq!(
            SqlDialect::MySql.switch_dialect(sql),
            "SELECT `Name` FROM `Product`"
        );
        assert_eq!(SqlDialect::Sqlite.switch_dialect(sql), sql);
        assert_eq!(SqlDialect::MsSql.switch_dialect(sql), sql);
    }

    #[test]
    fn test_switch_dialect_ignores_literals() {
        let sql = "SELECT [Name] FROM [Product] WHERE [Size] = '[XL]'";
        assert_eq!(
            SqlDialect::MySql.switch_dialect(sql),
            "SELECT `Name` FROM `Product` WHERE `Size` = '[XL]'"
        );
    }

    #[test]
    fn test_from_connection_string() {
        assert_eq!(
            SqlDialect::from_connection_string("postgresql://localhost/db"),
            Some(SqlDialect::PostgreSql)
        );
        assert_eq!(
            SqlDialect::from_connection_string("MARIADB://localhost/db"),
            Some(SqlDialect::MySql)
        );
        assert_eq!(
            SqlDialect::from_connection_string("sqlite:test.db"),
            Some(SqlDialect::Sqlite)
        );
        assert_eq!(
            SqlDialect::from_connection_string("mssql://sa:pw@localhost/db"),
            Some(SqlDialect::MsSql)
        );
        assert_eq!(
            SqlDialect::from_connection_string(
                "Server=tcp:localhost,1433;Database=AdventureWorks;User Id=sa;Password=x"
            ),
            Some(SqlDialect::MsSql)
        );
        assert_eq!(SqlDialect::from_connection_string("oracle://x"), None);
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(SqlDialect::MySql.quote_identifier("Name"), "`Name`");
        assert_eq!(SqlDialect::PostgreSql.quote_identifier("Name"), "\"Name\"");
        assert_eq!(SqlDialect::Sqlite.quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(SqlDialect::MsSql.quote_identifier("a]b"), "[a]]b]");
    }

    #[test]
    fn test_render_fragment_numbers_mssql_placeholders() {
        let (sql, count) = SqlDialect::MsSql.render_fragment("[Name] = ? OR [Color] = ?", 2);
        assert_eq!(sql, "[Name] = @P2 OR [Color] = @P3");
        assert_eq!(count, 2);
    }

    #[test]
    fn test_render_fragment_numbers_postgres_placeholders() {
        let (sql, count) =
            SqlDialect::PostgreSql.render_fragment("[Name] = ? AND [Color] <> '?' AND [Size] = ?", 3);
        assert_eq!(sql, "\"Name\" = $3 AND \"Color\" <> '?' AND \"Size\" = $4");
        assert_eq!(count, 2);
    }

    #[test]
    fn test_render_fragment_keeps_question_marks_elsewhere() {
        let (sql, count) = SqlDialect::Sqlite.render_fragment("[Name] IN (?, ?)", 1);
        assert_eq!(sql, "[Name] IN (?, ?)");
        assert_eq!(count, 2);
    }

    #[test]
    fn test_paging_clause() {
        assert_eq!(SqlDialect::PostgreSql.paging_clause(None, None), "");
        assert_eq!(SqlDialect::MySql.paging_clause(Some(5), None), " LIMIT 5");
        assert_eq!(
            SqlDialect::Sqlite.paging_clause(Some(5), Some(10)),
            " LIMIT 5 OFFSET 10"
        );
        assert_eq!(SqlDialect::Sqlite.paging_clause(None, Some(2)), " LIMIT -1 OFFSET 2");
        assert_eq!(SqlDialect::PostgreSql.paging_clause(None, Some(2)), " OFFSET 2");
    }

    #[test]
    fn test_mssql_paging() {
        let dialect = SqlDialect::MsSql;
        assert_eq!(dialect.top_prefix(Some(5), None).as_deref(), Some("TOP (5) "));
        assert_eq!(dialect.paging_clause(Some(5), None), "");
        assert_eq!(dialect.top_prefix(Some(5), Some(10)), None);
        assert_eq!(
            dialect.paging_clause(Some(5), Some(10)),
            " OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY"
        );
        assert_eq!(dialect.paging_clause(None, Some(3)), " OFFSET 3 ROWS");
        assert!(dialect.paging_requires_order(Some(3)));
        assert!(!SqlDialect::PostgreSql.paging_requires_order(Some(3)));
        assert_eq!(SqlDialect::MySql.top_prefix(Some(5), None), None);
    }

    #[test]
    fn test_savepoint_sql() {
        assert_eq!(SqlDialect::PostgreSql.savepoint_sql("sp"), "SAVEPOINT sp");
        assert_eq!(SqlDialect::MsSql.savepoint_sql("sp"), "SAVE TRANSACTION sp");
        assert_eq!(
            SqlDialect::MsSql.rollback_to_savepoint_sql("sp"),
            "ROLLBACK TRANSACTION sp"
        );
        assert_eq!(SqlDialect::MsSql.release_savepoint_sql("sp"), None);
        assert_eq!(
            SqlDialect::Sqlite.release_savepoint_sql("sp").as_deref(),
            Some("RELEASE SAVEPOINT sp")
        );
    }

    #[test]
    fn test_convert_to_sql_in() {
        assert_eq!(convert_to_sql_in(&[1, 2, 3]).as_deref(), Some("IN (1,2,3)"));
        assert_eq!(convert_to_sql_in(&[]), None);
    }

    #[test]
    fn test_check_dialect() {
        assert!(check_dialect("sqlite:x.db", SqlDialect::Sqlite).is_ok());
        assert!(matches!(
            check_dialect("mysql://localhost/db", SqlDialect::PostgreSql),
            Err(DbError::Configuration { .. })
        ));
        assert!(check_dialect("oracle://x", SqlDialect::MySql).is_err());
        assert!(check_dialect("Server=localhost;Database=db", SqlDialect::MsSql).is_ok());
    }
}

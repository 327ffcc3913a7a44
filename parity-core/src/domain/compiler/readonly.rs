// parity-core/src/domain/compiler/readonly.rs
use sqlparser::ast::{SetExpr, Statement};
use sqlparser::dialect::DuckDbDialect;
use sqlparser::parser::Parser;

use crate::domain::error::DomainError;

/// Accepts exactly one SELECT / WITH / set-operation statement.
/// Anything else (DML, DDL, PRAGMA, multiple statements, SELECT INTO) is refused.
pub fn ensure_read_only(sql: &str) -> Result<(), DomainError> {
    let dialect = DuckDbDialect {};
    let statements =
        Parser::parse_sql(&dialect, sql).map_err(|e| DomainError::UnsafeQuery(e.to_string()))?;

    let [statement] = statements.as_slice() else {
        return Err(DomainError::UnsafeQuery(format!(
            "expected exactly one statement, found {}",
            statements.len()
        )));
    };

    match statement {
        Statement::Query(query) => {
            if let SetExpr::Select(select) = query.body.as_ref()
                && select.into.is_some()
            {
                return Err(DomainError::UnsafeQuery("SELECT INTO creates a table".into()));
            }
            Ok(())
        }
        other => Err(DomainError::UnsafeQuery(format!(
            "only queries are allowed, got: {}",
            truncate(&other.to_string())
        ))),
    }
}

fn truncate(sql: &str) -> String {
    let mut s: String = sql.chars().take(60).collect();
    if s.len() < sql.len() {
        s.push_str("...");
    }
    s
}

//! Read-only SQL over one repository's issues.
//!
//! The caller's query refers to an `issues` table as if it only contained
//! the target repository. That view is provided by creating a session-local
//! TEMP table named `issues` populated from the scoped slice of the real
//! table; SQLite resolves unqualified names against the temp schema first,
//! so the caller's SQL needs no rewriting. The temp table lives on a single
//! pooled connection and is dropped before the connection is returned.

use anyhow::Context;
use serde_json::Value;
use sqlx::sqlite::SqliteConnection;
use sqlx::{Column, Executor, Row, Statement, TypeInfo, ValueRef};
use tracing::{debug, warn};

use super::DbPool;
use super::models::{ScopedQueryOutcome, ScopedQueryRows};
use crate::{RepolensError, Result};

const MAX_QUERY_LENGTH: usize = 10_000;

/// Statement validation. Rejections are hard errors; they mean the input
/// was never executed.
fn validate(query: &str) -> std::result::Result<String, String> {
    let trimmed = query.trim().trim_end_matches(';').trim();

    if trimmed.is_empty() {
        return Err("Query is empty".to_string());
    }
    if trimmed.len() > MAX_QUERY_LENGTH {
        return Err(format!(
            "Query exceeds maximum length of {MAX_QUERY_LENGTH} characters"
        ));
    }
    if trimmed.contains(';') {
        return Err("Multiple statements are not allowed".to_string());
    }

    let lowered = trimmed.to_lowercase();
    if !lowered.starts_with("select") {
        return Err("Only SELECT queries are allowed".to_string());
    }

    // Qualified references would bypass the temp-table shadowing.
    if contains_schema_qualifier(&lowered, "main.") || contains_schema_qualifier(&lowered, "temp.")
    {
        return Err("Schema-qualified table references are not allowed".to_string());
    }

    Ok(trimmed.to_string())
}

fn contains_schema_qualifier(lowered: &str, qualifier: &str) -> bool {
    let mut search_from = 0;
    while let Some(pos) = lowered[search_from..].find(qualifier) {
        let at = search_from + pos;
        let preceded_by_ident = at > 0
            && lowered[..at]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric() || c == '_');
        if !preceded_by_ident {
            return true;
        }
        search_from = at + qualifier.len();
    }
    false
}

/// Execute a caller-supplied SELECT against one repository's issues.
///
/// Validation failures return `Err`; execution failures after validation
/// are reported in-band as [`ScopedQueryOutcome::Error`] so callers can
/// cache and render them like any other result.
pub async fn execute_scoped_query(
    pool: &DbPool,
    repo_name: &str,
    query: &str,
) -> Result<ScopedQueryOutcome> {
    let sanitized = match validate(query) {
        Ok(sanitized) => sanitized,
        Err(reason) => return Err(RepolensError::QueryRejected(reason)),
    };

    let mut conn = pool
        .acquire()
        .await
        .context("Failed to acquire connection for scoped query")?;

    // Stale shadow from a crashed prior run on this pooled connection.
    sqlx::query("DROP TABLE IF EXISTS temp.issues")
        .execute(&mut *conn)
        .await
        .context("Failed to reset scoped query scratch table")?;

    sqlx::query(
        r#"
        CREATE TEMP TABLE issues AS
        SELECT id, repo_name, issue_number, title, body, state,
               author, created_at, updated_at, labels
        FROM main.issues
        WHERE repo_name = ?
        "#,
    )
    .bind(repo_name)
    .execute(&mut *conn)
    .await
    .context("Failed to build scoped issue table")?;

    let outcome = match run_select(&mut conn, &sanitized).await {
        Ok(rows) => {
            debug!(
                "Scoped query on {} returned {} rows",
                repo_name,
                rows.rows.len()
            );
            ScopedQueryOutcome::Rows(rows)
        }
        Err(err) => {
            debug!("Scoped query on {} failed: {:#}", repo_name, err);
            ScopedQueryOutcome::Error {
                error: format!("{err:#}"),
                query: sanitized,
            }
        }
    };

    // The connection goes back to the pool; the shadow must not outlive us.
    if let Err(err) = sqlx::query("DROP TABLE IF EXISTS temp.issues")
        .execute(&mut *conn)
        .await
    {
        warn!("Failed to drop scoped query scratch table: {}", err);
    }

    Ok(outcome)
}

async fn run_select(
    conn: &mut SqliteConnection,
    sanitized: &str,
) -> anyhow::Result<ScopedQueryRows> {
    let statement = conn.prepare(sanitized).await?;
    let columns: Vec<String> = statement
        .columns()
        .iter()
        .map(|column| column.name().to_string())
        .collect();

    let rows = statement.query().fetch_all(&mut *conn).await?;

    let mut decoded = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut values = Vec::with_capacity(columns.len());
        for index in 0..columns.len() {
            values.push(decode_column(row, index)?);
        }
        decoded.push(values);
    }

    Ok(ScopedQueryRows {
        columns,
        rows: decoded,
        query: sanitized.to_string(),
    })
}

/// SQLite is dynamically typed, so decode per-cell rather than per-column.
fn decode_column(row: &sqlx::sqlite::SqliteRow, index: usize) -> anyhow::Result<Value> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }

    let value = match raw.type_info().name() {
        "INTEGER" => Value::from(row.try_get::<i64, _>(index)?),
        "REAL" => serde_json::Number::from_f64(row.try_get::<f64, _>(index)?)
            .map_or(Value::Null, Value::Number),
        "BLOB" => Value::String(
            String::from_utf8_lossy(&row.try_get::<Vec<u8>, _>(index)?).into_owned(),
        ),
        _ => Value::String(row.try_get::<String, _>(index)?),
    };

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_semicolon() {
        let sanitized = validate("SELECT COUNT(*) FROM issues;").expect("should validate");
        assert_eq!(sanitized, "SELECT COUNT(*) FROM issues");
    }

    #[test]
    fn rejects_with_prefixed_query() {
        assert!(validate("WITH x AS (SELECT 1) SELECT * FROM x").is_err());
    }

    #[test]
    fn rejects_empty_query() {
        assert!(validate("   ;  ").is_err());
    }

    #[test]
    fn rejects_non_select() {
        assert!(validate("DELETE FROM issues").is_err());
        assert!(validate("UPDATE issues SET state = 'closed'").is_err());
        assert!(validate("PRAGMA table_info(issues)").is_err());
    }

    #[test]
    fn rejects_multiple_statements() {
        assert!(validate("SELECT 1; SELECT 2").is_err());
    }

    #[test]
    fn rejects_schema_qualified_references() {
        assert!(validate("SELECT * FROM main.issues").is_err());
        assert!(validate("SELECT * FROM temp.issues").is_err());
        assert!(validate("select * from MAIN.issues").is_err());
    }

    #[test]
    fn allows_identifiers_containing_qualifier_text() {
        // "domain." has "main." as a substring but is part of an identifier.
        assert!(validate("SELECT domain.title FROM issues AS domain").is_ok());
    }

    #[test]
    fn rejects_oversized_query() {
        let huge = format!("SELECT '{}' FROM issues", "x".repeat(MAX_QUERY_LENGTH));
        assert!(validate(&huge).is_err());
    }
}

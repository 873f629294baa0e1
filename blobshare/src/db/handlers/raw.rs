//! Unrestricted statement execution for the admin console.
//!
//! Anything can be run here, including writes and schema changes. It must only ever be
//! reachable from the local console, never from the HTTP router.

use crate::db::errors::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Executor, Row, SqliteConnection, Statement, TypeInfo, ValueRef};
use tracing::instrument;

/// Result of a raw statement: either a table or a row count.
#[derive(Debug, Clone, PartialEq)]
pub enum RawQueryOutcome {
    Rows { columns: Vec<String>, rows: Vec<Vec<String>> },
    Affected(u64),
}

/// Run `sql` against the store.
///
/// The statement is prepared first so that anything producing columns (`SELECT`,
/// `PRAGMA`, `... RETURNING`) comes back as rows and everything else reports how many
/// rows it touched.
#[instrument(skip(conn), err)]
pub async fn run_raw_query(conn: &mut SqliteConnection, sql: &str) -> Result<RawQueryOutcome> {
    let statement = (&mut *conn).prepare(sql).await?;

    if statement.columns().is_empty() {
        let result = (&mut *conn).execute(sql).await?;
        return Ok(RawQueryOutcome::Affected(result.rows_affected()));
    }

    let columns: Vec<String> = statement.columns().iter().map(|c| c.name().to_string()).collect();
    let fetched = statement.query().fetch_all(&mut *conn).await?;

    let mut rows = Vec::with_capacity(fetched.len());
    for row in &fetched {
        let mut values = Vec::with_capacity(columns.len());
        for index in 0..columns.len() {
            values.push(render_value(row, index)?);
        }
        rows.push(values);
    }

    Ok(RawQueryOutcome::Rows { columns, rows })
}

/// Render a single value for display, based on the storage class of the value itself
/// rather than the declared column type.
fn render_value(row: &SqliteRow, index: usize) -> Result<String> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok("null".to_string());
    }
    let storage_class = raw.type_info().name().to_string();

    let rendered = match storage_class.as_str() {
        "INTEGER" => row.try_get_unchecked::<i64, _>(index)?.to_string(),
        "REAL" => row.try_get_unchecked::<f64, _>(index)?.to_string(),
        "BLOB" => format!("<{} bytes>", row.try_get_unchecked::<Vec<u8>, _>(index)?.len()),
        _ => row.try_get_unchecked::<String, _>(index)?,
    };
    Ok(rendered)
}

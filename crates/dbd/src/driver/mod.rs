//! Execution drivers.
//!
//! A [`Driver`] owns one database connection. It rewrites printf-style queries into its
//! native placeholder syntax, binds a [`ParameterVector`] and either returns an affected
//! row count or streams rows into a [`RowSink`].
//!
//! | name      | backend          | params string                   |
//! |-----------|------------------|---------------------------------|
//! | `sqlite3` | `rusqlite`       | database path (or `:memory:`)   |
//! | `pgsql`   | `tokio-postgres` | libpq connection string or URL  |

use crate::bind::ParameterVector;
use crate::error::{DbdError, DbdResult};
use crate::placeholder::{PlaceholderStyle, to_native};
use async_trait::async_trait;

pub mod postgres;
pub mod sqlite;

pub use postgres::PgDriver;
pub use sqlite::SqliteDriver;

/// One result cell; `None` is SQL NULL.
pub type Cell = Option<Vec<u8>>;

/// Receives the result of a selection, in cursor order.
pub trait RowSink {
    /// Column names, reported once per query before any row.
    fn columns(&mut self, names: &[String]) -> DbdResult<()>;

    fn row(&mut self, cells: &[Cell]) -> DbdResult<()>;
}

/// Database capability used by the execution modes.
#[async_trait]
pub trait Driver: Send {
    /// Driver name as given on the command line.
    fn name(&self) -> &'static str;

    fn placeholder_style(&self) -> PlaceholderStyle;

    /// Rewrite `query` into this driver's placeholder syntax.
    fn native_sql(&self, query: &str) -> String {
        to_native(query, self.placeholder_style())
    }

    /// Escape a value for inclusion inside a quoted SQL literal.
    fn escape(&self, value: &str) -> String;

    /// Run a statement and return the number of affected rows.
    async fn execute(&mut self, query: &str, params: &ParameterVector) -> DbdResult<u64>;

    /// Run a row-returning statement and stream its rows into `sink`.
    async fn select(
        &mut self,
        query: &str,
        params: &ParameterVector,
        sink: &mut (dyn RowSink + Send),
    ) -> DbdResult<()>;
}

/// Open a connection with the named driver.
pub async fn connect(driver: &str, params: &str) -> DbdResult<Box<dyn Driver>> {
    match driver {
        sqlite::NAME => Ok(Box::new(SqliteDriver::open(params)?)),
        postgres::NAME => Ok(Box::new(PgDriver::connect(params).await?)),
        other => Err(DbdError::UnknownDriver(other.to_string())),
    }
}

/// Double single quotes, the escaping rule shared by both drivers.
pub(crate) fn escape_quotes(value: &str) -> String {
    value.replace('\'', "''")
}

const MAX_LOGGED_SQL: usize = 200;

/// Truncate to at most `max` bytes on a char boundary.
fn truncate_sql_bytes(sql: &str, max: usize) -> &str {
    if sql.len() <= max {
        return sql;
    }
    let mut end = max;
    while !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

/// Emit the SQL about to run under the `dbd.sql` target.
pub(crate) fn log_sql(driver: &'static str, operation: &'static str, native_sql: &str, param_count: usize) {
    let sql = if native_sql.len() > MAX_LOGGED_SQL {
        format!("{}...", truncate_sql_bytes(native_sql, MAX_LOGGED_SQL))
    } else {
        native_sql.to_string()
    };
    tracing::debug!(
        target: "dbd.sql",
        driver,
        operation,
        param_count,
        sql = %sql,
    );
}

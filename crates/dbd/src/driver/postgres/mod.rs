//! PostgreSQL driver (`pgsql`) on `tokio-postgres`.
//!
//! Statements are prepared first, so every parameter value is converted to the type the
//! server inferred for its position (see [`types::PgParam`]). Result cells are rendered
//! back to text through [`types::PgCell`].

mod types;

pub use types::{PgCell, PgParam};

use super::{Cell, Driver, RowSink, escape_quotes, log_sql};
use crate::bind::ParameterVector;
use crate::error::{DbdError, DbdResult};
use crate::placeholder::PlaceholderStyle;
use async_trait::async_trait;
use futures_util::TryStreamExt;
use std::error::Error;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, Statement};

pub const NAME: &str = "pgsql";

pub struct PgDriver {
    client: Client,
}

impl PgDriver {
    /// Connect with a libpq-style connection string or `postgres://` URL.
    pub async fn connect(params: &str) -> DbdResult<Self> {
        let (client, connection) =
            tokio_postgres::connect(params, NoTls)
                .await
                .map_err(|e| DbdError::Connect {
                    driver: NAME,
                    message: pg_message(&e),
                })?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(target: "dbd.sql", error = %e, "postgres connection error");
            }
        });
        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn prepare(
        &self,
        operation: &'static str,
        query: &str,
        params: &ParameterVector,
    ) -> DbdResult<Statement> {
        let sql = self.native_sql(query);
        log_sql(NAME, operation, &sql, params.len());
        self.client
            .prepare(&sql)
            .await
            .map_err(|e| DbdError::driver(NAME, operation, query, pg_message(&e)))
    }
}

#[async_trait]
impl Driver for PgDriver {
    fn name(&self) -> &'static str {
        NAME
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Dollar
    }

    fn escape(&self, value: &str) -> String {
        escape_quotes(value)
    }

    async fn execute(&mut self, query: &str, params: &ParameterVector) -> DbdResult<u64> {
        let stmt = self.prepare("prepare query", query, params).await?;
        let values: Vec<PgParam<'_>> = params.params().map(PgParam::from).collect();
        let refs: Vec<&(dyn ToSql + Sync)> =
            values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();

        self.client
            .execute(&stmt, &refs)
            .await
            .map_err(|e| DbdError::driver(NAME, "query", query, pg_message(&e)))
    }

    async fn select(
        &mut self,
        query: &str,
        params: &ParameterVector,
        sink: &mut (dyn RowSink + Send),
    ) -> DbdResult<()> {
        let stmt = self.prepare("prepare select", query, params).await?;
        let names: Vec<String> = stmt.columns().iter().map(|c| c.name().to_string()).collect();
        sink.columns(&names)?;

        let values: Vec<PgParam<'_>> = params.params().map(PgParam::from).collect();
        let refs: Vec<&(dyn ToSql + Sync)> =
            values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();

        let stream = self
            .client
            .query_raw(&stmt, refs.iter().copied())
            .await
            .map_err(|e| DbdError::driver(NAME, "select", query, pg_message(&e)))?;
        let mut stream = std::pin::pin!(stream);

        let mut cells: Vec<Cell> = Vec::with_capacity(names.len());
        while let Some(row) = stream
            .try_next()
            .await
            .map_err(|e| DbdError::driver(NAME, "read row", query, pg_message(&e)))?
        {
            cells.clear();
            for i in 0..names.len() {
                let cell: Option<PgCell> = row
                    .try_get(i)
                    .map_err(|e| DbdError::driver(NAME, "read row", query, pg_message(&e)))?;
                cells.push(cell.map(PgCell::into_bytes));
            }
            sink.row(&cells)?;
        }
        Ok(())
    }
}

/// Prefer the server's message over the client's error wrapper. Client-side errors
/// carry the conversion failure in their source chain.
fn pg_message(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => db.message().to_string(),
        None => error_chain(e),
    }
}

fn error_chain(e: &dyn Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("error serializing parameter 0")]
    struct Wrapper(#[source] std::io::Error);

    #[test]
    fn error_chain_includes_every_source() {
        let inner = std::io::Error::other("invalid int4 value 'abc'");
        assert_eq!(
            error_chain(&Wrapper(inner)),
            "error serializing parameter 0: invalid int4 value 'abc'"
        );
        assert_eq!(error_chain(&std::io::Error::other("plain")), "plain");
    }
}

//! SQLite driver (`sqlite3`).

use super::{Cell, Driver, RowSink, escape_quotes, log_sql};
use crate::bind::{BoundParam, ParameterVector};
use crate::error::{DbdError, DbdResult};
use crate::placeholder::{ParamType, PlaceholderStyle};
use async_trait::async_trait;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{Connection, params_from_iter};
use std::time::Duration;

pub const NAME: &str = "sqlite3";

const BUSY_TIMEOUT_MS: u64 = 1000;

pub struct SqliteDriver {
    conn: Connection,
}

impl SqliteDriver {
    /// Open the database at `path` (`:memory:` for a private in-memory database).
    pub fn open(path: &str) -> DbdResult<Self> {
        let connect_err = |e: rusqlite::Error| DbdError::Connect {
            driver: NAME,
            message: e.to_string(),
        };
        let conn = Connection::open(path).map_err(connect_err)?;
        conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))
            .map_err(connect_err)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn execute_blocking(&mut self, query: &str, params: &ParameterVector) -> DbdResult<u64> {
        let sql = self.native_sql(query);
        log_sql(NAME, "query", &sql, params.len());

        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| DbdError::driver(NAME, "prepare query", query, e))?;
        let values = bind_values(query, params)?;
        let changed = stmt
            .execute(params_from_iter(values.iter()))
            .map_err(|e| DbdError::driver(NAME, "query", query, e))?;
        Ok(changed as u64)
    }

    fn select_blocking(
        &mut self,
        query: &str,
        params: &ParameterVector,
        sink: &mut (dyn RowSink + Send),
    ) -> DbdResult<()> {
        let sql = self.native_sql(query);
        log_sql(NAME, "select", &sql, params.len());

        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| DbdError::driver(NAME, "prepare select", query, e))?;
        let values = bind_values(query, params)?;

        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        sink.columns(&names)?;

        let mut rows = stmt
            .query(params_from_iter(values.iter()))
            .map_err(|e| DbdError::driver(NAME, "select", query, e))?;

        let mut cells: Vec<Cell> = Vec::with_capacity(names.len());
        while let Some(row) = rows
            .next()
            .map_err(|e| DbdError::driver(NAME, "read row", query, e))?
        {
            cells.clear();
            for i in 0..names.len() {
                let value = row
                    .get_ref(i)
                    .map_err(|e| DbdError::driver(NAME, "read row", query, e))?;
                cells.push(cell_bytes(value));
            }
            sink.row(&cells)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    fn name(&self) -> &'static str {
        NAME
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Question
    }

    fn escape(&self, value: &str) -> String {
        escape_quotes(value)
    }

    async fn execute(&mut self, query: &str, params: &ParameterVector) -> DbdResult<u64> {
        self.execute_blocking(query, params)
    }

    async fn select(
        &mut self,
        query: &str,
        params: &ParameterVector,
        sink: &mut (dyn RowSink + Send),
    ) -> DbdResult<()> {
        self.select_blocking(query, params, sink)
    }
}

fn bind_values(query: &str, params: &ParameterVector) -> DbdResult<Vec<Value>> {
    params
        .params()
        .enumerate()
        .map(|(i, p)| {
            to_value(p).map_err(|message| {
                DbdError::driver(NAME, "bind", query, format!("argument {}: {message}", i + 1))
            })
        })
        .collect()
}

/// Convert a bound parameter to a SQLite value according to its declared type.
fn to_value(param: BoundParam<'_>) -> Result<Value, String> {
    let Some(raw) = param.value else {
        return Ok(Value::Null);
    };
    let ty = param.param_type;

    if ty == ParamType::Blob {
        return Ok(Value::Blob(raw.to_vec()));
    }

    if ty.is_integer() || ty.is_float() {
        let text = std::str::from_utf8(raw)
            .map_err(|_| format!("{ty} value is not valid UTF-8"))?
            .trim();
        let invalid = || format!("invalid {ty} value '{text}'");
        return if ty.is_float() {
            text.parse::<f64>().map(Value::Real).map_err(|_| invalid())
        } else if ty.is_unsigned() {
            let v = text.parse::<u64>().map_err(|_| invalid())?;
            i64::try_from(v)
                .map(Value::Integer)
                .map_err(|_| format!("{ty} value '{text}' does not fit in a 64-bit integer"))
        } else {
            text.parse::<i64>().map(Value::Integer).map_err(|_| invalid())
        };
    }

    Ok(match std::str::from_utf8(raw) {
        Ok(s) => Value::Text(s.to_string()),
        Err(_) => Value::Blob(raw.to_vec()),
    })
}

fn cell_bytes(value: ValueRef<'_>) -> Cell {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string().into_bytes()),
        ValueRef::Real(f) => Some(format_real(f).into_bytes()),
        ValueRef::Text(t) => Some(t.to_vec()),
        ValueRef::Blob(b) => Some(b.to_vec()),
    }
}

/// Render a REAL the way SQLite's own text conversion does for whole numbers (`1.0`).
fn format_real(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}

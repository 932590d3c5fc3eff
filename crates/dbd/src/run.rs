//! Execution modes.
//!
//! One [`Request`] runs in exactly one [`Mode`]. Every mode writes through a single
//! [`Formatter`], so output follows the order in which the database produced it.

use crate::argument::{ArgumentSource, HandleCache};
use crate::bind::Binder;
use crate::driver::Driver;
use crate::error::{DbdError, DbdResult};
use crate::format::{Formatter, OutputOptions};
use std::fmt;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Escape each positional value with the driver's quoting rule.
    Escape,
    /// Select every row of each named table.
    Table,
    /// Run each positional query and stream its rows.
    Select,
    /// Run one statement and report the affected row count.
    Query,
}

impl Mode {
    pub fn name(self) -> &'static str {
        match self {
            Self::Escape => "escape",
            Self::Table => "table",
            Self::Select => "select",
            Self::Query => "query",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything one invocation needs besides the connection.
#[derive(Debug, Clone)]
pub struct Request {
    pub mode: Mode,
    /// Queries, table names or values to escape, depending on the mode.
    pub positionals: Vec<String>,
    /// Argument sources, bound to the placeholders of every query.
    pub arguments: Vec<ArgumentSource>,
    pub output: OutputOptions,
}

impl Request {
    pub fn new(mode: Mode, positionals: Vec<String>) -> Self {
        Self {
            mode,
            positionals,
            arguments: Vec::new(),
            output: OutputOptions::default(),
        }
    }

    pub fn with_arguments(mut self, arguments: Vec<ArgumentSource>) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_output(mut self, output: OutputOptions) -> Self {
        self.output = output;
        self
    }

    /// Check the positional count for the mode. Runs before any connection is opened.
    pub fn validate(&self) -> DbdResult<()> {
        match self.mode {
            Mode::Query if self.positionals.len() != 1 => {
                Err(DbdError::configuration("one query needs to be specified"))
            }
            Mode::Select if self.positionals.is_empty() => {
                Err(DbdError::configuration("at least one query needs to be specified"))
            }
            Mode::Table if self.positionals.is_empty() => {
                Err(DbdError::configuration("at least one table needs to be specified"))
            }
            _ => Ok(()),
        }
    }
}

/// Run `request` against `driver`, writing to `out`.
///
/// In [`Mode::Query`] the count is written before a zero count is reported as
/// [`DbdError::NoRowsChanged`].
pub async fn run<W>(
    driver: &mut dyn Driver,
    request: &Request,
    handles: &mut HandleCache,
    out: W,
) -> DbdResult<()>
where
    W: Write + Send,
{
    request.validate()?;

    tracing::debug!(
        mode = %request.mode,
        driver = driver.name(),
        positionals = request.positionals.len(),
        arguments = request.arguments.len(),
        "running request"
    );

    let mut formatter = Formatter::new(out, request.output.clone());
    match request.mode {
        Mode::Escape => run_escape(driver, request, &mut formatter),
        Mode::Query => run_query(driver, request, handles, &mut formatter).await,
        Mode::Select | Mode::Table => run_select(driver, request, handles, &mut formatter).await,
    }
}

fn run_escape<W: Write>(
    driver: &dyn Driver,
    request: &Request,
    formatter: &mut Formatter<W>,
) -> DbdResult<()> {
    let escaped: Vec<String> = request
        .positionals
        .iter()
        .map(|v| driver.escape(v))
        .collect();
    formatter.write_escaped(&escaped)?;
    formatter.finish()
}

async fn run_query<W: Write + Send>(
    driver: &mut dyn Driver,
    request: &Request,
    handles: &mut HandleCache,
    formatter: &mut Formatter<W>,
) -> DbdResult<()> {
    let query = request
        .positionals
        .first()
        .ok_or_else(|| DbdError::configuration("one query needs to be specified"))?;

    let params = Binder::default().bind(query, &request.arguments, handles)?;
    let rows = driver.execute(query, &params).await?;

    formatter.write_count(rows)?;
    formatter.finish()?;

    if rows == 0 {
        return Err(DbdError::NoRowsChanged {
            query: query.clone(),
        });
    }
    Ok(())
}

async fn run_select<W: Write + Send>(
    driver: &mut dyn Driver,
    request: &Request,
    handles: &mut HandleCache,
    formatter: &mut Formatter<W>,
) -> DbdResult<()> {
    let binder = Binder::default();
    for positional in &request.positionals {
        let query = match request.mode {
            Mode::Table => table_query(driver, positional),
            _ => positional.clone(),
        };
        let params = binder.bind(&query, &request.arguments, handles)?;
        driver.select(&query, &params, formatter).await?;
    }
    formatter.finish()
}

/// `select * from <table>`, with the table name escaped by the driver.
pub fn table_query(driver: &dyn Driver, table: &str) -> String {
    format!("select * from {}", driver.escape(table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::ParameterVector;
    use crate::driver::{Cell, RowSink};
    use crate::placeholder::PlaceholderStyle;
    use async_trait::async_trait;

    /// Records calls and replays canned rows.
    #[derive(Default)]
    struct FakeDriver {
        affected: u64,
        rows: Vec<Vec<Cell>>,
        queries: Vec<String>,
        bound: Vec<Vec<Option<Vec<u8>>>>,
    }

    #[async_trait]
    impl Driver for FakeDriver {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn placeholder_style(&self) -> PlaceholderStyle {
            PlaceholderStyle::Question
        }

        fn escape(&self, value: &str) -> String {
            value.replace('\'', "''")
        }

        async fn execute(&mut self, query: &str, params: &ParameterVector) -> DbdResult<u64> {
            self.queries.push(query.to_string());
            self.bound
                .push(params.params().map(|p| p.value.map(<[u8]>::to_vec)).collect());
            Ok(self.affected)
        }

        async fn select(
            &mut self,
            query: &str,
            params: &ParameterVector,
            sink: &mut (dyn RowSink + Send),
        ) -> DbdResult<()> {
            self.queries.push(query.to_string());
            self.bound
                .push(params.params().map(|p| p.value.map(<[u8]>::to_vec)).collect());
            sink.columns(&["c".to_string()])?;
            for row in &self.rows {
                sink.row(row)?;
            }
            Ok(())
        }
    }

    async fn run_to_string(driver: &mut FakeDriver, request: &Request) -> (DbdResult<()>, String) {
        let mut handles = HandleCache::new();
        let mut out = Vec::new();
        let result = run(driver, request, &mut handles, &mut out).await;
        (result, String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn escape_mode_doubles_quotes_without_executing() {
        let mut driver = FakeDriver::default();
        let request = Request::new(
            Mode::Escape,
            vec!["john';drop table users".into(), "ok".into()],
        );
        let (result, out) = run_to_string(&mut driver, &request).await;
        result.unwrap();
        assert_eq!(out, "john'';drop table users\tok\n");
        assert!(driver.queries.is_empty());
    }

    #[tokio::test]
    async fn query_mode_reports_count() {
        let mut driver = FakeDriver {
            affected: 3,
            ..Default::default()
        };
        let request = Request::new(Mode::Query, vec!["update t set a = %d".into()])
            .with_arguments(vec![ArgumentSource::literal("1")]);
        let (result, out) = run_to_string(&mut driver, &request).await;
        result.unwrap();
        assert_eq!(out, "3\n");
        assert_eq!(driver.bound, vec![vec![Some(b"1".to_vec())]]);
    }

    #[tokio::test]
    async fn zero_rows_is_written_then_reported() {
        let mut driver = FakeDriver::default();
        let request = Request::new(Mode::Query, vec!["delete from t".into()]);
        let (result, out) = run_to_string(&mut driver, &request).await;
        assert_eq!(out, "0\n");
        let err = result.unwrap_err();
        assert!(err.is_no_rows_changed());
        assert_eq!(err.exit_code(), 1);
    }

    #[tokio::test]
    async fn query_mode_needs_exactly_one_query() {
        let mut driver = FakeDriver::default();
        let request = Request::new(Mode::Query, vec!["a".into(), "b".into()]);
        let (result, out) = run_to_string(&mut driver, &request).await;
        assert!(matches!(result, Err(DbdError::Configuration(_))));
        assert!(out.is_empty());
        assert!(driver.queries.is_empty());
    }

    #[tokio::test]
    async fn count_mismatch_aborts_before_execution() {
        let mut driver = FakeDriver::default();
        let request = Request::new(Mode::Select, vec!["select %d, %s".into()])
            .with_arguments(vec![ArgumentSource::literal("1")]);
        let (result, _) = run_to_string(&mut driver, &request).await;
        assert!(matches!(
            result,
            Err(DbdError::ArgumentCountMismatch {
                expected: 2,
                provided: 1,
                ..
            })
        ));
        assert!(driver.queries.is_empty());
    }

    #[tokio::test]
    async fn table_mode_escapes_and_concatenates() {
        let mut driver = FakeDriver {
            rows: vec![vec![Some(b"1".to_vec())], vec![Some(b"2".to_vec())]],
            ..Default::default()
        };
        let request = Request::new(Mode::Table, vec!["a".into(), "b'c".into()]);
        let (result, out) = run_to_string(&mut driver, &request).await;
        result.unwrap();
        assert_eq!(driver.queries, vec!["select * from a", "select * from b''c"]);
        assert_eq!(out, "1\n2\n1\n2\n");
    }

    #[tokio::test]
    async fn select_mode_with_header_and_empty_result() {
        let mut driver = FakeDriver::default();
        let output = OutputOptions {
            header: true,
            ..Default::default()
        };
        let request = Request::new(Mode::Select, vec!["select c from t".into()]).with_output(output);
        let (result, out) = run_to_string(&mut driver, &request).await;
        result.unwrap();
        assert_eq!(out, "c\n");
    }

    #[test]
    fn validation_per_mode() {
        assert!(Request::new(Mode::Escape, vec![]).validate().is_ok());
        assert!(Request::new(Mode::Select, vec![]).validate().is_err());
        assert!(Request::new(Mode::Table, vec![]).validate().is_err());
        assert!(Request::new(Mode::Query, vec![]).validate().is_err());
        assert!(Request::new(Mode::Query, vec!["q".into()]).validate().is_ok());
    }
}

use crate::cli::RunArgs;
use dbd::format::{DEFAULT_COLUMN_SEPARATOR, DEFAULT_LINE_SEPARATOR};
use dbd::{DbdError, DbdResult, Encoding, OutputOptions, Request};
use std::path::PathBuf;

pub const DRIVER_ENV: &str = "DBD_DRIVER";
pub const PARAMS_ENV: &str = "DBD_PARAMS";

/// A fully resolved invocation.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub driver: String,
    pub params: String,
    /// `None` writes to stdout.
    pub output: Option<PathBuf>,
    pub request: Request,
}

impl RunConfig {
    pub fn from_env(args: RunArgs) -> DbdResult<Self> {
        Self::resolve(args, |key| std::env::var(key).ok())
    }

    /// Apply environment defaults through `env` and validate. Flags win over the environment.
    pub fn resolve(args: RunArgs, env: impl Fn(&str) -> Option<String>) -> DbdResult<Self> {
        let Some(mode) = args.mode else {
            return Err(DbdError::configuration(
                "one of --escape, --table, --select, or --query must be specified",
            ));
        };

        let driver = args
            .driver
            .or_else(|| non_empty(env(DRIVER_ENV)))
            .ok_or_else(|| DbdError::configuration("--driver must be specified"))?;
        let params = args
            .params
            .or_else(|| non_empty(env(PARAMS_ENV)))
            .ok_or_else(|| DbdError::configuration("--params must be specified"))?;

        let encoding = match args.encoding.as_deref() {
            Some(name) => name.parse::<Encoding>()?,
            None => Encoding::default(),
        };

        let output = OutputOptions {
            column_separator: args
                .column_separator
                .unwrap_or_else(|| DEFAULT_COLUMN_SEPARATOR.to_string()),
            line_separator: args
                .line_separator
                .unwrap_or_else(|| DEFAULT_LINE_SEPARATOR.to_string()),
            no_end_of_line: args.no_end_of_line,
            header: args.header,
            encoding,
        };

        let request = Request::new(mode, args.positionals)
            .with_arguments(args.arguments)
            .with_output(output);
        request.validate()?;

        Ok(Self {
            driver,
            params,
            output: args.output,
            request,
        })
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.is_empty())
}

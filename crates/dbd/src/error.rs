//! Error types for dbd

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for dbd operations
pub type DbdResult<T> = Result<T, DbdError>;

/// Exit code for a caller or input error.
pub const EXIT_CALLER_ERROR: i32 = 1;

/// Exit code for a database, driver or I/O failure.
pub const EXIT_FAILURE: i32 = 2;

/// Error types for argument binding and query execution
#[derive(Debug, Error)]
pub enum DbdError {
    /// Missing or contradictory configuration (driver, params, mode)
    #[error("{0}")]
    Configuration(String),

    /// No driver is registered under this name
    #[error("no driver for '{0}'")]
    UnknownDriver(String),

    /// Placeholder count and supplied argument count disagree
    #[error("database query '{query}' expects {expected} arguments, {provided} provided")]
    ArgumentCountMismatch {
        query: String,
        expected: usize,
        provided: usize,
    },

    /// A file-backed argument could not be opened or read
    #[error("database query '{query}' failed while reading '{path}'")]
    ArgumentRead {
        query: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Connecting to the database failed
    #[error("failed to open a connection to the database (using {driver}): {message}")]
    Connect {
        driver: &'static str,
        message: String,
    },

    /// Driver-reported failure during prepare/bind/execute/fetch
    #[error("database {operation} '{query}' failed (using {driver}): {message}")]
    Driver {
        operation: &'static str,
        query: String,
        driver: &'static str,
        message: String,
    },

    /// Unsupported cell encoding name
    #[error("encoding '{0}' must be one of 'none', 'base64', 'base64url', 'echo'")]
    UnsupportedEncoding(String),

    /// The output file could not be opened
    #[error("could not open '{}'", path.display())]
    OutputOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing to the output destination failed
    #[error("failed to write output")]
    Io(#[from] std::io::Error),

    /// A mutation completed but did not modify anything
    #[error("database query '{query}' changed no rows")]
    NoRowsChanged { query: String },
}

impl DbdError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a driver error for a specific operation and query
    pub fn driver(
        driver: &'static str,
        operation: &'static str,
        query: impl Into<String>,
        message: impl ToString,
    ) -> Self {
        Self::Driver {
            operation,
            query: query.into(),
            driver,
            message: message.to_string(),
        }
    }

    /// Check if this is the "zero rows affected" soft failure
    pub fn is_no_rows_changed(&self) -> bool {
        matches!(self, Self::NoRowsChanged { .. })
    }

    /// Process exit code for this error.
    ///
    /// Caller errors (bad configuration, argument count, unknown encoding, nothing
    /// changed) map to 1; driver and I/O failures map to 2.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_)
            | Self::UnknownDriver(_)
            | Self::ArgumentCountMismatch { .. }
            | Self::UnsupportedEncoding(_)
            | Self::NoRowsChanged { .. } => EXIT_CALLER_ERROR,
            Self::ArgumentRead { .. }
            | Self::Connect { .. }
            | Self::Driver { .. }
            | Self::OutputOpen { .. }
            | Self::Io(_) => EXIT_FAILURE,
        }
    }
}

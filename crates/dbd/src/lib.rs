//! # dbd
//!
//! Run parameterized SQL from shell scripts and stream the results as delimited text.
//!
//! ## Features
//!
//! - **printf-style placeholders**: `%d`, `%lu`, `%pDt`, `%pDb`... carry the parameter type
//! - **Argument sources**: literals, files (or stdin) and explicit NULLs, bound positionally
//! - **Shared file handles**: the same path named twice reuses one stream
//! - **Pluggable slot layout**: BLOB/CLOB values use a four-slot large-object layout
//! - **Drivers**: SQLite (`sqlite3`) and PostgreSQL (`pgsql`)
//! - **Cell encodings**: `none`, `echo`, `base64`, `base64url`
//!
//! ## Example
//!
//! ```ignore
//! use dbd::{ArgumentSource, HandleCache, Mode, Request, driver};
//!
//! let mut db = driver::connect("sqlite3", "app.db").await?;
//! let request = Request::new(Mode::Select, vec!["select * from users where id = %d".into()])
//!     .with_arguments(vec![ArgumentSource::literal("42")]);
//!
//! let mut handles = HandleCache::new();
//! dbd::run(db.as_mut(), &request, &mut handles, std::io::stdout().lock()).await?;
//! ```

pub mod argument;
pub mod bind;
pub mod driver;
pub mod encoding;
pub mod error;
pub mod format;
pub mod placeholder;
pub mod run;

pub use argument::{ArgumentSource, HandleCache, ResolvedArgument, Resolver, StreamKey};
pub use bind::{Binder, BoundParam, LargeObjectLayout, ParameterVector, Slot, SlotLayout};
pub use driver::{Cell, Driver, PgDriver, RowSink, SqliteDriver, connect};
pub use encoding::Encoding;
pub use error::{DbdError, DbdResult, EXIT_CALLER_ERROR, EXIT_FAILURE};
pub use format::{Formatter, OutputOptions};
pub use placeholder::{ParamType, Placeholder, PlaceholderStyle, scan, to_native};
pub use run::{Mode, Request, run};

//! Argument sources and their resolution into bytes.
//!
//! An [`ArgumentSource`] is what the caller supplied for one placeholder: a literal, a
//! file (or stdin), or NULL. The [`Resolver`] turns a source into a [`ResolvedArgument`].
//!
//! Literal sources resolve to the same bytes every time. File sources are read to
//! completion on first resolution; the underlying stream is then exhausted and any later
//! resolution of the same path yields an empty value flagged as `exhausted`. Streams are
//! opened lazily and shared per path through the [`HandleCache`] owned by the invocation.

use crate::error::{DbdError, DbdResult};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

/// Initial capacity of the read buffer for file-backed arguments.
const INITIAL_READ_BUFFER: usize = 1024;

/// Marker used on the command line for standard input.
pub const STDIN_MARKER: &str = "-";

/// Identifies a shared readable stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamKey {
    Stdin,
    Path(PathBuf),
}

impl StreamKey {
    /// Parse a command-line file argument; `-` is stdin.
    pub fn parse(arg: &str) -> Self {
        if arg == STDIN_MARKER {
            Self::Stdin
        } else {
            Self::Path(PathBuf::from(arg))
        }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdin => f.write_str("<stdin>"),
            Self::Path(p) => write!(f, "{}", p.display()),
        }
    }
}

/// Kind of an argument source, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Literal,
    File,
    Null,
}

/// One caller-supplied argument, in command-line order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentSource {
    Literal(String),
    File(StreamKey),
    Null,
}

impl ArgumentSource {
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    /// A file argument; `-` reads standard input.
    pub fn file(arg: &str) -> Self {
        Self::File(StreamKey::parse(arg))
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Literal(_) => SourceKind::Literal,
            Self::File(_) => SourceKind::File,
            Self::Null => SourceKind::Null,
        }
    }
}

/// Bytes produced by resolving an [`ArgumentSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArgument {
    /// `None` for NULL.
    pub bytes: Option<Vec<u8>>,
    /// The source was a stream already drained by an earlier resolution.
    pub exhausted: bool,
}

impl ResolvedArgument {
    fn value(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Some(bytes),
            exhausted: false,
        }
    }

    fn null() -> Self {
        Self {
            bytes: None,
            exhausted: false,
        }
    }

    fn end_of_data() -> Self {
        Self {
            bytes: Some(Vec::new()),
            exhausted: true,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_null(&self) -> bool {
        self.bytes.is_none()
    }
}

enum StreamState {
    Open(Box<dyn Read + Send>),
    Exhausted,
}

/// Path-to-stream map shared by every argument of one invocation.
///
/// Naming the same path twice reuses the same stream, so the second argument sees
/// whatever the first left unread (nothing, since resolution reads to the end).
#[derive(Default)]
pub struct HandleCache {
    streams: HashMap<StreamKey, StreamState>,
}

impl fmt::Debug for HandleCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self.streams.keys().map(|k| k.to_string()).collect();
        keys.sort();
        f.debug_struct("HandleCache").field("streams", &keys).finish()
    }
}

impl HandleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reader for a key ahead of time instead of opening it lazily.
    pub fn insert_reader(&mut self, key: StreamKey, reader: impl Read + Send + 'static) {
        self.streams.insert(key, StreamState::Open(Box::new(reader)));
    }

    /// Whether a stream has been opened (or registered) for this key.
    pub fn contains(&self, key: &StreamKey) -> bool {
        self.streams.contains_key(key)
    }

    pub fn is_exhausted(&self, key: &StreamKey) -> bool {
        matches!(self.streams.get(key), Some(StreamState::Exhausted))
    }

    fn state_mut(&mut self, key: &StreamKey) -> std::io::Result<&mut StreamState> {
        if !self.streams.contains_key(key) {
            let reader: Box<dyn Read + Send> = match key {
                StreamKey::Stdin => Box::new(std::io::stdin()),
                StreamKey::Path(p) => Box::new(File::open(p)?),
            };
            self.streams.insert(key.clone(), StreamState::Open(reader));
        }
        // Inserted above when missing.
        self.streams
            .get_mut(key)
            .ok_or_else(|| std::io::Error::other("stream vanished from handle cache"))
    }
}

/// Resolves argument sources against the invocation's [`HandleCache`].
#[derive(Debug)]
pub struct Resolver<'c> {
    handles: &'c mut HandleCache,
}

impl<'c> Resolver<'c> {
    pub fn new(handles: &'c mut HandleCache) -> Self {
        Self { handles }
    }

    /// Resolve one source. `query` is only used for error context.
    pub fn resolve(&mut self, source: &ArgumentSource, query: &str) -> DbdResult<ResolvedArgument> {
        let resolved = match source {
            ArgumentSource::Literal(v) => ResolvedArgument::value(v.as_bytes().to_vec()),
            ArgumentSource::Null => ResolvedArgument::null(),
            ArgumentSource::File(key) => {
                self.resolve_stream(key)
                    .map_err(|source| DbdError::ArgumentRead {
                        query: query.to_string(),
                        path: key.to_string(),
                        source,
                    })?
            }
        };

        tracing::trace!(
            target: "dbd.argument",
            kind = ?source.kind(),
            len = resolved.len(),
            null = resolved.is_null(),
            exhausted = resolved.exhausted,
            "resolved argument"
        );
        Ok(resolved)
    }

    fn resolve_stream(&mut self, key: &StreamKey) -> std::io::Result<ResolvedArgument> {
        let state = self.handles.state_mut(key)?;
        let bytes = match state {
            StreamState::Exhausted => return Ok(ResolvedArgument::end_of_data()),
            StreamState::Open(reader) => read_full(reader.as_mut())?,
        };
        *state = StreamState::Exhausted;
        Ok(ResolvedArgument::value(bytes))
    }
}

/// Read a stream to completion into a buffer that doubles as it fills.
fn read_full(reader: &mut dyn Read) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(INITIAL_READ_BUFFER);
    reader.read_to_end(&mut buf)?;
    Ok(buf)
}

//! Printf-style placeholder scanning.
//!
//! Queries are written with printf-style markers instead of native placeholders:
//!
//! ```ignore
//! select * from users where id = %d and name = %s and avatar = %pDb
//! ```
//!
//! [`scan`] turns a query into the ordered list of [`Placeholder`]s (one per logical
//! argument), and [`to_native`] rewrites the same token stream into a driver's own
//! placeholder syntax. Both are pure functions over the query text.
//!
//! Grammar after a `%`:
//! - `%%` is a literal percent and is not a placeholder.
//! - a specifier from [`SPECIFIERS`] (longest match wins) selects its type.
//! - any other letter is a text placeholder consuming that single letter.
//! - a `%` not followed by a letter is literal text.

use crate::bind::SlotLayout;
use std::fmt;
use std::ops::Range;


/// Semantic parameter type inferred from a specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    Tiny,
    UTiny,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    LongLong,
    ULongLong,
    Float,
    Double,
    /// Default for unrecognized letters (`%s`, `%x`, ...)
    String,
    Text,
    Time,
    Date,
    DateTime,
    Timestamp,
    ZTimestamp,
    Blob,
    Clob,
    Null,
}

impl ParamType {
    /// BLOB and CLOB are passed with the driver's large-object calling convention.
    pub fn is_large_object(self) -> bool {
        matches!(self, Self::Blob | Self::Clob)
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Tiny
                | Self::UTiny
                | Self::Short
                | Self::UShort
                | Self::Int
                | Self::UInt
                | Self::Long
                | Self::ULong
                | Self::LongLong
                | Self::ULongLong
        )
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            Self::UTiny | Self::UShort | Self::UInt | Self::ULong | Self::ULongLong
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tiny => "tiny",
            Self::UTiny => "unsigned tiny",
            Self::Short => "short",
            Self::UShort => "unsigned short",
            Self::Int => "int",
            Self::UInt => "unsigned int",
            Self::Long => "long",
            Self::ULong => "unsigned long",
            Self::LongLong => "long long",
            Self::ULongLong => "unsigned long long",
            Self::Float => "float",
            Self::Double => "double",
            Self::String => "string",
            Self::Text => "text",
            Self::Time => "time",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Timestamp => "timestamp",
            Self::ZTimestamp => "zoned timestamp",
            Self::Blob => "blob",
            Self::Clob => "clob",
            Self::Null => "null",
        };
        f.write_str(name)
    }
}

/// Recognized specifier suffixes (the text after `%`), longest first.
pub const SPECIFIERS: &[(&str, ParamType)] = &[
    ("hhd", ParamType::Tiny),
    ("hhu", ParamType::UTiny),
    ("lld", ParamType::LongLong),
    ("llu", ParamType::ULongLong),
    ("pDt", ParamType::Text),
    ("pDi", ParamType::Time),
    ("pDd", ParamType::Date),
    ("pDa", ParamType::DateTime),
    ("pDs", ParamType::Timestamp),
    ("pDz", ParamType::ZTimestamp),
    ("pDb", ParamType::Blob),
    ("pDc", ParamType::Clob),
    ("pDn", ParamType::Null),
    ("hd", ParamType::Short),
    ("hu", ParamType::UShort),
    ("ld", ParamType::Long),
    ("lu", ParamType::ULong),
    ("lf", ParamType::Double),
    ("d", ParamType::Int),
    ("u", ParamType::UInt),
    ("f", ParamType::Float),
];

/// One placeholder found in a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub param_type: ParamType,
    /// Byte range of the full marker (including the `%`) in the query text.
    pub span: Range<usize>,
}

/// A lexical piece of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'q> {
    /// Text passed through unchanged.
    Literal(&'q str),
    /// `%%`, rendered as a single `%`.
    Percent,
    Placeholder(Placeholder),
}

/// Iterator over the tokens of a query.
#[derive(Debug, Clone)]
pub struct Tokens<'q> {
    query: &'q str,
    pos: usize,
}

/// Tokenize a query.
pub fn tokens(query: &str) -> Tokens<'_> {
    Tokens { query, pos: 0 }
}

impl<'q> Iterator for Tokens<'q> {
    type Item = Token<'q>;

    fn next(&mut self) -> Option<Token<'q>> {
        let bytes = self.query.as_bytes();
        let start = self.pos;
        if start >= bytes.len() {
            return None;
        }

        if bytes[start] == b'%' {
            match bytes.get(start + 1) {
                Some(b'%') => {
                    self.pos = start + 2;
                    return Some(Token::Percent);
                }
                Some(c) if c.is_ascii_alphabetic() => {
                    let (param_type, len) = match_specifier(&self.query[start + 1..]);
                    self.pos = start + 1 + len;
                    return Some(Token::Placeholder(Placeholder {
                        param_type,
                        span: start..self.pos,
                    }));
                }
                // Lone percent: literal text.
                _ => {}
            }
        }

        // '%' is ASCII, so it never occurs inside a multi-byte sequence and the
        // split point is always a char boundary.
        let end = bytes[start + 1..]
            .iter()
            .position(|&b| b == b'%')
            .map_or(bytes.len(), |i| start + 1 + i);
        self.pos = end;
        Some(Token::Literal(&self.query[start..end]))
    }
}

/// Match a specifier at the start of `rest` (which begins with a letter).
///
/// Returns the type and the number of bytes consumed after the `%`.
fn match_specifier(rest: &str) -> (ParamType, usize) {
    SPECIFIERS
        .iter()
        .find(|(spec, _)| rest.starts_with(spec))
        .map(|&(spec, ty)| (ty, spec.len()))
        .unwrap_or((ParamType::String, 1))
}

/// Ordered placeholders of a query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceholderScan {
    pub placeholders: Vec<Placeholder>,
}

impl PlaceholderScan {
    /// Number of logical arguments the query expects.
    pub fn len(&self) -> usize {
        self.placeholders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placeholders.is_empty()
    }

    pub fn types(&self) -> impl Iterator<Item = ParamType> + '_ {
        self.placeholders.iter().map(|p| p.param_type)
    }

    /// Total number of value slots the placeholders occupy under `layout`.
    pub fn slot_count(&self, layout: &dyn SlotLayout) -> usize {
        self.types().map(|t| layout.slot_count(t)).sum()
    }
}

/// Scan a query for placeholders, left to right.
pub fn scan(query: &str) -> PlaceholderScan {
    let placeholders = tokens(query)
        .filter_map(|t| match t {
            Token::Placeholder(p) => Some(p),
            _ => None,
        })
        .collect();
    PlaceholderScan { placeholders }
}

/// Native placeholder syntax of a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `$1, $2, ...` (PostgreSQL)
    Dollar,
    /// `?1, ?2, ...` (SQLite)
    Question,
}

/// Rewrite a printf-style query into the driver's native placeholder syntax.
///
/// A marker directly followed by a digit gets a space, so `%d0` becomes `?1 0`
/// rather than `?10`.
pub fn to_native(query: &str, style: PlaceholderStyle) -> String {
    let mut out = String::with_capacity(query.len() + 8);
    let mut n = 0usize;
    let mut after_marker = false;
    for token in tokens(query) {
        match token {
            Token::Literal(s) => {
                if after_marker && s.starts_with(|c: char| c.is_ascii_digit()) {
                    out.push(' ');
                }
                out.push_str(s);
                after_marker = false;
            }
            Token::Percent => {
                out.push('%');
                after_marker = false;
            }
            Token::Placeholder(_) => {
                after_marker = true;
                n += 1;
                match style {
                    PlaceholderStyle::Dollar => out.push('$'),
                    PlaceholderStyle::Question => out.push('?'),
                }
                out.push_str(&n.to_string());
            }
        }
    }
    out
}

//! Per-cell output encodings.

use crate::error::DbdError;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Encoding applied to every header name and cell value before it is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Pass bytes through unchanged.
    None,
    /// Backslash-escape anything that is not printable ASCII, plus `\` and `"`.
    #[default]
    Echo,
    /// RFC 4648 base64 with padding.
    Base64,
    /// RFC 4648 URL-safe base64 without padding.
    Base64Url,
}

impl Encoding {
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Echo => "echo",
            Self::Base64 => "base64",
            Self::Base64Url => "base64url",
        }
    }

    pub fn encode<'a>(self, raw: &'a [u8]) -> Cow<'a, [u8]> {
        match self {
            Self::None => Cow::Borrowed(raw),
            Self::Echo => escape_echo(raw),
            Self::Base64 => Cow::Owned(STANDARD.encode(raw).into_bytes()),
            Self::Base64Url => Cow::Owned(URL_SAFE_NO_PAD.encode(raw).into_bytes()),
        }
    }
}

impl FromStr for Encoding {
    type Err = DbdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "echo" => Ok(Self::Echo),
            "base64" => Ok(Self::Base64),
            "base64url" => Ok(Self::Base64Url),
            other => Err(DbdError::UnsupportedEncoding(other.to_string())),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn needs_echo_escape(b: u8) -> bool {
    !(0x20..0x7f).contains(&b) || b == b'\\' || b == b'"'
}

fn escape_echo(raw: &[u8]) -> Cow<'_, [u8]> {
    if !raw.iter().copied().any(needs_echo_escape) {
        return Cow::Borrowed(raw);
    }

    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = Vec::with_capacity(raw.len() + 8);
    for &b in raw {
        if !needs_echo_escape(b) {
            out.push(b);
            continue;
        }
        out.push(b'\\');
        match b {
            0x07 => out.push(b'a'),
            0x08 => out.push(b'b'),
            0x0c => out.push(b'f'),
            b'\n' => out.push(b'n'),
            b'\r' => out.push(b'r'),
            b'\t' => out.push(b't'),
            0x0b => out.push(b'v'),
            b'\\' => out.push(b'\\'),
            b'"' => out.push(b'"'),
            _ => {
                out.push(b'x');
                out.push(HEX[usize::from(b >> 4)]);
                out.push(HEX[usize::from(b & 0x0f)]);
            }
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enc(e: Encoding, raw: &[u8]) -> String {
        String::from_utf8(e.encode(raw).into_owned()).unwrap()
    }

    #[test]
    fn parses_known_names_only() {
        assert_eq!("none".parse::<Encoding>().unwrap(), Encoding::None);
        assert_eq!("echo".parse::<Encoding>().unwrap(), Encoding::Echo);
        assert_eq!("base64".parse::<Encoding>().unwrap(), Encoding::Base64);
        assert_eq!("base64url".parse::<Encoding>().unwrap(), Encoding::Base64Url);

        let err = "hex".parse::<Encoding>().unwrap_err();
        assert!(matches!(err, DbdError::UnsupportedEncoding(ref n) if n == "hex"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn default_is_echo() {
        assert_eq!(Encoding::default(), Encoding::Echo);
    }

    #[test]
    fn echo_leaves_plain_text_borrowed() {
        assert!(matches!(Encoding::Echo.encode(b"hello world"), Cow::Borrowed(_)));
    }

    #[test]
    fn echo_escapes_controls_quotes_and_backslashes() {
        assert_eq!(enc(Encoding::Echo, b"a\tb\nc"), "a\\tb\\nc");
        assert_eq!(enc(Encoding::Echo, b"say \"hi\""), "say \\\"hi\\\"");
        assert_eq!(enc(Encoding::Echo, b"C:\\dir"), "C:\\\\dir");
        assert_eq!(enc(Encoding::Echo, b"\x07\x08\x0c\r\x0b"), "\\a\\b\\f\\r\\v");
        assert_eq!(enc(Encoding::Echo, b"\x00\x1b\xff"), "\\x00\\x1b\\xff");
        assert_eq!(enc(Encoding::Echo, b"it's"), "it's");
    }

    #[test]
    fn base64_variants() {
        assert_eq!(enc(Encoding::Base64, b"\xfb\xff?"), "+/8/");
        assert_eq!(enc(Encoding::Base64Url, b"\xfb\xff?"), "-_8_");
        assert_eq!(enc(Encoding::Base64, b"ab"), "YWI=");
        assert_eq!(enc(Encoding::Base64Url, b"ab"), "YWI");
    }

    #[test]
    fn none_is_passthrough() {
        assert_eq!(Encoding::None.encode(b"\x00\n"), Cow::Borrowed(&b"\x00\n"[..]));
    }
}

//! Text-to-binary conversion for parameters and binary-to-text for result cells.

use crate::bind::BoundParam;
use crate::placeholder::ParamType;
use bytes::BytesMut;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use std::error::Error;
use std::fmt::Write as _;
use std::net::IpAddr;
use std::str::FromStr;
use tokio_postgres::types::{Format, FromSql, IsNull, Kind, ToSql, Type};
use uuid::Uuid;

type BoxError = Box<dyn Error + Sync + Send>;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A bound parameter sent in the binary format of whatever type the server expects.
///
/// Types without a binary conversion here are sent in text format and parsed by the
/// server.
#[derive(Debug, Clone, Copy)]
pub struct PgParam<'a> {
    pub param_type: ParamType,
    pub value: Option<&'a [u8]>,
}

impl<'a> From<BoundParam<'a>> for PgParam<'a> {
    fn from(p: BoundParam<'a>) -> Self {
        Self {
            param_type: p.param_type,
            value: p.value,
        }
    }
}

fn utf8<'r>(raw: &'r [u8], ty: &Type) -> Result<&'r str, BoxError> {
    std::str::from_utf8(raw).map_err(|_| format!("value for {ty} is not valid UTF-8").into())
}

fn parse<T>(text: &str, ty: &Type) -> Result<T, BoxError>
where
    T: FromStr,
{
    text.trim()
        .parse::<T>()
        .map_err(|_| format!("invalid {ty} value '{text}'").into())
}

fn parse_bool(text: &str) -> Result<bool, BoxError> {
    match text.trim().to_ascii_lowercase().as_str() {
        "t" | "true" | "y" | "yes" | "on" | "1" => Ok(true),
        "f" | "false" | "n" | "no" | "off" | "0" => Ok(false),
        other => Err(format!("invalid boolean value '{other}'").into()),
    }
}

fn parse_timestamp(text: &str) -> Result<NaiveDateTime, BoxError> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::from_str(text))
        .or_else(|_| NaiveDate::parse_from_str(text, "%Y-%m-%d").map(|d| d.and_time(NaiveTime::MIN)))
        .map_err(|_| format!("invalid timestamp value '{text}'").into())
}

fn parse_timestamptz(text: &str) -> Result<DateTime<FixedOffset>, BoxError> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .or_else(|_| DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z"))
        .map_err(|_| format!("invalid timestamptz value '{text}'").into())
}

fn is_textual(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN | Type::XML
    ) || matches!(ty.kind(), Kind::Enum(_))
        || matches!(ty.name(), "citext" | "ltree" | "lquery" | "ltxtquery")
}

/// Parameter types converted client-side into their binary form.
fn has_binary_param(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::BYTEA
            | Type::BOOL
            | Type::CHAR
            | Type::INT2
            | Type::INT4
            | Type::INT8
            | Type::OID
            | Type::FLOAT4
            | Type::FLOAT8
            | Type::NUMERIC
            | Type::DATE
            | Type::TIME
            | Type::TIMESTAMP
            | Type::TIMESTAMPTZ
            | Type::JSON
            | Type::JSONB
            | Type::UUID
    )
}

fn encode_binary(text: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::BOOL => parse_bool(text)?.to_sql(ty, out),
        Type::CHAR => parse::<i8>(text, ty)?.to_sql(ty, out),
        Type::INT2 => parse::<i16>(text, ty)?.to_sql(ty, out),
        Type::INT4 => parse::<i32>(text, ty)?.to_sql(ty, out),
        Type::INT8 => parse::<i64>(text, ty)?.to_sql(ty, out),
        Type::OID => parse::<u32>(text, ty)?.to_sql(ty, out),
        Type::FLOAT4 => parse::<f32>(text, ty)?.to_sql(ty, out),
        Type::FLOAT8 => parse::<f64>(text, ty)?.to_sql(ty, out),
        Type::NUMERIC => parse::<Decimal>(text, ty)?.to_sql(ty, out),
        Type::DATE => NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
            .map_err(|_| format!("invalid date value '{text}'"))?
            .to_sql(ty, out),
        Type::TIME => parse::<NaiveTime>(text, ty)?.to_sql(ty, out),
        Type::TIMESTAMP => parse_timestamp(text)?.to_sql(ty, out),
        Type::TIMESTAMPTZ => parse_timestamptz(text)?.to_sql(ty, out),
        Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(text)
            .map_err(|e| format!("invalid json value: {e}"))?
            .to_sql(ty, out),
        Type::UUID => parse::<Uuid>(text, ty)?.to_sql(ty, out),
        _ => Err(format!("no binary conversion for {ty}").into()),
    }
}

impl ToSql for PgParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        let Some(raw) = self.value else {
            return Ok(IsNull::Yes);
        };

        if *ty == Type::BYTEA || !has_binary_param(ty) {
            out.extend_from_slice(raw);
            return Ok(IsNull::No);
        }

        let text = utf8(raw, ty)?;
        encode_binary(text, ty, out).map_err(|e| {
            format!("{e} ({} placeholder)", self.param_type).into()
        })
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, ty: &Type) -> Format {
        if has_binary_param(ty) {
            Format::Binary
        } else {
            Format::Text
        }
    }

    tokio_postgres::types::to_sql_checked!();
}

/// A result cell rendered as text (or raw bytes for `bytea`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgCell(Vec<u8>);

impl PgCell {
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl<'a> FromSql<'a> for PgCell {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        if *ty == Type::BYTEA || is_textual(ty) {
            return Ok(Self(raw.to_vec()));
        }
        Ok(Self(cell_text(ty, raw)?.into_bytes()))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

/// Render one non-null binary value the way the server prints it.
fn cell_text(ty: &Type, raw: &[u8]) -> Result<String, BoxError> {
    match ty.kind() {
        Kind::Array(member) => return array_text(member, raw),
        Kind::Range(member) => return range_text(member, raw),
        Kind::Domain(base) => return cell_text(base, raw),
        _ => {}
    }
    if is_textual(ty) {
        return Ok(utf8(raw, ty)?.to_string());
    }

    let text = match *ty {
        Type::BYTEA => {
            let mut hex = String::from("\\x");
            for b in raw {
                let _ = write!(hex, "{b:02x}");
            }
            hex
        }
        Type::BOOL => String::from(if bool::from_sql(ty, raw)? { "t" } else { "f" }),
        Type::CHAR => i8::from_sql(ty, raw)?.to_string(),
        Type::INT2 => i16::from_sql(ty, raw)?.to_string(),
        Type::INT4 => i32::from_sql(ty, raw)?.to_string(),
        Type::INT8 => i64::from_sql(ty, raw)?.to_string(),
        Type::OID | Type::XID | Type::CID => u32::from_sql(&Type::OID, raw)?.to_string(),
        Type::FLOAT4 => f32::from_sql(ty, raw)?.to_string(),
        Type::FLOAT8 => f64::from_sql(ty, raw)?.to_string(),
        Type::NUMERIC => Decimal::from_sql(ty, raw)?.to_string(),
        Type::MONEY => money_text(i64::from_sql(&Type::INT8, raw)?),
        Type::DATE => NaiveDate::from_sql(ty, raw)?.to_string(),
        Type::TIME => NaiveTime::from_sql(ty, raw)?.to_string(),
        Type::TIMETZ => timetz_text(raw)?,
        Type::TIMESTAMP => NaiveDateTime::from_sql(ty, raw)?
            .format(TIMESTAMP_FORMAT)
            .to_string(),
        Type::TIMESTAMPTZ => DateTime::<Utc>::from_sql(ty, raw)?
            .format("%Y-%m-%d %H:%M:%S%.f%:z")
            .to_string(),
        Type::INTERVAL => interval_text(raw)?,
        Type::INET | Type::CIDR => inet_text(raw)?,
        Type::MACADDR | Type::MACADDR8 => raw
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(":"),
        Type::BIT | Type::VARBIT => bit_text(raw)?,
        Type::POINT => {
            let mut buf = raw;
            let x = f64::from_be_bytes(take(&mut buf)?);
            let y = f64::from_be_bytes(take(&mut buf)?);
            format!("({x},{y})")
        }
        Type::JSON | Type::JSONB => serde_json::Value::from_sql(ty, raw)?.to_string(),
        Type::UUID => Uuid::from_sql(ty, raw)?.to_string(),
        _ => return Err(format!("unsupported column type {ty}").into()),
    };
    Ok(text)
}

fn take<'r, const N: usize>(buf: &mut &'r [u8]) -> Result<[u8; N], BoxError> {
    let slice: &'r [u8] = buf;
    let (head, rest) = slice.split_first_chunk::<N>().ok_or("truncated value")?;
    *buf = rest;
    Ok(*head)
}

fn take_i32(buf: &mut &[u8]) -> Result<i32, BoxError> {
    Ok(i32::from_be_bytes(take(buf)?))
}

fn take_i64(buf: &mut &[u8]) -> Result<i64, BoxError> {
    Ok(i64::from_be_bytes(take(buf)?))
}

/// A length-prefixed element; a negative length is NULL.
fn take_element<'r>(buf: &mut &'r [u8]) -> Result<Option<&'r [u8]>, BoxError> {
    let Ok(len) = usize::try_from(take_i32(buf)?) else {
        return Ok(None);
    };
    let slice: &'r [u8] = buf;
    let (element, rest) = slice.split_at_checked(len).ok_or("truncated element")?;
    *buf = rest;
    Ok(Some(element))
}

/// Quote `value` if the server would: empty, `NULL`, whitespace or any of `specials`.
fn push_quoted(out: &mut String, value: &str, specials: &[char], escape_null: bool) {
    let needs_quotes = value.is_empty()
        || (escape_null && value.eq_ignore_ascii_case("NULL"))
        || value
            .chars()
            .any(|c| c == '"' || c == '\\' || c.is_ascii_whitespace() || specials.contains(&c));
    if !needs_quotes {
        out.push_str(value);
        return;
    }
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

fn array_text(member: &Type, raw: &[u8]) -> Result<String, BoxError> {
    let mut buf = raw;
    let ndim = usize::try_from(take_i32(&mut buf)?).map_err(|_| "invalid array dimensions")?;
    let _has_nulls = take_i32(&mut buf)?;
    let _element_oid = take_i32(&mut buf)?;

    let mut dims = Vec::with_capacity(ndim);
    for _ in 0..ndim {
        let len = take_i32(&mut buf)?;
        let lower = take_i32(&mut buf)?;
        dims.push((len, lower));
    }

    let mut out = String::new();
    if dims.is_empty() {
        out.push_str("{}");
        return Ok(out);
    }
    if dims.iter().any(|&(_, lower)| lower != 1) {
        for &(len, lower) in &dims {
            let _ = write!(out, "[{}:{}]", lower, lower + len - 1);
        }
        out.push('=');
    }
    write_array_level(member, &dims, &mut buf, &mut out)?;
    Ok(out)
}

fn write_array_level(
    member: &Type,
    dims: &[(i32, i32)],
    buf: &mut &[u8],
    out: &mut String,
) -> Result<(), BoxError> {
    let Some((&(len, _), inner)) = dims.split_first() else {
        return Ok(());
    };
    out.push('{');
    for i in 0..len {
        if i > 0 {
            out.push(',');
        }
        if !inner.is_empty() {
            write_array_level(member, inner, buf, out)?;
            continue;
        }
        match take_element(buf)? {
            None => out.push_str("NULL"),
            Some(element) => push_quoted(out, &cell_text(member, element)?, &['{', '}', ','], true),
        }
    }
    out.push('}');
    Ok(())
}

const RANGE_EMPTY: u8 = 0x01;
const RANGE_LB_INC: u8 = 0x02;
const RANGE_UB_INC: u8 = 0x04;
const RANGE_LB_INF: u8 = 0x08;
const RANGE_UB_INF: u8 = 0x10;

fn range_text(member: &Type, raw: &[u8]) -> Result<String, BoxError> {
    let mut buf = raw;
    let [flags] = take::<1>(&mut buf)?;
    if flags & RANGE_EMPTY != 0 {
        return Ok("empty".to_string());
    }

    let specials = ['(', ')', '[', ']', ','];
    let mut out = String::from(if flags & RANGE_LB_INC != 0 { "[" } else { "(" });
    if flags & RANGE_LB_INF == 0 {
        let bound = take_element(&mut buf)?.ok_or("null range bound")?;
        push_quoted(&mut out, &cell_text(member, bound)?, &specials, false);
    }
    out.push(',');
    if flags & RANGE_UB_INF == 0 {
        let bound = take_element(&mut buf)?.ok_or("null range bound")?;
        push_quoted(&mut out, &cell_text(member, bound)?, &specials, false);
    }
    out.push(if flags & RANGE_UB_INC != 0 { ']' } else { ')' });
    Ok(out)
}

/// `HH:MM:SS` with trailing fractional digits trimmed.
fn clock_text(micros: u64) -> String {
    let secs = micros / 1_000_000;
    let frac = micros % 1_000_000;
    let mut out = format!("{:02}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60);
    if frac != 0 {
        let digits = format!("{frac:06}");
        out.push('.');
        out.push_str(digits.trim_end_matches('0'));
    }
    out
}

/// Postgres-style interval output, such as `1 year 2 mons -3 days 04:05:06`.
fn interval_text(raw: &[u8]) -> Result<String, BoxError> {
    let mut buf = raw;
    let micros = take_i64(&mut buf)?;
    let days = take_i32(&mut buf)?;
    let months = take_i32(&mut buf)?;

    let mut parts: Vec<String> = Vec::new();
    let mut after_negative = false;
    for (value, unit) in [
        (months / 12, "year"),
        (months % 12, "mon"),
        (days, "day"),
    ] {
        if value == 0 {
            continue;
        }
        let sign = if after_negative && value > 0 { "+" } else { "" };
        let plural = if value == 1 { "" } else { "s" };
        parts.push(format!("{sign}{value} {unit}{plural}"));
        after_negative = value < 0;
    }

    if micros != 0 || parts.is_empty() {
        let sign = if micros < 0 {
            "-"
        } else if after_negative {
            "+"
        } else {
            ""
        };
        parts.push(format!("{sign}{}", clock_text(micros.unsigned_abs())));
    }
    Ok(parts.join(" "))
}

fn timetz_text(raw: &[u8]) -> Result<String, BoxError> {
    let mut buf = raw;
    let micros = u64::try_from(take_i64(&mut buf)?).map_err(|_| "invalid timetz value")?;
    // Stored as seconds west of UTC.
    let east = -take_i32(&mut buf)?;

    let mut out = clock_text(micros);
    let abs = east.unsigned_abs();
    let _ = write!(out, "{}{:02}", if east < 0 { '-' } else { '+' }, abs / 3600);
    if abs % 3600 != 0 {
        let _ = write!(out, ":{:02}", abs / 60 % 60);
    }
    if abs % 60 != 0 {
        let _ = write!(out, ":{:02}", abs % 60);
    }
    Ok(out)
}

const PGSQL_AF_INET: u8 = 2;
const PGSQL_AF_INET6: u8 = 3;

fn inet_text(raw: &[u8]) -> Result<String, BoxError> {
    let mut buf = raw;
    let [family, bits, is_cidr, _len] = take::<4>(&mut buf)?;
    let (addr, max_bits) = match family {
        PGSQL_AF_INET => (IpAddr::from(<[u8; 4]>::try_from(buf)?), 32),
        PGSQL_AF_INET6 => (IpAddr::from(<[u8; 16]>::try_from(buf)?), 128),
        other => return Err(format!("invalid inet family {other}").into()),
    };
    if is_cidr != 0 || bits != max_bits {
        Ok(format!("{addr}/{bits}"))
    } else {
        Ok(addr.to_string())
    }
}

fn bit_text(raw: &[u8]) -> Result<String, BoxError> {
    let mut buf = raw;
    let len = usize::try_from(take_i32(&mut buf)?).map_err(|_| "invalid bit length")?;
    if buf.len() * 8 < len {
        return Err("truncated bit string".into());
    }
    Ok((0..len)
        .map(|i| if buf[i / 8] & (0x80 >> (i % 8)) != 0 { '1' } else { '0' })
        .collect())
}

/// Money in the server's default `C` monetary locale: `-$1,234.56`.
fn money_text(cents: i64) -> String {
    let abs = cents.unsigned_abs();
    let whole = (abs / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if cents < 0 { "-" } else { "" };
    format!("{sign}${grouped}.{:02}", abs % 100)
}

//! Named query parameters (`:name`) and their binding to PostgreSQL's
//! positional placeholders (`$1`, `$2`, ...).

use bytes::BytesMut;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use keiba_error::{ErrorCode, ErrorContext, KeibaError, Result};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use tokio_postgres::types::{IsNull, ToSql, Type};

use super::numeric;

type BoxError = Box<dyn Error + Sync + Send>;

/// A single bound value.
///
/// Values adapt to the type the server infers for their placeholder, so a
/// `Text("2020")` can be compared against an `int4` column and an `Int(5)`
/// against a `varchar` code column.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl ParamValue {
    fn kind(&self) -> &'static str {
        match self {
            ParamValue::Null => "null",
            ParamValue::Bool(_) => "bool",
            ParamValue::Int(_) => "integer",
            ParamValue::Float(_) => "float",
            ParamValue::Text(_) => "text",
            ParamValue::Date(_) => "date",
            ParamValue::Timestamp(_) => "timestamp",
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for ParamValue {
                fn from(v: $ty) -> Self {
                    ParamValue::$variant(v.into())
                }
            }
        )*
    };
}

impl_from!(
    bool => Bool,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    f32 => Float,
    f64 => Float,
    String => Text,
    &str => Text,
    NaiveDate => Date,
    NaiveDateTime => Timestamp,
);

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(ParamValue::Null, Into::into)
    }
}

/// Named parameters for a query. An empty set means "no parameters".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    values: BTreeMap<String, ParamValue>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = QueryParams::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// SQL rewritten to positional placeholders, with values in `$n` order.
#[derive(Debug)]
pub struct BoundQuery<'p> {
    sql: String,
    names: Vec<String>,
    values: Vec<&'p ParamValue>,
}

impl<'p> BoundQuery<'p> {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Placeholder names in `$n` order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn sql_params(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.values
            .iter()
            .map(|v| *v as &(dyn ToSql + Sync))
            .collect()
    }
}

/// Rewrite `:name` placeholders to `$n`.
///
/// String literals, quoted identifiers, dollar-quoted bodies, comments and
/// `::` casts are copied through untouched. A name used twice maps to the
/// same `$n`. Parameters that the query never mentions are ignored.
pub fn bind_named<'p>(sql: &str, params: &'p QueryParams) -> Result<BoundQuery<'p>> {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut names: Vec<String> = Vec::new();
    let mut values: Vec<&'p ParamValue> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        let prev = i.checked_sub(1).map(|p| chars[p]);

        match c {
            '\'' | '"' => {
                let end = quoted_end(&chars, i, c);
                out.extend(&chars[i..end]);
                i = end;
            }
            '-' if next == Some('-') => {
                let end = chars[i..]
                    .iter()
                    .position(|&ch| ch == '\n')
                    .map_or(chars.len(), |p| i + p);
                out.extend(&chars[i..end]);
                i = end;
            }
            '/' if next == Some('*') => {
                let end = find_seq(&chars, i + 2, &['*', '/']).map_or(chars.len(), |p| p + 2);
                out.extend(&chars[i..end]);
                i = end;
            }
            '$' => match dollar_tag(&chars, i) {
                Some(tag_len) => {
                    let tag = &chars[i..i + tag_len];
                    let end = find_seq(&chars, i + tag_len, tag)
                        .map_or(chars.len(), |p| p + tag_len);
                    out.extend(&chars[i..end]);
                    i = end;
                }
                None => {
                    out.push(c);
                    i += 1;
                }
            },
            ':' if next == Some(':') => {
                out.push_str("::");
                i += 2;
            }
            // `arr[lo:hi]` is a slice, not a placeholder
            ':' if next.is_some_and(is_ident_start)
                && !prev.is_some_and(|p| is_ident_char(p) || p == ':') =>
            {
                let start = i + 1;
                let end = start
                    + chars[start..]
                        .iter()
                        .take_while(|&&ch| is_ident_char(ch))
                        .count();
                let name: String = chars[start..end].iter().collect();

                let position = match names.iter().position(|n| *n == name) {
                    Some(p) => p,
                    None => {
                        let value = params.get(&name).ok_or_else(|| missing_parameter(&name))?;
                        names.push(name);
                        values.push(value);
                        names.len() - 1
                    }
                };
                out.push('$');
                out.push_str(&(position + 1).to_string());
                i = end;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    Ok(BoundQuery {
        sql: out,
        names,
        values,
    })
}

fn missing_parameter(name: &str) -> KeibaError {
    KeibaError::new(
        ErrorCode::MissingParameter,
        format!("No value supplied for placeholder ':{}'", name),
    )
    .with_context(ErrorContext::Parameter {
        name: name.to_string(),
    })
    .with_hint(format!("Add '{}' to the query parameters", name))
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Index one past the closing quote; a doubled quote is an escape.
fn quoted_end(chars: &[char], start: usize, quote: char) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

/// Length of a `$tag$` opener at `start`, if there is one. `$1` is not a tag.
fn dollar_tag(chars: &[char], start: usize) -> Option<usize> {
    if start > 0 && is_ident_char(chars[start - 1]) {
        return None;
    }
    let mut i = start + 1;
    if chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
        return None;
    }
    while i < chars.len() && is_ident_char(chars[i]) {
        i += 1;
    }
    (chars.get(i) == Some(&'$')).then_some(i - start + 1)
}

fn find_seq(chars: &[char], from: usize, seq: &[char]) -> Option<usize> {
    if from > chars.len() || seq.is_empty() {
        return None;
    }
    chars[from..]
        .windows(seq.len())
        .position(|w| w == seq)
        .map(|p| from + p)
}

/// A value that cannot be sent as the server-side parameter type.
#[derive(Debug)]
pub struct ParamTypeError {
    kind: &'static str,
    pg_type: String,
}

impl fmt::Display for ParamTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot send a {} value as {}", self.kind, self.pg_type)
    }
}

impl Error for ParamTypeError {}

fn mismatch(value: &ParamValue, ty: &Type) -> std::result::Result<IsNull, BoxError> {
    Err(Box::new(ParamTypeError {
        kind: value.kind(),
        pg_type: ty.name().to_string(),
    }))
}

fn is_text(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN
    )
}

fn parse_bool(s: &str) -> std::result::Result<bool, BoxError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "on" | "1" => Ok(true),
        "false" | "f" | "no" | "n" | "off" | "0" => Ok(false),
        other => Err(format!("invalid boolean literal '{}'", other).into()),
    }
}

fn parse_timestamp(s: &str) -> std::result::Result<NaiveDateTime, BoxError> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d").map(|d| d.and_time(NaiveTime::MIN)))
        .map_err(Into::into)
}

impl ToSql for ParamValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
        match self {
            ParamValue::Null => Ok(IsNull::Yes),
            ParamValue::Bool(v) => match *ty {
                Type::BOOL => v.to_sql(ty, out),
                _ if is_text(ty) => v.to_string().to_sql(ty, out),
                _ => mismatch(self, ty),
            },
            ParamValue::Int(v) => match *ty {
                Type::INT2 => i16::try_from(*v)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*v)?.to_sql(ty, out),
                Type::INT8 => v.to_sql(ty, out),
                Type::FLOAT4 => (*v as f32).to_sql(ty, out),
                Type::FLOAT8 => (*v as f64).to_sql(ty, out),
                Type::NUMERIC => numeric::encode(&v.to_string(), out),
                _ if is_text(ty) => v.to_string().to_sql(ty, out),
                _ => mismatch(self, ty),
            },
            ParamValue::Float(v) => match *ty {
                Type::FLOAT4 => (*v as f32).to_sql(ty, out),
                Type::FLOAT8 => v.to_sql(ty, out),
                Type::NUMERIC => numeric::encode_f64(*v, out),
                _ if is_text(ty) => v.to_string().to_sql(ty, out),
                _ => mismatch(self, ty),
            },
            ParamValue::Text(s) => match *ty {
                _ if is_text(ty) => s.to_sql(ty, out),
                Type::BOOL => parse_bool(s)?.to_sql(ty, out),
                Type::INT2 => s.trim().parse::<i16>()?.to_sql(ty, out),
                Type::INT4 => s.trim().parse::<i32>()?.to_sql(ty, out),
                Type::INT8 => s.trim().parse::<i64>()?.to_sql(ty, out),
                Type::FLOAT4 => s.trim().parse::<f32>()?.to_sql(ty, out),
                Type::FLOAT8 => s.trim().parse::<f64>()?.to_sql(ty, out),
                Type::NUMERIC => numeric::encode(s, out),
                Type::DATE => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")?.to_sql(ty, out),
                Type::TIMESTAMP => parse_timestamp(s)?.to_sql(ty, out),
                Type::TIMESTAMPTZ => parse_timestamp(s)?.and_utc().to_sql(ty, out),
                _ => mismatch(self, ty),
            },
            ParamValue::Date(d) => match *ty {
                Type::DATE => d.to_sql(ty, out),
                Type::TIMESTAMP => d.and_time(NaiveTime::MIN).to_sql(ty, out),
                Type::TIMESTAMPTZ => d.and_time(NaiveTime::MIN).and_utc().to_sql(ty, out),
                _ if is_text(ty) => d.to_string().to_sql(ty, out),
                _ => mismatch(self, ty),
            },
            ParamValue::Timestamp(ts) => match *ty {
                Type::TIMESTAMP => ts.to_sql(ty, out),
                Type::TIMESTAMPTZ => ts.and_utc().to_sql(ty, out),
                Type::DATE => ts.date().to_sql(ty, out),
                _ if is_text(ty) => ts.to_string().to_sql(ty, out),
                _ => mismatch(self, ty),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        // Checked per value in to_sql
        true
    }

    fn to_sql_checked(&self, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
        self.to_sql(ty, out)
    }
}

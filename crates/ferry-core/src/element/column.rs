//! Typed column values and their conversions.

use std::fmt;
use std::mem::size_of;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use num_bigint::{BigInt, Sign};
use rust_decimal::Decimal;

use super::ElementError;

/// Layout used when a time is rendered as (or parsed from) text.
pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%:z";

const NAIVE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Unknown,
    Bool,
    BigInt,
    Decimal,
    String,
    Bytes,
    Time,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Unknown => "unknown",
            ColumnType::Bool => "bool",
            ColumnType::BigInt => "bigInt",
            ColumnType::Decimal => "decimal",
            ColumnType::String => "string",
            ColumnType::Bytes => "bytes",
            ColumnType::Time => "time",
        };
        f.write_str(name)
    }
}

/// A tagged column value.
///
/// `Null` keeps the declared type so a nil bigint and a nil string stay
/// distinguishable; every conversion of a `Null` fails with `NilValue`.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null(ColumnType),
    Bool(bool),
    BigInt(BigInt),
    Decimal(Decimal),
    String(String),
    Bytes(Vec<u8>),
    Time(DateTime<Utc>),
}

impl ColumnValue {
    pub fn kind(&self) -> ColumnType {
        match self {
            ColumnValue::Null(kind) => *kind,
            ColumnValue::Bool(_) => ColumnType::Bool,
            ColumnValue::BigInt(_) => ColumnType::BigInt,
            ColumnValue::Decimal(_) => ColumnType::Decimal,
            ColumnValue::String(_) => ColumnType::String,
            ColumnValue::Bytes(_) => ColumnType::Bytes,
            ColumnValue::Time(_) => ColumnType::Time,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, ColumnValue::Null(_))
    }

    fn transform_error(&self, to: ColumnType, reason: impl Into<String>) -> ElementError {
        ElementError::Transform {
            from: self.kind(),
            to,
            reason: reason.into(),
        }
    }

    fn unsupported(&self, to: ColumnType) -> ElementError {
        self.transform_error(to, "conversion is not defined")
    }

    /// Text view of `String` / `Bytes` values, used by the parsing conversions.
    fn text(&self, to: ColumnType) -> Result<&str, ElementError> {
        match self {
            ColumnValue::String(s) => Ok(s.as_str()),
            ColumnValue::Bytes(b) => std::str::from_utf8(b)
                .map_err(|e| self.transform_error(to, format!("invalid utf-8: {e}"))),
            _ => Err(self.unsupported(to)),
        }
    }

    pub fn as_bool(&self) -> Result<bool, ElementError> {
        match self {
            ColumnValue::Null(kind) => Err(ElementError::NilValue(*kind)),
            ColumnValue::Bool(b) => Ok(*b),
            ColumnValue::BigInt(b) => Ok(b.sign() != Sign::NoSign),
            ColumnValue::Decimal(d) => Ok(!d.is_zero()),
            ColumnValue::String(_) | ColumnValue::Bytes(_) => {
                let text = self.text(ColumnType::Bool)?;
                parse_bool(text)
                    .ok_or_else(|| self.transform_error(ColumnType::Bool, format!("invalid bool {text:?}")))
            }
            ColumnValue::Time(_) => Err(self.unsupported(ColumnType::Bool)),
        }
    }

    pub fn as_bigint(&self) -> Result<BigInt, ElementError> {
        match self {
            ColumnValue::Null(kind) => Err(ElementError::NilValue(*kind)),
            ColumnValue::Bool(b) => Ok(BigInt::from(u8::from(*b))),
            ColumnValue::BigInt(b) => Ok(b.clone()),
            ColumnValue::Decimal(d) => decimal_to_bigint(d)
                .ok_or_else(|| self.transform_error(ColumnType::BigInt, format!("invalid bigInt {d}"))),
            ColumnValue::String(_) | ColumnValue::Bytes(_) => {
                let text = self.text(ColumnType::BigInt)?.trim();
                BigInt::from_str(text)
                    .ok()
                    .or_else(|| Decimal::from_str(text).ok().and_then(|d| decimal_to_bigint(&d)))
                    .ok_or_else(|| {
                        self.transform_error(ColumnType::BigInt, format!("invalid bigInt {text:?}"))
                    })
            }
            ColumnValue::Time(_) => Err(self.unsupported(ColumnType::BigInt)),
        }
    }

    pub fn as_decimal(&self) -> Result<Decimal, ElementError> {
        match self {
            ColumnValue::Null(kind) => Err(ElementError::NilValue(*kind)),
            ColumnValue::Bool(b) => Ok(if *b { Decimal::ONE } else { Decimal::ZERO }),
            ColumnValue::BigInt(b) => Decimal::from_str(&b.to_string())
                .map_err(|e| self.transform_error(ColumnType::Decimal, e.to_string())),
            ColumnValue::Decimal(d) => Ok(*d),
            ColumnValue::String(_) | ColumnValue::Bytes(_) => {
                let text = self.text(ColumnType::Decimal)?.trim();
                Decimal::from_str(text)
                    .or_else(|_| Decimal::from_scientific(text))
                    .map_err(|_| {
                        self.transform_error(ColumnType::Decimal, format!("invalid decimal {text:?}"))
                    })
            }
            ColumnValue::Time(_) => Err(self.unsupported(ColumnType::Decimal)),
        }
    }

    pub fn as_string(&self) -> Result<String, ElementError> {
        match self {
            ColumnValue::Null(kind) => Err(ElementError::NilValue(*kind)),
            ColumnValue::Bool(b) => Ok(b.to_string()),
            ColumnValue::BigInt(b) => Ok(b.to_string()),
            ColumnValue::Decimal(d) => Ok(d.normalize().to_string()),
            ColumnValue::String(s) => Ok(s.clone()),
            ColumnValue::Bytes(_) => self.text(ColumnType::String).map(str::to_string),
            ColumnValue::Time(t) => Ok(t.format(DEFAULT_TIME_FORMAT).to_string()),
        }
    }

    pub fn as_bytes(&self) -> Result<Vec<u8>, ElementError> {
        match self {
            ColumnValue::Bytes(b) => Ok(b.clone()),
            other => other.as_string().map(String::into_bytes),
        }
    }

    pub fn as_time(&self) -> Result<DateTime<Utc>, ElementError> {
        match self {
            ColumnValue::Null(kind) => Err(ElementError::NilValue(*kind)),
            ColumnValue::Time(t) => Ok(*t),
            ColumnValue::String(_) | ColumnValue::Bytes(_) => {
                let text = self.text(ColumnType::Time)?.trim();
                parse_time(text).ok_or_else(|| {
                    self.transform_error(ColumnType::Time, format!("invalid time {text:?}"))
                })
            }
            _ => Err(self.unsupported(ColumnType::Time)),
        }
    }

    pub fn byte_size(&self) -> usize {
        match self {
            ColumnValue::Null(_) => 0,
            ColumnValue::Bool(_) => 1,
            ColumnValue::BigInt(b) => b.bits().div_ceil(8) as usize,
            ColumnValue::Decimal(d) => d.to_string().len(),
            ColumnValue::String(s) => s.len(),
            ColumnValue::Bytes(b) => b.len(),
            ColumnValue::Time(_) => 12,
        }
    }

    /// Approximate footprint including heap allocations.
    pub fn memory_size(&self) -> usize {
        let heap = match self {
            ColumnValue::BigInt(b) => b.bits().div_ceil(64) as usize * size_of::<u64>(),
            ColumnValue::String(s) => s.capacity(),
            ColumnValue::Bytes(b) => b.capacity(),
            _ => 0,
        };
        size_of::<ColumnValue>() + heap
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

fn decimal_to_bigint(d: &Decimal) -> Option<BigInt> {
    BigInt::from_str(&d.trunc().normalize().to_string()).ok()
}

fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(text, DEFAULT_TIME_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(text))
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, NAIVE_TIME_FORMAT)
                .ok()
                .map(|t| t.and_utc())
        })
}

impl From<bool> for ColumnValue {
    fn from(v: bool) -> Self {
        ColumnValue::Bool(v)
    }
}

impl From<i64> for ColumnValue {
    fn from(v: i64) -> Self {
        ColumnValue::BigInt(BigInt::from(v))
    }
}

impl From<BigInt> for ColumnValue {
    fn from(v: BigInt) -> Self {
        ColumnValue::BigInt(v)
    }
}

impl From<Decimal> for ColumnValue {
    fn from(v: Decimal) -> Self {
        ColumnValue::Decimal(v)
    }
}

impl From<&str> for ColumnValue {
    fn from(v: &str) -> Self {
        ColumnValue::String(v.to_string())
    }
}

impl From<String> for ColumnValue {
    fn from(v: String) -> Self {
        ColumnValue::String(v)
    }
}

impl From<Vec<u8>> for ColumnValue {
    fn from(v: Vec<u8>) -> Self {
        ColumnValue::Bytes(v)
    }
}

impl From<DateTime<Utc>> for ColumnValue {
    fn from(v: DateTime<Utc>) -> Self {
        ColumnValue::Time(v)
    }
}

/// A named value inside a record.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    value: ColumnValue,
}

impl Column {
    pub fn new(name: impl Into<String>, value: impl Into<ColumnValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn null(name: impl Into<String>, kind: ColumnType) -> Self {
        Self::new(name, ColumnValue::Null(kind))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &ColumnValue {
        &self.value
    }

    pub fn into_value(self) -> ColumnValue {
        self.value
    }

    pub fn kind(&self) -> ColumnType {
        self.value.kind()
    }

    pub fn byte_size(&self) -> usize {
        self.value.byte_size()
    }

    pub fn memory_size(&self) -> usize {
        self.value.memory_size() + size_of::<String>() + self.name.capacity()
    }
}

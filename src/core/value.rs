use serde::{Deserialize, Serialize};
use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::cmp::Ordering;
use super::error::ShardingError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    Null,
    // Numeric types
    SmallInt(i16),
    Integer(i64),
    Real(f64),
    Numeric(Decimal),  // NUMERIC/DECIMAL with precision
    // String types
    Text(String),
    // Boolean
    Boolean(bool),
    // Date/Time types
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    // Special types
    Uuid(Uuid),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Integer view used by sharding algorithms.
    ///
    /// Text is accepted when it holds a plain integer, so `'42'` and `42` shard alike.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::SmallInt(i) => Some(i64::from(*i)),
            Self::Integer(i) => Some(*i),
            Self::Numeric(d) if d.fract().is_zero() => d.to_i64(),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Truthiness for marker columns (`TRUE`, `1`, `'true'`, `'1'`).
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Boolean(b) => *b,
            Self::SmallInt(_) | Self::Integer(_) => self.as_i64() == Some(1),
            Self::Text(s) => s.eq_ignore_ascii_case("true") || s == "1",
            _ => false,
        }
    }

    const fn is_numeric(&self) -> bool {
        matches!(self, Self::SmallInt(_) | Self::Integer(_) | Self::Real(_) | Self::Numeric(_))
    }

    fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::SmallInt(i) => Some(Decimal::from(*i)),
            Self::Integer(i) => Some(Decimal::from(*i)),
            Self::Real(r) => Decimal::from_f64(*r),
            Self::Numeric(d) => Some(*d),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::SmallInt(i) => Some(f64::from(*i)),
            Self::Integer(i) => Some(*i as f64),
            Self::Real(r) => Some(*r),
            Self::Numeric(d) => d.to_f64(),
            _ => None,
        }
    }

    /// Total order used by ordering and grouping merges.
    ///
    /// NULL sorts lowest. Numbers compare across numeric types; values of unrelated
    /// types fall back to comparing their rendered text.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Null, _) => Ordering::Less,
            (_, Self::Null) => Ordering::Greater,
            (Self::SmallInt(a), Self::SmallInt(b)) => a.cmp(b),
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Numeric(a), Self::Numeric(b)) => a.cmp(b),
            (Self::Real(a), Self::Real(b)) => a.total_cmp(b),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                match (a, b) {
                    (Self::Real(_), _) | (_, Self::Real(_)) => {
                        let (x, y) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
                        x.total_cmp(&y)
                    }
                    _ => a.as_decimal().cmp(&b.as_decimal()),
                }
            }
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Boolean(a), Self::Boolean(b)) => a.cmp(b),
            (Self::Date(a), Self::Date(b)) => a.cmp(b),
            (Self::Timestamp(a), Self::Timestamp(b)) => a.cmp(b),
            (Self::Date(a), Self::Timestamp(b)) => a.and_time(chrono::NaiveTime::MIN).cmp(b),
            (Self::Timestamp(a), Self::Date(b)) => a.cmp(&b.and_time(chrono::NaiveTime::MIN)),
            (Self::Uuid(a), Self::Uuid(b)) => a.cmp(b),
            (a, b) => a.to_string().cmp(&b.to_string()),
        }
    }

    /// Numeric addition for SUM/COUNT accumulation. NULL is the additive identity.
    pub fn add(&self, other: &Self) -> Result<Self, ShardingError> {
        match (self, other) {
            (Self::Null, v) | (v, Self::Null) => Ok(v.clone()),
            (Self::Real(_), _) | (_, Self::Real(_)) => {
                match (self.as_f64(), other.as_f64()) {
                    (Some(a), Some(b)) => Ok(Self::Real(a + b)),
                    _ => Err(ShardingError::TypeMismatch(format!("cannot add {self} and {other}"))),
                }
            }
            (Self::Numeric(_), _) | (_, Self::Numeric(_)) => {
                match (self.as_decimal(), other.as_decimal()) {
                    (Some(a), Some(b)) => a
                        .checked_add(b)
                        .map(Self::Numeric)
                        .ok_or_else(|| ShardingError::TypeMismatch("numeric overflow".to_string())),
                    _ => Err(ShardingError::TypeMismatch(format!("cannot add {self} and {other}"))),
                }
            }
            _ => match (self.as_integer_strict(), other.as_integer_strict()) {
                (Some(a), Some(b)) => Ok(a.checked_add(b).map_or_else(
                    || Self::Numeric(Decimal::from(a) + Decimal::from(b)),
                    Self::Integer,
                )),
                _ => Err(ShardingError::TypeMismatch(format!("cannot add {self} and {other}"))),
            },
        }
    }

    /// Exact division used to finish AVG from its (sum, count) pair.
    pub fn divide(&self, count: &Self) -> Result<Self, ShardingError> {
        if self.is_null() || count.is_null() {
            return Ok(Self::Null);
        }
        if let Self::Real(sum) = self {
            let n = count
                .as_f64()
                .ok_or_else(|| ShardingError::TypeMismatch(format!("count {count} is not numeric")))?;
            return Ok(if n == 0.0 { Self::Null } else { Self::Real(sum / n) });
        }
        let sum = self
            .as_decimal()
            .ok_or_else(|| ShardingError::TypeMismatch(format!("sum {self} is not numeric")))?;
        let n = count
            .as_decimal()
            .ok_or_else(|| ShardingError::TypeMismatch(format!("count {count} is not numeric")))?;
        if n.is_zero() {
            return Ok(Self::Null);
        }
        sum.checked_div(n)
            .map(Self::Numeric)
            .ok_or_else(|| ShardingError::TypeMismatch("numeric overflow".to_string()))
    }

    const fn as_integer_strict(&self) -> Option<i64> {
        match self {
            Self::SmallInt(i) => Some(*i as i64),
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Renders the value as a SQL literal for text substitution.
    #[must_use]
    pub fn to_sql_literal(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::SmallInt(_) | Self::Integer(_) | Self::Real(_) | Self::Numeric(_) | Self::Boolean(_) => self.to_string(),
            Self::Text(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Date(_) | Self::Timestamp(_) | Self::Uuid(_) => format!("'{self}'"),
        }
    }

    /// Grouping key fragment. NULL gets a marker that no rendered value can produce.
    #[must_use]
    pub fn key_fragment(&self) -> String {
        match self {
            Self::Null => "\u{0}NULL".to_string(),
            other if other.is_numeric() => other
                .as_decimal()
                .map_or_else(|| other.to_string(), |d| d.normalize().to_string()),
            other => other.to_string(),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::SmallInt(i) => write!(f, "{i}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Real(r) => write!(f, "{r}"),
            Self::Numeric(d) => write!(f, "{d}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Timestamp(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S")),
            Self::Uuid(u) => write!(f, "{u}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

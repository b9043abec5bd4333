//! Row and scalar representations produced by a row source.
//!
//! A [`Row`] is one tuple of a query window, keyed by column position. The
//! column names live once in the window's column list rather than in every row.

use chrono::NaiveDateTime;
use std::cmp::Ordering;
use std::fmt;

/// Format used for timestamps in message values and query literals.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A column of the exported table, as reported by the schema collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    /// Source type name, e.g. `UInt64` or `Nullable(DateTime)`.
    pub data_type: String,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A typed scalar read from the source table.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    /// An integer too wide for 64 bits (`Int128`, `UInt256`, ...), as decimal text.
    BigInt(String),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Render as a JSON value for a message body.
    ///
    /// Byte blobs become (lossy) text and timestamps use [`TIMESTAMP_FORMAT`].
    /// Non-finite floats have no JSON form and become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::UInt(u) => serde_json::Value::from(*u),
            Self::BigInt(s) => serde_json::Value::String(s.clone()),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Bytes(b) => serde_json::Value::String(String::from_utf8_lossy(b).into_owned()),
            Self::Timestamp(ts) => serde_json::Value::String(ts.format(TIMESTAMP_FORMAT).to_string()),
        }
    }

    /// Raw bytes used as a message key.
    pub fn to_key_bytes(&self) -> Vec<u8> {
        match self {
            Self::Bytes(b) => b.clone(),
            Self::Text(s) => s.as_bytes().to_vec(),
            other => other.to_string().into_bytes(),
        }
    }

    /// Compare two cursor values.
    ///
    /// Integers compare numerically across signedness and width; everything
    /// else only compares within its own variant. `None` means the values are
    /// not comparable.
    pub fn cursor_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::BigInt(_), _) | (_, Self::BigInt(_)) => cmp_integers(self, other),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::UInt(a), Self::UInt(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::UInt(b)) => Some(i128::from(*a).cmp(&i128::from(*b))),
            (Self::UInt(a), Self::Int(b)) => Some(i128::from(*a).cmp(&i128::from(*b))),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Bytes(a), Self::Bytes(b)) => Some(a.cmp(b)),
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::UInt(u) => write!(f, "{u}"),
            Self::BigInt(s) => write!(f, "{s}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            Self::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
        }
    }
}

/// Sign and magnitude digits (no leading zeros) of an integer value.
fn integer_parts(value: &Value) -> Option<(bool, String)> {
    let text = match value {
        Value::Int(i) => i.to_string(),
        Value::UInt(u) => u.to_string(),
        Value::BigInt(s) => s.trim().to_string(),
        _ => return None,
    };
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(&text)),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let digits = digits.trim_start_matches('0');
    Some((negative && !digits.is_empty(), digits.to_string()))
}

/// Numeric comparison of integers of any width: by sign, then digit count,
/// then digits.
fn cmp_integers(a: &Value, b: &Value) -> Option<Ordering> {
    let (a_neg, a_digits) = integer_parts(a)?;
    let (b_neg, b_digits) = integer_parts(b)?;
    Some(match (a_neg, b_neg) {
        (false, true) => Ordering::Greater,
        (true, false) => Ordering::Less,
        (negative, _) => {
            let magnitude = a_digits
                .len()
                .cmp(&b_digits.len())
                .then_with(|| a_digits.cmp(&b_digits));
            if negative {
                magnitude.reverse()
            } else {
                magnitude
            }
        }
    })
}

/// One tuple of a row window, values in column order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Build the JSON object for this row.
    ///
    /// Columns without a value in this row are emitted as `null`.
    pub fn to_json_object(&self, columns: &[String]) -> serde_json::Map<String, serde_json::Value> {
        columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let value = self
                    .values
                    .get(i)
                    .map(Value::to_json)
                    .unwrap_or(serde_json::Value::Null);
                (name.clone(), value)
            })
            .collect()
    }
}

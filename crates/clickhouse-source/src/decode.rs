//! Decoding of `JSONCompactEachRowWithNamesAndTypes` responses.
//!
//! The format is one JSON array per line: column names, then column types,
//! then one array per row. 64-bit and wider integers arrive as quoted strings.

use ch_sync_export::{Column, Row, Value};
use chrono::NaiveDateTime;

pub const FORMAT: &str = "JSONCompactEachRowWithNamesAndTypes";

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Header of a response: column names paired with their types.
pub fn parse_header<'a>(lines: &mut impl Iterator<Item = &'a str>) -> Result<Vec<Column>, String> {
    let names: Vec<String> = match next_nonblank(lines) {
        Some(line) => serde_json::from_str(line).map_err(|e| format!("bad names line: {e}"))?,
        None => return Ok(Vec::new()),
    };
    let types: Vec<String> = match next_nonblank(lines) {
        Some(line) => serde_json::from_str(line).map_err(|e| format!("bad types line: {e}"))?,
        None => return Err("response has names but no types line".to_string()),
    };
    if names.len() != types.len() {
        return Err(format!(
            "{} column names but {} column types",
            names.len(),
            types.len()
        ));
    }
    Ok(names
        .into_iter()
        .zip(types)
        .map(|(name, ty)| Column::new(name, ty))
        .collect())
}

fn next_nonblank<'a>(lines: &mut impl Iterator<Item = &'a str>) -> Option<&'a str> {
    lines.find(|l| !l.trim().is_empty())
}

/// Decode one data line against the header's columns.
pub fn decode_row(line: &str, columns: &[Column]) -> Result<Row, String> {
    let cells: Vec<serde_json::Value> =
        serde_json::from_str(line).map_err(|e| format!("bad row line: {e}"))?;
    if cells.len() != columns.len() {
        return Err(format!(
            "row has {} values, expected {}",
            cells.len(),
            columns.len()
        ));
    }
    let values = cells
        .into_iter()
        .zip(columns)
        .map(|(cell, column)| decode_value(cell, &column.data_type))
        .collect();
    Ok(Row::new(values))
}

/// Strip `Nullable(...)` and `LowCardinality(...)` wrappers.
pub fn base_type(ty: &str) -> &str {
    let mut ty = ty.trim();
    loop {
        let inner = ["Nullable(", "LowCardinality("]
            .iter()
            .find_map(|w| ty.strip_prefix(w).and_then(|r| r.strip_suffix(')')));
        match inner {
            Some(inner) => ty = inner.trim(),
            None => return ty,
        }
    }
}

pub fn decode_value(cell: serde_json::Value, ty: &str) -> Value {
    use serde_json::Value as J;

    let ty = base_type(ty);
    match cell {
        J::Null => Value::Null,
        J::Bool(b) => Value::Bool(b),
        J::Number(n) => {
            if ty.starts_with("UInt") {
                if let Some(u) = n.as_u64() {
                    return Value::UInt(u);
                }
            }
            if let Some(i) = n.as_i64() {
                if ty.starts_with("UInt") && i >= 0 {
                    return Value::UInt(i as u64);
                }
                if !ty.starts_with("Float") && !ty.starts_with("Decimal") {
                    return Value::Int(i);
                }
            }
            n.as_f64().map(Value::Float).unwrap_or(Value::Null)
        }
        J::String(s) => decode_text(s, ty),
        other => Value::Text(other.to_string()),
    }
}

fn decode_text(s: String, ty: &str) -> Value {
    if ty.starts_with("UInt") {
        if let Ok(u) = s.parse() {
            return Value::UInt(u);
        }
        if is_integer_text(&s) {
            return Value::BigInt(s);
        }
    } else if ty.starts_with("Int") {
        if let Ok(i) = s.parse() {
            return Value::Int(i);
        }
        if is_integer_text(&s) {
            return Value::BigInt(s);
        }
    } else if ty.starts_with("Float") {
        if let Ok(f) = s.parse() {
            return Value::Float(f);
        }
    } else if ty.starts_with("DateTime") {
        if let Ok(ts) = NaiveDateTime::parse_from_str(&s, DATETIME_FORMAT) {
            return Value::Timestamp(ts);
        }
    } else if ty.starts_with("FixedString") {
        return Value::Bytes(s.into_bytes());
    }
    Value::Text(s)
}

fn is_integer_text(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

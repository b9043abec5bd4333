//! Identifier quoting and literal rendering for generated queries.
//!
//! Quote doubling is the only escaping performed. Column and table names
//! must come from the schema collaborator or trusted configuration, never
//! from untrusted input.

use crate::value::{Value, TIMESTAMP_FORMAT};
use chrono::Timelike;

const IDENT_DELIMITER: char = '`';

/// Trim a name and wrap it in backticks, doubling embedded backticks.
///
/// A blank name yields an empty string.
pub fn quote_identifier(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        return String::new();
    }
    let escaped = name.replace(IDENT_DELIMITER, "``");
    format!("{IDENT_DELIMITER}{escaped}{IDENT_DELIMITER}")
}

/// `` `database`.`table` ``
pub fn qualified(database: &str, table: &str) -> String {
    format!("{}.{}", quote_identifier(database), quote_identifier(table))
}

/// Quote each name and join with commas, as used in a select list.
pub fn join_quoted<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(|n| quote_identifier(n.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Render a scalar for embedding in a predicate.
pub fn literal_for(value: &Value) -> String {
    match value {
        Value::Text(s) => quote_string(s),
        Value::Bytes(b) => quote_string(&String::from_utf8_lossy(b)),
        // sub-second precision is kept so DateTime64 cursors do not re-read rows
        Value::Timestamp(ts) if ts.nanosecond() != 0 => {
            format!("'{}'", ts.format("%Y-%m-%d %H:%M:%S%.f"))
        }
        Value::Timestamp(ts) => format!("'{}'", ts.format(TIMESTAMP_FORMAT)),
        other => other.to_string(),
    }
}

/// Render a configured (textual) bound such as a cursor start value.
pub fn literal_for_text(value: &str) -> String {
    quote_string(value)
}

fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("id"), "`id`");
        assert_eq!(quote_identifier("we`ird"), "`we``ird`");
        assert_eq!(quote_identifier(""), "");
    }

    #[test]
    fn test_quote_identifier_trims_whitespace() {
        assert_eq!(quote_identifier(" id\t"), "`id`");
        assert_eq!(quote_identifier("   "), "");
        assert_eq!(qualified(" db ", "events "), "`db`.`events`");
    }

    #[test]
    fn test_qualified_and_join() {
        assert_eq!(qualified("db", "events"), "`db`.`events`");
        assert_eq!(join_quoted(&["a", "b"]), "`a`,`b`");
    }

    #[test]
    fn test_literals() {
        assert_eq!(literal_for(&Value::Text("O'Brien".into())), "'O''Brien'");
        assert_eq!(literal_for(&Value::Bytes(b"x'y".to_vec())), "'x''y'");
        assert_eq!(literal_for(&Value::UInt(25)), "25");
        assert_eq!(literal_for(&Value::Int(-3)), "-3");
        assert_eq!(
            literal_for(&Value::BigInt("18446744073709551616".into())),
            "18446744073709551616"
        );
        assert_eq!(literal_for(&Value::Float(1.25)), "1.25");
        let ts = NaiveDate::from_ymd_opt(2023, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 1)
            .unwrap();
        assert_eq!(literal_for(&Value::Timestamp(ts)), "'2023-12-31 23:59:01'");
        let precise = ts + chrono::Duration::milliseconds(250);
        assert_eq!(
            literal_for(&Value::Timestamp(precise)),
            "'2023-12-31 23:59:01.250'"
        );
        assert_eq!(literal_for_text("10"), "'10'");
    }
}

//! Normalization of user-supplied `ORDER BY` expressions.
//!
//! Only bare column references with an optional `ASC`/`DESC` survive. Any
//! fragment naming something other than a known column is dropped, so a typo
//! or an arbitrary expression never reaches the generated query.

use crate::sql::quote_identifier;
use std::collections::HashSet;

/// One accepted ordering term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    pub column: String,
    pub direction: Option<Direction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl OrderTerm {
    pub fn render(&self) -> String {
        match self.direction {
            Some(Direction::Asc) => format!("{} ASC", quote_identifier(&self.column)),
            Some(Direction::Desc) => format!("{} DESC", quote_identifier(&self.column)),
            None => quote_identifier(&self.column),
        }
    }
}

/// Parse `expr` into the terms that reference a column in `known`.
pub fn parse_order_terms<S: AsRef<str>>(expr: &str, known: &[S]) -> Vec<OrderTerm> {
    let known: HashSet<&str> = known.iter().map(|c| c.as_ref()).collect();

    expr.split(',')
        .filter_map(|fragment| {
            let mut tokens = fragment.split_whitespace();
            let candidate = strip_delimiters(tokens.next()?);
            if !known.contains(candidate) {
                return None;
            }
            let direction = tokens.next().and_then(|t| match t.to_ascii_uppercase().as_str() {
                "ASC" => Some(Direction::Asc),
                "DESC" => Some(Direction::Desc),
                _ => None,
            });
            Some(OrderTerm {
                column: candidate.to_string(),
                direction,
            })
        })
        .collect()
}

/// Normalize `expr` against the known columns.
///
/// Returns an empty string when nothing survives.
pub fn normalize_order_by<S: AsRef<str>>(expr: &str, known: &[S]) -> String {
    render_terms(&parse_order_terms(expr, known))
}

pub fn render_terms(terms: &[OrderTerm]) -> String {
    terms
        .iter()
        .map(OrderTerm::render)
        .collect::<Vec<_>>()
        .join(", ")
}

fn strip_delimiters(token: &str) -> &str {
    token
        .strip_prefix('`')
        .and_then(|t| t.strip_suffix('`'))
        .unwrap_or(token)
}

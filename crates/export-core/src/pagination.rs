//! Query window planning.
//!
//! A run pages through its table in one of two modes, fixed when the
//! [`Planner`] is built:
//!
//! - **Offset**: `LIMIT <offset>, <batch>`; the offset grows by each window's row count.
//! - **Cursor**: `WHERE cursor > <last>` (or `>= <start>` before any row was seen),
//!   optionally `AND cursor <= <end>`, ordered by the cursor column first.
//!
//! In cursor mode the cursor column always leads the `ORDER BY`, so every
//! window observes cursor values in non-decreasing order and the exclusive
//! lower bound never re-reads the boundary row.

use crate::config::{CursorConfig, ExportConfig};
use crate::error::{ExportError, Result};
use crate::order_by::{parse_order_terms, render_terms, OrderTerm};
use crate::sql::{join_quoted, literal_for, literal_for_text, qualified, quote_identifier};
use crate::value::Value;
use std::cmp::Ordering;

/// Pagination progress of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum PaginationState {
    Offset {
        offset: u64,
    },
    Cursor {
        column: String,
        last: Option<Value>,
        start: Option<String>,
        end: Option<String>,
    },
}

impl PaginationState {
    /// Human-readable position for progress events.
    pub fn position(&self) -> String {
        match self {
            Self::Offset { offset } => offset.to_string(),
            Self::Cursor { last: Some(v), .. } => v.to_string(),
            Self::Cursor {
                last: None,
                start: Some(s),
                ..
            } => s.clone(),
            Self::Cursor { .. } => String::new(),
        }
    }
}

/// One planned window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowRequest {
    pub sql: String,
    /// The `WHERE` clause body, if any.
    pub predicate: Option<String>,
}

/// Builds successive window queries for one table.
#[derive(Debug, Clone)]
pub struct Planner {
    select_list: String,
    source: String,
    order_by: String,
    batch_size: usize,
    state: PaginationState,
}

impl Planner {
    /// Plan a run over `columns`, choosing the pagination mode from `config`.
    pub fn new(config: &ExportConfig, columns: &[String]) -> Result<Self> {
        if columns.is_empty() {
            return Err(ExportError::Config(format!(
                "table {}.{} has no columns",
                config.database, config.table
            )));
        }

        let mut terms = parse_order_terms(&config.order_by, columns);

        let state = match &config.cursor {
            None => PaginationState::Offset { offset: 0 },
            Some(CursorConfig { column, start, end }) => {
                if !columns.iter().any(|c| c == column) {
                    return Err(ExportError::Config(format!(
                        "cursor column {column} does not exist in {}.{}",
                        config.database, config.table
                    )));
                }
                terms.retain(|t| &t.column != column);
                terms.insert(
                    0,
                    OrderTerm {
                        column: column.clone(),
                        direction: None,
                    },
                );
                PaginationState::Cursor {
                    column: column.clone(),
                    last: None,
                    start: non_blank(start),
                    end: non_blank(end),
                }
            }
        };

        Ok(Self {
            select_list: join_quoted(columns),
            source: qualified(&config.database, &config.table),
            order_by: render_terms(&terms),
            batch_size: config.batch_size,
            state,
        })
    }

    pub fn state(&self) -> &PaginationState {
        &self.state
    }

    pub fn order_by(&self) -> &str {
        &self.order_by
    }

    pub fn is_cursor_mode(&self) -> bool {
        matches!(self.state, PaginationState::Cursor { .. })
    }

    /// Build the query for the next window from the current state.
    pub fn next_request(&self) -> WindowRequest {
        let predicate = self.predicate();
        let mut sql = format!("SELECT {} FROM {}", self.select_list, self.source);
        if let Some(p) = &predicate {
            sql.push_str(" WHERE ");
            sql.push_str(p);
        }
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by);
        }
        match &self.state {
            PaginationState::Offset { offset } => {
                sql.push_str(&format!(" LIMIT {offset}, {}", self.batch_size));
            }
            PaginationState::Cursor { .. } => {
                sql.push_str(&format!(" LIMIT {}", self.batch_size));
            }
        }
        WindowRequest { sql, predicate }
    }

    fn predicate(&self) -> Option<String> {
        let PaginationState::Cursor {
            column,
            last,
            start,
            end,
        } = &self.state
        else {
            return None;
        };

        let col = quote_identifier(column);
        let mut clauses = Vec::with_capacity(2);
        match (last, start) {
            (Some(v), _) => clauses.push(format!("{col} > {}", literal_for(v))),
            (None, Some(s)) => clauses.push(format!("{col} >= {}", literal_for_text(s))),
            (None, None) => {}
        }
        if let Some(e) = end {
            clauses.push(format!("{col} <= {}", literal_for_text(e)));
        }

        if clauses.is_empty() {
            None
        } else {
            Some(clauses.join(" AND "))
        }
    }

    /// Record a consumed, non-empty window.
    ///
    /// `last_cursor` is the cursor value of the window's final row. In cursor
    /// mode it must be strictly greater than the previous one; otherwise the
    /// next window would repeat this one and the run is failed instead.
    pub fn advance(&mut self, rows: usize, last_cursor: Option<Value>) -> Result<()> {
        match &mut self.state {
            PaginationState::Offset { offset } => {
                *offset += rows as u64;
                Ok(())
            }
            PaginationState::Cursor { column, last, .. } => {
                let Some(next) = last_cursor.filter(|v| !v.is_null()) else {
                    return Ok(());
                };
                if let Some(prev) = last.as_ref() {
                    if next.cursor_cmp(prev) != Some(Ordering::Greater) {
                        return Err(ExportError::StalledCursor {
                            column: column.clone(),
                            last: prev.to_string(),
                            rows,
                        });
                    }
                }
                *last = Some(next);
                Ok(())
            }
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

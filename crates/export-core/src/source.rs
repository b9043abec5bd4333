//! Database access seam.
//!
//! Implemented by the ClickHouse source crate and by in-memory fakes in tests.

use crate::error::Result;
use crate::value::{Column, Row};
use async_trait::async_trait;

/// Schema lookups and query execution against the source database.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Columns of `database.table` in table order.
    async fn columns(&self, database: &str, table: &str) -> Result<Vec<Column>>;

    /// Cheap row-count estimate, used to size topics.
    async fn row_count_estimate(&self, database: &str, table: &str) -> Result<u64>;

    /// Execute one window query.
    ///
    /// Failures carry the query text (see [`crate::ExportError::Query`]).
    async fn execute_query(&self, sql: &str) -> Result<Box<dyn RowCursor>>;
}

/// Rows of one executed window, scanned one at a time.
#[async_trait]
pub trait RowCursor: Send {
    /// The next row, or `None` once the window is exhausted.
    async fn next_row(&mut self) -> Option<Result<Row>>;
}

/// A cursor over rows that are already in memory.
pub struct VecRowCursor {
    rows: std::vec::IntoIter<Row>,
}

impl VecRowCursor {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: rows.into_iter(),
        }
    }
}

#[async_trait]
impl RowCursor for VecRowCursor {
    async fn next_row(&mut self) -> Option<Result<Row>> {
        self.rows.next().map(Ok)
    }
}

//! In-memory collaborators for exercising the export loop.
//!
//! `FakeTable` understands exactly the window queries the planner emits:
//! comparisons on unsigned integer columns and the two `LIMIT` forms. Rows
//! are kept sorted by `id`, and NULL never satisfies a comparison.

use crate::error::{ExportError, Result};
use crate::sink::{DeliveryError, Message, MessageSink, TopicReadiness};
use crate::source::{RowCursor, RowSource, VecRowCursor};
use crate::value::{Column, Row, Value};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub struct FakeTable {
    columns: Vec<Column>,
    rows: Mutex<Vec<Row>>,
    queries: Mutex<Vec<String>>,
    fail_queries: AtomicBool,
}

impl FakeTable {
    /// `id UInt64, name String` with ids `1..=n`.
    pub fn with_ids(n: u64) -> Self {
        let table = Self {
            columns: vec![Column::new("id", "UInt64"), Column::new("name", "String")],
            rows: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
            fail_queries: AtomicBool::new(false),
        };
        table.push_ids(1..=n);
        table
    }

    /// Adds a `seq Nullable(UInt64)` column equal to `id`, NULL for `nulls`.
    pub fn with_nullable_seq(n: u64, nulls: &[u64]) -> Self {
        let table = Self {
            columns: vec![
                Column::new("id", "UInt64"),
                Column::new("name", "String"),
                Column::new("seq", "Nullable(UInt64)"),
            ],
            rows: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
            fail_queries: AtomicBool::new(false),
        };
        {
            let mut rows = table.rows.lock().unwrap();
            for id in 1..=n {
                let seq = if nulls.contains(&id) {
                    Value::Null
                } else {
                    Value::UInt(id)
                };
                rows.push(Row::new(vec![
                    Value::UInt(id),
                    Value::Text(format!("row-{id}")),
                    seq,
                ]));
            }
        }
        table
    }

    pub fn push_ids(&self, ids: impl IntoIterator<Item = u64>) {
        let mut rows = self.rows.lock().unwrap();
        for id in ids {
            rows.push(Row::new(vec![
                Value::UInt(id),
                Value::Text(format!("row-{id}")),
            ]));
        }
        rows.sort_by_key(|r| match r.values[0] {
            Value::UInt(id) => id,
            _ => 0,
        });
    }

    pub fn fail_queries(&self) {
        self.fail_queries.store(true, Ordering::SeqCst);
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    fn run(&self, sql: &str) -> Vec<Row> {
        let rows = self.rows.lock().unwrap().clone();
        let (offset, limit) = parse_limit(sql);
        let clauses = predicate_clauses(sql);
        rows.into_iter()
            .filter(|row| {
                self.uint_at(row, "id").is_some()
                    && clauses
                        .iter()
                        .all(|c| self.uint_at(row, &c.column).is_some_and(|v| c.matches(v)))
            })
            .skip(offset)
            .take(limit)
            .collect()
    }

    /// Unsigned value of `column`; NULL and unknown columns give `None`.
    fn uint_at(&self, row: &Row, column: &str) -> Option<u64> {
        let i = self.columns.iter().position(|c| c.name == column)?;
        match row.values.get(i) {
            Some(Value::UInt(v)) => Some(*v),
            _ => None,
        }
    }
}

struct Clause {
    column: String,
    op: String,
    bound: u64,
}

impl Clause {
    fn matches(&self, id: u64) -> bool {
        match self.op.as_str() {
            ">" => id > self.bound,
            ">=" => id >= self.bound,
            "<=" => id <= self.bound,
            "<" => id < self.bound,
            _ => false,
        }
    }
}

fn predicate_clauses(sql: &str) -> Vec<Clause> {
    let Some((_, rest)) = sql.split_once(" WHERE ") else {
        return Vec::new();
    };
    let body = rest
        .split(" ORDER BY ")
        .next()
        .unwrap_or(rest)
        .split(" LIMIT ")
        .next()
        .unwrap_or(rest);
    body.split(" AND ")
        .filter_map(|clause| {
            let mut parts = clause.split_whitespace();
            let column = parts.next()?.trim_matches('`').to_string();
            let op = parts.next()?.to_string();
            let bound = parts.next()?.trim_matches('\'').parse().ok()?;
            Some(Clause { column, op, bound })
        })
        .collect()
}

fn parse_limit(sql: &str) -> (usize, usize) {
    let Some((_, limit)) = sql.rsplit_once(" LIMIT ") else {
        return (0, usize::MAX);
    };
    match limit.split_once(", ") {
        Some((offset, n)) => (offset.parse().unwrap(), n.parse().unwrap()),
        None => (0, limit.parse().unwrap()),
    }
}

#[async_trait]
impl RowSource for FakeTable {
    async fn columns(&self, _database: &str, _table: &str) -> Result<Vec<Column>> {
        Ok(self.columns.clone())
    }

    async fn row_count_estimate(&self, _database: &str, _table: &str) -> Result<u64> {
        Ok(self.rows.lock().unwrap().len() as u64)
    }

    async fn execute_query(&self, sql: &str) -> Result<Box<dyn RowCursor>> {
        self.queries.lock().unwrap().push(sql.to_string());
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(ExportError::query(sql, "Code: 47. Unknown identifier"));
        }
        Ok(Box::new(VecRowCursor::new(self.run(sql))))
    }
}

/// Records delivered batches; fails the first writes with scripted errors.
#[derive(Default)]
pub struct FakeSink {
    failures: Mutex<VecDeque<DeliveryError>>,
    attempts: AtomicUsize,
    delivered: Mutex<Vec<Vec<Message>>>,
    closed: AtomicBool,
}

impl FakeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_with(failures: Vec<DeliveryError>) -> Self {
        Self {
            failures: Mutex::new(failures.into()),
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn delivered_batches(&self) -> Vec<Vec<Message>> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn delivered_values(&self) -> Vec<serde_json::Value> {
        self.delivered_batches()
            .iter()
            .flatten()
            .map(|m| serde_json::from_slice(&m.value).unwrap())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageSink for FakeSink {
    async fn write(&self, batch: &[Message]) -> std::result::Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.delivered.lock().unwrap().push(batch.to_vec());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeReadiness {
    ready: bool,
    calls: AtomicUsize,
}

impl FakeReadiness {
    pub fn ready() -> Self {
        Self {
            ready: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn never_ready() -> Self {
        Self {
            ready: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TopicReadiness for FakeReadiness {
    async fn wait_ready(&self, topic: &str, timeout: Duration) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.ready {
            Ok(())
        } else {
            tokio::time::sleep(timeout).await;
            Err(ExportError::NotReady {
                topic: topic.to_string(),
            })
        }
    }
}

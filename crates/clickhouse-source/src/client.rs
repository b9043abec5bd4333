use crate::decode::{self, FORMAT};
use async_trait::async_trait;
use ch_sync_export::sql::{qualified, quote_identifier};
use ch_sync_export::{Column, ExportError, Result, Row, RowCursor, RowSource, Value};
use std::time::Duration;
use tracing::debug;

/// Connection settings for the ClickHouse HTTP interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickHouseConfig {
    /// Base URL, e.g. `http://localhost:8123`.
    pub url: String,
    pub user: String,
    pub password: String,
    /// Default database for unqualified names.
    pub database: String,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            user: "default".to_string(),
            password: String::new(),
            database: "default".to_string(),
        }
    }
}

/// Estimated row count of one table.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TableRows {
    pub table: String,
    pub rows: u64,
}

/// A [`RowSource`] over the ClickHouse HTTP interface.
pub struct ClickHouseSource {
    http: reqwest::Client,
    config: ClickHouseConfig,
}

impl ClickHouseSource {
    pub fn new(config: ClickHouseConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| ExportError::Connectivity(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    /// Run `sql` and return the raw response body.
    ///
    /// `params` are bound server-side as `{name:Type}` query parameters.
    async fn post(&self, sql: &str, params: &[(&str, &str)]) -> Result<String> {
        let mut query: Vec<(String, &str)> = vec![("database".to_string(), self.config.database.as_str())];
        query.extend(params.iter().map(|(k, v)| (format!("param_{k}"), *v)));

        let response = self
            .http
            .post(self.config.url.trim_end_matches('/'))
            .query(&query)
            .header("X-ClickHouse-User", &self.config.user)
            .header("X-ClickHouse-Key", &self.config.password)
            .body(format!("{sql} FORMAT {FORMAT}"))
            .send()
            .await
            .map_err(|e| {
                ExportError::Connectivity(format!(
                    "Failed to reach ClickHouse at {}: {e}",
                    self.config.url
                ))
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ExportError::Connectivity(format!("Failed to read ClickHouse response: {e}")))?;
        if !status.is_success() {
            return Err(ExportError::query(sql, format!("{status}: {}", body.trim())));
        }
        Ok(body)
    }

    /// Run `sql` and decode every row.
    pub async fn query_rows(&self, sql: &str, params: &[(&str, &str)]) -> Result<(Vec<Column>, Vec<Row>)> {
        let body = self.post(sql, params).await?;
        let mut lines = body.lines();
        let columns = decode::parse_header(&mut lines).map_err(|m| ExportError::query(sql, m))?;
        let rows = lines
            .filter(|l| !l.trim().is_empty())
            .map(|l| decode::decode_row(l, &columns).map_err(|m| ExportError::query(sql, m)))
            .collect::<Result<Vec<_>>>()?;
        Ok((columns, rows))
    }

    async fn scalar(&self, sql: &str, params: &[(&str, &str)]) -> Result<Value> {
        let (_, rows) = self.query_rows(sql, params).await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|r| r.values.into_iter().next())
            .unwrap_or(Value::Null))
    }

    pub async fn ping(&self) -> Result<()> {
        self.scalar("SELECT 1", &[]).await.map(|_| ())
    }

    /// Estimated row counts of every table in `database`, by name.
    pub async fn count_all_tables_rows(&self, database: &str) -> Result<Vec<TableRows>> {
        let sql = "SELECT table, sum(rows) AS rows FROM system.parts \
                   WHERE database = {db:String} AND active \
                   GROUP BY table ORDER BY table";
        let (_, rows) = self.query_rows(sql, &[("db", database)]).await?;
        Ok(rows
            .into_iter()
            .filter_map(|r| match r.values.as_slice() {
                [Value::Text(table), Value::UInt(n)] => Some(TableRows {
                    table: table.clone(),
                    rows: *n,
                }),
                _ => None,
            })
            .collect())
    }

    /// Engine name of a table, or `None` when the table does not exist.
    pub async fn table_engine(&self, database: &str, table: &str) -> Result<Option<String>> {
        let sql = "SELECT engine FROM system.tables \
                   WHERE database = {db:String} AND name = {tbl:String}";
        match self.scalar(sql, &[("db", database), ("tbl", table)]).await? {
            Value::Text(engine) => Ok(Some(engine)),
            _ => Ok(None),
        }
    }

    /// Exact `count()` of a table or view.
    pub async fn exact_count(&self, database: &str, table: &str) -> Result<u64> {
        let sql = format!("SELECT count() FROM {}", qualified(database, table));
        match self.scalar(&sql, &[]).await? {
            Value::UInt(n) => Ok(n),
            Value::Int(n) => Ok(n.max(0) as u64),
            other => Err(ExportError::query(&sql, format!("unexpected count value {other}"))),
        }
    }

    /// `max(column)` of a table as text, or `None` when it has no value.
    ///
    /// Used to resume a cursor from what a destination table already holds.
    pub async fn max_value(&self, database: &str, table: &str, column: &str) -> Result<Option<String>> {
        let sql = format!(
            "SELECT max({}) FROM {}",
            quote_identifier(column),
            qualified(database, table)
        );
        let value = self.scalar(&sql, &[]).await?;
        debug!(database, table, column, value = %value, "Read cursor high-water mark");
        Ok(if value.is_null() {
            None
        } else {
            Some(value.to_string())
        })
    }
}

#[async_trait]
impl RowSource for ClickHouseSource {
    async fn columns(&self, database: &str, table: &str) -> Result<Vec<Column>> {
        let sql = "SELECT name, type FROM system.columns \
                   WHERE database = {db:String} AND table = {tbl:String} \
                   ORDER BY position";
        let (_, rows) = self.query_rows(sql, &[("db", database), ("tbl", table)]).await?;
        let columns: Vec<Column> = rows
            .into_iter()
            .filter_map(|r| match r.values.as_slice() {
                [Value::Text(name), Value::Text(ty)] => Some(Column::new(name.clone(), ty.clone())),
                _ => None,
            })
            .collect();
        if columns.is_empty() {
            return Err(ExportError::Config(format!(
                "table {database}.{table} not found or has no columns"
            )));
        }
        Ok(columns)
    }

    async fn row_count_estimate(&self, database: &str, table: &str) -> Result<u64> {
        let sql = "SELECT sum(rows) FROM system.parts \
                   WHERE database = {db:String} AND table = {tbl:String} AND active";
        match self.scalar(sql, &[("db", database), ("tbl", table)]).await? {
            Value::UInt(n) => Ok(n),
            Value::Int(n) => Ok(n.max(0) as u64),
            _ => Ok(0),
        }
    }

    async fn execute_query(&self, sql: &str) -> Result<Box<dyn RowCursor>> {
        let body = self.post(sql, &[]).await?;
        Ok(Box::new(ResponseCursor::new(sql, body)?))
    }
}

/// Decodes rows from a buffered response one line at a time.
struct ResponseCursor {
    sql: String,
    body: String,
    pos: usize,
    columns: Vec<Column>,
}

impl ResponseCursor {
    fn new(sql: &str, body: String) -> Result<Self> {
        let mut lines = body.split_inclusive('\n');
        let columns = decode::parse_header(&mut lines.by_ref().map(str::trim_end))
            .map_err(|m| ExportError::query(sql, m))?;
        let consumed = body.len() - lines.map(str::len).sum::<usize>();
        Ok(Self {
            sql: sql.to_string(),
            pos: consumed,
            body,
            columns,
        })
    }
}

#[async_trait]
impl RowCursor for ResponseCursor {
    async fn next_row(&mut self) -> Option<Result<Row>> {
        loop {
            let rest = &self.body[self.pos..];
            if rest.is_empty() {
                return None;
            }
            let (line, advance) = match rest.find('\n') {
                Some(i) => (&rest[..i], i + 1),
                None => (rest, rest.len()),
            };
            self.pos += advance;
            if line.trim().is_empty() {
                continue;
            }
            return Some(
                decode::decode_row(line, &self.columns).map_err(|m| ExportError::query(&self.sql, m)),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_response_cursor_yields_rows_after_header() {
        let body = "[\"id\",\"v\"]\n[\"UInt64\",\"String\"]\n[\"1\",\"a\"]\n\n[\"2\",\"b\"]\n".to_string();
        let mut cursor = ResponseCursor::new("SELECT 1", body).unwrap();

        let first = cursor.next_row().await.unwrap().unwrap();
        assert_eq!(first.values, vec![Value::UInt(1), Value::Text("a".into())]);
        let second = cursor.next_row().await.unwrap().unwrap();
        assert_eq!(second.values[0], Value::UInt(2));
        assert!(cursor.next_row().await.is_none());
    }

    #[tokio::test]
    async fn test_response_cursor_empty_window() {
        let body = "[\"id\"]\n[\"UInt64\"]\n".to_string();
        let mut cursor = ResponseCursor::new("SELECT 1", body).unwrap();
        assert!(cursor.next_row().await.is_none());
    }

    #[tokio::test]
    async fn test_response_cursor_reports_query_on_bad_row() {
        let body = "[\"id\"]\n[\"UInt64\"]\nnot json".to_string();
        let mut cursor = ResponseCursor::new("SELECT broken", body).unwrap();
        match cursor.next_row().await {
            Some(Err(ExportError::Query { query, .. })) => assert_eq!(query, "SELECT broken"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connectivity_error() {
        let source = ClickHouseSource::new(ClickHouseConfig {
            url: "http://127.0.0.1:1".to_string(),
            ..ClickHouseConfig::default()
        })
        .unwrap();
        let err = source.columns("db", "t").await.unwrap_err();
        assert!(matches!(err, ExportError::Connectivity(_)));
    }

    #[tokio::test]
    async fn test_ping_reports_unreachable_server() {
        let source = ClickHouseSource::new(ClickHouseConfig {
            url: "http://127.0.0.1:1".to_string(),
            ..ClickHouseConfig::default()
        })
        .unwrap();
        assert!(matches!(source.ping().await, Err(ExportError::Connectivity(_))));
        assert!(matches!(
            source.table_engine("db", "t").await,
            Err(ExportError::Connectivity(_))
        ));
    }
}

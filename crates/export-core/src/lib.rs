//! Incremental table export engine.
//!
//! Reads a table window by window and delivers each window as one batch of
//! keyed JSON messages. Paging is either offset-based or driven by a strictly
//! increasing cursor column; cursor runs can keep watching for new rows.
//!
//! The database and the message stream are reached through the
//! [`RowSource`], [`MessageSink`] and [`TopicReadiness`] traits, so the engine
//! itself holds no client state.

pub mod config;
pub mod error;
pub mod event;
pub mod export;
pub mod order_by;
pub mod pagination;
pub mod retry;
pub mod sink;
pub mod source;
pub mod sql;
pub mod value;

#[cfg(test)]
mod testing;

pub use config::{default_topic_name, CursorConfig, ExportConfig, RetryPolicy};
pub use error::{ExportError, Result};
pub use event::{ExportEvent, ExportObserver, NoopObserver, TracingObserver};
pub use export::{export_table, ExportSummary};
pub use order_by::normalize_order_by;
pub use pagination::{PaginationState, Planner, WindowRequest};
pub use retry::deliver_with_retry;
pub use sink::{DeliveryError, Message, MessageSink, TopicReadiness};
pub use source::{RowCursor, RowSource, VecRowCursor};
pub use sql::{literal_for, quote_identifier};
pub use value::{Column, Row, Value};

//! Stream delivery seam.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// One keyed message; the value is the JSON-encoded row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
}

/// A failed batch write, classified by the stream client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The broker does not know the topic (or partition) yet.
    #[error("Unknown topic or partition: {0}")]
    UnknownTopic(String),

    #[error("{0}")]
    Other(String),
}

/// Writes batches to one destination topic.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Blocking write of the whole batch.
    async fn write(&self, batch: &[Message]) -> Result<(), DeliveryError>;

    /// Flush outstanding messages and release the client.
    async fn close(&self) -> crate::error::Result<()>;
}

/// Readiness check for a destination topic.
#[async_trait]
pub trait TopicReadiness: Send + Sync {
    /// Wait until every configured broker reports partitions for `topic`.
    async fn wait_ready(&self, topic: &str, timeout: Duration) -> crate::error::Result<()>;
}

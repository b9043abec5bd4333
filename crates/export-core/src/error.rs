use thiserror::Error;

/// Errors surfaced by an export run.
///
/// Collaborator crates map their native failures into these variants so the
/// caller of [`crate::export_table`] sees one taxonomy regardless of which
/// database or broker client produced the failure.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Query failed: {message} (query: {query})")]
    Query { query: String, message: String },

    #[error("Topic not ready: {topic}")]
    NotReady { topic: String },

    #[error("No configured broker is reachable: {0}")]
    BrokersUnreachable(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Topic administration failed: {0}")]
    Admin(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cursor on column {column} did not advance past {last} (window returned {rows} rows)")]
    StalledCursor {
        column: String,
        last: String,
        rows: usize,
    },
}

impl ExportError {
    pub fn query(query: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            query: query.into(),
            message: message.into(),
        }
    }

    /// Whether this error came from the destination not being provisioned yet.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::NotReady { .. })
    }
}

pub type Result<T> = std::result::Result<T, ExportError>;

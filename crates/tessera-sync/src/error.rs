use thiserror::Error;

/// Failures raised by the `Database` capability.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("record not found in {table}: {id}")]
    NotFound { table: String, id: String },

    #[error("channel already subscribed: {0}")]
    ChannelInUse(String),

    #[error("write to {table} failed: {reason}")]
    WriteFailed { table: String, reason: String },

    #[error("malformed record in {table}: {source}")]
    Malformed {
        table: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Local input validation, raised before any I/O is attempted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("issue title must not be empty")]
    EmptyTitle,

    #[error("comment text must not be empty")]
    EmptyComment,
}

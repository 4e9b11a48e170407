//! Errors raised by the event log

use std::error::Error as StdError;
use thiserror::Error;

/// Boxed error for wrapping backend-specific errors
pub type BoxedError = Box<dyn StdError + Send + Sync>;

#[derive(Debug, Error)]
pub enum StorageError {
    /// The stream head moved past the version the writer read, the event id
    /// was already taken, or another writer held the database lock
    #[error("concurrent write conflict on {stream} stream {aggregate_id}")]
    ConcurrentWriteConflict {
        stream: &'static str,
        aggregate_id: String,
    },

    #[error("cannot reach event log: {context}")]
    Connection {
        context: String,
        #[source]
        source: BoxedError,
    },

    #[error("event log query failed: {context}")]
    Query {
        context: String,
        #[source]
        source: BoxedError,
    },

    #[error("event log migration failed")]
    Migration(#[source] BoxedError),

    /// The event tables are missing; `Storage::initialize` has not run
    #[error("event log is not initialized: {0}")]
    Uninitialized(String),

    /// The configured backend was not compiled in
    #[error("unsupported backend: {0}")]
    UnsupportedBackend(String),

    /// A row that cannot be turned into, or out of, an event
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl StorageError {
    pub(crate) fn conflict(stream: &'static str, aggregate_id: impl ToString) -> Self {
        Self::ConcurrentWriteConflict {
            stream,
            aggregate_id: aggregate_id.to_string(),
        }
    }

    pub fn connection(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn query(context: impl Into<String>, source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Query {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn migration(source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Migration(Box::new(source))
    }

    /// True when retrying against a fresh read may succeed
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrentWriteConflict { .. })
    }
}

//! Event folds and the lending state machine
//!
//! Everything here is pure: rows in, state out. Nothing is cached; callers
//! reload rows and fold again on every read.

pub mod book;
pub mod borrowing;
pub mod lending;
pub mod source_chain;
pub mod user;

use chrono::{DateTime, Utc};
use thiserror::Error;
use ulid::Ulid;

/// A stored row that cannot be folded, which means the log itself is corrupt
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReconstructionError {
    #[error("event {event_id}: unknown event type '{event_type}'")]
    UnknownEventType { event_id: Ulid, event_type: String },

    #[error("event {event_id}: invalid authors: {reason}")]
    InvalidAuthors { event_id: Ulid, reason: String },

    #[error("event {event_id}: invalid timestamp in {field}: '{value}'")]
    InvalidTimestamp {
        event_id: Ulid,
        field: &'static str,
        value: String,
    },

    #[error("event {event_id}: missing {field}")]
    MissingField { event_id: Ulid, field: &'static str },
}

/// Parse an RFC 3339 column value into a UTC instant
pub(crate) fn parse_instant(
    event_id: Ulid,
    field: &'static str,
    value: &str,
) -> Result<DateTime<Utc>, ReconstructionError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ReconstructionError::InvalidTimestamp {
            event_id,
            field,
            value: value.to_string(),
        })
}

//! Event and row types for the storage layer
//!
//! Services append typed events wrapped in envelopes; stores hand back raw
//! rows. Rows keep payload fields exactly as stored (authors as JSON text,
//! instants as RFC 3339 text) so that decoding, and deciding what counts as
//! corrupt, stays with the code that folds them.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use ulid::Ulid;

use crate::error::StorageError;

/// Renders an instant the way every stored timestamp is written
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Strongly-typed user identifier
///
/// User ids come from the external identity service and are opaque strings,
/// unlike book and lending ids which are generated here as ULIDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A stored `event_type` that no known event family recognises
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown event type '{0}'")]
pub struct UnknownEventType(pub String);

macro_rules! event_type_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownEventType;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownEventType(other.to_string())),
                }
            }
        }
    };
}

event_type_enum! {
    /// Book stream event types
    BookEventType {
        Created => "created",
        Updated => "updated",
        Deleted => "deleted",
    }
}

event_type_enum! {
    /// Lending stream event types
    LendingEventType {
        Borrowed => "borrowed",
        DueDateExtended => "due_date_extended",
        Returned => "returned",
    }
}

event_type_enum! {
    /// User stream event types
    UserEventType {
        Created => "created",
    }
}

/// Full field set carried by a `created` book event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookFields {
    pub code: Option<String>,
    pub title: String,
    pub authors: Vec<String>,
    pub publisher: Option<String>,
    pub published_date: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// Partial overlay carried by an `updated` book event
///
/// `None` means "leave the prior value alone", never "clear it".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookPatch {
    pub title: Option<String>,
    pub authors: Option<Vec<String>>,
    pub publisher: Option<String>,
    pub published_date: Option<String>,
    pub thumbnail_url: Option<String>,
}

impl BookPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.authors.is_none()
            && self.publisher.is_none()
            && self.published_date.is_none()
            && self.thumbnail_url.is_none()
    }
}

/// Domain events for the book stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BookEvent {
    Created(BookFields),
    Updated(BookPatch),
    Deleted { reason: String, memo: Option<String> },
}

impl BookEvent {
    pub fn event_type(&self) -> BookEventType {
        match self {
            BookEvent::Created(_) => BookEventType::Created,
            BookEvent::Updated(_) => BookEventType::Updated,
            BookEvent::Deleted { .. } => BookEventType::Deleted,
        }
    }
}

/// Domain events for a book's lending stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LendingEvent {
    Borrowed { due_date: DateTime<Utc> },
    DueDateExtended { due_date: DateTime<Utc> },
    Returned,
}

impl LendingEvent {
    pub fn event_type(&self) -> LendingEventType {
        match self {
            LendingEvent::Borrowed { .. } => LendingEventType::Borrowed,
            LendingEvent::DueDateExtended { .. } => LendingEventType::DueDateExtended,
            LendingEvent::Returned => LendingEventType::Returned,
        }
    }

    pub fn due_date(&self) -> Option<DateTime<Utc>> {
        match self {
            LendingEvent::Borrowed { due_date } | LendingEvent::DueDateExtended { due_date } => {
                Some(*due_date)
            }
            LendingEvent::Returned => None,
        }
    }
}

/// Domain events for the user stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserEvent {
    Created { name: String },
}

impl UserEvent {
    pub fn event_type(&self) -> UserEventType {
        match self {
            UserEvent::Created { .. } => UserEventType::Created,
        }
    }
}

/// A book event ready to append
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookEventEnvelope {
    pub event_id: Ulid,
    pub book_id: Ulid,
    pub event: BookEvent,
    pub occurred_at: DateTime<Utc>,
}

impl BookEventEnvelope {
    pub fn new(book_id: Ulid, event: BookEvent, occurred_at: DateTime<Utc>) -> Self {
        Self {
            event_id: Ulid::new(),
            book_id,
            event,
            occurred_at,
        }
    }

    /// Flatten into the stored column layout
    pub fn into_row(self) -> Result<BookEventRow, StorageError> {
        let event_type = self.event.event_type().as_str().to_string();
        let mut row = BookEventRow {
            event_id: self.event_id,
            book_id: self.book_id,
            event_type,
            code: None,
            title: None,
            authors: None,
            publisher: None,
            published_date: None,
            thumbnail_url: None,
            delete_reason: None,
            delete_memo: None,
            occurred_at: format_timestamp(self.occurred_at),
        };

        match self.event {
            BookEvent::Created(fields) => {
                row.code = fields.code;
                row.title = Some(fields.title);
                row.authors = Some(encode_authors(&fields.authors)?);
                row.publisher = fields.publisher;
                row.published_date = fields.published_date;
                row.thumbnail_url = fields.thumbnail_url;
            }
            BookEvent::Updated(patch) => {
                row.title = patch.title;
                row.authors = patch.authors.as_deref().map(encode_authors).transpose()?;
                row.publisher = patch.publisher;
                row.published_date = patch.published_date;
                row.thumbnail_url = patch.thumbnail_url;
            }
            BookEvent::Deleted { reason, memo } => {
                row.delete_reason = Some(reason);
                row.delete_memo = memo;
            }
        }

        Ok(row)
    }
}

fn encode_authors(authors: &[String]) -> Result<String, StorageError> {
    serde_json::to_string(authors)
        .map_err(|e| StorageError::InvalidData(format!("failed to serialize authors: {}", e)))
}

/// A lending event ready to append
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LendingEventEnvelope {
    pub event_id: Ulid,
    pub lending_id: Ulid,
    pub book_id: Ulid,
    pub borrower_id: UserId,
    pub event: LendingEvent,
    pub occurred_at: DateTime<Utc>,
}

impl LendingEventEnvelope {
    pub fn new(
        lending_id: Ulid,
        book_id: Ulid,
        borrower_id: UserId,
        event: LendingEvent,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Ulid::new(),
            lending_id,
            book_id,
            borrower_id,
            event,
            occurred_at,
        }
    }

    pub fn into_row(self) -> LendingEventRow {
        LendingEventRow {
            event_id: self.event_id,
            lending_id: self.lending_id,
            book_id: self.book_id,
            borrower_id: self.borrower_id,
            event_type: self.event.event_type().as_str().to_string(),
            due_date: self.event.due_date().map(format_timestamp),
            occurred_at: format_timestamp(self.occurred_at),
        }
    }
}

/// A user event ready to append
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEventEnvelope {
    pub event_id: Ulid,
    pub user_id: UserId,
    pub event: UserEvent,
    pub occurred_at: DateTime<Utc>,
}

impl UserEventEnvelope {
    pub fn new(user_id: UserId, event: UserEvent, occurred_at: DateTime<Utc>) -> Self {
        Self {
            event_id: Ulid::new(),
            user_id,
            event,
            occurred_at,
        }
    }

    pub fn into_row(self) -> UserEventRow {
        let event_type = self.event.event_type().as_str().to_string();
        let UserEvent::Created { name } = self.event;
        UserEventRow {
            event_id: self.event_id,
            user_id: self.user_id,
            event_type,
            name,
            occurred_at: format_timestamp(self.occurred_at),
        }
    }
}

/// One stored book event, fields as persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookEventRow {
    pub event_id: Ulid,
    pub book_id: Ulid,
    pub event_type: String,
    pub code: Option<String>,
    pub title: Option<String>,
    /// JSON array text
    pub authors: Option<String>,
    pub publisher: Option<String>,
    pub published_date: Option<String>,
    pub thumbnail_url: Option<String>,
    pub delete_reason: Option<String>,
    pub delete_memo: Option<String>,
    pub occurred_at: String,
}

/// One stored lending event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LendingEventRow {
    pub event_id: Ulid,
    pub lending_id: Ulid,
    pub book_id: Ulid,
    pub borrower_id: UserId,
    pub event_type: String,
    pub due_date: Option<String>,
    pub occurred_at: String,
}

/// One stored user event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEventRow {
    pub event_id: Ulid,
    pub user_id: UserId,
    pub event_type: String,
    pub name: String,
    pub occurred_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_format_timestamp_second_precision() {
        let t = at() + chrono::Duration::milliseconds(250);
        assert_eq!(format_timestamp(t), "2024-04-01T09:30:00Z");
    }

    #[test]
    fn test_event_type_parsing() {
        assert_eq!("created".parse::<BookEventType>(), Ok(BookEventType::Created));
        assert_eq!(
            "due_date_extended".parse::<LendingEventType>(),
            Ok(LendingEventType::DueDateExtended)
        );
        assert_eq!(
            "Created".parse::<BookEventType>(),
            Err(UnknownEventType("Created".into()))
        );
        assert!("returned".parse::<UserEventType>().is_err());
    }

    #[test]
    fn test_created_envelope_into_row() {
        let book_id = Ulid::new();
        let envelope = BookEventEnvelope::new(
            book_id,
            BookEvent::Created(BookFields {
                code: Some("9784000000000".into()),
                title: "Title".into(),
                authors: vec!["A".into(), "B".into()],
                publisher: None,
                published_date: Some("2020-01-01".into()),
                thumbnail_url: None,
            }),
            at(),
        );

        let row = envelope.into_row().unwrap();
        assert_eq!(row.book_id, book_id);
        assert_eq!(row.event_type, "created");
        assert_eq!(row.title.as_deref(), Some("Title"));
        assert_eq!(row.authors.as_deref(), Some(r#"["A","B"]"#));
        assert_eq!(row.publisher, None);
        assert_eq!(row.occurred_at, "2024-04-01T09:30:00Z");
    }

    #[test]
    fn test_updated_envelope_keeps_absent_fields_null() {
        let envelope = BookEventEnvelope::new(
            Ulid::new(),
            BookEvent::Updated(BookPatch {
                publisher: Some("X".into()),
                ..Default::default()
            }),
            at(),
        );

        let row = envelope.into_row().unwrap();
        assert_eq!(row.event_type, "updated");
        assert_eq!(row.title, None);
        assert_eq!(row.authors, None);
        assert_eq!(row.publisher.as_deref(), Some("X"));
    }

    #[test]
    fn test_deleted_envelope_into_row() {
        let envelope = BookEventEnvelope::new(
            Ulid::new(),
            BookEvent::Deleted {
                reason: "lost".into(),
                memo: Some("left on a train".into()),
            },
            at(),
        );

        let row = envelope.into_row().unwrap();
        assert_eq!(row.event_type, "deleted");
        assert_eq!(row.delete_reason.as_deref(), Some("lost"));
        assert_eq!(row.delete_memo.as_deref(), Some("left on a train"));
    }

    #[test]
    fn test_lending_envelope_into_row() {
        let due = at() + chrono::Duration::days(7);
        let row = LendingEventEnvelope::new(
            Ulid::new(),
            Ulid::new(),
            UserId::new("u1"),
            LendingEvent::Borrowed { due_date: due },
            at(),
        )
        .into_row();
        assert_eq!(row.event_type, "borrowed");
        assert_eq!(row.due_date.as_deref(), Some("2024-04-08T09:30:00Z"));

        let row = LendingEventEnvelope::new(
            Ulid::new(),
            Ulid::new(),
            UserId::new("u1"),
            LendingEvent::Returned,
            at(),
        )
        .into_row();
        assert_eq!(row.event_type, "returned");
        assert_eq!(row.due_date, None);
    }

    #[test]
    fn test_book_patch_is_empty() {
        assert!(BookPatch::default().is_empty());
        let patch = BookPatch {
            thumbnail_url: Some("https://example.com/t.png".into()),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_user_id_display() {
        let id = UserId::from("abc123");
        assert_eq!(id.to_string(), "abc123");
        assert_eq!(id.as_ref(), "abc123");
    }
}

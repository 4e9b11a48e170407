//! Book stream fold

use chrono::{DateTime, Utc};
use holocron_storage::{BookEventRow, BookEventType, UserId};
use serde::Serialize;
use ulid::Ulid;

use super::{parse_instant, ReconstructionError};

/// How strictly the serialized author list is checked
///
/// Single-book reads and writes require a non-empty list on `created`.
/// Listing and borrowing views accept an absent or empty list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorsPolicy {
    Required,
    Lenient,
}

/// Current state of one book lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookState {
    pub id: Ulid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub title: String,
    pub authors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(rename = "thumbnailURL", skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BookStatus {
    Available,
    Borrowed,
}

/// Who holds a borrowed book
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Borrower {
    pub id: UserId,
    pub name: Option<String>,
    pub borrowed_at: DateTime<Utc>,
}

/// A book together with its lending status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookView {
    #[serde(flatten)]
    pub book: BookState,
    pub status: BookStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub borrower: Option<Borrower>,
}

impl BookView {
    pub fn available(book: BookState) -> Self {
        Self {
            book,
            status: BookStatus::Available,
            borrower: None,
        }
    }

    pub fn borrowed(book: BookState, borrower: Borrower) -> Self {
        Self {
            book,
            status: BookStatus::Borrowed,
            borrower: Some(borrower),
        }
    }
}

/// Fold one book's rows, oldest first, into its current lifecycle
///
/// - `created` starts a fresh lifecycle, discarding anything before it
/// - `updated` overlays each present field; absent fields keep their value
/// - `deleted` ends the lifecycle
///
/// Returns `None` when the stream is empty or its last lifecycle was deleted.
/// An `updated` row with no open lifecycle is skipped.
pub fn reconstruct_book(
    rows: &[BookEventRow],
    policy: AuthorsPolicy,
) -> Result<Option<BookState>, ReconstructionError> {
    let mut state: Option<BookState> = None;

    for row in rows {
        let event_type = row.event_type.parse::<BookEventType>().map_err(|e| {
            ReconstructionError::UnknownEventType {
                event_id: row.event_id,
                event_type: e.0,
            }
        })?;
        let occurred_at = parse_instant(row.event_id, "occurred_at", &row.occurred_at)?;

        match event_type {
            BookEventType::Created => {
                let title = row
                    .title
                    .clone()
                    .ok_or(ReconstructionError::MissingField {
                        event_id: row.event_id,
                        field: "title",
                    })?;
                let authors = decode_created_authors(row, policy)?;

                state = Some(BookState {
                    id: row.book_id,
                    code: row.code.clone(),
                    title,
                    authors,
                    publisher: row.publisher.clone(),
                    published_date: row.published_date.clone(),
                    thumbnail_url: row.thumbnail_url.clone(),
                    created_at: occurred_at,
                    updated_at: occurred_at,
                });
            }
            BookEventType::Updated => {
                let Some(book) = state.as_mut() else {
                    tracing::debug!(event_id = %row.event_id, "skipping update outside a lifecycle");
                    continue;
                };

                if let Some(title) = &row.title {
                    book.title = title.clone();
                }
                if let Some(raw) = row.authors.as_deref().filter(|s| !s.is_empty()) {
                    let authors = decode_authors_json(row.event_id, raw)?;
                    if policy == AuthorsPolicy::Required && authors.is_empty() {
                        return Err(ReconstructionError::InvalidAuthors {
                            event_id: row.event_id,
                            reason: "empty list".to_string(),
                        });
                    }
                    book.authors = authors;
                }
                if let Some(publisher) = &row.publisher {
                    book.publisher = Some(publisher.clone());
                }
                if let Some(published_date) = &row.published_date {
                    book.published_date = Some(published_date.clone());
                }
                if let Some(thumbnail_url) = &row.thumbnail_url {
                    book.thumbnail_url = Some(thumbnail_url.clone());
                }
                book.updated_at = occurred_at;
            }
            BookEventType::Deleted => {
                state = None;
            }
        }
    }

    Ok(state)
}

fn decode_created_authors(
    row: &BookEventRow,
    policy: AuthorsPolicy,
) -> Result<Vec<String>, ReconstructionError> {
    let raw = row.authors.as_deref().filter(|s| !s.is_empty());

    match (raw, policy) {
        (None, AuthorsPolicy::Lenient) => Ok(Vec::new()),
        (None, AuthorsPolicy::Required) => Err(ReconstructionError::InvalidAuthors {
            event_id: row.event_id,
            reason: "absent".to_string(),
        }),
        (Some(raw), AuthorsPolicy::Lenient) => decode_authors_json(row.event_id, raw),
        (Some(raw), AuthorsPolicy::Required) => {
            let authors = decode_authors_json(row.event_id, raw)?;
            if authors.is_empty() {
                return Err(ReconstructionError::InvalidAuthors {
                    event_id: row.event_id,
                    reason: "empty list".to_string(),
                });
            }
            Ok(authors)
        }
    }
}

fn decode_authors_json(event_id: Ulid, raw: &str) -> Result<Vec<String>, ReconstructionError> {
    serde_json::from_str(raw).map_err(|e| ReconstructionError::InvalidAuthors {
        event_id,
        reason: e.to_string(),
    })
}

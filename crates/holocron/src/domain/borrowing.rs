//! Borrowing list entries: an open lending joined with its book

use chrono::{DateTime, Utc};
use serde::Serialize;
use ulid::Ulid;

use super::book::BookState;
use super::lending::CurrentLending;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowingBook {
    pub lending_id: Ulid,
    pub book_id: Ulid,
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
    pub borrowed_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
}

impl BorrowingBook {
    /// `book` should come from a lenient fold, so a missing author list shows as empty
    pub fn new(lending: &CurrentLending, book: &BookState) -> Self {
        Self {
            lending_id: lending.lending_id,
            book_id: book.id,
            code: book.code.clone(),
            title: book.title.clone(),
            authors: book.authors.clone(),
            publisher: book.publisher.clone(),
            published_date: book.published_date.clone(),
            thumbnail_url: book.thumbnail_url.clone(),
            borrowed_at: lending.borrowed_at,
            due_date: lending.due_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BorrowingList {
    pub items: Vec<BorrowingBook>,
    pub total: usize,
}

impl From<Vec<BorrowingBook>> for BorrowingList {
    fn from(items: Vec<BorrowingBook>) -> Self {
        let total = items.len();
        Self { items, total }
    }
}

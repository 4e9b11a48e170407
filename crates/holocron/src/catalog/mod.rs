//! Read side of the catalog
//!
//! Every query reloads the relevant event streams and folds them again;
//! nothing derived is cached between calls. Each stream read also reports
//! its version (the id of the stream's last event) so a command can append
//! against exactly the state it validated.

pub mod listing;

use holocron_common::BookCode;
use holocron_storage::{Storage, StorageError, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;
use ulid::Ulid;

use crate::domain::book::{reconstruct_book, AuthorsPolicy, BookState, BookView, Borrower};
use crate::domain::borrowing::BorrowingBook;
use crate::domain::lending::{current_lending, open_lendings, CurrentLending};
use crate::domain::user::{reconstruct_user, UserState};
use crate::domain::ReconstructionError;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Corrupt event: {0}")]
    Corrupt(#[from] ReconstructionError),
}

/// A derived value plus the version of the stream it was folded from
///
/// `version` is `None` for a stream with no events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: Option<Ulid>,
}

pub struct Catalog {
    storage: Arc<dyn Storage>,
}

impl Catalog {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn book(
        &self,
        id: Ulid,
        policy: AuthorsPolicy,
    ) -> Result<Versioned<Option<BookState>>, CatalogError> {
        let rows = self.storage.load_book_events(id).await?;
        Ok(Versioned {
            version: rows.last().map(|r| r.event_id),
            value: reconstruct_book(&rows, policy)?,
        })
    }

    /// The open lending of a book, versioned by the book's lending stream
    pub async fn lending(
        &self,
        book_id: Ulid,
    ) -> Result<Versioned<Option<CurrentLending>>, CatalogError> {
        let rows = self.storage.load_lending_events_for_book(book_id).await?;
        Ok(Versioned {
            version: rows.last().map(|r| r.event_id),
            value: current_lending(&rows)?,
        })
    }

    pub async fn user(&self, id: &UserId) -> Result<Versioned<Option<UserState>>, CatalogError> {
        let rows = self.storage.load_user_events(id).await?;
        Ok(Versioned {
            version: rows.last().map(|r| r.event_id),
            value: reconstruct_user(&rows)?,
        })
    }

    /// Every book whose current lifecycle is live, newest first
    pub async fn current_books(&self) -> Result<Vec<BookState>, CatalogError> {
        let rows = self.storage.load_all_book_events().await?;

        let mut streams: HashMap<Ulid, Vec<_>> = HashMap::new();
        for row in rows {
            streams.entry(row.book_id).or_default().push(row);
        }

        let mut books = Vec::with_capacity(streams.len());
        for rows in streams.values() {
            if let Some(book) = reconstruct_book(rows, AuthorsPolicy::Lenient)? {
                books.push(book);
            }
        }

        books.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(books)
    }

    /// Most recently registered live book carrying `code`
    pub async fn find_book_by_code(
        &self,
        code: &BookCode,
    ) -> Result<Option<BookState>, CatalogError> {
        Ok(self
            .current_books()
            .await?
            .into_iter()
            .find(|b| b.code.as_deref() == Some(code.as_str())))
    }

    /// Attach lending status, and the borrower's name when known
    pub async fn book_view(&self, book: BookState) -> Result<BookView, CatalogError> {
        let Some(lending) = self.lending(book.id).await?.value else {
            return Ok(BookView::available(book));
        };

        let name = self
            .user(&lending.borrower_id)
            .await?
            .value
            .map(|user| user.name);

        Ok(BookView::borrowed(
            book,
            Borrower {
                id: lending.borrower_id,
                name,
                borrowed_at: lending.borrowed_at,
            },
        ))
    }

    /// Open lendings held by `borrower`, joined with their books
    ///
    /// A lending whose book no longer reconstructs is skipped.
    pub async fn borrowings(&self, borrower: &UserId) -> Result<Vec<BorrowingBook>, CatalogError> {
        let rows = self.storage.load_lending_events_for_borrower(borrower).await?;

        let mut items = Vec::new();
        for lending in open_lendings(&rows)? {
            if &lending.borrower_id != borrower {
                continue;
            }
            match self.book(lending.book_id, AuthorsPolicy::Lenient).await?.value {
                Some(book) => items.push(BorrowingBook::new(&lending, &book)),
                None => warn!(
                    lending_id = %lending.lending_id,
                    book_id = %lending.book_id,
                    "open lending refers to a book that no longer exists; skipping"
                ),
            }
        }
        Ok(items)
    }
}

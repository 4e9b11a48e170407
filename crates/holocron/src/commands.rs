//! Command handlers for catalog, user and lending operations
//!
//! This module centralizes validation and event generation for all write
//! operations. Each command folds the streams it needs, checks the requested
//! transition against that state, and appends at most one event carrying the
//! stream version it read. A concurrent writer on the same stream surfaces as
//! `CommandError::Conflict`.

use chrono::{DateTime, SubsecRound, Utc};
use holocron_common::{
    parse_authors, parse_code, parse_delete_reason, parse_title, parse_user_name,
    to_pagination, to_search_keyword, BookAuthors, BookCode, BookTitle, ValidationError,
};
use holocron_storage::{
    BookEvent, BookEventEnvelope, BookFields, BookPatch, LendingEvent, LendingEventEnvelope,
    Storage, StorageError, UserEvent, UserEventEnvelope, UserId,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::bookinfo::{BookInfo, BookInfoFetcher, CatalogCacheSource, ExternalApiSource};
use crate::catalog::listing::{listing_chain, BookPage, ListQuery, ListingChain};
use crate::catalog::{Catalog, CatalogError};
use crate::domain::book::{AuthorsPolicy, BookState, BookView};
use crate::domain::borrowing::BorrowingList;
use crate::domain::lending::{decide_borrow, validate_return, BorrowDecision, LendingError};
use crate::domain::source_chain::SourceChain;
use crate::domain::user::{default_user_name, UserState};
use crate::domain::ReconstructionError;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid due days {0}: must be at least 1")]
    InvalidDueDays(i64),

    #[error("Due date out of range")]
    DueDateOutOfRange,

    #[error("Book not found: {0}")]
    BookNotFound(Ulid),

    #[error("No book info found for code {0}")]
    BookInfoNotFound(String),

    #[error("Book listing is unavailable")]
    BookListUnavailable,

    #[error("Book {0} is already borrowed by another user")]
    AlreadyBorrowed(Ulid),

    #[error("Book {0} is currently borrowed")]
    BookBorrowed(Ulid),

    #[error("Book {0} is not currently borrowed")]
    NotBorrowed(Ulid),

    #[error("Book {0} is borrowed by another user")]
    NotBorrower(Ulid),

    #[error("User already exists: {0}")]
    UserAlreadyExists(UserId),

    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("Corrupt event: {0}")]
    CorruptEvent(#[from] ReconstructionError),

    #[error("Storage error: {0}")]
    Storage(StorageError),
}

/// Caller-facing classification of a `CommandError`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself is malformed; the caller can fix it
    Validation,
    NotFound,
    /// The request is well-formed but the current state rejects it
    Conflict,
    /// A stored event could not be read back
    DataIntegrity,
    Internal,
}

impl CommandError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommandError::Validation(_)
            | CommandError::InvalidDueDays(_)
            | CommandError::DueDateOutOfRange => ErrorKind::Validation,
            CommandError::BookNotFound(_) | CommandError::BookInfoNotFound(_) => {
                ErrorKind::NotFound
            }
            CommandError::AlreadyBorrowed(_)
            | CommandError::BookBorrowed(_)
            | CommandError::NotBorrowed(_)
            | CommandError::NotBorrower(_)
            | CommandError::UserAlreadyExists(_)
            | CommandError::Conflict(_) => ErrorKind::Conflict,
            CommandError::CorruptEvent(_) | CommandError::Storage(StorageError::InvalidData(_)) => {
                ErrorKind::DataIntegrity
            }
            CommandError::BookListUnavailable | CommandError::Storage(_) => ErrorKind::Internal,
        }
    }

    fn from_lending(book_id: Ulid, error: LendingError) -> Self {
        debug!(book_id = %book_id, reason = %error, "lending transition rejected");
        match error {
            LendingError::InvalidDueDays(days) => CommandError::InvalidDueDays(days),
            LendingError::DueDateOutOfRange => CommandError::DueDateOutOfRange,
            LendingError::AlreadyBorrowed => CommandError::AlreadyBorrowed(book_id),
            LendingError::NotBorrowed => CommandError::NotBorrowed(book_id),
            LendingError::NotBorrower => CommandError::NotBorrower(book_id),
        }
    }
}

impl From<StorageError> for CommandError {
    fn from(error: StorageError) -> Self {
        if error.is_conflict() {
            return CommandError::Conflict(error.to_string());
        }
        CommandError::Storage(error)
    }
}

impl From<CatalogError> for CommandError {
    fn from(error: CatalogError) -> Self {
        match error {
            CatalogError::Storage(e) => e.into(),
            CatalogError::Corrupt(e) => CommandError::CorruptEvent(e),
        }
    }
}

pub type CommandResult<T> = Result<T, CommandError>;

/// Source of "now" for every event the handler appends
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Wall clock truncated to whole seconds, matching stored precision
pub fn system_clock() -> Clock {
    Arc::new(|| Utc::now().trunc_subsecs(0))
}

/// Input for registering a book by hand
#[derive(Debug, Clone, Default)]
pub struct NewBook {
    pub code: Option<String>,
    pub title: String,
    pub authors: Vec<String>,
    pub publisher: Option<String>,
    pub published_date: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// Fields to overlay onto a book; `None` leaves the field alone
#[derive(Debug, Clone, Default)]
pub struct BookUpdate {
    pub title: Option<String>,
    pub authors: Option<Vec<String>>,
    pub publisher: Option<String>,
    pub published_date: Option<String>,
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListBooksRequest {
    pub code: Option<String>,
    pub keyword: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowReceipt {
    pub lending_id: Ulid,
    pub book_id: Ulid,
    pub borrower_id: UserId,
    pub borrowed_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub due_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnReceipt {
    pub lending_id: Ulid,
    pub book_id: Ulid,
    pub returned_at: DateTime<Utc>,
}

pub struct CommandHandler {
    storage: Arc<dyn Storage>,
    catalog: Arc<Catalog>,
    book_info: SourceChain<BookCode, BookInfo>,
    listing: ListingChain,
    clock: Clock,
}

impl CommandHandler {
    /// Build a handler whose book-info lookup tries the catalog first, then
    /// each of `fetchers` in order
    pub fn new(storage: Arc<dyn Storage>, fetchers: Vec<Box<dyn BookInfoFetcher>>) -> Self {
        let catalog = Arc::new(Catalog::new(storage.clone()));

        let mut book_info =
            SourceChain::new().with_source(CatalogCacheSource::new(catalog.clone()));
        for fetcher in fetchers {
            book_info.push(Box::new(ExternalApiSource::new(fetcher)));
        }

        Self {
            storage,
            listing: listing_chain(catalog.clone()),
            catalog,
            book_info,
            clock: system_clock(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Register a book from explicit fields
    pub async fn create_book(&self, input: NewBook) -> CommandResult<BookState> {
        // Validate inputs
        let title = parse_title(&input.title)?;
        let authors = parse_authors(input.authors)?;
        let code = input.code.as_deref().map(parse_code).transpose()?;

        self.append_created(BookFields {
            code: code.map(BookCode::into_inner),
            title: title.into_inner(),
            authors: authors.into_inner(),
            publisher: input.publisher,
            published_date: input.published_date,
            thumbnail_url: input.thumbnail_url,
        })
        .await
    }

    /// Register a book from bibliographic info looked up by its code
    pub async fn create_book_by_code(&self, code: &str) -> CommandResult<BookState> {
        let code = parse_code(code)?;

        let info = self.book_info.fetch(&code).await.map_err(|e| {
            debug!(code = %code, error = %e, "book info lookup exhausted");
            CommandError::BookInfoNotFound(code.to_string())
        })?;

        let title = parse_title(&info.title)?;
        let authors = parse_authors(info.authors)?;

        self.append_created(BookFields {
            code: Some(code.into_inner()),
            title: title.into_inner(),
            authors: authors.into_inner(),
            publisher: info.publisher,
            published_date: info.published_date,
            thumbnail_url: info.thumbnail_url,
        })
        .await
    }

    async fn append_created(&self, fields: BookFields) -> CommandResult<BookState> {
        let book_id = Ulid::new();
        let envelope = BookEventEnvelope::new(book_id, BookEvent::Created(fields), self.now());

        self.storage.append_book_event(envelope, None).await?;
        info!(book_id = %book_id, "book created");

        self.catalog
            .book(book_id, AuthorsPolicy::Required)
            .await?
            .value
            .ok_or(CommandError::BookNotFound(book_id))
    }

    /// Overlay the present fields of `update` onto a book
    ///
    /// An update with no fields appends nothing and returns the book as is.
    pub async fn update_book(&self, id: Ulid, update: BookUpdate) -> CommandResult<BookState> {
        let current = self.catalog.book(id, AuthorsPolicy::Required).await?;
        let book = current.value.ok_or(CommandError::BookNotFound(id))?;

        let patch = BookPatch {
            title: update
                .title
                .as_deref()
                .map(parse_title)
                .transpose()?
                .map(BookTitle::into_inner),
            authors: update
                .authors
                .map(parse_authors)
                .transpose()?
                .map(BookAuthors::into_inner),
            publisher: update.publisher,
            published_date: update.published_date,
            thumbnail_url: update.thumbnail_url,
        };

        if patch.is_empty() {
            debug!(book_id = %id, "update carries no fields; nothing to append");
            return Ok(book);
        }

        let envelope = BookEventEnvelope::new(id, BookEvent::Updated(patch), self.now());
        self.storage
            .append_book_event(envelope, current.version)
            .await?;
        info!(book_id = %id, "book updated");

        self.catalog
            .book(id, AuthorsPolicy::Required)
            .await?
            .value
            .ok_or(CommandError::BookNotFound(id))
    }

    /// Delete a book that is not currently lent out
    pub async fn delete_book(
        &self,
        id: Ulid,
        reason: &str,
        memo: Option<String>,
    ) -> CommandResult<()> {
        let reason = parse_delete_reason(reason)?;

        let current = self.catalog.book(id, AuthorsPolicy::Required).await?;
        if current.value.is_none() {
            return Err(CommandError::BookNotFound(id));
        }

        if let Some(lending) = self.catalog.lending(id).await?.value {
            debug!(
                book_id = %id,
                lending_id = %lending.lending_id,
                "refusing to delete a borrowed book"
            );
            return Err(CommandError::BookBorrowed(id));
        }

        let event = BookEvent::Deleted {
            reason: reason.as_str().to_string(),
            memo,
        };
        self.storage
            .append_book_event(BookEventEnvelope::new(id, event, self.now()), current.version)
            .await?;
        info!(book_id = %id, reason = %reason, "book deleted");

        Ok(())
    }

    pub async fn get_book(&self, id: Ulid) -> CommandResult<BookView> {
        let book = self
            .catalog
            .book(id, AuthorsPolicy::Required)
            .await?
            .value
            .ok_or(CommandError::BookNotFound(id))?;
        Ok(self.catalog.book_view(book).await?)
    }

    /// List current books, filtered by code or keyword, one page at a time
    pub async fn list_books(&self, request: ListBooksRequest) -> CommandResult<BookPage> {
        let code = request
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .map(parse_code)
            .transpose()?;
        let query = ListQuery {
            code,
            keyword: to_search_keyword(request.keyword.as_deref()),
        };
        let page = to_pagination(request.limit, request.offset);

        let books = self.listing.fetch(&query).await.map_err(|e| {
            warn!(error = %e, "book listing unavailable");
            CommandError::BookListUnavailable
        })?;

        let total = books.len();
        let mut items = Vec::new();
        for book in books
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(page.limit() as usize)
        {
            items.push(self.catalog.book_view(book).await?);
        }

        Ok(BookPage { items, total })
    }

    /// Create a user; an absent or empty name gets a generated one
    pub async fn create_user(&self, user_id: UserId, name: Option<&str>) -> CommandResult<UserState> {
        let name = match name.filter(|n| !n.is_empty()) {
            Some(n) => parse_user_name(n)?.into_inner(),
            None => default_user_name(&user_id),
        };

        let current = self.catalog.user(&user_id).await?;
        if current.value.is_some() {
            return Err(CommandError::UserAlreadyExists(user_id));
        }

        let envelope =
            UserEventEnvelope::new(user_id.clone(), UserEvent::Created { name }, self.now());
        self.storage
            .append_user_event(envelope, current.version)
            .await?;
        info!(user_id = %user_id, "user created");

        self.catalog
            .user(&user_id)
            .await?
            .value
            .ok_or_else(|| {
                CommandError::Conflict(format!("user {} vanished after creation", user_id))
            })
    }

    /// Borrow a book, or extend the due date when `borrower` already holds it
    pub async fn borrow_book(
        &self,
        book_id: Ulid,
        borrower: &UserId,
        due_days: Option<i64>,
    ) -> CommandResult<BorrowReceipt> {
        self.require_book(book_id).await?;

        let lending = self.catalog.lending(book_id).await?;
        let now = self.now();
        let decision = decide_borrow(lending.value.as_ref(), borrower, now, due_days)
            .map_err(|e| CommandError::from_lending(book_id, e))?;

        match decision {
            BorrowDecision::Open {
                lending_id,
                due_date,
                due_days,
            } => {
                let envelope = LendingEventEnvelope::new(
                    lending_id,
                    book_id,
                    borrower.clone(),
                    LendingEvent::Borrowed { due_date },
                    now,
                );
                self.storage
                    .append_lending_event(envelope, lending.version)
                    .await?;
                info!(
                    book_id = %book_id,
                    lending_id = %lending_id,
                    user_id = %borrower,
                    due_date = %due_date,
                    "book borrowed"
                );

                Ok(BorrowReceipt {
                    lending_id,
                    book_id,
                    borrower_id: borrower.clone(),
                    borrowed_at: now,
                    due_date,
                    due_days,
                })
            }
            BorrowDecision::Extend {
                lending: current,
                due_date,
                due_days,
            } => {
                let envelope = LendingEventEnvelope::new(
                    current.lending_id,
                    book_id,
                    borrower.clone(),
                    LendingEvent::DueDateExtended { due_date },
                    now,
                );
                self.storage
                    .append_lending_event(envelope, lending.version)
                    .await?;
                info!(
                    book_id = %book_id,
                    lending_id = %current.lending_id,
                    user_id = %borrower,
                    due_date = %due_date,
                    "due date extended"
                );

                Ok(BorrowReceipt {
                    lending_id: current.lending_id,
                    book_id,
                    borrower_id: current.borrower_id,
                    borrowed_at: current.borrowed_at,
                    due_date,
                    due_days,
                })
            }
        }
    }

    /// Return a book; only its current borrower may do so
    pub async fn return_book(
        &self,
        book_id: Ulid,
        requester: &UserId,
    ) -> CommandResult<ReturnReceipt> {
        self.require_book(book_id).await?;

        let lending = self.catalog.lending(book_id).await?;
        let current = validate_return(lending.value.as_ref(), requester)
            .map_err(|e| CommandError::from_lending(book_id, e))?;

        let now = self.now();
        let envelope = LendingEventEnvelope::new(
            current.lending_id,
            book_id,
            current.borrower_id.clone(),
            LendingEvent::Returned,
            now,
        );
        self.storage
            .append_lending_event(envelope, lending.version)
            .await?;
        info!(
            book_id = %book_id,
            lending_id = %current.lending_id,
            user_id = %requester,
            "book returned"
        );

        Ok(ReturnReceipt {
            lending_id: current.lending_id,
            book_id,
            returned_at: now,
        })
    }

    /// Books `borrower` currently holds
    pub async fn list_borrowings(&self, borrower: &UserId) -> CommandResult<BorrowingList> {
        Ok(self.catalog.borrowings(borrower).await?.into())
    }

    async fn require_book(&self, id: Ulid) -> CommandResult<BookState> {
        self.catalog
            .book(id, AuthorsPolicy::Lenient)
            .await?
            .value
            .ok_or(CommandError::BookNotFound(id))
    }
}

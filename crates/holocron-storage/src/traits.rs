//! Storage trait definitions
//!
//! The event log is split into three stream families:
//! - BookEventStore: one stream per book
//! - LendingEventStore: one stream per book, holding every lending of that book
//! - UserEventStore: one stream per user
//!
//! Rows come back in insertion order. Appends take the event id of the
//! stream's latest row as `expected_version` (`None` for an empty stream) and
//! fail with `StorageError::ConcurrentWriteConflict` on mismatch, writing nothing.

use async_trait::async_trait;
use ulid::Ulid;

use crate::error::StorageError;
use crate::types::{
    BookEventEnvelope, BookEventRow, LendingEventEnvelope, LendingEventRow, UserEventEnvelope,
    UserEventRow, UserId,
};

#[async_trait]
pub trait BookEventStore: Send + Sync {
    /// Append to the stream of `event.book_id`
    ///
    /// # Errors
    /// * `StorageError::ConcurrentWriteConflict` - Version mismatch or reused event id
    /// * `StorageError::Query` - Database error
    async fn append_book_event(
        &self,
        event: BookEventEnvelope,
        expected_version: Option<Ulid>,
    ) -> Result<(), StorageError>;

    /// All events of one book, oldest first
    async fn load_book_events(&self, book_id: Ulid) -> Result<Vec<BookEventRow>, StorageError>;

    /// Every book event in the log, oldest first
    async fn load_all_book_events(&self) -> Result<Vec<BookEventRow>, StorageError>;
}

#[async_trait]
pub trait LendingEventStore: Send + Sync {
    /// Append to the lending stream of `event.book_id`
    ///
    /// # Errors
    /// * `StorageError::ConcurrentWriteConflict` - Version mismatch or reused event id
    /// * `StorageError::Query` - Database error
    async fn append_lending_event(
        &self,
        event: LendingEventEnvelope,
        expected_version: Option<Ulid>,
    ) -> Result<(), StorageError>;

    /// Every lending event recorded against a book, oldest first
    async fn load_lending_events_for_book(
        &self,
        book_id: Ulid,
    ) -> Result<Vec<LendingEventRow>, StorageError>;

    /// Every lending event carrying this borrower, across all books
    async fn load_lending_events_for_borrower(
        &self,
        borrower_id: &UserId,
    ) -> Result<Vec<LendingEventRow>, StorageError>;
}

#[async_trait]
pub trait UserEventStore: Send + Sync {
    async fn append_user_event(
        &self,
        event: UserEventEnvelope,
        expected_version: Option<Ulid>,
    ) -> Result<(), StorageError>;

    async fn load_user_events(&self, user_id: &UserId) -> Result<Vec<UserEventRow>, StorageError>;
}

/// Combined storage interface with lifecycle management
#[async_trait]
pub trait Storage: BookEventStore + LendingEventStore + UserEventStore + Send + Sync {
    /// Short backend identifier for logs
    fn backend_name(&self) -> &'static str;

    /// Create or migrate the schema; safe to call more than once
    async fn initialize(&self) -> Result<(), StorageError>;

    /// Verify the backend is reachable and initialised
    async fn health_check(&self) -> Result<(), StorageError>;

    /// Release connections
    async fn close(&self) -> Result<(), StorageError>;
}

//! In-process storage backend
//!
//! Keeps each event family in a `Vec` behind one `parking_lot::RwLock`, so
//! the version check and the push happen under the same write guard. Nothing
//! survives the process; use it for tests and dry runs.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;
use ulid::Ulid;

use crate::error::StorageError;
use crate::traits::{BookEventStore, LendingEventStore, Storage, UserEventStore};
use crate::types::{
    BookEventEnvelope, BookEventRow, LendingEventEnvelope, LendingEventRow, UserEventEnvelope,
    UserEventRow, UserId,
};

#[derive(Debug, Default)]
struct EventLog {
    books: Vec<BookEventRow>,
    lendings: Vec<LendingEventRow>,
    users: Vec<UserEventRow>,
    event_ids: HashSet<Ulid>,
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    log: RwLock<EventLog>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn check_version(
    stream: &'static str,
    aggregate_id: impl ToString,
    current: Option<Ulid>,
    expected: Option<Ulid>,
) -> Result<(), StorageError> {
    if current != expected {
        return Err(StorageError::conflict(stream, aggregate_id));
    }
    Ok(())
}

#[async_trait]
impl BookEventStore for MemoryStorage {
    async fn append_book_event(
        &self,
        event: BookEventEnvelope,
        expected_version: Option<Ulid>,
    ) -> Result<(), StorageError> {
        let row = event.into_row()?;
        let mut log = self.log.write();

        let current = log
            .books
            .iter()
            .rev()
            .find(|r| r.book_id == row.book_id)
            .map(|r| r.event_id);
        check_version("book", row.book_id, current, expected_version)?;

        if !log.event_ids.insert(row.event_id) {
            return Err(StorageError::conflict("book", row.book_id));
        }
        log.books.push(row);
        Ok(())
    }

    async fn load_book_events(&self, book_id: Ulid) -> Result<Vec<BookEventRow>, StorageError> {
        let log = self.log.read();
        Ok(log
            .books
            .iter()
            .filter(|r| r.book_id == book_id)
            .cloned()
            .collect())
    }

    async fn load_all_book_events(&self) -> Result<Vec<BookEventRow>, StorageError> {
        Ok(self.log.read().books.clone())
    }
}

#[async_trait]
impl LendingEventStore for MemoryStorage {
    async fn append_lending_event(
        &self,
        event: LendingEventEnvelope,
        expected_version: Option<Ulid>,
    ) -> Result<(), StorageError> {
        let row = event.into_row();
        let mut log = self.log.write();

        let current = log
            .lendings
            .iter()
            .rev()
            .find(|r| r.book_id == row.book_id)
            .map(|r| r.event_id);
        check_version("lending", row.book_id, current, expected_version)?;

        if !log.event_ids.insert(row.event_id) {
            return Err(StorageError::conflict("lending", row.book_id));
        }
        log.lendings.push(row);
        Ok(())
    }

    async fn load_lending_events_for_book(
        &self,
        book_id: Ulid,
    ) -> Result<Vec<LendingEventRow>, StorageError> {
        let log = self.log.read();
        Ok(log
            .lendings
            .iter()
            .filter(|r| r.book_id == book_id)
            .cloned()
            .collect())
    }

    async fn load_lending_events_for_borrower(
        &self,
        borrower_id: &UserId,
    ) -> Result<Vec<LendingEventRow>, StorageError> {
        let log = self.log.read();
        Ok(log
            .lendings
            .iter()
            .filter(|r| &r.borrower_id == borrower_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserEventStore for MemoryStorage {
    async fn append_user_event(
        &self,
        event: UserEventEnvelope,
        expected_version: Option<Ulid>,
    ) -> Result<(), StorageError> {
        let row = event.into_row();
        let mut log = self.log.write();

        let current = log
            .users
            .iter()
            .rev()
            .find(|r| r.user_id == row.user_id)
            .map(|r| r.event_id);
        check_version("user", &row.user_id, current, expected_version)?;

        if !log.event_ids.insert(row.event_id) {
            return Err(StorageError::conflict("user", &row.user_id));
        }
        log.users.push(row);
        Ok(())
    }

    async fn load_user_events(&self, user_id: &UserId) -> Result<Vec<UserEventRow>, StorageError> {
        let log = self.log.read();
        Ok(log
            .users
            .iter()
            .filter(|r| &r.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn initialize(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

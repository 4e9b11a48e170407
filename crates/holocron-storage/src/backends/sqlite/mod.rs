//! SQLite storage backend implementation using sqlx
//!
//! # Architecture
//!
//! - **migrations**: SQL schema in `migrations/sqlite/` (applied via sqlx)
//! - **event_store**: append and load for the book, lending and user streams
//!
//! Each append runs the version check and the insert inside one
//! `BEGIN IMMEDIATE` transaction.
//! Stream order is SQLite's `rowid`, never the ULID event id, since ULIDs
//! minted in the same millisecond do not sort by insertion.
//!
//! # Security
//!
//! All queries use sqlx's prepared statement bindings (`bind()`); user data
//! is never interpolated into query strings.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use ulid::Ulid;

use crate::error::StorageError;
use crate::traits::{BookEventStore, LendingEventStore, Storage, UserEventStore};
use crate::types::{
    BookEventEnvelope, BookEventRow, LendingEventEnvelope, LendingEventRow, UserEventEnvelope,
    UserEventRow, UserId,
};

mod event_store;

/// Embedded SQLite migrations from `migrations/sqlite/`
static MIGRATIONS: sqlx::migrate::Migrator = sqlx::migrate!("migrations/sqlite");

/// SQLite storage backend
///
/// ```no_run
/// use holocron_storage::backends::sqlite::SqliteStorage;
/// use holocron_storage::Storage;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let storage = SqliteStorage::new("/var/lib/holocron/events.sqlite").await?;
/// storage.initialize().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (creating if needed) a database at `path`, or `:memory:`
    ///
    /// An in-memory database lives inside a single connection, so the pool
    /// is capped at one connection that is never recycled.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the database connection fails.
    pub async fn new(path: &str) -> Result<Self, StorageError> {
        let in_memory = path == ":memory:";
        let options = if in_memory {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| StorageError::connection("invalid SQLite URL", e))?
        } else {
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .pragma("wal_autocheckpoint", "1000")
        }
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .foreign_keys(true);

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .min_connections(1)
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
                .min_connections(1)
                .max_connections(5)
                .idle_timeout(Duration::from_secs(600))
        };

        let pool = pool_options
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(|e| StorageError::connection("failed to create SQLite pool", e))?;

        Ok(Self { pool })
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl BookEventStore for SqliteStorage {
    async fn append_book_event(
        &self,
        event: BookEventEnvelope,
        expected_version: Option<Ulid>,
    ) -> Result<(), StorageError> {
        self.append_book_event_impl(event, expected_version).await
    }

    async fn load_book_events(&self, book_id: Ulid) -> Result<Vec<BookEventRow>, StorageError> {
        self.load_book_events_impl(Some(book_id)).await
    }

    async fn load_all_book_events(&self) -> Result<Vec<BookEventRow>, StorageError> {
        self.load_book_events_impl(None).await
    }
}

#[async_trait]
impl LendingEventStore for SqliteStorage {
    async fn append_lending_event(
        &self,
        event: LendingEventEnvelope,
        expected_version: Option<Ulid>,
    ) -> Result<(), StorageError> {
        self.append_lending_event_impl(event, expected_version)
            .await
    }

    async fn load_lending_events_for_book(
        &self,
        book_id: Ulid,
    ) -> Result<Vec<LendingEventRow>, StorageError> {
        self.load_lending_events_for_book_impl(book_id).await
    }

    async fn load_lending_events_for_borrower(
        &self,
        borrower_id: &UserId,
    ) -> Result<Vec<LendingEventRow>, StorageError> {
        self.load_lending_events_for_borrower_impl(borrower_id)
            .await
    }
}

#[async_trait]
impl UserEventStore for SqliteStorage {
    async fn append_user_event(
        &self,
        event: UserEventEnvelope,
        expected_version: Option<Ulid>,
    ) -> Result<(), StorageError> {
        self.append_user_event_impl(event, expected_version).await
    }

    async fn load_user_events(&self, user_id: &UserId) -> Result<Vec<UserEventRow>, StorageError> {
        self.load_user_events_impl(user_id).await
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn initialize(&self) -> Result<(), StorageError> {
        MIGRATIONS
            .run(self.pool())
            .await
            .map_err(StorageError::migration)
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1")
            .execute(self.pool())
            .await
            .map_err(|e| StorageError::connection("health check: database connection failed", e))?;

        let tables: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM sqlite_master
            WHERE type = 'table'
              AND name IN ('book_events', 'lending_events', 'user_events')
            "#,
        )
        .fetch_one(self.pool())
        .await
        .map_err(|e| StorageError::connection("health check: failed to verify schema", e))?;

        if tables != 3 {
            return Err(StorageError::Uninitialized(format!(
                "found {} of 3 event tables",
                tables
            )));
        }

        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.pool.close().await;
        Ok(())
    }
}

//! Append and load for the three event tables
//!
//! The latest row of a stream is found with `ORDER BY rowid DESC`; see the
//! module docs of the backend for why rowid rather than event id.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};
use std::str::FromStr;
use ulid::Ulid;

use super::SqliteStorage;
use crate::error::StorageError;
use crate::types::{
    BookEventEnvelope, BookEventRow, LendingEventEnvelope, LendingEventRow, UserEventEnvelope,
    UserEventRow, UserId,
};

const BOOK_COLUMNS: &str = "event_id, book_id, event_type, code, title, authors, publisher, \
     published_date, thumbnail_url, delete_reason, delete_memo, occurred_at";

const LENDING_COLUMNS: &str =
    "event_id, lending_id, book_id, borrower_id, event_type, due_date, occurred_at";

const USER_COLUMNS: &str = "event_id, user_id, event_type, name, occurred_at";

fn parse_ulid(row: &SqliteRow, column: &str) -> Result<Ulid, StorageError> {
    let raw: String = row
        .try_get(column)
        .map_err(|e| StorageError::query(format!("failed to read column {}", column), e))?;
    Ulid::from_str(&raw)
        .map_err(|e| StorageError::InvalidData(format!("invalid ULID in {}: {}", column, e)))
}

fn get<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T, StorageError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(column)
        .map_err(|e| StorageError::query(format!("failed to read column {}", column), e))
}

fn book_row(row: &SqliteRow) -> Result<BookEventRow, StorageError> {
    Ok(BookEventRow {
        event_id: parse_ulid(row, "event_id")?,
        book_id: parse_ulid(row, "book_id")?,
        event_type: get(row, "event_type")?,
        code: get(row, "code")?,
        title: get(row, "title")?,
        authors: get(row, "authors")?,
        publisher: get(row, "publisher")?,
        published_date: get(row, "published_date")?,
        thumbnail_url: get(row, "thumbnail_url")?,
        delete_reason: get(row, "delete_reason")?,
        delete_memo: get(row, "delete_memo")?,
        occurred_at: get(row, "occurred_at")?,
    })
}

fn lending_row(row: &SqliteRow) -> Result<LendingEventRow, StorageError> {
    Ok(LendingEventRow {
        event_id: parse_ulid(row, "event_id")?,
        lending_id: parse_ulid(row, "lending_id")?,
        book_id: parse_ulid(row, "book_id")?,
        borrower_id: UserId::new(get::<String>(row, "borrower_id")?),
        event_type: get(row, "event_type")?,
        due_date: get(row, "due_date")?,
        occurred_at: get(row, "occurred_at")?,
    })
}

fn user_row(row: &SqliteRow) -> Result<UserEventRow, StorageError> {
    Ok(UserEventRow {
        event_id: parse_ulid(row, "event_id")?,
        user_id: UserId::new(get::<String>(row, "user_id")?),
        event_type: get(row, "event_type")?,
        name: get(row, "name")?,
        occurred_at: get(row, "occurred_at")?,
    })
}

/// Compare the stream head against `expected` inside the open transaction
async fn verify_version(
    tx: &mut Transaction<'_, Sqlite>,
    head_query: &str,
    stream: &'static str,
    aggregate_id: &str,
    expected: Option<Ulid>,
) -> Result<(), StorageError> {
    let current: Option<String> = sqlx::query_scalar(head_query)
        .bind(aggregate_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| StorageError::query("failed to get current version", e))?;

    let current = current
        .map(|raw| {
            Ulid::from_str(&raw).map_err(|e| {
                StorageError::InvalidData(format!("invalid ULID in event_id: {}", e))
            })
        })
        .transpose()?;

    if current != expected {
        return Err(StorageError::conflict(stream, aggregate_id));
    }
    Ok(())
}

/// SQLITE_BUSY or SQLITE_LOCKED, including their extended codes
fn is_lock_contention(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|db| db.code())
        .and_then(|code| code.parse::<i32>().ok())
        .map(|code| matches!(code & 0xff, 5 | 6))
        .unwrap_or(false)
}

fn map_write_error(
    stream: &'static str,
    aggregate_id: &str,
    message: &'static str,
    e: sqlx::Error,
) -> StorageError {
    let is_unique = e
        .as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false);
    if is_unique || is_lock_contention(&e) {
        StorageError::conflict(stream, aggregate_id)
    } else {
        StorageError::query(message, e)
    }
}

impl SqliteStorage {
    /// Open a write transaction holding the database write lock
    ///
    /// `BEGIN IMMEDIATE` takes the lock before the version check, so racing
    /// writers queue on the busy timeout and the later one sees the moved head.
    async fn begin(
        &self,
        stream: &'static str,
        aggregate_id: &str,
    ) -> Result<Transaction<'static, Sqlite>, StorageError> {
        self.pool()
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(|e| map_write_error(stream, aggregate_id, "failed to begin transaction", e))
    }

    pub(super) async fn append_book_event_impl(
        &self,
        envelope: BookEventEnvelope,
        expected_version: Option<Ulid>,
    ) -> Result<(), StorageError> {
        let row = envelope.into_row()?;
        let book_id = row.book_id.to_string();
        let mut tx = self.begin("book", &book_id).await?;

        verify_version(
            &mut tx,
            "SELECT event_id FROM book_events WHERE book_id = ?1 ORDER BY rowid DESC LIMIT 1",
            "book",
            &book_id,
            expected_version,
        )
        .await?;

        sqlx::query(
            r#"
            INSERT INTO book_events (
                event_id, book_id, event_type, code, title, authors, publisher,
                published_date, thumbnail_url, delete_reason, delete_memo, occurred_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(row.event_id.to_string())
        .bind(&book_id)
        .bind(&row.event_type)
        .bind(&row.code)
        .bind(&row.title)
        .bind(&row.authors)
        .bind(&row.publisher)
        .bind(&row.published_date)
        .bind(&row.thumbnail_url)
        .bind(&row.delete_reason)
        .bind(&row.delete_memo)
        .bind(&row.occurred_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_write_error("book", &book_id, "failed to insert event", e))?;

        tx.commit()
            .await
            .map_err(|e| map_write_error("book", &book_id, "failed to commit transaction", e))
    }

    pub(super) async fn load_book_events_impl(
        &self,
        book_id: Option<Ulid>,
    ) -> Result<Vec<BookEventRow>, StorageError> {
        let rows = match book_id {
            Some(id) => {
                let sql = format!(
                    "SELECT {} FROM book_events WHERE book_id = ?1 ORDER BY rowid",
                    BOOK_COLUMNS
                );
                sqlx::query(&sql)
                    .bind(id.to_string())
                    .fetch_all(self.pool())
                    .await
            }
            None => {
                let sql = format!("SELECT {} FROM book_events ORDER BY rowid", BOOK_COLUMNS);
                sqlx::query(&sql).fetch_all(self.pool()).await
            }
        }
        .map_err(|e| StorageError::query("failed to load book events", e))?;

        rows.iter().map(book_row).collect()
    }

    pub(super) async fn append_lending_event_impl(
        &self,
        envelope: LendingEventEnvelope,
        expected_version: Option<Ulid>,
    ) -> Result<(), StorageError> {
        let row = envelope.into_row();
        let book_id = row.book_id.to_string();
        let mut tx = self.begin("lending", &book_id).await?;

        verify_version(
            &mut tx,
            "SELECT event_id FROM lending_events WHERE book_id = ?1 ORDER BY rowid DESC LIMIT 1",
            "lending",
            &book_id,
            expected_version,
        )
        .await?;

        sqlx::query(
            r#"
            INSERT INTO lending_events (
                event_id, lending_id, book_id, borrower_id, event_type, due_date, occurred_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(row.event_id.to_string())
        .bind(row.lending_id.to_string())
        .bind(&book_id)
        .bind(row.borrower_id.as_str())
        .bind(&row.event_type)
        .bind(&row.due_date)
        .bind(&row.occurred_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_write_error("lending", &book_id, "failed to insert event", e))?;

        tx.commit()
            .await
            .map_err(|e| map_write_error("lending", &book_id, "failed to commit transaction", e))
    }

    pub(super) async fn load_lending_events_for_book_impl(
        &self,
        book_id: Ulid,
    ) -> Result<Vec<LendingEventRow>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM lending_events WHERE book_id = ?1 ORDER BY rowid",
            LENDING_COLUMNS
        ))
        .bind(book_id.to_string())
        .fetch_all(self.pool())
        .await
        .map_err(|e| StorageError::query("failed to load lending events", e))?;

        rows.iter().map(lending_row).collect()
    }

    pub(super) async fn load_lending_events_for_borrower_impl(
        &self,
        borrower_id: &UserId,
    ) -> Result<Vec<LendingEventRow>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM lending_events WHERE borrower_id = ?1 ORDER BY rowid",
            LENDING_COLUMNS
        ))
        .bind(borrower_id.as_str())
        .fetch_all(self.pool())
        .await
        .map_err(|e| StorageError::query("failed to load lending events", e))?;

        rows.iter().map(lending_row).collect()
    }

    pub(super) async fn append_user_event_impl(
        &self,
        envelope: UserEventEnvelope,
        expected_version: Option<Ulid>,
    ) -> Result<(), StorageError> {
        let row = envelope.into_row();
        let user_id = row.user_id.as_str().to_string();
        let mut tx = self.begin("user", &user_id).await?;

        verify_version(
            &mut tx,
            "SELECT event_id FROM user_events WHERE user_id = ?1 ORDER BY rowid DESC LIMIT 1",
            "user",
            &user_id,
            expected_version,
        )
        .await?;

        sqlx::query(
            r#"
            INSERT INTO user_events (event_id, user_id, event_type, name, occurred_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(row.event_id.to_string())
        .bind(&user_id)
        .bind(&row.event_type)
        .bind(&row.name)
        .bind(&row.occurred_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_write_error("user", &user_id, "failed to insert event", e))?;

        tx.commit()
            .await
            .map_err(|e| map_write_error("user", &user_id, "failed to commit transaction", e))
    }

    pub(super) async fn load_user_events_impl(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<UserEventRow>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM user_events WHERE user_id = ?1 ORDER BY rowid",
            USER_COLUMNS
        ))
        .bind(user_id.as_str())
        .fetch_all(self.pool())
        .await
        .map_err(|e| StorageError::query("failed to load user events", e))?;

        rows.iter().map(user_row).collect()
    }
}

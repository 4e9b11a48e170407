//! LendingEventStore test suite

use holocron_storage::{LendingEvent, LendingEventEnvelope, Storage, StorageError, UserId};
use ulid::Ulid;

use super::at;

pub async fn run_all<S: Storage>(storage: &S) {
    test_lending_stream_per_book(storage).await;
    test_stale_lending_version_is_rejected(storage).await;
    test_load_by_borrower(storage).await;
}

fn borrowed(lending_id: Ulid, book_id: Ulid, borrower: &str, day: u32) -> LendingEventEnvelope {
    LendingEventEnvelope::new(
        lending_id,
        book_id,
        UserId::new(borrower),
        LendingEvent::Borrowed {
            due_date: at(day + 7),
        },
        at(day),
    )
}

pub async fn test_lending_stream_per_book<S: Storage>(storage: &S) {
    let book_id = Ulid::new();
    let lending_id = Ulid::new();

    let open = borrowed(lending_id, book_id, "u1", 1);
    let open_id = open.event_id;
    storage.append_lending_event(open, None).await.unwrap();

    let extend = LendingEventEnvelope::new(
        lending_id,
        book_id,
        UserId::new("u1"),
        LendingEvent::DueDateExtended { due_date: at(15) },
        at(2),
    );
    let extend_id = extend.event_id;
    storage
        .append_lending_event(extend, Some(open_id))
        .await
        .unwrap();

    let close = LendingEventEnvelope::new(
        lending_id,
        book_id,
        UserId::new("u1"),
        LendingEvent::Returned,
        at(3),
    );
    storage
        .append_lending_event(close, Some(extend_id))
        .await
        .unwrap();

    let rows = storage.load_lending_events_for_book(book_id).await.unwrap();
    let types: Vec<&str> = rows.iter().map(|r| r.event_type.as_str()).collect();
    assert_eq!(types, vec!["borrowed", "due_date_extended", "returned"]);
    assert_eq!(rows[0].due_date.as_deref(), Some("2024-04-08T10:00:00Z"));
    assert_eq!(rows[1].due_date.as_deref(), Some("2024-04-15T10:00:00Z"));
    assert_eq!(rows[2].due_date, None);
    assert!(rows.iter().all(|r| r.lending_id == lending_id));

    // A new lending of the same book continues the same stream
    let last = rows.last().unwrap().event_id;
    storage
        .append_lending_event(borrowed(Ulid::new(), book_id, "u2", 4), Some(last))
        .await
        .unwrap();
    assert_eq!(
        storage
            .load_lending_events_for_book(book_id)
            .await
            .unwrap()
            .len(),
        4
    );
}

pub async fn test_stale_lending_version_is_rejected<S: Storage>(storage: &S) {
    let book_id = Ulid::new();
    storage
        .append_lending_event(borrowed(Ulid::new(), book_id, "u1", 5), None)
        .await
        .unwrap();

    // Second borrower read the empty stream before the first append landed
    let result = storage
        .append_lending_event(borrowed(Ulid::new(), book_id, "u2", 5), None)
        .await;
    assert!(
        matches!(
            result,
            Err(StorageError::ConcurrentWriteConflict {
                stream: "lending",
                ..
            })
        ),
        "expected conflict, got {:?}",
        result
    );

    let rows = storage.load_lending_events_for_book(book_id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].borrower_id.as_str(), "u1");
}

pub async fn test_load_by_borrower<S: Storage>(storage: &S) {
    let borrower = format!("reader-{}", Ulid::new());
    let first_book = Ulid::new();
    let second_book = Ulid::new();

    storage
        .append_lending_event(borrowed(Ulid::new(), first_book, &borrower, 6), None)
        .await
        .unwrap();
    storage
        .append_lending_event(borrowed(Ulid::new(), second_book, "someone-else", 6), None)
        .await
        .unwrap();

    let rows = storage
        .load_lending_events_for_borrower(&UserId::new(borrower.clone()))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].book_id, first_book);
    assert_eq!(rows[0].borrower_id.as_str(), borrower);
}

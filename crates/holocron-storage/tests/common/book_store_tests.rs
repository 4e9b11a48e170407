//! BookEventStore test suite

use holocron_storage::{
    BookEvent, BookEventEnvelope, BookFields, BookPatch, Storage, StorageError,
};
use ulid::Ulid;

use super::at;

pub async fn run_all<S: Storage>(storage: &S) {
    test_append_and_load_created(storage).await;
    test_load_unknown_book_is_empty(storage).await;
    test_events_load_in_insertion_order(storage).await;
    test_stale_version_is_rejected(storage).await;
    test_none_version_on_existing_stream_is_rejected(storage).await;
    test_duplicate_event_id_is_rejected(storage).await;
    test_load_all_spans_books(storage).await;
}

fn created(title: &str, authors: &[&str]) -> BookEvent {
    BookEvent::Created(BookFields {
        code: Some("9784000000001".to_string()),
        title: title.to_string(),
        authors: authors.iter().map(|a| a.to_string()).collect(),
        publisher: None,
        published_date: None,
        thumbnail_url: None,
    })
}

pub async fn test_append_and_load_created<S: Storage>(storage: &S) {
    let book_id = Ulid::new();
    let envelope = BookEventEnvelope::new(book_id, created("Dune", &["Frank Herbert"]), at(1));
    let event_id = envelope.event_id;

    storage
        .append_book_event(envelope, None)
        .await
        .expect("append to empty stream should succeed");

    let rows = storage.load_book_events(book_id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].event_id, event_id);
    assert_eq!(rows[0].event_type, "created");
    assert_eq!(rows[0].title.as_deref(), Some("Dune"));
    assert_eq!(rows[0].authors.as_deref(), Some(r#"["Frank Herbert"]"#));
    assert_eq!(rows[0].code.as_deref(), Some("9784000000001"));
    assert_eq!(rows[0].occurred_at, "2024-04-01T10:00:00Z");
}

pub async fn test_load_unknown_book_is_empty<S: Storage>(storage: &S) {
    let rows = storage.load_book_events(Ulid::new()).await.unwrap();
    assert!(rows.is_empty());
}

pub async fn test_events_load_in_insertion_order<S: Storage>(storage: &S) {
    let book_id = Ulid::new();
    let first = BookEventEnvelope::new(book_id, created("First", &["A"]), at(2));
    let first_id = first.event_id;
    storage.append_book_event(first, None).await.unwrap();

    // Same timestamp on purpose: order must come from insertion, not time
    let second = BookEventEnvelope::new(
        book_id,
        BookEvent::Updated(BookPatch {
            publisher: Some("X".to_string()),
            ..Default::default()
        }),
        at(2),
    );
    let second_id = second.event_id;
    storage
        .append_book_event(second, Some(first_id))
        .await
        .unwrap();

    let third = BookEventEnvelope::new(
        book_id,
        BookEvent::Deleted {
            reason: "lost".to_string(),
            memo: None,
        },
        at(2),
    );
    let third_id = third.event_id;
    storage
        .append_book_event(third, Some(second_id))
        .await
        .unwrap();

    let rows = storage.load_book_events(book_id).await.unwrap();
    let ids: Vec<Ulid> = rows.iter().map(|r| r.event_id).collect();
    assert_eq!(ids, vec![first_id, second_id, third_id]);
    assert_eq!(rows[1].title, None);
    assert_eq!(rows[1].publisher.as_deref(), Some("X"));
    assert_eq!(rows[2].delete_reason.as_deref(), Some("lost"));
}

pub async fn test_stale_version_is_rejected<S: Storage>(storage: &S) {
    let book_id = Ulid::new();
    let first = BookEventEnvelope::new(book_id, created("Stale", &["A"]), at(3));
    let first_id = first.event_id;
    storage.append_book_event(first, None).await.unwrap();

    let winner = BookEventEnvelope::new(
        book_id,
        BookEvent::Updated(BookPatch {
            title: Some("Winner".to_string()),
            ..Default::default()
        }),
        at(3),
    );
    storage
        .append_book_event(winner, Some(first_id))
        .await
        .unwrap();

    // A second writer that also read `first_id` must lose
    let loser = BookEventEnvelope::new(
        book_id,
        BookEvent::Updated(BookPatch {
            title: Some("Loser".to_string()),
            ..Default::default()
        }),
        at(3),
    );
    let result = storage.append_book_event(loser, Some(first_id)).await;
    assert!(
        matches!(result, Err(StorageError::ConcurrentWriteConflict { stream: "book", .. })),
        "expected conflict, got {:?}",
        result
    );

    let rows = storage.load_book_events(book_id).await.unwrap();
    assert_eq!(rows.len(), 2, "losing append must write nothing");
}

pub async fn test_none_version_on_existing_stream_is_rejected<S: Storage>(storage: &S) {
    let book_id = Ulid::new();
    storage
        .append_book_event(
            BookEventEnvelope::new(book_id, created("Once", &["A"]), at(4)),
            None,
        )
        .await
        .unwrap();

    let result = storage
        .append_book_event(
            BookEventEnvelope::new(book_id, created("Twice", &["A"]), at(4)),
            None,
        )
        .await;
    assert!(matches!(
        result,
        Err(StorageError::ConcurrentWriteConflict { .. })
    ));
}

pub async fn test_duplicate_event_id_is_rejected<S: Storage>(storage: &S) {
    let book_id = Ulid::new();
    let envelope = BookEventEnvelope::new(book_id, created("Dup", &["A"]), at(5));
    let replay = BookEventEnvelope {
        book_id: Ulid::new(),
        ..envelope.clone()
    };
    storage.append_book_event(envelope, None).await.unwrap();

    let result = storage.append_book_event(replay, None).await;
    assert!(matches!(
        result,
        Err(StorageError::ConcurrentWriteConflict { .. })
    ));
}

pub async fn test_load_all_spans_books<S: Storage>(storage: &S) {
    let a = Ulid::new();
    let b = Ulid::new();
    storage
        .append_book_event(BookEventEnvelope::new(a, created("A", &["x"]), at(6)), None)
        .await
        .unwrap();
    storage
        .append_book_event(BookEventEnvelope::new(b, created("B", &["y"]), at(7)), None)
        .await
        .unwrap();

    let rows = storage.load_all_book_events().await.unwrap();
    let pos_a = rows.iter().position(|r| r.book_id == a).unwrap();
    let pos_b = rows.iter().position(|r| r.book_id == b).unwrap();
    assert!(pos_a < pos_b, "rows must come back in insertion order");
}

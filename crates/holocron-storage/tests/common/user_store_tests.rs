//! UserEventStore test suite

use holocron_storage::{Storage, StorageError, UserEvent, UserEventEnvelope, UserId};
use ulid::Ulid;

use super::at;

pub async fn run_all<S: Storage>(storage: &S) {
    test_create_and_load_user(storage).await;
    test_second_create_on_same_stream_conflicts(storage).await;
}

pub async fn test_create_and_load_user<S: Storage>(storage: &S) {
    let user_id = UserId::new(format!("uid-{}", Ulid::new()));
    storage
        .append_user_event(
            UserEventEnvelope::new(
                user_id.clone(),
                UserEvent::Created {
                    name: "Ada".to_string(),
                },
                at(1),
            ),
            None,
        )
        .await
        .unwrap();

    let rows = storage.load_user_events(&user_id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].event_type, "created");
    assert_eq!(rows[0].name, "Ada");
    assert_eq!(rows[0].user_id, user_id);

    let other = storage
        .load_user_events(&UserId::new("nobody"))
        .await
        .unwrap();
    assert!(other.is_empty());
}

pub async fn test_second_create_on_same_stream_conflicts<S: Storage>(storage: &S) {
    let user_id = UserId::new(format!("uid-{}", Ulid::new()));
    let create = |name: &str| {
        UserEventEnvelope::new(
            user_id.clone(),
            UserEvent::Created {
                name: name.to_string(),
            },
            at(2),
        )
    };

    storage.append_user_event(create("first"), None).await.unwrap();
    let result = storage.append_user_event(create("second"), None).await;
    assert!(matches!(
        result,
        Err(StorageError::ConcurrentWriteConflict { stream: "user", .. })
    ));
}

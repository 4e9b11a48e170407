//! Test utilities shared by the unit test modules.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use holocron_storage::backends::memory::MemoryStorage;
use holocron_storage::Storage;

use crate::commands::Clock;

/// Creates an empty, initialized in-memory event log.
pub async fn create_test_storage() -> Arc<dyn Storage> {
    let storage = MemoryStorage::new();
    storage
        .initialize()
        .await
        .expect("failed to initialize storage");
    Arc::new(storage)
}

/// 2024-04-01T10:00:00Z
pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 1, 10, 0, 0)
        .single()
        .expect("valid fixed time")
}

/// A clock that starts at `start` and moves one second forward per reading.
pub fn stepping_clock(start: DateTime<Utc>) -> Clock {
    let ticks = Arc::new(AtomicI64::new(0));
    Arc::new(move || start + Duration::seconds(ticks.fetch_add(1, Ordering::SeqCst)))
}

//! Shared test harness for storage backends
//!
//! Generic checks every backend must pass so that services behave the same
//! whichever log they run against.
//!
//! ```ignore
//! use holocron_storage::backends::memory::MemoryStorage;
//!
//! #[tokio::test]
//! async fn memory_passes_all_tests() {
//!     let storage = MemoryStorage::new();
//!     storage.initialize().await.unwrap();
//!     common::run_all_tests(&storage).await;
//! }
//! ```

pub mod book_store_tests;
pub mod lending_store_tests;
pub mod user_store_tests;

use chrono::{DateTime, TimeZone, Utc};
use holocron_storage::Storage;

/// Run every suite in sequence
pub async fn run_all_tests<S: Storage>(storage: &S) {
    book_store_tests::run_all(storage).await;
    lending_store_tests::run_all(storage).await;
    user_store_tests::run_all(storage).await;
}

pub async fn run_book_store_tests<S: Storage>(storage: &S) {
    book_store_tests::run_all(storage).await;
}

pub async fn run_lending_store_tests<S: Storage>(storage: &S) {
    lending_store_tests::run_all(storage).await;
}

pub async fn run_user_store_tests<S: Storage>(storage: &S) {
    user_store_tests::run_all(storage).await;
}

/// Fixed instant so stored timestamps are predictable
pub fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, day, 10, 0, 0).unwrap()
}

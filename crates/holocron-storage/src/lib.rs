//! Event log storage for the holocron library services
//!
//! Every change to the catalog, to lending, or to users is an immutable
//! event. This crate stores those events and hands them back in insertion
//! order; folding them into current state happens in the service crate.
//!
//! # Supported Backends
//!
//! - **Memory** (always available) - Process-local log for tests and dry runs
//! - **SQLite** (feature: `sqlite`, default) - Embedded database via sqlx
//!
//! # Architecture
//!
//! All backends implement the same traits:
//! - [`BookEventStore`] - Book registration, update and deletion events
//! - [`LendingEventStore`] - Borrow, extend and return events, one stream per book
//! - [`UserEventStore`] - User creation events
//! - [`Storage`] - Lifecycle management (initialize, health check, close)
//!
//! # Examples
//!
//! ```no_run
//! use holocron_storage::{create_storage, StorageConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StorageConfig::from_url("sqlite:///var/lib/holocron/events.sqlite")?;
//! let storage = create_storage(&config).await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod traits;
mod types;

pub mod backends;

pub use config::{BackendType, ConfigError, StorageConfig};
pub use error::{BoxedError, StorageError};
pub use traits::{BookEventStore, LendingEventStore, Storage, UserEventStore};
pub use types::{
    format_timestamp, BookEvent, BookEventEnvelope, BookEventRow, BookEventType, BookFields,
    BookPatch, LendingEvent, LendingEventEnvelope, LendingEventRow, LendingEventType,
    UnknownEventType, UserEvent, UserEventEnvelope, UserEventRow, UserEventType, UserId,
};

use std::sync::Arc;

/// Create storage from configuration
///
/// Builds the configured backend and runs its schema initialisation.
///
/// # Errors
///
/// Returns `StorageError::UnsupportedBackend` if the backend type
/// is not compiled in (missing feature flag).
pub async fn create_storage(config: &StorageConfig) -> Result<Arc<dyn Storage>, StorageError> {
    let storage: Arc<dyn Storage> = match config.backend {
        BackendType::Memory => Arc::new(backends::memory::MemoryStorage::new()),
        #[cfg(feature = "sqlite")]
        BackendType::Sqlite => Arc::new(
            backends::sqlite::SqliteStorage::new(&config.connection_string).await?,
        ),
        #[cfg(not(feature = "sqlite"))]
        BackendType::Sqlite => {
            return Err(StorageError::UnsupportedBackend(
                "SQLite backend not compiled in (enable 'sqlite' feature)".into(),
            ))
        }
    };

    storage.initialize().await?;
    tracing::debug!(backend = storage.backend_name(), "storage initialized");
    Ok(storage)
}

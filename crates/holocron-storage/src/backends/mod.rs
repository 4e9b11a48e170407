//! Storage backend implementations
//!
//! The memory backend is always available; SQLite is behind the `sqlite` feature.

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

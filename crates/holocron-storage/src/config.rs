//! Storage configuration

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when parsing storage configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid URL format: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Unsupported URL scheme: {0}. Supported schemes: memory, sqlite")]
    UnsupportedScheme(String),

    #[error("Missing database path in URL: {0}")]
    MissingPath(String),
}

/// Storage backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Process-local event log, lost on exit
    Memory,
    /// SQLite backend
    Sqlite,
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: BackendType,

    /// File path, `:memory:`, or empty for the memory backend
    pub connection_string: String,
}

impl StorageConfig {
    /// Parse connection URL into storage configuration
    ///
    /// Supported URL formats:
    /// - `memory://` - In-process event log
    /// - `sqlite://:memory:` - In-memory SQLite
    /// - `sqlite:///path/to/db.sqlite` - File-based SQLite (absolute path)
    /// - `sqlite://relative/db.sqlite` - File-based SQLite (relative path)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidUrl` if the URL cannot be parsed.
    /// Returns `ConfigError::UnsupportedScheme` if the URL scheme is not supported.
    /// Returns `ConfigError::MissingPath` if a SQLite URL names no database.
    pub fn from_url(url: &str) -> Result<Self, ConfigError> {
        // `:memory:` is not a valid host, so rewrite it into the path first
        let normalized_url = if url.contains("://:memory:") {
            url.replace("://:memory:", ":///:memory:")
        } else {
            url.to_string()
        };

        let parsed = url::Url::parse(&normalized_url)?;

        match parsed.scheme() {
            "memory" => Ok(Self::memory()),
            "sqlite" => {
                let host = parsed.host_str().unwrap_or_default();
                let path = parsed.path();
                let connection_string = if path == "/:memory:" {
                    ":memory:".to_string()
                } else if host.is_empty() {
                    path.to_string()
                } else {
                    format!("{}{}", host, path)
                };

                if connection_string.is_empty() || connection_string == "/" {
                    return Err(ConfigError::MissingPath(url.to_string()));
                }

                Ok(Self {
                    backend: BackendType::Sqlite,
                    connection_string,
                })
            }
            scheme => Err(ConfigError::UnsupportedScheme(scheme.to_string())),
        }
    }

    /// In-process storage for tests and throwaway runs
    #[must_use]
    pub fn memory() -> Self {
        Self {
            backend: BackendType::Memory,
            connection_string: String::new(),
        }
    }

    /// File-based SQLite configuration
    #[must_use]
    pub fn sqlite_file(path: &str) -> Self {
        Self {
            backend: BackendType::Sqlite,
            connection_string: path.to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::memory()
    }
}

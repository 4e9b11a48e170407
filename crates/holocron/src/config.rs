use holocron_storage::StorageConfig;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::bookinfo::{BookInfoError, BookInfoFetcher, GoogleBooksFetcher, OpenBdFetcher};

pub const DATABASE_URL_ENV: &str = "HOLOCRON_DATABASE_URL";
pub const GOOGLE_BOOKS_URL_ENV: &str = "GOOGLE_BOOKS_API_URL";
pub const OPENBD_URL_ENV: &str = "OPENBD_API_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Storage configuration error: {0}")]
    StorageConfig(#[from] holocron_storage::ConfigError),

    #[error("Book info configuration error: {0}")]
    BookInfo(#[from] BookInfoError),
}

/// Event log location
///
/// `url` accepts `memory://`, `sqlite://:memory:` or `sqlite:///path/to/file.sqlite`.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
}

fn default_database_url() -> String {
    "sqlite://holocron.sqlite".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

/// External bibliographic providers
///
/// A provider without a base URL is left out of the lookup chain.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct BookInfoConfig {
    #[serde(default)]
    pub google_books_url: Option<String>,

    #[serde(default)]
    pub openbd_url: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for BookInfoConfig {
    fn default() -> Self {
        Self {
            google_books_url: None,
            openbd_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub book_info: BookInfoConfig,
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`; empty values are ignored
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(url) = get(DATABASE_URL_ENV) {
            debug!(var = DATABASE_URL_ENV, "database URL overridden from environment");
            self.database.url = url;
        }
        if let Some(url) = get(GOOGLE_BOOKS_URL_ENV) {
            self.book_info.google_books_url = Some(url);
        }
        if let Some(url) = get(OPENBD_URL_ENV) {
            self.book_info.openbd_url = Some(url);
        }
    }

    pub fn storage_config(&self) -> Result<StorageConfig, ConfigError> {
        Ok(StorageConfig::from_url(&self.database.url)?)
    }

    /// Configured HTTP providers, Google Books before OpenBD
    pub fn fetchers(&self) -> Result<Vec<Box<dyn BookInfoFetcher>>, ConfigError> {
        let timeout = Duration::from_secs(self.book_info.timeout_secs);
        let mut fetchers: Vec<Box<dyn BookInfoFetcher>> = Vec::new();

        if let Some(url) = &self.book_info.google_books_url {
            fetchers.push(Box::new(GoogleBooksFetcher::new(url.as_str(), timeout)?));
        }
        if let Some(url) = &self.book_info.openbd_url {
            fetchers.push(Box::new(OpenBdFetcher::new(url.as_str(), timeout)?));
        }

        Ok(fetchers)
    }
}

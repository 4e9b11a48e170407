//! Bibliographic lookup by item code
//!
//! Sources, in the order the service tries them:
//!
//! - **Catalog cache** - a current book already registered with the same code
//! - **Google Books** - `GET {base}/volumes?q=isbn:{code}`
//! - **OpenBD** - `GET {base}/get?isbn={code}`
//!
//! HTTP providers split into a fetch step returning raw bytes and a pure
//! parse step, so parsing is testable without a server.

mod google_books;
mod openbd;

pub use google_books::{parse_google_books, GoogleBooksFetcher};
pub use openbd::{parse_openbd, OpenBdFetcher};

use async_trait::async_trait;
use holocron_common::BookCode;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::catalog::Catalog;
use crate::domain::source_chain::{Source, SourceError};

/// Per-request timeout when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookInfo {
    pub title: String,
    pub authors: Vec<String>,
    pub publisher: Option<String>,
    pub published_date: Option<String>,
    #[serde(rename = "thumbnailURL")]
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum BookInfoError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("book info API returned status {status}")]
    Api { status: u16 },

    #[error("failed to parse book info response: {0}")]
    Parse(String),

    #[error("no book info for code {0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Config(String),
}

#[async_trait]
pub trait BookInfoFetcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Raw response body for `code`
    async fn fetch(&self, code: &BookCode) -> Result<Vec<u8>, BookInfoError>;

    fn parse(&self, code: &BookCode, body: &[u8]) -> Result<BookInfo, BookInfoError>;
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, BookInfoError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| BookInfoError::Config(format!("failed to build HTTP client: {}", e)))
}

/// Read a successful response body; anything but 200 is an API error
pub(crate) async fn read_body(response: reqwest::Response) -> Result<Vec<u8>, BookInfoError> {
    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(BookInfoError::Api {
            status: status.as_u16(),
        });
    }
    Ok(response.bytes().await?.to_vec())
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Wraps an HTTP fetcher as a chain source
///
/// A provider's "not found" declines; transport, status and parse errors fail.
pub struct ExternalApiSource {
    fetcher: Box<dyn BookInfoFetcher>,
}

impl ExternalApiSource {
    pub fn new(fetcher: Box<dyn BookInfoFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Source for ExternalApiSource {
    type Criteria = BookCode;
    type Output = BookInfo;

    fn name(&self) -> &'static str {
        self.fetcher.name()
    }

    async fn try_fetch(&self, code: &BookCode) -> Result<BookInfo, SourceError> {
        let body = self.fetcher.fetch(code).await.map_err(SourceError::failed)?;
        match self.fetcher.parse(code, &body) {
            Ok(info) => Ok(info),
            Err(BookInfoError::NotFound(_)) => Err(SourceError::Declined),
            Err(e) => Err(SourceError::failed(e)),
        }
    }
}

/// Answers from books already in the catalog; a miss declines
pub struct CatalogCacheSource {
    catalog: Arc<Catalog>,
}

impl CatalogCacheSource {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Source for CatalogCacheSource {
    type Criteria = BookCode;
    type Output = BookInfo;

    fn name(&self) -> &'static str {
        "catalog"
    }

    async fn try_fetch(&self, code: &BookCode) -> Result<BookInfo, SourceError> {
        let book = self
            .catalog
            .find_book_by_code(code)
            .await
            .map_err(SourceError::failed)?
            .ok_or(SourceError::Declined)?;

        Ok(BookInfo {
            title: book.title,
            authors: book.authors,
            publisher: book.publisher,
            published_date: book.published_date,
            thumbnail_url: book.thumbnail_url,
        })
    }
}

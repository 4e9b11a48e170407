//! Google Books volumes API

use async_trait::async_trait;
use holocron_common::BookCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{http_client, non_empty, read_body, BookInfo, BookInfoError, BookInfoFetcher};

#[derive(Debug)]
pub struct GoogleBooksFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl GoogleBooksFetcher {
    /// `base_url` is the API root, e.g. `https://www.googleapis.com/books/v1`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BookInfoError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            client: http_client(timeout)?,
            base_url,
        })
    }
}

#[async_trait]
impl BookInfoFetcher for GoogleBooksFetcher {
    fn name(&self) -> &'static str {
        "google_books"
    }

    async fn fetch(&self, code: &BookCode) -> Result<Vec<u8>, BookInfoError> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/volumes", self.base_url),
            &[("q", format!("isbn:{}", code))],
        )
        .map_err(|e| BookInfoError::Config(format!("invalid Google Books URL: {}", e)))?;

        debug!(code = %code, "querying Google Books");
        let response = self.client.get(url).send().await?;
        read_body(response).await
    }

    fn parse(&self, code: &BookCode, body: &[u8]) -> Result<BookInfo, BookInfoError> {
        parse_google_books(code, body)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumesResponse {
    #[serde(default)]
    total_items: u64,
    #[serde(default)]
    items: Vec<Volume>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Volume {
    volume_info: VolumeInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeInfo {
    #[serde(default)]
    title: String,
    #[serde(default)]
    authors: Vec<String>,
    publisher: Option<String>,
    published_date: Option<String>,
    image_links: Option<ImageLinks>,
}

#[derive(Debug, Deserialize)]
struct ImageLinks {
    thumbnail: Option<String>,
}

/// First volume of a search response
pub fn parse_google_books(code: &BookCode, body: &[u8]) -> Result<BookInfo, BookInfoError> {
    let response: VolumesResponse =
        serde_json::from_slice(body).map_err(|e| BookInfoError::Parse(e.to_string()))?;

    if response.total_items == 0 {
        return Err(BookInfoError::NotFound(code.to_string()));
    }
    let volume = response
        .items
        .into_iter()
        .next()
        .ok_or_else(|| BookInfoError::NotFound(code.to_string()))?;

    let info = volume.volume_info;
    if info.title.trim().is_empty() {
        return Err(BookInfoError::NotFound(code.to_string()));
    }

    Ok(BookInfo {
        title: info.title,
        authors: info.authors,
        publisher: non_empty(info.publisher),
        published_date: non_empty(info.published_date),
        thumbnail_url: non_empty(info.image_links.and_then(|l| l.thumbnail)),
    })
}

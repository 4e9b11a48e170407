//! OpenBD bibliographic API

use async_trait::async_trait;
use holocron_common::BookCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{http_client, non_empty, read_body, BookInfo, BookInfoError, BookInfoFetcher};

#[derive(Debug)]
pub struct OpenBdFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl OpenBdFetcher {
    /// `base_url` is the API root, e.g. `https://api.openbd.jp/v1`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BookInfoError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            client: http_client(timeout)?,
            base_url,
        })
    }
}

#[async_trait]
impl BookInfoFetcher for OpenBdFetcher {
    fn name(&self) -> &'static str {
        "openbd"
    }

    async fn fetch(&self, code: &BookCode) -> Result<Vec<u8>, BookInfoError> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/get", self.base_url),
            &[("isbn", code.as_str())],
        )
        .map_err(|e| BookInfoError::Config(format!("invalid OpenBD URL: {}", e)))?;

        debug!(code = %code, "querying OpenBD");
        let response = self.client.get(url).send().await?;
        read_body(response).await
    }

    fn parse(&self, code: &BookCode, body: &[u8]) -> Result<BookInfo, BookInfoError> {
        parse_openbd(code, body)
    }
}

#[derive(Debug, Deserialize)]
struct Entry {
    summary: Option<Summary>,
}

#[derive(Debug, Deserialize)]
struct Summary {
    #[serde(default)]
    title: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    publisher: String,
    #[serde(default)]
    pubdate: String,
    #[serde(default)]
    cover: String,
}

/// `YYYYMMDD` becomes `YYYY-MM-DD`; anything else passes through
fn normalize_pubdate(pubdate: &str) -> String {
    if pubdate.len() == 8 && pubdate.bytes().all(|b| b.is_ascii_digit()) {
        format!("{}-{}-{}", &pubdate[..4], &pubdate[4..6], &pubdate[6..])
    } else {
        pubdate.to_string()
    }
}

/// The response is an array with one entry per requested code, `null` when unknown
pub fn parse_openbd(code: &BookCode, body: &[u8]) -> Result<BookInfo, BookInfoError> {
    let entries: Vec<Option<Entry>> =
        serde_json::from_slice(body).map_err(|e| BookInfoError::Parse(e.to_string()))?;

    let summary = entries
        .into_iter()
        .next()
        .flatten()
        .and_then(|entry| entry.summary)
        .ok_or_else(|| BookInfoError::NotFound(code.to_string()))?;

    if summary.title.trim().is_empty() {
        return Err(BookInfoError::NotFound(code.to_string()));
    }

    let authors = summary
        .author
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect();

    Ok(BookInfo {
        title: summary.title,
        authors,
        publisher: non_empty(Some(summary.publisher)),
        published_date: non_empty(Some(normalize_pubdate(&summary.pubdate))),
        thumbnail_url: non_empty(Some(summary.cover)),
    })
}

//! Catalog listing through a source chain
//!
//! code filter -> keyword search -> full listing. The first two decline when
//! their criterion is absent; the full listing always answers.

use async_trait::async_trait;
use holocron_common::{BookCode, SearchKeyword};
use serde::Serialize;
use std::sync::Arc;

use super::Catalog;
use crate::domain::book::{BookState, BookView};
use crate::domain::source_chain::{Source, SourceChain, SourceError};

#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub code: Option<BookCode>,
    pub keyword: Option<SearchKeyword>,
}

/// One page of the listing; `total` counts every match
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookPage {
    pub items: Vec<BookView>,
    pub total: usize,
}

pub type ListingChain = SourceChain<ListQuery, Vec<BookState>>;

pub fn listing_chain(catalog: Arc<Catalog>) -> ListingChain {
    SourceChain::new()
        .with_source(CodeFilterSource::new(catalog.clone()))
        .with_source(KeywordSearchSource::new(catalog.clone()))
        .with_source(FullListingSource::new(catalog))
}

pub struct CodeFilterSource {
    catalog: Arc<Catalog>,
}

impl CodeFilterSource {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Source for CodeFilterSource {
    type Criteria = ListQuery;
    type Output = Vec<BookState>;

    fn name(&self) -> &'static str {
        "code_filter"
    }

    async fn try_fetch(&self, query: &ListQuery) -> Result<Vec<BookState>, SourceError> {
        let code = query.code.as_ref().ok_or(SourceError::Declined)?;
        let books = self
            .catalog
            .current_books()
            .await
            .map_err(SourceError::failed)?;
        Ok(books
            .into_iter()
            .filter(|b| b.code.as_deref() == Some(code.as_str()))
            .collect())
    }
}

pub struct KeywordSearchSource {
    catalog: Arc<Catalog>,
}

impl KeywordSearchSource {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }
}

fn matches_keyword(book: &BookState, needle: &str) -> bool {
    book.title.to_lowercase().contains(needle)
        || book
            .authors
            .iter()
            .any(|a| a.to_lowercase().contains(needle))
}

#[async_trait]
impl Source for KeywordSearchSource {
    type Criteria = ListQuery;
    type Output = Vec<BookState>;

    fn name(&self) -> &'static str {
        "keyword_search"
    }

    async fn try_fetch(&self, query: &ListQuery) -> Result<Vec<BookState>, SourceError> {
        let keyword = query.keyword.as_ref().ok_or(SourceError::Declined)?;
        let needle = keyword.as_str().to_lowercase();
        let books = self
            .catalog
            .current_books()
            .await
            .map_err(SourceError::failed)?;
        Ok(books
            .into_iter()
            .filter(|b| matches_keyword(b, &needle))
            .collect())
    }
}

pub struct FullListingSource {
    catalog: Arc<Catalog>,
}

impl FullListingSource {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Source for FullListingSource {
    type Criteria = ListQuery;
    type Output = Vec<BookState>;

    fn name(&self) -> &'static str {
        "full_listing"
    }

    async fn try_fetch(&self, _query: &ListQuery) -> Result<Vec<BookState>, SourceError> {
        self.catalog
            .current_books()
            .await
            .map_err(SourceError::failed)
    }
}

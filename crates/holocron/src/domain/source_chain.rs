//! First-responder composition over interchangeable data sources
//!
//! Each source either answers, declines ("not mine, ask the next one"), or
//! fails. The chain returns the first answer. Declines and failures both move
//! on to the next source; they differ only in how loudly they are logged.

use async_trait::async_trait;
use std::error::Error as StdError;
use thiserror::Error;
use tracing::{debug, warn};

pub type BoxedError = Box<dyn StdError + Send + Sync>;

#[derive(Debug, Error)]
pub enum SourceError {
    /// The criteria are outside this source's responsibility
    #[error("declined")]
    Declined,

    #[error(transparent)]
    Failed(BoxedError),
}

impl SourceError {
    pub fn failed(source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Failed(Box::new(source))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("no source could answer ({attempted} tried, {failed} failed)")]
pub struct ChainExhausted {
    pub attempted: usize,
    pub failed: usize,
}

#[async_trait]
pub trait Source: Send + Sync {
    type Criteria: ?Sized + Sync;
    type Output: Send;

    /// Short name for logs
    fn name(&self) -> &'static str;

    async fn try_fetch(&self, criteria: &Self::Criteria) -> Result<Self::Output, SourceError>;
}

type DynSource<C, O> = Box<dyn Source<Criteria = C, Output = O>>;

/// Ordered list of sources, tried front to back
pub struct SourceChain<C: ?Sized + Sync, O: Send> {
    sources: Vec<DynSource<C, O>>,
}

impl<C: ?Sized + Sync, O: Send> Default for SourceChain<C, O> {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
        }
    }
}

impl<C: ?Sized + Sync, O: Send> SourceChain<C, O> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a source to the end of the chain
    #[must_use]
    pub fn with_source<S>(mut self, source: S) -> Self
    where
        S: Source<Criteria = C, Output = O> + 'static,
    {
        self.sources.push(Box::new(source));
        self
    }

    pub fn push(&mut self, source: DynSource<C, O>) {
        self.sources.push(source);
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub async fn fetch(&self, criteria: &C) -> Result<O, ChainExhausted> {
        let mut failed = 0;

        for source in &self.sources {
            match source.try_fetch(criteria).await {
                Ok(output) => {
                    debug!(source = source.name(), "source answered");
                    return Ok(output);
                }
                Err(SourceError::Declined) => {
                    debug!(source = source.name(), "source declined");
                }
                Err(SourceError::Failed(e)) => {
                    failed += 1;
                    warn!(source = source.name(), error = %e, "source failed");
                }
            }
        }

        Err(ChainExhausted {
            attempted: self.sources.len(),
            failed,
        })
    }
}

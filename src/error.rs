//! Typed errors for the crawl pipeline.
//!
//! Per-item failures ([`CrawlError::Fetch`], [`CrawlError::Parse`]) are
//! recovered where they happen: the source or candidate is dropped, the error
//! is logged, and the worker moves on. [`CrawlError::Persistence`] is the only
//! run-level failure and is surfaced to `main`.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while crawling, extracting, caching or persisting.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Network failure, timeout or non-success status while fetching a URL.
    #[error("fetch failed for {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// A document could not be parsed into something usable.
    #[error("could not parse {url}: {reason}")]
    Parse { url: String, reason: String },

    /// Reading or appending the dedup log failed.
    #[error("dedup log error at {}: {source}", path.display())]
    Cache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The sink could not store the collected records.
    #[error("{sink} sink failed: {source}")]
    Persistence {
        sink: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Invalid registry or run configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CrawlError {
    pub fn parse(url: impl Into<String>, reason: impl Into<String>) -> Self {
        CrawlError::Parse {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn persistence<E>(sink: &'static str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CrawlError::Persistence {
            sink,
            source: Box::new(source),
        }
    }

    /// Short label used as a structured logging field.
    pub fn kind(&self) -> &'static str {
        match self {
            CrawlError::Fetch { .. } => "fetch",
            CrawlError::Parse { .. } => "parse",
            CrawlError::Cache { .. } => "cache",
            CrawlError::Persistence { .. } => "persistence",
            CrawlError::Config(_) => "config",
        }
    }
}

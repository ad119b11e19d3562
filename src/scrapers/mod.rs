//! Source scrapers: turn a fetched source document into candidate entries.
//!
//! Each [`SourceVariant`] has one way of finding candidates:
//!
//! | Variant | Module | Candidates |
//! |---------|--------|------------|
//! | `StructuredFeed` | [`xml_feed`] | every `item` element |
//! | `Sitemap` | [`xml_feed`] | every `item`, else every `url` entry |
//! | `LinkList` | [`link_list`] | every anchor whose text is on topic |
//!
//! Source documents are downloaded through the [`SourceFetcher`] trait so
//! the fetch stage can run against canned documents in tests.

pub mod link_list;
pub mod xml_feed;

use crate::error::CrawlError;
use crate::models::{CandidateEntry, SourceDescriptor, SourceVariant};
use crate::relevance::RelevanceFilter;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Sent with every request; some publishers reject unknown agents.
pub const USER_AGENT: &str = "Mozilla/5.0";

/// Upper bound on downloading one source document.
pub const SOURCE_TIMEOUT: Duration = Duration::from_secs(5);

/// Downloads a source document as text.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, CrawlError>;
}

/// [`SourceFetcher`] over HTTP with the source timeout applied.
#[derive(Debug, Clone)]
pub struct HttpSourceFetcher {
    client: reqwest::Client,
}

impl HttpSourceFetcher {
    pub fn new() -> Result<Self, CrawlError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(SOURCE_TIMEOUT)
            .build()
            .map_err(|e| CrawlError::Config(format!("cannot build source HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SourceFetcher for HttpSourceFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<String, CrawlError> {
        let fetch_err = |source| CrawlError::Fetch {
            url: url.to_string(),
            source,
        };
        self.client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(fetch_err)?
            .text()
            .await
            .map_err(fetch_err)
    }
}

impl SourceVariant {
    /// Parse `body` (the document behind `source.url`) into candidates.
    pub fn extract_candidates(
        self,
        body: &str,
        source: &Arc<SourceDescriptor>,
        relevance: &RelevanceFilter,
    ) -> Result<Vec<CandidateEntry>, CrawlError> {
        match self {
            SourceVariant::StructuredFeed => xml_feed::feed_candidates(body, source, false),
            SourceVariant::Sitemap => xml_feed::feed_candidates(body, source, true),
            SourceVariant::LinkList => Ok(link_list::link_candidates(body, source, relevance)),
        }
    }
}

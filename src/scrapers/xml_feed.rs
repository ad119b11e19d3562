//! RSS feeds and sitemaps.

use crate::error::CrawlError;
use crate::feed::{XmlElement, parse_document};
use crate::models::{CandidateEntry, CandidateItem, SourceDescriptor};
use std::sync::Arc;

/// Parse `xml` and turn each `item` into a candidate. With
/// `url_fallback`, a document without items yields its `url` entries
/// instead (Google News sitemaps).
pub fn feed_candidates(
    xml: &str,
    source: &Arc<SourceDescriptor>,
    url_fallback: bool,
) -> Result<Vec<CandidateEntry>, CrawlError> {
    let document = Arc::new(parse_document(&source.url, xml)?);

    let mut entries: Vec<&XmlElement> = document.find_all("item");
    if entries.is_empty() && url_fallback {
        entries = document.find_all("url");
    }

    Ok(entries
        .into_iter()
        .map(|el| CandidateEntry {
            item: CandidateItem::Element(el.clone()),
            document: Some(Arc::clone(&document)),
            source: Arc::clone(source),
        })
        .collect())
}

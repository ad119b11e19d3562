//! Link-list pages: plain HTML pages listing article links.
//!
//! There is no per-item metadata to go on, so the anchor text is the only
//! early signal: an anchor becomes a candidate when its visible text passes
//! the relevance filter.

use crate::models::{CandidateEntry, CandidateItem, SourceDescriptor};
use crate::relevance::RelevanceFilter;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::sync::Arc;
use tracing::debug;
use url::Url;

static ANCHORS: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("valid selector"));

/// Collect on-topic anchors from `html` as bare-URL candidates.
///
/// Absolute hrefs are kept exactly as written. Relative hrefs are resolved
/// against the source URL.
pub fn link_candidates(
    html: &str,
    source: &Arc<SourceDescriptor>,
    relevance: &RelevanceFilter,
) -> Vec<CandidateEntry> {
    let document = Html::parse_document(html);
    let base = Url::parse(&source.url).ok();

    let mut candidates = Vec::new();
    for anchor in document.select(&ANCHORS) {
        let text = anchor.text().collect::<String>();
        if !relevance.matches(&text) {
            continue;
        }
        let Some(href) = anchor.value().attr("href").map(str::trim) else {
            continue;
        };
        let Some(url) = resolve_href(href, base.as_ref()) else {
            debug!(%href, source = %source.url, "Skipping unresolvable link");
            continue;
        };
        candidates.push(CandidateEntry {
            item: CandidateItem::Link(url),
            document: None,
            source: Arc::clone(source),
        });
    }
    candidates
}

fn resolve_href(href: &str, base: Option<&Url>) -> Option<String> {
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    if Url::parse(href).is_ok() {
        return Some(href.to_string());
    }
    base?.join(href).ok().map(|u| u.to_string())
}

//! Data models shared by the crawl stages.
//!
//! - [`SourceDescriptor`]: one configured source (locale, URL, schema, variant)
//! - [`CandidateEntry`]: an item parsed out of a source, before its article is fetched
//! - [`CanonicalRecord`]: the normalized article handed to a sink
//!
//! Records serialize with camelCase keys (`siteName`, `publishedAt`, ...),
//! the shape consumers of the JSONL files and the database rows expect.

use crate::feed::XmlElement;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How a source document is turned into candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceVariant {
    /// RSS/Atom style feed: one candidate per `item`.
    StructuredFeed,
    /// Like a feed, but falls back to `url` entries when there are no items.
    Sitemap,
    /// Plain HTML page: one candidate per relevant anchor.
    LinkList,
}

/// Tag names that hold each logical field inside a source item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct FieldSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<String>,
}

impl FieldSchema {
    /// Feed schema with the usual `title`/`description`/`link` tags.
    pub fn rss() -> Self {
        Self {
            title: Some("title".into()),
            description: Some("description".into()),
            url: Some("link".into()),
            publish_date: None,
        }
    }

    /// Without a title or description tag nothing can be filtered before
    /// the article itself is fetched.
    pub fn can_prefilter(&self) -> bool {
        self.title.is_some() || self.description.is_some()
    }
}

/// A configured source. Built once at startup and shared read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub locale: String,
    pub url: String,
    pub schema: FieldSchema,
    pub variant: SourceVariant,
}

/// The raw item a candidate was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateItem {
    /// Feed or sitemap element.
    Element(XmlElement),
    /// Bare article URL taken from a link-list page.
    Link(String),
}

/// An unvalidated entry waiting for the processing stage.
#[derive(Debug, Clone)]
pub struct CandidateEntry {
    pub item: CandidateItem,
    /// Whole source document, used for document-level fallbacks such as
    /// `lastBuildDate`. Absent for link-list pages.
    pub document: Option<Arc<XmlElement>>,
    pub source: Arc<SourceDescriptor>,
}

impl CandidateEntry {
    pub fn locale(&self) -> &str {
        &self.source.locale
    }

    /// Text of the schema-declared tag on this item, or `""`.
    pub fn field_text(&self, tag: Option<&str>) -> String {
        match (&self.item, tag) {
            (CandidateItem::Element(el), Some(tag)) => el.find_text(tag).unwrap_or_default(),
            _ => String::new(),
        }
    }

    /// The article URL this candidate points at.
    pub fn resolve_url(&self) -> Option<String> {
        let url = match &self.item {
            CandidateItem::Link(url) => url.trim().to_string(),
            CandidateItem::Element(el) => match self.source.schema.url.as_deref() {
                Some(tag) => el.find_text(tag)?,
                None => el.text(),
            },
        };
        (!url.is_empty()).then_some(url)
    }
}

/// A fully resolved article, ready for persistence.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRecord {
    pub url: String,
    pub title: String,
    pub description: String,
    pub content: String,
    pub author: String,
    pub language: String,
    pub site_name: String,
    pub published_at: String,
    pub added_on: String,
    pub url_to_image: String,
}

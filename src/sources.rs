//! Source registry: which sources to crawl for each locale.
//!
//! The built-in registry covers the English and Chinese sources the crawler
//! was written for. A YAML file can replace it:
//!
//! ```yaml
//! keywords: [corona, coronavirus]
//! sources:
//!   en:
//!     - url: https://www.theage.com.au/rss/world.xml
//!       variant: structured_feed
//!       schema: { title: title, description: description, url: link }
//!   zh:
//!     - url: https://news.pts.org.tw/dailynews.php
//!       variant: link_list
//! ```

use crate::error::CrawlError;
use crate::models::{FieldSchema, SourceDescriptor, SourceVariant};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use url::Url;

/// One source entry as written in the registry file.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceEntry {
    pub url: String,
    pub variant: SourceVariant,
    #[serde(default)]
    pub schema: FieldSchema,
}

/// Locale → ordered sources, plus an optional keyword override.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceRegistry {
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
    pub sources: BTreeMap<String, Vec<SourceEntry>>,
}

const RSS_FEEDS_EN: [&str; 10] = [
    "https://www.scmp.com/rss/318208/feed",
    "https://www.theage.com.au/rss/feed.xml",
    "https://www.theage.com.au/rss/world.xml",
    "https://www.news.com.au/content-feeds/latest-news-world/",
    "https://www.news.com.au/content-feeds/latest-news-national/",
    "http://www.dailytelegraph.com.au/news/breaking-news/rss",
    "http://www.dailytelegraph.com.au/news/national/rss",
    "http://www.dailytelegraph.com.au/newslocal/rss",
    "http://www.dailytelegraph.com.au/news/world/rss",
    "https://www.sbs.com.au/news/topic/latest/feed",
];

impl SourceRegistry {
    /// The registry compiled into the binary.
    pub fn builtin() -> Self {
        let mut en: Vec<SourceEntry> = RSS_FEEDS_EN
            .iter()
            .map(|url| SourceEntry {
                url: url.to_string(),
                variant: SourceVariant::StructuredFeed,
                schema: FieldSchema::rss(),
            })
            .collect();
        en.push(SourceEntry {
            url: "https://www.channelnewsasia.com/googlenews/cna_news_sitemap.xml".into(),
            variant: SourceVariant::Sitemap,
            schema: FieldSchema {
                title: Some("title".into()),
                description: Some("news:keywords".into()),
                url: Some("loc".into()),
                publish_date: Some("news:publication_date".into()),
            },
        });

        let zh = vec![
            SourceEntry {
                url: "https://news.cts.com.tw/sitemap.xml".into(),
                variant: SourceVariant::Sitemap,
                schema: FieldSchema {
                    url: Some("loc".into()),
                    ..Default::default()
                },
            },
            SourceEntry {
                url: "https://news.pts.org.tw/dailynews.php".into(),
                variant: SourceVariant::LinkList,
                schema: FieldSchema::default(),
            },
        ];

        Self {
            keywords: None,
            sources: BTreeMap::from([("en".to_string(), en), ("zh".to_string(), zh)]),
        }
    }

    /// Parse a registry from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, CrawlError> {
        serde_yaml::from_str(text)
            .map_err(|e| CrawlError::Config(format!("source registry is not valid YAML: {e}")))
    }

    /// Load a registry file.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Self, CrawlError> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            CrawlError::Config(format!("cannot read source registry {}: {e}", path.display()))
        })?;
        let registry = Self::from_yaml(&text)?;
        info!(locales = registry.sources.len(), "Loaded source registry");
        Ok(registry)
    }

    /// Validate and flatten into descriptors, locales sorted, sources in
    /// registry order.
    pub fn descriptors(&self) -> Result<Vec<Arc<SourceDescriptor>>, CrawlError> {
        let mut out = Vec::new();
        for (locale, entries) in &self.sources {
            if locale.trim().is_empty() {
                return Err(CrawlError::Config("empty locale code".into()));
            }
            debug!(%locale, count = entries.len(), "Registering sources");
            for entry in entries {
                Url::parse(&entry.url).map_err(|e| {
                    CrawlError::Config(format!("invalid source URL {:?} ({locale}): {e}", entry.url))
                })?;
                out.push(Arc::new(SourceDescriptor {
                    locale: locale.clone(),
                    url: entry.url.clone(),
                    schema: entry.schema.clone(),
                    variant: entry.variant,
                }));
            }
        }
        if out.is_empty() {
            return Err(CrawlError::Config("source registry has no sources".into()));
        }
        Ok(out)
    }
}

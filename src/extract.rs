//! Article extraction: download an article page and pull out its text and
//! metadata.
//!
//! The processing stage only depends on the [`ArticleExtractor`] trait.
//! [`HtmlArticleExtractor`] is the production implementation: it fetches the
//! page with `reqwest` and reads it with `scraper`.
//!
//! # Metadata layout
//!
//! `<meta>` tags are keyed by their `name`, `property` or `itemprop`
//! attribute. Prefixed keys are split on the first colon into nested maps,
//! so `og:title` lands in [`ArticleMetadata::og`] under `title` and
//! `article:modified_time` in [`ArticleMetadata::article`] under
//! `modified_time`. Everything else stays in [`ArticleMetadata::fields`].

use crate::error::CrawlError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Metadata read from the article's `<meta>` tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleMetadata {
    /// Unprefixed tags such as `description` or `keywords`.
    pub fields: HashMap<String, String>,
    /// OpenGraph tags (`og:*`) without their prefix.
    pub og: HashMap<String, String>,
    /// Article tags (`article:*`) without their prefix.
    pub article: HashMap<String, String>,
}

impl ArticleMetadata {
    /// Plain value for `key`, else its OpenGraph value, ignoring blanks.
    pub fn resolve(&self, key: &str) -> Option<&str> {
        non_blank(self.fields.get(key)).or_else(|| non_blank(self.og.get(key)))
    }

    fn insert(&mut self, key: &str, value: &str) {
        let (map, key) = match key.split_once(':') {
            Some(("og", rest)) => (&mut self.og, rest),
            Some(("article", rest)) => (&mut self.article, rest),
            _ => (&mut self.fields, key),
        };
        // first occurrence wins, like a browser reading the head
        map.entry(key.to_string()).or_insert_with(|| value.trim().to_string());
    }
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.trim().is_empty())
}

/// Everything the processing stage needs from an article page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedArticle {
    /// URL after redirects.
    pub url: String,
    /// Scheme and host of the article, e.g. `https://www.example.com`.
    pub source_url: String,
    pub text: String,
    pub authors: Vec<String>,
    pub language: String,
    pub publish_date: Option<DateTime<Utc>>,
    pub top_image: String,
    pub metadata: ArticleMetadata,
}

/// Turns an article URL into an [`ExtractedArticle`].
#[async_trait]
pub trait ArticleExtractor: Send + Sync {
    async fn extract(&self, url: &str) -> Result<ExtractedArticle, CrawlError>;
}

/// Fetches article pages over HTTP and parses the HTML.
#[derive(Debug, Clone)]
pub struct HtmlArticleExtractor {
    client: reqwest::Client,
}

impl HtmlArticleExtractor {
    /// Build an extractor whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, CrawlError> {
        let client = reqwest::Client::builder()
            .user_agent(crate::scrapers::USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| CrawlError::Config(format!("cannot build article HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ArticleExtractor for HtmlArticleExtractor {
    #[instrument(level = "debug", skip(self))]
    async fn extract(&self, url: &str) -> Result<ExtractedArticle, CrawlError> {
        let fetch_err = |source| CrawlError::Fetch {
            url: url.to_string(),
            source,
        };
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(fetch_err)?;
        let final_url = response.url().clone();
        let html = response.text().await.map_err(fetch_err)?;
        debug!(bytes = html.len(), final_url = %final_url, "Downloaded article");
        Ok(parse_article(&html, &final_url))
    }
}

macro_rules! selector {
    ($name:ident, $css:expr) => {
        static $name: Lazy<Selector> = Lazy::new(|| Selector::parse($css).expect("valid selector"));
    };
}

selector!(META, "meta[content]");
selector!(HTML_ROOT, "html");
selector!(ARTICLE_PARAGRAPHS, "article p");
selector!(PARAGRAPHS, "p");
selector!(BYLINES, "[rel='author'], [itemprop='author'], .byline, .author");
selector!(TIME, "time[datetime]");
selector!(IMAGES, "img[src]");

/// Parse a downloaded article page.
pub fn parse_article(html: &str, url: &Url) -> ExtractedArticle {
    let document = Html::parse_document(html);

    let mut metadata = ArticleMetadata::default();
    for meta in document.select(&META) {
        let el = meta.value();
        let key = el
            .attr("name")
            .or_else(|| el.attr("property"))
            .or_else(|| el.attr("itemprop"))
            .or_else(|| el.attr("http-equiv"));
        if let (Some(key), Some(content)) = (key, el.attr("content")) {
            metadata.insert(&key.trim().to_lowercase(), content);
        }
    }

    ExtractedArticle {
        url: url.to_string(),
        source_url: source_url(url),
        text: extract_text(&document),
        authors: extract_authors(&document, &metadata),
        language: extract_language(&document, &metadata),
        publish_date: extract_publish_date(&document, &metadata),
        top_image: extract_top_image(&document, &metadata, url),
        metadata,
    }
}

fn source_url(url: &Url) -> String {
    match url.host_str() {
        Some(host) => format!("{}://{}", url.scheme(), host),
        None => url.to_string(),
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().join(" ")
}

fn extract_text(document: &Html) -> String {
    let collect = |selector: &Selector| {
        document
            .select(selector)
            .map(element_text)
            .filter(|p| !p.is_empty())
            .join("\n\n")
    };
    let text = collect(&*ARTICLE_PARAGRAPHS);
    if text.is_empty() { collect(&*PARAGRAPHS) } else { text }
}

fn extract_authors(document: &Html, metadata: &ArticleMetadata) -> Vec<String> {
    let from_meta = metadata
        .fields
        .get("author")
        .or_else(|| metadata.article.get("author"))
        .into_iter()
        .flat_map(|v| v.split([',', ';']).map(str::to_string).collect::<Vec<_>>());

    let from_bylines = document
        .select(&BYLINES)
        .map(element_text)
        .filter(|t| t.len() < 100);

    from_meta
        .chain(from_bylines)
        .map(|a| {
            let a = a.trim();
            a.strip_prefix("By ")
                .or_else(|| a.strip_prefix("by "))
                .unwrap_or(a)
                .trim()
                .to_string()
        })
        .filter(|a| !a.is_empty() && !a.starts_with("http"))
        .unique_by(|a| a.to_lowercase())
        .collect()
}

fn extract_language(document: &Html, metadata: &ArticleMetadata) -> String {
    let raw = document
        .select(&HTML_ROOT)
        .next()
        .and_then(|html| html.value().attr("lang"))
        .filter(|lang| !lang.trim().is_empty())
        .or_else(|| non_blank(metadata.fields.get("content-language")))
        .or_else(|| non_blank(metadata.fields.get("language")))
        .or_else(|| non_blank(metadata.og.get("locale")))
        .unwrap_or_default();
    raw.trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn extract_publish_date(document: &Html, metadata: &ArticleMetadata) -> Option<DateTime<Utc>> {
    let from_meta = [
        metadata.article.get("published_time"),
        metadata.fields.get("datepublished"),
        metadata.fields.get("pubdate"),
        metadata.fields.get("date"),
    ]
    .into_iter()
    .flatten()
    .find_map(|v| parse_date(v));

    from_meta.or_else(|| {
        document
            .select(&TIME)
            .filter_map(|t| t.value().attr("datetime"))
            .find_map(parse_date)
    })
}

fn extract_top_image(document: &Html, metadata: &ArticleMetadata, url: &Url) -> String {
    let candidate = non_blank(metadata.og.get("image"))
        .or_else(|| non_blank(metadata.fields.get("twitter:image")))
        .map(str::to_string)
        .or_else(|| {
            document
                .select(&IMAGES)
                .filter_map(|img| img.value().attr("src"))
                .map(str::to_string)
                .next()
        });
    candidate
        .and_then(|src| url.join(src.trim()).ok())
        .map(|u| u.to_string())
        .unwrap_or_default()
}

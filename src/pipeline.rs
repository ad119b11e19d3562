//! Two-phase crawl pipeline.
//!
//! 1. **Fetch stage**: a fixed pool of workers drains the source queue,
//!    downloads each source and pushes its candidates onto the candidate queue.
//! 2. **Processing stage**: once every fetch worker has exited, a second pool
//!    of the same size drains the candidate queue. Each candidate is
//!    pre-filtered, deduplicated, extracted, filtered again and turned into a
//!    [`CanonicalRecord`].
//!
//! Failures are contained per item. A source or candidate that errors (or
//! panics) is logged and dropped, and its worker carries on with the next
//! item. Both phases always run to completion.
//!
//! All shared state travels in an explicit [`RunContext`].

use crate::cache::DedupCache;
use crate::dates;
use crate::error::CrawlError;
use crate::extract::{ArticleExtractor, ExtractedArticle};
use crate::models::{CandidateEntry, CanonicalRecord, SourceDescriptor};
use crate::relevance::RelevanceFilter;
use crate::scrapers::SourceFetcher;
use futures::FutureExt;
use futures::future::join_all;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// Default size of each worker pool.
pub const DEFAULT_WORKERS: usize = 10;

/// Flags and shared handles for one run.
pub struct RunContext {
    pub workers: usize,
    pub fetcher: Arc<dyn SourceFetcher>,
    pub extractor: Arc<dyn ArticleExtractor>,
    pub cache: Arc<DedupCache>,
    pub relevance: Arc<RelevanceFilter>,
}

/// FIFO queue drained by a worker pool.
#[derive(Debug)]
pub struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self::from_items(Vec::new())
    }

    pub fn from_items(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            items: Mutex::new(items.into_iter().collect()),
        }
    }

    pub async fn extend(&self, items: impl IntoIterator<Item = T>) {
        self.items.lock().await.extend(items);
    }

    pub async fn pop(&self) -> Option<T> {
        self.items.lock().await.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Records grouped by locale, in completion order.
#[derive(Debug, Default)]
pub struct ResultCollection {
    records: Mutex<BTreeMap<String, Vec<CanonicalRecord>>>,
}

impl ResultCollection {
    pub async fn push(&self, locale: &str, record: CanonicalRecord) {
        self.records
            .lock()
            .await
            .entry(locale.to_string())
            .or_default()
            .push(record);
    }

    pub fn into_inner(self) -> BTreeMap<String, Vec<CanonicalRecord>> {
        self.records.into_inner()
    }
}

/// Counters kept while a run is in progress.
#[derive(Debug, Default)]
pub struct RunStats {
    pub sources_fetched: AtomicUsize,
    pub sources_failed: AtomicUsize,
    pub candidates: AtomicUsize,
    pub irrelevant: AtomicUsize,
    pub duplicates: AtomicUsize,
    pub failed: AtomicUsize,
    pub records: AtomicUsize,
}

impl RunStats {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicUsize| c.load(Ordering::Relaxed);
        StatsSnapshot {
            sources_fetched: get(&self.sources_fetched),
            sources_failed: get(&self.sources_failed),
            candidates: get(&self.candidates),
            irrelevant: get(&self.irrelevant),
            duplicates: get(&self.duplicates),
            failed: get(&self.failed),
            records: get(&self.records),
        }
    }
}

/// Plain copy of [`RunStats`] for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub sources_fetched: usize,
    pub sources_failed: usize,
    pub candidates: usize,
    pub irrelevant: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub records: usize,
}

/// What happened to one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Record(Box<CanonicalRecord>),
    Irrelevant,
    Duplicate,
}

/// Output of [`run`].
#[derive(Debug)]
pub struct RunOutput {
    pub records: BTreeMap<String, Vec<CanonicalRecord>>,
    pub stats: StatsSnapshot,
}

/// Run both phases over `sources` and return what was collected.
#[instrument(level = "info", skip_all, fields(sources = sources.len(), workers = ctx.workers))]
pub async fn run(ctx: Arc<RunContext>, sources: Vec<Arc<SourceDescriptor>>) -> RunOutput {
    let stats = Arc::new(RunStats::default());
    let source_queue = Arc::new(WorkQueue::from_items(sources));
    let candidate_queue = Arc::new(WorkQueue::new());

    {
        let ctx = Arc::clone(&ctx);
        let stats = Arc::clone(&stats);
        let candidate_queue = Arc::clone(&candidate_queue);
        run_pool("fetch", ctx.workers, source_queue, move |source| {
            fetch_source(
                Arc::clone(&ctx),
                Arc::clone(&stats),
                Arc::clone(&candidate_queue),
                source,
            )
        })
        .await;
    }
    info!(
        candidates = candidate_queue.len().await,
        fetched = stats.sources_fetched.load(Ordering::Relaxed),
        failed = stats.sources_failed.load(Ordering::Relaxed),
        "Fetch stage drained"
    );

    let results = Arc::new(ResultCollection::default());
    {
        let ctx = Arc::clone(&ctx);
        let stats = Arc::clone(&stats);
        let results = Arc::clone(&results);
        run_pool("process", ctx.workers, candidate_queue, move |candidate| {
            handle_candidate(
                Arc::clone(&ctx),
                Arc::clone(&stats),
                Arc::clone(&results),
                candidate,
            )
        })
        .await;
    }

    let stats = stats.snapshot();
    info!(?stats, "Processing stage drained");

    let records = match Arc::try_unwrap(results) {
        Ok(results) => results.into_inner(),
        // every worker has been joined, so this is unreachable in practice
        Err(shared) => shared.records.lock().await.clone(),
    };
    RunOutput { records, stats }
}

/// Spawn `workers` tasks that pop from `queue` until it is empty. A panic
/// inside `handler` is caught and logged; the worker continues.
async fn run_pool<T, F, Fut>(stage: &'static str, workers: usize, queue: Arc<WorkQueue<T>>, handler: F)
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let handler = Arc::new(handler);
    let handles = (0..workers.max(1)).map(|worker| {
        let queue = Arc::clone(&queue);
        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            let mut handled = 0usize;
            while let Some(item) = queue.pop().await {
                if AssertUnwindSafe(handler(item)).catch_unwind().await.is_err() {
                    error!(stage, worker, "Item handler panicked; continuing with next item");
                }
                handled += 1;
            }
            debug!(stage, worker, handled, "Worker finished");
        })
    });

    for joined in join_all(handles).await {
        if let Err(e) = joined {
            error!(stage, error = %e, "Worker task failed");
        }
    }
}

async fn fetch_source(
    ctx: Arc<RunContext>,
    stats: Arc<RunStats>,
    queue: Arc<WorkQueue<CandidateEntry>>,
    source: Arc<SourceDescriptor>,
) {
    debug!(url = %source.url, locale = %source.locale, "Fetching source");
    match collect_candidates(&ctx, &source).await {
        Ok(candidates) => {
            RunStats::bump(&stats.sources_fetched);
            stats.candidates.fetch_add(candidates.len(), Ordering::Relaxed);
            info!(url = %source.url, count = candidates.len(), "Collected candidates");
            queue.extend(candidates).await;
        }
        Err(e) => {
            RunStats::bump(&stats.sources_failed);
            warn!(url = %source.url, kind = e.kind(), error = %e, "Source skipped");
        }
    }
}

/// Download one source and parse it according to its variant.
pub async fn collect_candidates(
    ctx: &RunContext,
    source: &Arc<SourceDescriptor>,
) -> Result<Vec<CandidateEntry>, CrawlError> {
    let body = ctx.fetcher.fetch(&source.url).await?;
    source
        .variant
        .extract_candidates(&body, source, &ctx.relevance)
}

async fn handle_candidate(
    ctx: Arc<RunContext>,
    stats: Arc<RunStats>,
    results: Arc<ResultCollection>,
    candidate: CandidateEntry,
) {
    let locale = candidate.locale().to_string();
    match process_candidate(&ctx, &candidate).await {
        Ok(Outcome::Record(record)) => {
            RunStats::bump(&stats.records);
            debug!(url = %record.url, %locale, "Record collected");
            results.push(&locale, *record).await;
        }
        Ok(Outcome::Irrelevant) => RunStats::bump(&stats.irrelevant),
        Ok(Outcome::Duplicate) => RunStats::bump(&stats.duplicates),
        Err(e) => {
            RunStats::bump(&stats.failed);
            warn!(source = %candidate.source.url, kind = e.kind(), error = %e, "Candidate dropped");
        }
    }
}

/// Run one candidate through filtering, dedup, extraction and synthesis.
pub async fn process_candidate(
    ctx: &RunContext,
    candidate: &CandidateEntry,
) -> Result<Outcome, CrawlError> {
    let schema = &candidate.source.schema;

    // Cheap filter on feed text before paying for the article download.
    let (feed_title, feed_description) = if schema.can_prefilter() {
        let title = candidate.field_text(schema.title.as_deref());
        let description = candidate.field_text(schema.description.as_deref());
        if !ctx.relevance.matches_any(&[title.as_str(), description.as_str()]) {
            return Ok(Outcome::Irrelevant);
        }
        (title, description)
    } else {
        (String::new(), String::new())
    };

    let url = candidate
        .resolve_url()
        .ok_or_else(|| CrawlError::parse(&candidate.source.url, "entry has no article URL"))?;

    if !ctx.cache.check_and_insert(&url).await? {
        return Ok(Outcome::Duplicate);
    }

    let added_on = dates::now_canonical();
    let article = ctx.extractor.extract(&url).await?;
    if article.url != url {
        debug!(%url, final_url = %article.url, "Article was redirected");
    }

    let title = metadata_or(&article, "title", feed_title);
    let description = metadata_or(&article, "description", feed_description);
    let keywords = metadata_or(&article, "keywords", String::new());

    if !ctx.relevance.matches_any(&[title.as_str(), description.as_str(), keywords.as_str()]) {
        debug!(%url, "Article is off topic after extraction");
        return Ok(Outcome::Irrelevant);
    }

    let published_at = resolve_published_at(candidate, &article);

    Ok(Outcome::Record(Box::new(CanonicalRecord {
        site_name: site_name(&article.source_url),
        author: article.authors.iter().join(", "),
        language: article.language,
        content: article.text,
        url_to_image: article.top_image,
        url,
        title,
        description,
        published_at,
        added_on,
    })))
}

/// Extraction metadata for `key` (plain, then OpenGraph), else `fallback`.
fn metadata_or(article: &ExtractedArticle, key: &str, fallback: String) -> String {
    article
        .metadata
        .resolve(key)
        .map(str::to_string)
        .unwrap_or(fallback)
}

static SCHEME_AND_WWW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://(www\.)?").expect("valid site regex"));

/// `https://www.example.com` → `example.com`.
pub fn site_name(source_url: &str) -> String {
    SCHEME_AND_WWW.replace(source_url, "").into_owned()
}

/// First non-empty publish date among, in order: the schema's publish-date
/// tag, the item's `pubDate`, the extractor's parsed date, the article's
/// modified time, the document's `lastBuildDate`, and finally the current
/// time. Feeds mostly carry fresh items, so "now" is a fair last resort.
pub fn resolve_published_at(candidate: &CandidateEntry, article: &ExtractedArticle) -> String {
    let non_empty = |s: String| (!s.trim().is_empty()).then_some(s);

    let schema_date = candidate
        .source
        .schema
        .publish_date
        .as_deref()
        .map(|tag| candidate.field_text(Some(tag)))
        .and_then(non_empty);
    if let Some(raw) = schema_date {
        return normalized(&raw, "schema");
    }

    if let Some(raw) = non_empty(candidate.field_text(Some("pubDate"))) {
        return normalized(&raw, "pubDate");
    }

    if let Some(date) = article.publish_date {
        return dates::format_canonical(&date);
    }

    if let Some(raw) = article.metadata.article.get("modified_time").cloned().and_then(non_empty) {
        return normalized(&raw, "article:modified_time");
    }

    let build_date = candidate
        .document
        .as_ref()
        .and_then(|doc| doc.find_text("lastBuildDate"))
        .and_then(non_empty);
    if let Some(raw) = build_date {
        return normalized(&raw, "lastBuildDate");
    }

    dates::now_canonical()
}

fn normalized(raw: &str, origin: &'static str) -> String {
    let date = dates::normalize(raw);
    if !date.is_canonical() {
        warn!(input = %raw, origin, "Unrecognized date format stored verbatim");
    }
    date.into_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheMode;
    use crate::extract::ArticleMetadata;
    use crate::feed::parse_document;
    use crate::models::{CandidateItem, FieldSchema, SourceVariant};
    use crate::sources::SourceRegistry;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[derive(Default)]
    struct StubFetcher {
        documents: HashMap<String, String>,
    }

    #[async_trait]
    impl SourceFetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<String, CrawlError> {
            self.documents
                .get(url)
                .cloned()
                .ok_or_else(|| CrawlError::parse(url, "no such document"))
        }
    }

    #[derive(Default)]
    struct StubExtractor {
        articles: HashMap<String, ExtractedArticle>,
        calls: StdMutex<Vec<String>>,
        delay: Option<Duration>,
        panic_on: Option<String>,
    }

    impl StubExtractor {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ArticleExtractor for StubExtractor {
        async fn extract(&self, url: &str) -> Result<ExtractedArticle, CrawlError> {
            self.calls.lock().unwrap().push(url.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.panic_on.as_deref() == Some(url) {
                panic!("extractor blew up on {url}");
            }
            self.articles
                .get(url)
                .cloned()
                .ok_or_else(|| CrawlError::parse(url, "no such article"))
        }
    }

    fn article(url: &str, og_title: &str) -> ExtractedArticle {
        let mut metadata = ArticleMetadata::default();
        if !og_title.is_empty() {
            metadata.og.insert("title".into(), og_title.into());
        }
        ExtractedArticle {
            url: url.into(),
            source_url: "https://www.example.com".into(),
            text: "Full article text".into(),
            authors: vec!["Jane Doe".into(), "John Roe".into()],
            language: "en".into(),
            publish_date: None,
            top_image: "https://www.example.com/lead.jpg".into(),
            metadata,
        }
    }

    fn descriptor(url: &str, schema: FieldSchema, variant: SourceVariant) -> Arc<SourceDescriptor> {
        Arc::new(SourceDescriptor {
            locale: "en".into(),
            url: url.into(),
            schema,
            variant,
        })
    }

    fn feed_candidate(item_xml: &str, schema: FieldSchema) -> CandidateEntry {
        let doc = parse_document(
            "u",
            &format!(
                "<rss><channel><lastBuildDate>Sat, 25 Jan 2020 03:00:00 +0000</lastBuildDate>{item_xml}</channel></rss>"
            ),
        )
        .unwrap();
        CandidateEntry {
            item: CandidateItem::Element(doc.find("item").unwrap().clone()),
            document: Some(Arc::new(doc)),
            source: descriptor("https://feed.example.com/rss", schema, SourceVariant::StructuredFeed),
        }
    }

    async fn context(
        cache_path: &Path,
        mode: CacheMode,
        fetcher: StubFetcher,
        extractor: Arc<StubExtractor>,
    ) -> RunContext {
        RunContext {
            workers: 4,
            fetcher: Arc::new(fetcher),
            extractor,
            cache: Arc::new(DedupCache::open(cache_path, mode).await.unwrap()),
            relevance: Arc::new(RelevanceFilter::default()),
        }
    }

    fn record_of(outcome: Outcome) -> CanonicalRecord {
        match outcome {
            Outcome::Record(record) => *record,
            other => panic!("expected a record, got {other:?}"),
        }
    }

    #[test]
    fn test_site_name_strips_scheme_and_www() {
        assert_eq!(site_name("https://www.theage.com.au"), "theage.com.au");
        assert_eq!(site_name("http://news.cts.com.tw"), "news.cts.com.tw");
    }

    #[tokio::test]
    async fn test_work_queue_is_fifo() {
        let queue = WorkQueue::from_items([1, 2]);
        queue.extend([3]).await;
        assert_eq!(queue.len().await, 3);
        assert_eq!(queue.pop().await, Some(1));
        assert_eq!(queue.pop().await, Some(2));
        assert_eq!(queue.pop().await, Some(3));
        assert_eq!(queue.pop().await, None);
    }

    #[tokio::test]
    async fn test_irrelevant_feed_item_skips_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Arc::new(StubExtractor::default());
        let ctx = context(
            &dir.path().join("cache.txt"),
            CacheMode::Persistent,
            StubFetcher::default(),
            Arc::clone(&extractor),
        )
        .await;

        let candidate = feed_candidate(
            "<item><title>Cricket scores</title><description>Day two</description><link>https://a/1</link></item>",
            FieldSchema::rss(),
        );
        assert_eq!(process_candidate(&ctx, &candidate).await.unwrap(), Outcome::Irrelevant);
        assert!(extractor.calls().is_empty());
        assert!(!ctx.cache.contains("https://a/1").await);
    }

    #[tokio::test]
    async fn test_og_title_replaces_empty_feed_title() {
        let dir = tempfile::tempdir().unwrap();
        let url = "https://www.example.com/outbreak";
        let mut extractor = StubExtractor::default();
        extractor.articles.insert(url.into(), article(url, "Outbreak spreads"));
        let ctx = context(
            &dir.path().join("cache.txt"),
            CacheMode::Persistent,
            StubFetcher::default(),
            Arc::new(extractor),
        )
        .await;

        let candidate = feed_candidate(
            &format!("<item><title></title><description>coronavirus update</description><link>{url}</link></item>"),
            FieldSchema::rss(),
        );
        let record = record_of(process_candidate(&ctx, &candidate).await.unwrap());
        assert_eq!(record.title, "Outbreak spreads");
        assert_eq!(record.description, "coronavirus update");
        assert_eq!(record.site_name, "example.com");
        assert_eq!(record.author, "Jane Doe, John Roe");
        assert_eq!(record.language, "en");
        assert_eq!(record.content, "Full article text");
        assert_eq!(record.url_to_image, "https://www.example.com/lead.jpg");
        // falls through to the document's lastBuildDate
        assert_eq!(record.published_at, "2020-01-25 03:00:00");
    }

    #[tokio::test]
    async fn test_empty_titles_stay_empty() {
        let dir = tempfile::tempdir().unwrap();
        let url = "https://www.example.com/quiet";
        let mut extractor = StubExtractor::default();
        extractor.articles.insert(url.into(), article(url, ""));
        let ctx = context(
            &dir.path().join("cache.txt"),
            CacheMode::Persistent,
            StubFetcher::default(),
            Arc::new(extractor),
        )
        .await;

        let candidate = feed_candidate(
            &format!("<item><title></title><description>corona</description><link>{url}</link></item>"),
            FieldSchema::rss(),
        );
        let record = record_of(process_candidate(&ctx, &candidate).await.unwrap());
        assert_eq!(record.title, "");
    }

    #[tokio::test]
    async fn test_keywords_rescue_unfiltered_sitemap_entry() {
        let dir = tempfile::tempdir().unwrap();
        let on_topic = "https://news.example.tw/1";
        let off_topic = "https://news.example.tw/2";
        let mut extractor = StubExtractor::default();
        let mut a = article(on_topic, "");
        a.metadata.fields.insert("keywords".into(), "武漢肺炎,疫情".into());
        extractor.articles.insert(on_topic.into(), a);
        extractor.articles.insert(off_topic.into(), article(off_topic, "Typhoon warning"));
        let ctx = context(
            &dir.path().join("cache.txt"),
            CacheMode::Persistent,
            StubFetcher::default(),
            Arc::new(extractor),
        )
        .await;

        let schema = FieldSchema {
            url: Some("loc".into()),
            ..Default::default()
        };
        let first = feed_candidate(&format!("<item><loc>{on_topic}</loc></item>"), schema.clone());
        let second = feed_candidate(&format!("<item><loc>{off_topic}</loc></item>"), schema);

        assert!(matches!(
            process_candidate(&ctx, &first).await.unwrap(),
            Outcome::Record(_)
        ));
        assert_eq!(process_candidate(&ctx, &second).await.unwrap(), Outcome::Irrelevant);
        // still cached: an off-topic article is not fetched again next run
        assert!(ctx.cache.contains(off_topic).await);
    }

    #[tokio::test]
    async fn test_builtin_news_sitemap_title_passes_prefilter() {
        let dir = tempfile::tempdir().unwrap();
        let url = "https://www.channelnewsasia.com/singapore/climb";
        let mut extractor = StubExtractor::default();
        extractor.articles.insert(url.into(), article(url, ""));
        let extractor = Arc::new(extractor);
        let ctx = context(
            &dir.path().join("cache.txt"),
            CacheMode::Persistent,
            StubFetcher::default(),
            Arc::clone(&extractor),
        )
        .await;

        let cna = SourceRegistry::builtin()
            .descriptors()
            .unwrap()
            .into_iter()
            .find(|d| d.variant == SourceVariant::Sitemap && d.locale == "en")
            .unwrap();
        let sitemap = format!(
            r#"<urlset xmlns:news="http://www.google.com/schemas/sitemap-news/0.9">
  <url>
    <loc>{url}</loc>
    <news:news>
      <news:publication_date>2020-01-31T22:10:38+08:00</news:publication_date>
      <news:title>Coronavirus cases climb in Singapore</news:title>
      <news:keywords>Singapore, health</news:keywords>
    </news:news>
  </url>
</urlset>"#
        );
        let candidates = cna
            .variant
            .extract_candidates(&sitemap, &cna, &RelevanceFilter::default())
            .unwrap();
        assert_eq!(candidates.len(), 1);

        let record = record_of(process_candidate(&ctx, &candidates[0]).await.unwrap());
        assert_eq!(record.title, "Coronavirus cases climb in Singapore");
        assert_eq!(record.description, "Singapore, health");
        assert_eq!(record.published_at, "2020-01-31 14:10:38");
        assert_eq!(extractor.calls(), vec![url.to_string()]);
    }

    #[tokio::test]
    async fn test_cached_url_is_a_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("cache.txt");
        std::fs::write(&cache_path, "https://a/seen\n").unwrap();
        let extractor = Arc::new(StubExtractor::default());
        let ctx = context(
            &cache_path,
            CacheMode::Persistent,
            StubFetcher::default(),
            Arc::clone(&extractor),
        )
        .await;

        let candidate = feed_candidate(
            "<item><title>Coronavirus</title><link>https://a/seen</link></item>",
            FieldSchema::rss(),
        );
        assert_eq!(process_candidate(&ctx, &candidate).await.unwrap(), Outcome::Duplicate);
        assert!(extractor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_publish_date_chain_order() {
        let schema = FieldSchema {
            publish_date: Some("news:publication_date".into()),
            ..FieldSchema::rss()
        };
        let mut art = article("https://a/1", "");
        art.publish_date = Some(Utc.with_ymd_and_hms(2020, 1, 20, 8, 0, 0).unwrap());
        art.metadata
            .article
            .insert("modified_time".into(), "2020-01-21T08:00:00+00:00".into());

        let with_schema = feed_candidate(
            "<item><news:publication_date>2020-01-31T22:10:38+08:00</news:publication_date><pubDate>25 Jan 2020 01:52:22 +0000</pubDate></item>",
            schema.clone(),
        );
        assert_eq!(resolve_published_at(&with_schema, &art), "2020-01-31 14:10:38");

        let with_pub_date = feed_candidate(
            "<item><news:publication_date> </news:publication_date><pubDate>25 Jan 2020 01:52:22 +0000</pubDate></item>",
            schema.clone(),
        );
        assert_eq!(resolve_published_at(&with_pub_date, &art), "2020-01-25 01:52:22");

        let bare = feed_candidate("<item></item>", schema);
        assert_eq!(resolve_published_at(&bare, &art), "2020-01-20 08:00:00");

        art.publish_date = None;
        assert_eq!(resolve_published_at(&bare, &art), "2020-01-21 08:00:00");

        art.metadata.article.clear();
        assert_eq!(resolve_published_at(&bare, &art), "2020-01-25 03:00:00");
    }

    #[tokio::test]
    async fn test_publish_date_defaults_to_now() {
        let candidate = CandidateEntry {
            item: CandidateItem::Link("https://a/1".into()),
            document: None,
            source: descriptor("https://a/", FieldSchema::default(), SourceVariant::LinkList),
        };
        let before = dates::now_canonical();
        let resolved = resolve_published_at(&candidate, &article("https://a/1", ""));
        let after = dates::now_canonical();
        assert!(before <= resolved && resolved <= after);
    }

    #[tokio::test]
    async fn test_unrecognized_schema_date_is_kept_verbatim() {
        let schema = FieldSchema {
            publish_date: Some("date".into()),
            ..FieldSchema::rss()
        };
        let candidate = feed_candidate("<item><date>yesterday</date></item>", schema);
        assert_eq!(resolve_published_at(&candidate, &article("https://a/1", "")), "yesterday");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_same_url_yields_one_record() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("cache.txt");
        let url = "https://www.example.com/race";

        let feed = format!(
            "<rss><channel><item><title>Coronavirus race</title><link>{url}</link></item></channel></rss>"
        );
        let mut fetcher = StubFetcher::default();
        fetcher.documents.insert("https://feed.example.com/one".into(), feed.clone());
        fetcher.documents.insert("https://feed.example.com/two".into(), feed);

        let mut extractor = StubExtractor::default();
        extractor.articles.insert(url.into(), article(url, "Coronavirus race"));
        extractor.delay = Some(Duration::from_millis(20));
        let extractor = Arc::new(extractor);

        let ctx = Arc::new(
            context(&cache_path, CacheMode::Persistent, fetcher, Arc::clone(&extractor)).await,
        );
        let sources = vec![
            descriptor("https://feed.example.com/one", FieldSchema::rss(), SourceVariant::StructuredFeed),
            descriptor("https://feed.example.com/two", FieldSchema::rss(), SourceVariant::StructuredFeed),
        ];

        let output = run(ctx, sources).await;
        assert_eq!(output.records["en"].len(), 1);
        assert_eq!(output.stats.duplicates, 1);
        assert_eq!(extractor.calls(), vec![url.to_string()]);
        assert_eq!(std::fs::read_to_string(&cache_path).unwrap(), format!("{url}\n"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_run_end_to_end_and_idempotent_rerun() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("cache.txt");

        let rss = r#"<rss><channel>
            <item><title>Coronavirus cases rise</title><link>https://www.example.com/a</link>
                  <pubDate>Sat, 25 Jan 2020 01:52:22 +0000</pubDate></item>
            <item><title>Cricket scores</title><link>https://www.example.com/b</link></item>
            <item><title>Corona panic</title><link>https://www.example.com/missing</link></item>
        </channel></rss>"#;
        let links = r#"<a href="http://a">coronavirus outbreak</a><a href="http://b">weather today</a>"#;

        let make_fetcher = || {
            let mut fetcher = StubFetcher::default();
            fetcher.documents.insert("https://feed.example.com/rss".into(), rss.to_string());
            fetcher.documents.insert("https://tw.example.com/list".into(), links.to_string());
            fetcher
        };
        let make_extractor = || {
            let mut extractor = StubExtractor::default();
            extractor
                .articles
                .insert("https://www.example.com/a".into(), article("https://www.example.com/a", ""));
            extractor
                .articles
                .insert("http://a".into(), article("http://a", "Coronavirus outbreak"));
            Arc::new(extractor)
        };
        let sources = || {
            let mut list_source = (*descriptor(
                "https://tw.example.com/list",
                FieldSchema::default(),
                SourceVariant::LinkList,
            ))
            .clone();
            list_source.locale = "zh".into();
            vec![
                descriptor("https://feed.example.com/rss", FieldSchema::rss(), SourceVariant::StructuredFeed),
                Arc::new(list_source),
                descriptor("https://down.example.com/rss", FieldSchema::rss(), SourceVariant::StructuredFeed),
            ]
        };

        let ctx = Arc::new(
            context(&cache_path, CacheMode::Persistent, make_fetcher(), make_extractor()).await,
        );
        let first = run(ctx, sources()).await;

        assert_eq!(first.records["en"].len(), 1);
        assert_eq!(first.records["en"][0].published_at, "2020-01-25 01:52:22");
        assert_eq!(first.records["zh"].len(), 1);
        assert_eq!(first.records["zh"][0].url, "http://a");
        assert_eq!(first.stats.sources_fetched, 2);
        assert_eq!(first.stats.sources_failed, 1);
        assert_eq!(first.stats.irrelevant, 1);
        assert_eq!(first.stats.failed, 1);
        assert_eq!(first.stats.records, 2);

        let ctx = Arc::new(
            context(&cache_path, CacheMode::Persistent, make_fetcher(), make_extractor()).await,
        );
        let second = run(ctx, sources()).await;
        assert!(second.records.is_empty());
        assert_eq!(second.stats.duplicates, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panicking_item_does_not_stop_the_worker() {
        let dir = tempfile::tempdir().unwrap();
        let rss = r#"<rss><channel>
            <item><title>corona one</title><link>https://x/boom</link></item>
            <item><title>corona two</title><link>https://x/ok</link></item>
        </channel></rss>"#;
        let mut fetcher = StubFetcher::default();
        fetcher.documents.insert("https://feed.example.com/rss".into(), rss.into());
        let mut extractor = StubExtractor::default();
        extractor.articles.insert("https://x/ok".into(), article("https://x/ok", ""));
        extractor.panic_on = Some("https://x/boom".into());

        let mut ctx = context(
            &dir.path().join("cache.txt"),
            CacheMode::Bypass,
            fetcher,
            Arc::new(extractor),
        )
        .await;
        ctx.workers = 1;

        let output = run(
            Arc::new(ctx),
            vec![descriptor("https://feed.example.com/rss", FieldSchema::rss(), SourceVariant::StructuredFeed)],
        )
        .await;
        assert_eq!(output.records["en"].len(), 1);
        assert_eq!(output.records["en"][0].url, "https://x/ok");
    }
}

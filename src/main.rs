//! # Topic News Crawler
//!
//! Crawls a fixed registry of news sources (RSS feeds, Google News
//! sitemaps and plain link-list pages), keeps the articles that mention a
//! topic of interest, and stores each one as a canonical record.
//!
//! ## Usage
//!
//! ```sh
//! topic_news_crawler -d            # write data/<locale>/output.jsonl
//! topic_news_crawler -p            # insert into the production table
//! ```
//!
//! ## Architecture
//!
//! 1. **Registry**: load sources (built-in or `--sources` YAML) and keywords
//! 2. **Fetch stage**: worker pool downloads sources and collects candidates
//! 3. **Processing stage**: worker pool filters, deduplicates (via the
//!    append-only URL cache), extracts and normalizes each candidate
//! 4. **Output**: hand every record to the JSONL or Postgres sink
//!
//! Per-source and per-article failures are logged and skipped. Only a sink
//! failure makes the process exit non-zero.

use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cache;
mod cli;
mod dates;
mod error;
mod extract;
mod feed;
mod models;
mod outputs;
mod pipeline;
mod relevance;
mod scrapers;
mod sources;
mod utils;

use cache::DedupCache;
use cli::{Cli, SinkMode};
use error::CrawlError;
use extract::HtmlArticleExtractor;
use models::CanonicalRecord;
use outputs::RecordSink;
use outputs::jsonl::JsonlSink;
use outputs::postgres::PostgresSink;
use pipeline::RunContext;
use relevance::RelevanceFilter;
use scrapers::HttpSourceFetcher;
use sources::SourceRegistry;
use std::collections::BTreeMap;
use utils::{ensure_writable_dir, truncate_for_log};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();

    // --- Tracing init ---
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("topic_news_crawler starting up");

    let config = args.run_config()?;
    debug!(?config, "Resolved run configuration");

    // Early check: the file sink needs a writable output dir
    if let SinkMode::Files { output_dir } = &config.sink {
        if let Err(e) = ensure_writable_dir(output_dir).await {
            error!(
                path = %output_dir.display(),
                error = %e,
                "Output directory is not writable (fix perms or choose a different path)"
            );
            return Err(e.into());
        }
    }

    // ---- Registry and shared state ----
    let registry = match &config.sources {
        Some(path) => SourceRegistry::load(path).await?,
        None => SourceRegistry::builtin(),
    };
    let descriptors = registry.descriptors()?;
    let relevance = match &registry.keywords {
        Some(keywords) => RelevanceFilter::new(keywords),
        None => RelevanceFilter::default(),
    };
    info!(
        sources = descriptors.len(),
        keywords = ?relevance.keywords().collect::<Vec<_>>(),
        "Source registry ready"
    );

    let cache = DedupCache::open(&config.cache_file, config.cache_mode).await?;
    if config.clear_cache {
        cache.clear().await?;
    }
    info!(path = %cache.path().display(), mode = ?cache.mode(), known = cache.len().await, "Dedup cache ready");

    let ctx = Arc::new(RunContext {
        workers: config.workers,
        fetcher: Arc::new(HttpSourceFetcher::new()?),
        extractor: Arc::new(HtmlArticleExtractor::new(config.article_timeout)?),
        cache: Arc::new(cache),
        relevance: Arc::new(relevance),
    });

    // ---- Crawl ----
    let output = pipeline::run(ctx, descriptors).await;

    // ---- Output ----
    let locales = registry.sources.keys().cloned();
    let persisted = match &config.sink {
        SinkMode::Files { output_dir } => {
            dump_records(&output.records);
            let sink = JsonlSink::new(output_dir.clone(), locales);
            persist(&sink, &output.records).await
        }
        SinkMode::Store { database_url, table } => match PostgresSink::connect(database_url, *table).await {
            Ok(sink) => persist(&sink, &output.records).await,
            Err(e) => Err(e),
        },
    };

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        sources_fetched = output.stats.sources_fetched,
        candidates = output.stats.candidates,
        records = output.stats.records,
        duplicates = output.stats.duplicates,
        irrelevant = output.stats.irrelevant,
        failed = output.stats.failed,
        sources_failed = output.stats.sources_failed,
        "Execution complete"
    );

    if let Err(e) = persisted {
        error!(error = %e, "Collected records were not persisted");
        return Err(e.into());
    }
    Ok(())
}

#[instrument(level = "info", skip_all, fields(sink = sink.name()))]
async fn persist(
    sink: &dyn RecordSink,
    records: &BTreeMap<String, Vec<CanonicalRecord>>,
) -> Result<usize, CrawlError> {
    let written = sink.persist(records).await?;
    info!(written, "Records persisted");
    Ok(written)
}

/// Readable dump of every record, for debug runs.
fn dump_records(records: &BTreeMap<String, Vec<CanonicalRecord>>) {
    for (locale, batch) in records {
        for record in batch {
            debug!(
                %locale,
                url = %record.url,
                title = %record.title,
                description = %truncate_for_log(&record.description, 200),
                author = %record.author,
                language = %record.language,
                site_name = %record.site_name,
                published_at = %record.published_at,
                added_on = %record.added_on,
                url_to_image = %record.url_to_image,
                content = %truncate_for_log(&record.content, 300),
                "Record"
            );
        }
    }
}

//! Command-line interface for the topic news crawler.
//!
//! Flags mirror the crawler's run modes: where records go (`-d` files vs.
//! the database, `-p` table choice) and how the dedup cache behaves
//! (`-c` clear first, `-a` ignore it entirely). Options that name
//! infrastructure can also come from the environment.

use crate::cache::CacheMode;
use crate::error::CrawlError;
use crate::outputs::postgres::TableTarget;
use crate::pipeline::DEFAULT_WORKERS;
use clap::Parser;
use clap::builder::TypedValueParser;
use std::path::PathBuf;
use std::time::Duration;

/// Crawl news sources for on-topic articles and store them as canonical records.
///
/// # Examples
///
/// ```sh
/// # Debug run: write data/<locale>/output.jsonl and dump records
/// topic_news_crawler -d -v
///
/// # Store run against the production table
/// DATABASE_URL=postgres://crawler@localhost/news topic_news_crawler -p
///
/// # Re-crawl everything without touching cache.txt
/// topic_news_crawler -d -a
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Log at debug level instead of info
    #[arg(short, long)]
    pub verbose: bool,

    /// Write per-locale JSONL files and dump records instead of storing them
    #[arg(short, long)]
    pub debug: bool,

    /// Truncate the dedup cache before crawling
    #[arg(short, long)]
    pub clear: bool,

    /// Store into the production table rather than the test table
    #[arg(short, long)]
    pub production: bool,

    /// Ignore the dedup cache: do not load it and do not append to it
    #[arg(short, long)]
    pub all: bool,

    /// Dedup cache file, one URL per line
    #[arg(long, env = "CRAWLER_CACHE_FILE", default_value = "cache.txt")]
    pub cache_file: PathBuf,

    /// Root directory for `<locale>/output.jsonl` in debug mode
    #[arg(long, env = "CRAWLER_OUTPUT_DIR", default_value = "data")]
    pub output_dir: PathBuf,

    /// Optional YAML source registry (built-in sources otherwise)
    #[arg(long, env = "CRAWLER_SOURCES")]
    pub sources: Option<PathBuf>,

    /// Postgres connection string, required unless `--debug` is set
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Workers per pool (fetch and processing)
    #[arg(long, default_value_t = DEFAULT_WORKERS, value_parser = clap::value_parser!(u16).range(1..).map(usize::from))]
    pub workers: usize,

    /// Seconds allowed for fetching and extracting one article
    #[arg(long, default_value_t = 30)]
    pub article_timeout: u64,
}

/// Where collected records end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkMode {
    Files { output_dir: PathBuf },
    Store { database_url: String, table: TableTarget },
}

/// Validated settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub sink: SinkMode,
    pub cache_file: PathBuf,
    pub cache_mode: CacheMode,
    pub clear_cache: bool,
    pub sources: Option<PathBuf>,
    pub workers: usize,
    pub article_timeout: Duration,
}

impl Cli {
    /// Resolve flag combinations into a [`RunConfig`].
    ///
    /// Store mode without a database URL is a configuration error.
    pub fn run_config(&self) -> Result<RunConfig, CrawlError> {
        let sink = if self.debug {
            SinkMode::Files {
                output_dir: self.output_dir.clone(),
            }
        } else {
            let database_url = self
                .database_url
                .clone()
                .filter(|url| !url.trim().is_empty())
                .ok_or_else(|| {
                    CrawlError::Config("--database-url (or DATABASE_URL) is required unless --debug is set".into())
                })?;
            SinkMode::Store {
                database_url,
                table: TableTarget::from_production_flag(self.production),
            }
        };

        Ok(RunConfig {
            sink,
            cache_file: self.cache_file.clone(),
            cache_mode: if self.all {
                CacheMode::Bypass
            } else {
                CacheMode::Persistent
            },
            clear_cache: self.clear,
            sources: self.sources.clone(),
            workers: self.workers,
            article_timeout: Duration::from_secs(self.article_timeout),
        })
    }
}

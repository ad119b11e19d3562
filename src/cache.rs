//! Deduplication cache of article URLs already processed.
//!
//! The cache is an in-memory set mirrored by an append-only text log with one
//! URL per line. Every new URL is appended and flushed before
//! [`DedupCache::check_and_insert`] returns, so a crash can at worst cause an
//! article to be processed again, never lose the log.
//!
//! The set and the log sit behind one async mutex: checking membership,
//! inserting and appending happen in a single critical section, so two
//! workers racing on the same URL cannot both see it as new.
//!
//! In bypass mode (full recrawl) the log is neither read nor written; the
//! in-memory set still stops the same URL being processed twice in one run.

use crate::error::CrawlError;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// Whether the durable log participates in this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Load the log at startup and append every new URL.
    Persistent,
    /// Skip the log entirely.
    Bypass,
}

#[derive(Debug)]
struct CacheState {
    seen: HashSet<String>,
    log: Option<File>,
}

/// URL set shared by all processing workers.
#[derive(Debug)]
pub struct DedupCache {
    path: PathBuf,
    mode: CacheMode,
    state: Mutex<CacheState>,
}

impl DedupCache {
    /// Open the cache at `path`, creating the log if it does not exist and
    /// loading it unless `mode` is [`CacheMode::Bypass`].
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display(), ?mode))]
    pub async fn open(path: impl AsRef<Path>, mode: CacheMode) -> Result<Self, CrawlError> {
        let path = path.as_ref().to_path_buf();
        let mut seen = HashSet::new();
        let mut log = None;

        if mode == CacheMode::Persistent {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
                .map_err(|source| cache_err(&path, source))?;
            let text = tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| cache_err(&path, source))?;
            seen.extend(
                text.lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string),
            );
            log = Some(file);
            info!(entries = seen.len(), "Loaded dedup log");
        } else {
            info!("Dedup log bypassed for this run");
        }

        Ok(Self {
            path,
            mode,
            state: Mutex::new(CacheState { seen, log }),
        })
    }

    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn contains(&self, url: &str) -> bool {
        self.state.lock().await.seen.contains(url)
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.seen.len()
    }

    /// Record `url` as seen.
    ///
    /// Returns `Ok(true)` when the URL was new (and, in persistent mode, has
    /// been appended and flushed to the log) and `Ok(false)` when it was
    /// already known.
    pub async fn check_and_insert(&self, url: &str) -> Result<bool, CrawlError> {
        let mut state = self.state.lock().await;
        if state.seen.contains(url) {
            debug!(%url, "Already in dedup cache");
            return Ok(false);
        }

        if let Some(log) = state.log.as_mut() {
            let line = format!("{url}\n");
            log.write_all(line.as_bytes())
                .await
                .map_err(|source| cache_err(&self.path, source))?;
            log.flush()
                .await
                .map_err(|source| cache_err(&self.path, source))?;
        }
        state.seen.insert(url.to_string());
        Ok(true)
    }

    /// Forget every URL and truncate the log. The file is emptied even in
    /// bypass mode; it just stays closed afterwards.
    pub async fn clear(&self) -> Result<(), CrawlError> {
        let mut state = self.state.lock().await;
        state.seen.clear();
        state.log = None;
        File::create(&self.path)
            .await
            .map_err(|source| cache_err(&self.path, source))?;
        if self.mode == CacheMode::Persistent {
            let reopened = OpenOptions::new()
                .append(true)
                .open(&self.path)
                .await
                .map_err(|source| cache_err(&self.path, source))?;
            state.log = Some(reopened);
        }
        info!(path = %self.path.display(), "Cleared dedup cache");
        Ok(())
    }
}

fn cache_err(path: &Path, source: std::io::Error) -> CrawlError {
    CrawlError::Cache {
        path: path.to_path_buf(),
        source,
    }
}

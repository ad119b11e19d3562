//! JSON-lines file sink.
//!
//! Each locale gets `{output_dir}/{locale}/output.jsonl`, one serialized
//! [`CanonicalRecord`] per line. Files are rewritten on every run, so a
//! configured locale that produced nothing ends up with an empty file.

use super::RecordSink;
use crate::error::CrawlError;
use crate::models::CanonicalRecord;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

pub const OUTPUT_FILENAME: &str = "output.jsonl";

/// Writes records under `output_dir`, one directory per locale.
#[derive(Debug, Clone)]
pub struct JsonlSink {
    output_dir: PathBuf,
    locales: BTreeSet<String>,
}

impl JsonlSink {
    /// `locales` are the configured locales; each one gets a file even when
    /// the run collected nothing for it.
    pub fn new(output_dir: impl Into<PathBuf>, locales: impl IntoIterator<Item = String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            locales: locales.into_iter().collect(),
        }
    }

    pub fn path_for(&self, locale: &str) -> PathBuf {
        self.output_dir.join(locale).join(OUTPUT_FILENAME)
    }
}

/// Serialize `records` as JSON lines, each terminated by `\n`.
pub fn to_json_lines(records: &[CanonicalRecord]) -> Result<String, serde_json::Error> {
    let mut out = String::new();
    for record in records {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    Ok(out)
}

async fn write_locale(path: &Path, records: &[CanonicalRecord]) -> Result<(), CrawlError> {
    let body = to_json_lines(records).map_err(|e| CrawlError::persistence("jsonl", e))?;

    if let Some(dir) = path.parent() {
        if let Err(e) = fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), error = %e, "Failed to create output dir");
            return Err(CrawlError::persistence("jsonl", e));
        }
    }

    fs::write(path, body)
        .await
        .map_err(|e| CrawlError::persistence("jsonl", e))
}

#[async_trait]
impl RecordSink for JsonlSink {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    #[instrument(level = "info", skip_all, fields(output_dir = %self.output_dir.display()))]
    async fn persist(&self, records: &BTreeMap<String, Vec<CanonicalRecord>>) -> Result<usize, CrawlError> {
        let locales: BTreeSet<&str> = self
            .locales
            .iter()
            .map(String::as_str)
            .chain(records.keys().map(String::as_str))
            .collect();

        let mut written = 0;
        for locale in locales {
            let batch = records.get(locale).map(Vec::as_slice).unwrap_or_default();
            let path = self.path_for(locale);
            write_locale(&path, batch).await?;
            info!(path = %path.display(), count = batch.len(), "Wrote JSONL output");
            written += batch.len();
        }
        Ok(written)
    }
}

//! Sinks that persist the records collected by a run.
//!
//! # Submodules
//!
//! - [`jsonl`]: one JSON-lines file per locale, used in debug runs
//! - [`postgres`]: one row per record in the `production` or `test` table
//!
//! # Output Structure (file sink)
//!
//! ```text
//! output_dir/
//! ├── en/
//! │   └── output.jsonl
//! └── zh/
//!     └── output.jsonl
//! ```
//!
//! A sink receives every record at once, after the processing stage has
//! drained. Any error it returns is a [`CrawlError::Persistence`].

pub mod jsonl;
pub mod postgres;

use crate::error::CrawlError;
use crate::models::CanonicalRecord;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Destination for canonical records, grouped by locale.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    async fn persist(&self, records: &BTreeMap<String, Vec<CanonicalRecord>>) -> Result<usize, CrawlError>;
}

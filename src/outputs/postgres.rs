//! Postgres sink.
//!
//! Every record becomes one row in either the `production` or the `test`
//! table. Rows are written one statement at a time inside a single
//! transaction, so a failed run leaves no partial batch behind.

use super::RecordSink;
use crate::error::CrawlError;
use crate::models::CanonicalRecord;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, instrument};

/// Which table receives the records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableTarget {
    Production,
    #[default]
    Test,
}

impl TableTarget {
    pub fn from_production_flag(production: bool) -> Self {
        if production {
            TableTarget::Production
        } else {
            TableTarget::Test
        }
    }

    pub fn table_name(self) -> &'static str {
        match self {
            TableTarget::Production => "production",
            TableTarget::Test => "test",
        }
    }
}

impl fmt::Display for TableTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Column order shared by [`insert_statement`] and the bind calls.
pub const COLUMNS: [&str; 10] = [
    "url",
    "title",
    "description",
    "content",
    "author",
    "language",
    "site_name",
    "published_at",
    "added_on",
    "url_to_image",
];

/// Parameterized `INSERT` for `target`.
pub fn insert_statement(target: TableTarget) -> String {
    let placeholders = (1..=COLUMNS.len())
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        target.table_name(),
        COLUMNS.join(", "),
        placeholders
    )
}

pub struct PostgresSink {
    pool: PgPool,
    target: TableTarget,
}

impl PostgresSink {
    /// Connect to `database_url`. The pool is small; inserts are sequential.
    pub async fn connect(database_url: &str, target: TableTarget) -> Result<Self, CrawlError> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(database_url)
            .await
            .map_err(|e| CrawlError::persistence("postgres", e))?;
        info!(table = %target, "Connected to record store");
        Ok(Self { pool, target })
    }
}

#[async_trait]
impl RecordSink for PostgresSink {
    fn name(&self) -> &'static str {
        "postgres"
    }

    #[instrument(level = "info", skip_all, fields(table = %self.target))]
    async fn persist(&self, records: &BTreeMap<String, Vec<CanonicalRecord>>) -> Result<usize, CrawlError> {
        let statement = insert_statement(self.target);
        let store_err = |e| CrawlError::persistence("postgres", e);

        let mut tx = self.pool.begin().await.map_err(store_err)?;
        let mut written = 0;
        for (locale, batch) in records {
            for record in batch {
                sqlx::query(&statement)
                    .bind(&record.url)
                    .bind(&record.title)
                    .bind(&record.description)
                    .bind(&record.content)
                    .bind(&record.author)
                    .bind(&record.language)
                    .bind(&record.site_name)
                    .bind(&record.published_at)
                    .bind(&record.added_on)
                    .bind(&record.url_to_image)
                    .execute(&mut *tx)
                    .await
                    .map_err(store_err)?;
                written += 1;
            }
            debug!(%locale, count = batch.len(), "Inserted locale batch");
        }
        tx.commit().await.map_err(store_err)?;

        info!(written, "Stored records");
        Ok(written)
    }
}

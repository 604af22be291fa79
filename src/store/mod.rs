//! Downstream stores: dated listing partitions and keyed summary documents.
//!
//! The pipeline only talks to the traits; the JSON-file realizations keep a
//! run self-contained without a spreadsheet or database service.

pub mod document;
pub mod partition;

use crate::land::models::Snapshot;
use crate::summary::ComplexSummary;
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::Path;

pub use document::JsonDocumentStore;
pub use partition::JsonPartitionStore;

/// Listing rows stored as one partition per run date.
///
/// A partition carries the snapshot's incomplete-pair markers alongside its
/// rows, so a later read knows which pairs are safe to compare.
#[async_trait]
pub trait TabularStore: Send + Sync {
    /// Replaces the partition for the snapshot's date.
    async fn write_partition(&self, snapshot: &Snapshot) -> Result<()>;

    /// Reads a partition back; `None` if it was never written.
    async fn read_partition(&self, date: NaiveDate) -> Result<Option<Snapshot>>;
}

/// Whether an upsert inserted or replaced a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Summary documents keyed by (complex, date, trade type).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts the summary or replaces the one with the same key.
    async fn upsert(&self, summary: &ComplexSummary) -> Result<UpsertOutcome>;
}

/// Writes `contents` next to `path` and renames it into place.
pub(crate) async fn write_atomically(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await
}

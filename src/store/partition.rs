//! One JSON file per run date.

use super::{write_atomically, TabularStore};
use crate::land::models::Snapshot;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Stores each date's listings as `<dir>/<YYYY-MM-DD>.json`.
pub struct JsonPartitionStore {
    dir: PathBuf,
}

impl JsonPartitionStore {
    /// Creates a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the file holding the partition for `date`.
    pub fn partition_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.json", date.format("%Y-%m-%d")))
    }

    /// Returns the root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl TabularStore for JsonPartitionStore {
    async fn write_partition(&self, snapshot: &Snapshot) -> Result<()> {
        let path = self.partition_path(snapshot.date);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            info!("Replacing existing partition {}", path.display());
        }

        let json = serde_json::to_vec_pretty(snapshot).context("Failed to serialize snapshot")?;
        write_atomically(&path, &json)
            .await
            .with_context(|| format!("Failed to write partition: {}", path.display()))?;

        info!(
            "Wrote {} listings to partition {} ({} incomplete pairs)",
            snapshot.len(),
            snapshot.date,
            snapshot.incomplete.len()
        );
        Ok(())
    }

    async fn read_partition(&self, date: NaiveDate) -> Result<Option<Snapshot>> {
        let path = self.partition_path(date);
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Partition {} not found", date);
                return Ok(None);
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read partition: {}", path.display()));
            }
        };

        let snapshot: Snapshot = serde_json::from_slice(&content)
            .with_context(|| format!("Failed to parse partition: {}", path.display()))?;
        debug!("Read {} listings from partition {}", snapshot.len(), date);
        Ok(Some(snapshot))
    }
}

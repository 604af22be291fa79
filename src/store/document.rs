//! Summary documents kept in a single JSON file.

use super::{write_atomically, DocumentStore, UpsertOutcome};
use crate::summary::ComplexSummary;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::info;

/// Keeps every summary ever upserted in one JSON array.
pub struct JsonDocumentStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonDocumentStore {
    /// Creates a store backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    /// Returns the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads all stored summaries.
    pub async fn load(&self) -> Result<Vec<ComplexSummary>> {
        match tokio::fs::read(&self.path).await {
            Ok(content) => serde_json::from_slice(&content)
                .with_context(|| format!("Failed to parse documents: {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read documents: {}", self.path.display())),
        }
    }
}

#[async_trait]
impl DocumentStore for JsonDocumentStore {
    async fn upsert(&self, summary: &ComplexSummary) -> Result<UpsertOutcome> {
        let _guard = self.lock.lock().await;

        let mut documents = self.load().await?;
        let outcome = match documents.iter_mut().find(|d| d.key() == summary.key()) {
            Some(existing) => {
                *existing = summary.clone();
                UpsertOutcome::Updated
            }
            None => {
                documents.push(summary.clone());
                UpsertOutcome::Created
            }
        };

        let json = serde_json::to_vec_pretty(&documents).context("Failed to serialize documents")?;
        write_atomically(&self.path, &json)
            .await
            .with_context(|| format!("Failed to write documents: {}", self.path.display()))?;

        info!(
            "{} summary: complex={} date={} trade={}",
            if outcome == UpsertOutcome::Created { "Created" } else { "Updated" },
            summary.entity_id,
            summary.date,
            summary.trade_type
        );
        Ok(outcome)
    }
}

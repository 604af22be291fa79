//! Daily pipeline: collect, store the partition, summarize, and upsert.

use crate::collector::{CollectionReport, Collector};
use crate::config::Config;
use crate::format::Formatter;
use crate::land::{DirectSessionProvider, SessionManager, SessionProvider};
use crate::store::{
    DocumentStore, JsonDocumentStore, JsonPartitionStore, TabularStore, UpsertOutcome,
};
use crate::summary::{self, ComplexSummary};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Which stages of the pipeline to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Collect, store, summarize, and upsert
    #[default]
    Full,
    /// Collect and store the partition only
    CollectOnly,
    /// Summarize an already stored partition
    SummarizeOnly,
}

/// Per-invocation options that are not part of [`Config`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub date: NaiveDate,
    pub mode: RunMode,
    /// Skip the browser and replay the configured or last saved cookie header
    pub direct: bool,
}

impl RunOptions {
    /// Full run for `date` through the browser.
    pub fn new(date: NaiveDate) -> Self {
        Self { date, mode: RunMode::Full, direct: false }
    }
}

/// What a pipeline run did.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub date: NaiveDate,
    /// Present unless the run only summarized
    pub collection: Option<CollectionReport>,
    pub summaries: Vec<ComplexSummary>,
    pub created: usize,
    pub updated: usize,
}

impl RunOutcome {
    /// True if every pair was collected in full (or nothing was collected this run).
    pub fn is_complete(&self) -> bool {
        self.collection.as_ref().map_or(true, CollectionReport::is_complete)
    }
}

/// Executes the daily pipeline.
pub struct PipelineCommand {
    config: Config,
}

impl PipelineCommand {
    /// Creates a new pipeline command.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Runs the pipeline against the JSON stores under the configured data directory.
    pub async fn execute(&self, options: &RunOptions) -> Result<RunOutcome> {
        self.config.validate().context("Invalid configuration")?;

        let data_dir = &self.config.data_dir;
        let tabular = JsonPartitionStore::new(data_dir.join("partitions"));
        let documents = JsonDocumentStore::new(data_dir.join("summaries.json"));

        if options.direct || self.config.cookie.is_some() {
            let provider = DirectSessionProvider::new(self.config.clone());
            self.execute_with(&provider, &tabular, &documents, options).await
        } else {
            let provider = SessionManager::new(self.config.clone());
            self.execute_with(&provider, &tabular, &documents, options).await
        }
    }

    /// Runs the pipeline with the provided collaborators (for testing).
    pub async fn execute_with(
        &self,
        provider: &dyn SessionProvider,
        tabular: &dyn TabularStore,
        documents: &dyn DocumentStore,
        options: &RunOptions,
    ) -> Result<RunOutcome> {
        let date = options.date;
        let mut outcome =
            RunOutcome { date, collection: None, summaries: Vec::new(), created: 0, updated: 0 };

        // Pairs marked incomplete in the snapshot are dropped from `expected` by summarize.
        let today = match options.mode {
            RunMode::SummarizeOnly => tabular
                .read_partition(date)
                .await?
                .with_context(|| format!("No partition stored for {}", date))?,
            RunMode::Full | RunMode::CollectOnly => {
                info!("Collecting {} pairs for {}", self.config.pairs().len(), date);
                let collector = Collector::new(self.config.clone());
                let report = collector
                    .run(provider, date)
                    .await
                    .context("Could not establish an upstream session")?;

                if !report.fetched_anything() {
                    warn!("Nothing was fetched; keeping any existing partition for {}", date);
                    outcome.collection = Some(report);
                    return Ok(outcome);
                }

                let snapshot = report.snapshot();
                for pair in &snapshot.incomplete {
                    warn!(
                        "Storing {}/{} as incomplete: {}",
                        pair.entity_id, pair.trade_type, pair.reason
                    );
                }
                tabular.write_partition(&snapshot).await?;

                outcome.collection = Some(report);
                if options.mode == RunMode::CollectOnly {
                    return Ok(outcome);
                }
                snapshot
            }
        };

        let previous_day = date.pred_opt().context("Run date has no previous day")?;
        let yesterday = tabular.read_partition(previous_day).await?;
        if yesterday.is_none() {
            info!("No partition for {}; summaries carry no deltas", previous_day);
        }

        outcome.summaries = summary::summarize(&today, yesterday.as_ref(), &self.config.pairs());
        self.upsert_all(documents, &mut outcome).await?;

        Ok(outcome)
    }

    async fn upsert_all(
        &self,
        documents: &dyn DocumentStore,
        outcome: &mut RunOutcome,
    ) -> Result<()> {
        let pause = Duration::from_millis(self.config.upsert_delay_ms);

        for (idx, summary) in outcome.summaries.iter().enumerate() {
            if idx > 0 && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }

            let result = documents.upsert(summary).await.with_context(|| {
                format!("Failed to upsert summary for {}/{}", summary.entity_id, summary.trade_type)
            })?;
            match result {
                UpsertOutcome::Created => outcome.created += 1,
                UpsertOutcome::Updated => outcome.updated += 1,
            }
        }

        debug!("Upserted {} created, {} updated", outcome.created, outcome.updated);
        Ok(())
    }

    /// Renders an outcome in the configured output format.
    pub fn render(&self, outcome: &RunOutcome) -> String {
        Formatter::new(self.config.format).format_run(outcome)
    }
}

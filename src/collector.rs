//! Collection run over every (complex, trade type) pair.

use crate::config::Config;
use crate::error::SessionError;
use crate::land::client::FetchClient;
use crate::land::models::{Listing, ListingsByEntity, Snapshot, TradeType};
use crate::land::parser::ArticleParser;
use crate::land::session::{AuthenticatedRequester, SessionProvider};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, error, info, warn};

/// Upper bound on pages per pair, in case the upstream never stops paging.
const MAX_PAGES: u32 = 100;

/// How far collection of one pair got.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PairStatus {
    /// Every page was fetched
    Complete,
    /// Stopped at the per-complex listing cap
    Capped,
    /// Some pages were fetched before a fetch failure
    Partial { error: String },
    /// Nothing could be fetched
    Failed { error: String },
}

impl PairStatus {
    /// True if the pair holds everything it was supposed to hold.
    pub fn is_complete(&self) -> bool {
        matches!(self, PairStatus::Complete | PairStatus::Capped)
    }
}

impl fmt::Display for PairStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairStatus::Complete => write!(f, "complete"),
            PairStatus::Capped => write!(f, "capped"),
            PairStatus::Partial { error } => write!(f, "partial ({})", error),
            PairStatus::Failed { error } => write!(f, "failed ({})", error),
        }
    }
}

/// Outcome of collecting one (complex, trade type) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairReport {
    pub entity_id: String,
    pub trade_type: TradeType,
    pub status: PairStatus,
    pub listings: usize,
    pub pages: u32,
    /// Articles dropped because they could not be parsed
    pub skipped: usize,
    /// Articles dropped because their listing id was already seen
    pub duplicates: usize,
}

/// Everything one collection run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionReport {
    pub date: NaiveDate,
    pub listings: ListingsByEntity,
    pub pairs: Vec<PairReport>,
}

impl CollectionReport {
    /// Total number of listings across all complexes.
    pub fn total_listings(&self) -> usize {
        self.listings.values().map(Vec::len).sum()
    }

    /// Total number of articles skipped for parse failures.
    pub fn total_skipped(&self) -> usize {
        self.pairs.iter().map(|p| p.skipped).sum()
    }

    /// Total number of duplicate articles dropped.
    pub fn total_duplicates(&self) -> usize {
        self.pairs.iter().map(|p| p.duplicates).sum()
    }

    /// Pairs that did not finish.
    pub fn incomplete_pairs(&self) -> impl Iterator<Item = &PairReport> {
        self.pairs.iter().filter(|p| !p.status.is_complete())
    }

    /// True if every pair finished.
    pub fn is_complete(&self) -> bool {
        self.incomplete_pairs().next().is_none()
    }

    /// True if at least one pair fetched something.
    pub fn fetched_anything(&self) -> bool {
        self.pairs.iter().any(|p| p.pages > 0)
    }

    /// Flattens the collected listings into a dated snapshot, marking every
    /// pair that did not finish as incomplete.
    pub fn snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot::from_entities(self.date, &self.listings);
        for pair in self.incomplete_pairs() {
            snapshot.mark_incomplete(&pair.entity_id, pair.trade_type, pair.status.to_string());
        }
        snapshot
    }
}

struct PairOutcome {
    listings: Vec<Listing>,
    report: PairReport,
}

/// Drives the fetch client over the configured working set.
pub struct Collector {
    config: Config,
}

impl Collector {
    /// Creates a collector bound to one configuration.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Opens a session, collects every pair, and always disposes the session.
    ///
    /// A failed warm-up is retried once; a second failure aborts the run.
    pub async fn run(
        &self,
        provider: &dyn SessionProvider,
        date: NaiveDate,
    ) -> Result<CollectionReport, SessionError> {
        let mut session = match provider.warm_up().await {
            Ok(session) => session,
            Err(e) => {
                warn!("Session warm-up failed ({}), retrying once", e);
                provider.warm_up().await.inspect_err(|e| {
                    error!("Session warm-up failed again: {}", e);
                })?
            }
        };

        let report = self.collect_with(session.as_ref(), date).await;
        session.dispose().await;
        Ok(report)
    }

    /// Collects every pair through an already established session.
    pub async fn collect_with(
        &self,
        requester: &dyn AuthenticatedRequester,
        date: NaiveDate,
    ) -> CollectionReport {
        let client = FetchClient::new(requester, &self.config);
        let observed_at = Utc::now();
        let cap = self.config.max_listings_per_entity;

        let mut listings = ListingsByEntity::new();
        let mut pairs = Vec::new();

        for entity_id in &self.config.entity_ids {
            let mut entity_listings: Vec<Listing> = Vec::new();

            for &trade_type in &self.config.trade_types {
                let remaining = cap.saturating_sub(entity_listings.len());
                let outcome = self
                    .collect_pair(&client, entity_id, trade_type, date, observed_at, remaining)
                    .await;

                info!(
                    "complex={} trade={} -> {} listings ({})",
                    entity_id, trade_type, outcome.report.listings, outcome.report.status
                );
                entity_listings.extend(outcome.listings);
                pairs.push(outcome.report);
            }

            listings.entry(entity_id.clone()).or_default().extend(entity_listings);
        }

        let report = CollectionReport { date, listings, pairs };
        info!(
            "Collection complete: {} listings, {} skipped, {} duplicates, {} incomplete pairs",
            report.total_listings(),
            report.total_skipped(),
            report.total_duplicates(),
            report.incomplete_pairs().count()
        );
        report
    }

    async fn collect_pair(
        &self,
        client: &FetchClient<'_>,
        entity_id: &str,
        trade_type: TradeType,
        date: NaiveDate,
        observed_at: DateTime<Utc>,
        remaining: usize,
    ) -> PairOutcome {
        let parser = ArticleParser::new(entity_id, trade_type, date, observed_at);
        let mut report = PairReport {
            entity_id: entity_id.to_string(),
            trade_type,
            status: PairStatus::Complete,
            listings: 0,
            pages: 0,
            skipped: 0,
            duplicates: 0,
        };
        let mut listings = Vec::new();
        let mut seen = HashSet::new();

        if remaining == 0 {
            debug!("complex={} already at its cap, skipping trade={}", entity_id, trade_type);
            report.status = PairStatus::Capped;
            return PairOutcome { listings, report };
        }

        let mut page_number = 1;
        loop {
            if page_number > MAX_PAGES {
                warn!("complex={} trade={} hit the page limit", entity_id, trade_type);
                report.status = PairStatus::Partial { error: "page limit reached".to_string() };
                break;
            }

            let page = match client.fetch_page(entity_id, trade_type, page_number).await {
                Ok(page) => page,
                Err(e) => {
                    error!("complex={} trade={} page={}: {}", entity_id, trade_type, page_number, e);
                    let error = e.to_string();
                    report.status = if report.pages == 0 {
                        PairStatus::Failed { error }
                    } else {
                        PairStatus::Partial { error }
                    };
                    break;
                }
            };
            report.pages += 1;

            let mut leftover = 0;
            for (idx, article) in page.articles.iter().enumerate() {
                if listings.len() >= remaining {
                    leftover = page.articles.len() - idx;
                    break;
                }
                match parser.parse(article) {
                    Ok(listing) => {
                        if seen.insert(listing.listing_id.clone()) {
                            listings.push(listing);
                        } else {
                            debug!("Duplicate listing {} dropped", listing.listing_id);
                            report.duplicates += 1;
                        }
                    }
                    Err(e) => {
                        warn!("Skipping article on complex={} trade={}: {}", entity_id, trade_type, e);
                        report.skipped += 1;
                    }
                }
            }

            if listings.len() >= remaining && (leftover > 0 || page.has_more) {
                info!("complex={} reached its cap of {} listings", entity_id, remaining);
                report.status = PairStatus::Capped;
                break;
            }
            if !page.has_more {
                break;
            }
            page_number += 1;
        }

        report.listings = listings.len();
        PairOutcome { listings, report }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::land::client::mock::ScriptedRequester;
    use crate::land::session::ApiResponse;
    use crate::error::RequestError;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    fn test_config(entities: &[&str], trades: &[TradeType]) -> Config {
        Config {
            entity_ids: entities.iter().map(|s| s.to_string()).collect(),
            trade_types: trades.to_vec(),
            ..Config::default()
        }
        .without_delays()
    }

    fn article(id: &str, price: &str) -> Value {
        json!({"articleNo": id, "dealOrWarrantPrc": price, "floorInfo": "3/10"})
    }

    fn page(articles: Vec<Value>, more: bool) -> Result<ApiResponse, RequestError> {
        Ok(ApiResponse::new(200, json!({"isMoreData": more, "articleList": articles})))
    }

    fn rate_limited() -> Result<ApiResponse, RequestError> {
        Ok(ApiResponse::new(429, Value::Null))
    }

    #[tokio::test]
    async fn test_collects_all_pages() {
        let requester = ScriptedRequester::new(vec![
            page(vec![article("1", "5억"), article("2", "6억")], true),
            page(vec![article("3", "7억")], false),
        ]);
        let collector = Collector::new(test_config(&["8928"], &[TradeType::A1]));

        let report = collector.collect_with(&requester, date()).await;
        assert_eq!(report.total_listings(), 3);
        assert_eq!(report.pairs[0].status, PairStatus::Complete);
        assert_eq!(report.pairs[0].pages, 2);
        assert_eq!(report.listings["8928"][2].price, 70000);
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_cap_truncates_mid_page() {
        let requester = ScriptedRequester::new(vec![page(
            (1..=5).map(|i| article(&i.to_string(), "1억")).collect(),
            true,
        )]);
        let mut config = test_config(&["8928"], &[TradeType::A1]);
        config.max_listings_per_entity = 3;
        let collector = Collector::new(config);

        let report = collector.collect_with(&requester, date()).await;
        assert_eq!(report.listings["8928"].len(), 3);
        assert_eq!(report.pairs[0].status, PairStatus::Capped);
        // No second page requested once the cap is hit
        assert_eq!(requester.calls(), 1);
    }

    #[tokio::test]
    async fn test_cap_spans_trade_types() {
        let requester = ScriptedRequester::new(vec![
            page(vec![article("1", "1억"), article("2", "1억")], false),
            page(vec![article("3", "1억"), article("4", "1억")], false),
        ]);
        let mut config = test_config(&["8928"], &[TradeType::A1, TradeType::B1, TradeType::B2]);
        config.max_listings_per_entity = 3;
        let collector = Collector::new(config);

        let report = collector.collect_with(&requester, date()).await;
        assert_eq!(report.listings["8928"].len(), 3);
        assert_eq!(report.pairs[0].status, PairStatus::Complete);
        assert_eq!(report.pairs[1].status, PairStatus::Capped);
        assert_eq!(report.pairs[2].status, PairStatus::Capped);
        assert_eq!(report.pairs[2].pages, 0);
        assert_eq!(requester.calls(), 2);
    }

    #[tokio::test]
    async fn test_cap_exactly_at_last_item_is_complete() {
        let requester =
            ScriptedRequester::new(vec![page(vec![article("1", "1억"), article("2", "1억")], false)]);
        let mut config = test_config(&["8928"], &[TradeType::A1]);
        config.max_listings_per_entity = 2;
        let collector = Collector::new(config);

        let report = collector.collect_with(&requester, date()).await;
        assert_eq!(report.pairs[0].status, PairStatus::Complete);
    }

    #[tokio::test]
    async fn test_parse_failures_are_skipped_and_counted() {
        let requester = ScriptedRequester::new(vec![page(
            vec![article("1", "5억"), article("2", "가격협의"), json!({"dealOrWarrantPrc": "1억"})],
            false,
        )]);
        let collector = Collector::new(test_config(&["8928"], &[TradeType::A1]));

        let report = collector.collect_with(&requester, date()).await;
        assert_eq!(report.total_listings(), 1);
        assert_eq!(report.pairs[0].skipped, 2);
        assert_eq!(report.total_skipped(), 2);
        assert_eq!(report.pairs[0].status, PairStatus::Complete);
    }

    #[tokio::test]
    async fn test_duplicates_are_dropped() {
        let requester = ScriptedRequester::new(vec![
            page(vec![article("1", "5억"), article("2", "5억")], true),
            page(vec![article("2", "5억"), article("3", "5억")], false),
        ]);
        let collector = Collector::new(test_config(&["8928"], &[TradeType::A1]));

        let report = collector.collect_with(&requester, date()).await;
        assert_eq!(report.total_listings(), 3);
        assert_eq!(report.pairs[0].duplicates, 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_only_its_pair() {
        let requester = ScriptedRequester::new(vec![
            // 8928/A1: page 1 ok, page 2 rate limited three times
            page(vec![article("1", "5억")], true),
            rate_limited(),
            rate_limited(),
            rate_limited(),
            // 8928/B1: unauthorized straight away
            Ok(ApiResponse::new(403, Value::Null)),
            // 9999/A1 and 9999/B1 succeed
            page(vec![article("9", "3억")], false),
            page(vec![article("10", "2억")], false),
        ]);
        let collector = Collector::new(test_config(&["8928", "9999"], &[TradeType::A1, TradeType::B1]));

        let report = collector.collect_with(&requester, date()).await;
        assert!(matches!(report.pairs[0].status, PairStatus::Partial { .. }));
        assert!(matches!(report.pairs[1].status, PairStatus::Failed { .. }));
        assert_eq!(report.pairs[2].status, PairStatus::Complete);
        assert_eq!(report.pairs[3].status, PairStatus::Complete);

        assert_eq!(report.listings["8928"].len(), 1);
        assert_eq!(report.listings["9999"].len(), 2);
        assert_eq!(report.incomplete_pairs().count(), 2);
        assert!(!report.is_complete());
        assert!(report.fetched_anything());

        let snapshot = report.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.incomplete.len(), 2);
        assert!(!snapshot.is_complete_for("8928", TradeType::A1));
        assert!(!snapshot.is_complete_for("8928", TradeType::B1));
        assert!(snapshot.is_complete_for("9999", TradeType::A1));
        assert!(snapshot.incomplete[0].reason.starts_with("partial"));
    }

    #[tokio::test]
    async fn test_failed_entity_still_has_map_entry() {
        let requester = ScriptedRequester::new(vec![Ok(ApiResponse::new(500, Value::Null))]);
        let collector = Collector::new(test_config(&["8928"], &[TradeType::A1]));

        let report = collector.collect_with(&requester, date()).await;
        assert!(report.listings["8928"].is_empty());
        assert!(!report.fetched_anything());
    }

    #[tokio::test]
    async fn test_repeat_runs_are_identical_apart_from_timestamps() {
        let responses = || {
            vec![page(vec![article("1", "5억"), article("2", "6억 500")], false)]
        };
        let collector = Collector::new(test_config(&["8928"], &[TradeType::A1]));

        let first = collector.collect_with(&ScriptedRequester::new(responses()), date()).await;
        let second = collector.collect_with(&ScriptedRequester::new(responses()), date()).await;

        let strip = |report: &CollectionReport| {
            let mut listings = report.snapshot().listings;
            for l in &mut listings {
                l.observed_at = DateTime::<Utc>::UNIX_EPOCH;
            }
            serde_json::to_string(&listings).unwrap()
        };
        assert_eq!(strip(&first), strip(&second));
        assert_eq!(first.pairs, second.pairs);
    }

    struct FlakyProvider {
        failures: u32,
        attempts: AtomicU32,
    }

    #[async_trait]
    impl SessionProvider for FlakyProvider {
        async fn warm_up(&self) -> Result<Box<dyn AuthenticatedRequester>, SessionError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                return Err(SessionError::Timeout(1));
            }
            Ok(Box::new(ScriptedRequester::new(vec![page(vec![article("1", "5억")], false)])))
        }
    }

    #[tokio::test]
    async fn test_warm_up_retried_once() {
        let provider = FlakyProvider { failures: 1, attempts: AtomicU32::new(0) };
        let collector = Collector::new(test_config(&["8928"], &[TradeType::A1]));

        let report = collector.run(&provider, date()).await.unwrap();
        assert_eq!(report.total_listings(), 1);
        assert_eq!(provider.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_warm_up_gives_up_after_second_failure() {
        let provider = FlakyProvider { failures: 5, attempts: AtomicU32::new(0) };
        let collector = Collector::new(test_config(&["8928"], &[TradeType::A1]));

        let result = collector.run(&provider, date()).await;
        assert!(matches!(result, Err(SessionError::Timeout(_))));
        assert_eq!(provider.attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_pair_status_display() {
        assert_eq!(PairStatus::Complete.to_string(), "complete");
        assert_eq!(
            PairStatus::Failed { error: "HTTP 500".into() }.to_string(),
            "failed (HTTP 500)"
        );
        assert!(PairStatus::Capped.is_complete());
        assert!(!PairStatus::Partial { error: String::new() }.is_complete());
    }

    #[test]
    fn test_pair_status_serde() {
        let json = serde_json::to_value(PairStatus::Partial { error: "x".into() }).unwrap();
        assert_eq!(json, json!({"status": "partial", "error": "x"}));
    }
}

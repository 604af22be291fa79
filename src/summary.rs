//! Per-(complex, trade type) statistics and day-over-day deltas.
//!
//! Everything here is pure: two snapshots in, summaries out.

use crate::land::models::{Listing, Snapshot, TradeType};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Price statistics of a non-empty group, in 만원.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceStats {
    pub min: i64,
    pub max: i64,
    pub median: f64,
    pub mean: f64,
}

impl PriceStats {
    /// Computes stats over a set of prices, or `None` if there are none.
    pub fn from_prices(prices: &[i64]) -> Option<Self> {
        if prices.is_empty() {
            return None;
        }

        let mut sorted = prices.to_vec();
        sorted.sort_unstable();

        let n = sorted.len();
        let median = if n % 2 == 1 {
            sorted[n / 2] as f64
        } else {
            (sorted[n / 2 - 1] as f64 + sorted[n / 2] as f64) / 2.0
        };
        let mean = sorted.iter().map(|&p| p as f64).sum::<f64>() / n as f64;

        Some(Self { min: sorted[0], max: sorted[n - 1], median, mean })
    }
}

/// Change versus the same group in the previous snapshot (today minus yesterday).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryDelta {
    pub count: i64,
    /// Mean price change; `None` unless both days have prices
    pub mean_price: Option<f64>,
    /// Mean price change in percent of yesterday's mean
    pub mean_price_pct: Option<f64>,
    pub min_price: Option<i64>,
    /// Listings present today but not yesterday
    pub new_listings: usize,
    /// Listings present yesterday but not today
    pub removed_listings: usize,
}

/// Aggregate for one (complex, trade type, date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexSummary {
    pub entity_id: String,
    pub trade_type: TradeType,
    pub date: NaiveDate,
    pub count: usize,
    /// False when the pair's listings were cut short, so `count` is a floor
    pub complete: bool,
    pub stats: Option<PriceStats>,
    /// Cheapest listing, formatted for display
    pub lowest_listing: Option<String>,
    /// `None` when yesterday had no matching group, which is not the same as no change.
    /// Also `None` when either day's pair was incomplete.
    pub delta: Option<SummaryDelta>,
}

impl ComplexSummary {
    /// Key used for upserts: complex, date, trade type.
    pub fn key(&self) -> (&str, NaiveDate, TradeType) {
        (&self.entity_id, self.date, self.trade_type)
    }
}

type GroupKey = (String, TradeType);

fn group(listings: &[Listing]) -> BTreeMap<GroupKey, Vec<&Listing>> {
    let mut groups: BTreeMap<GroupKey, Vec<&Listing>> = BTreeMap::new();
    for listing in listings {
        groups.entry((listing.entity_id.clone(), listing.trade_type)).or_default().push(listing);
    }
    groups
}

fn stats_of(listings: &[&Listing]) -> Option<PriceStats> {
    let prices: Vec<i64> = listings.iter().map(|l| l.price).collect();
    PriceStats::from_prices(&prices)
}

fn compute_delta(today: &[&Listing], yesterday: &[&Listing]) -> SummaryDelta {
    let today_ids: HashSet<&str> = today.iter().map(|l| l.listing_id.as_str()).collect();
    let yesterday_ids: HashSet<&str> = yesterday.iter().map(|l| l.listing_id.as_str()).collect();

    let today_stats = stats_of(today);
    let yesterday_stats = stats_of(yesterday);

    let (mean_price, mean_price_pct, min_price) = match (&today_stats, &yesterday_stats) {
        (Some(t), Some(y)) => {
            let change = t.mean - y.mean;
            let pct = (y.mean != 0.0).then(|| (change / y.mean * 1000.0).round() / 10.0);
            (Some(change), pct, Some(t.min - y.min))
        }
        _ => (None, None, None),
    };

    SummaryDelta {
        count: today.len() as i64 - yesterday.len() as i64,
        mean_price,
        mean_price_pct,
        min_price,
        new_listings: today_ids.difference(&yesterday_ids).count(),
        removed_listings: yesterday_ids.difference(&today_ids).count(),
    }
}

/// Summarizes today's snapshot and compares it with yesterday's.
///
/// Groups come from today's listings plus any `expected` pairs, so a pair
/// whose inventory vanished still gets a (zero-count) summary. Expected
/// pairs marked incomplete today get no such placeholder. A group that is
/// incomplete on either day is summarized without a delta. Output is sorted
/// by complex id, then trade type.
pub fn summarize(
    today: &Snapshot,
    yesterday: Option<&Snapshot>,
    expected: &[(String, TradeType)],
) -> Vec<ComplexSummary> {
    let mut today_groups = group(&today.listings);
    for key in expected {
        if today.is_complete_for(&key.0, key.1) {
            today_groups.entry(key.clone()).or_default();
        }
    }

    let yesterday_groups = yesterday.map(|s| group(&s.listings)).unwrap_or_default();

    today_groups
        .into_iter()
        .map(|((entity_id, trade_type), listings)| {
            let lowest = listings.iter().min_by(|a, b| {
                a.price.cmp(&b.price).then_with(|| a.listing_id.cmp(&b.listing_id))
            });

            let complete = today.is_complete_for(&entity_id, trade_type);
            let comparable = complete
                && yesterday.is_some_and(|y| y.is_complete_for(&entity_id, trade_type));
            let delta = if comparable {
                yesterday_groups
                    .get(&(entity_id.clone(), trade_type))
                    .map(|prior| compute_delta(&listings, prior))
            } else {
                None
            };

            ComplexSummary {
                date: today.date,
                count: listings.len(),
                complete,
                stats: stats_of(&listings),
                lowest_listing: lowest.map(|l| l.short_description()),
                delta,
                entity_id,
                trade_type,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::land::models::fixtures::listing;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn snapshot(d: u32, listings: Vec<Listing>) -> Snapshot {
        Snapshot::new(day(d), listings)
    }

    /// `count` listings averaging exactly `mean`.
    fn group_of(prefix: &str, count: usize, mean: i64) -> Vec<Listing> {
        (0..count)
            .map(|i| {
                let offset = if i % 2 == 0 { 1000 } else { -1000 };
                let offset = if count % 2 == 1 && i == count - 1 { 0 } else { offset };
                listing(&format!("{}{}", prefix, i), "8928", TradeType::A1, mean + offset)
            })
            .collect()
    }

    #[test]
    fn test_price_stats() {
        let stats = PriceStats::from_prices(&[30, 10, 20, 40]).unwrap();
        assert_eq!(stats.min, 10);
        assert_eq!(stats.max, 40);
        assert_eq!(stats.median, 25.0);
        assert_eq!(stats.mean, 25.0);

        let stats = PriceStats::from_prices(&[5, 1, 3]).unwrap();
        assert_eq!(stats.median, 3.0);
        assert_eq!(stats.mean, 3.0);

        assert!(PriceStats::from_prices(&[]).is_none());
    }

    #[test]
    fn test_delta_against_matching_group() {
        let today = snapshot(16, group_of("t", 10, 50000));
        let yesterday = snapshot(15, group_of("y", 8, 48000));

        let summaries = summarize(&today, Some(&yesterday), &[]);
        assert_eq!(summaries.len(), 1);

        let summary = &summaries[0];
        assert_eq!(summary.count, 10);
        assert_eq!(summary.stats.as_ref().unwrap().mean, 50000.0);

        let delta = summary.delta.as_ref().unwrap();
        assert_eq!(delta.count, 2);
        assert_eq!(delta.mean_price, Some(2000.0));
        assert_eq!(delta.mean_price_pct, Some(4.2));
        assert_eq!(delta.new_listings, 10);
        assert_eq!(delta.removed_listings, 8);
    }

    #[test]
    fn test_zero_change_is_not_absent() {
        let listings = vec![listing("1", "8928", TradeType::A1, 100)];
        let today = snapshot(16, listings.clone());
        let yesterday = snapshot(15, listings);

        let summaries = summarize(&today, Some(&yesterday), &[]);
        let delta = summaries[0].delta.as_ref().unwrap();
        assert_eq!(delta.count, 0);
        assert_eq!(delta.mean_price, Some(0.0));
        assert_eq!(delta.min_price, Some(0));
        assert_eq!(delta.new_listings, 0);
        assert_eq!(delta.removed_listings, 0);
    }

    #[test]
    fn test_new_group_has_absent_delta() {
        let today = snapshot(
            16,
            vec![
                listing("1", "8928", TradeType::A1, 100),
                listing("2", "8928", TradeType::B1, 50),
            ],
        );
        let yesterday = snapshot(15, vec![listing("1", "8928", TradeType::A1, 90)]);

        let summaries = summarize(&today, Some(&yesterday), &[]);
        assert_eq!(summaries.len(), 2);
        assert!(summaries[0].delta.is_some());
        assert_eq!(summaries[1].trade_type, TradeType::B1);
        assert!(summaries[1].delta.is_none());
    }

    #[test]
    fn test_first_run_has_no_deltas() {
        let today = snapshot(
            16,
            vec![listing("1", "1", TradeType::A1, 100), listing("2", "2", TradeType::A1, 200)],
        );

        let summaries = summarize(&today, None, &[]);
        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().all(|s| s.delta.is_none()));
    }

    #[test]
    fn test_expected_pair_without_listings() {
        let today = snapshot(16, Vec::new());
        let yesterday = snapshot(15, vec![listing("1", "8928", TradeType::A1, 90)]);
        let expected = vec![("8928".to_string(), TradeType::A1)];

        let summaries = summarize(&today, Some(&yesterday), &expected);
        assert_eq!(summaries.len(), 1);

        let summary = &summaries[0];
        assert_eq!(summary.count, 0);
        assert!(summary.stats.is_none());
        assert!(summary.lowest_listing.is_none());

        let delta = summary.delta.as_ref().unwrap();
        assert_eq!(delta.count, -1);
        assert_eq!(delta.removed_listings, 1);
        assert_eq!(delta.mean_price, None);
    }

    #[test]
    fn test_lowest_listing_and_ordering() {
        let today = snapshot(
            16,
            vec![
                listing("b", "2", TradeType::A1, 300),
                listing("a", "1", TradeType::B2, 200),
                listing("c", "1", TradeType::A1, 150),
                listing("d", "1", TradeType::A1, 120),
            ],
        );

        let summaries = summarize(&today, None, &[]);
        let keys: Vec<_> = summaries.iter().map(|s| (s.entity_id.as_str(), s.trade_type)).collect();
        assert_eq!(keys, vec![("1", TradeType::A1), ("1", TradeType::B2), ("2", TradeType::A1)]);

        assert_eq!(
            summaries[0].lowest_listing.as_deref(),
            Some("5층 / 84.9㎡ / 120만원 / 하나부동산")
        );
        assert_eq!(summaries[0].key(), ("1", day(16), TradeType::A1));
    }

    #[test]
    fn test_percent_absent_when_yesterday_mean_is_zero() {
        let today = snapshot(16, vec![listing("1", "8928", TradeType::A1, 100)]);
        let yesterday = snapshot(15, vec![listing("1", "8928", TradeType::A1, 0)]);

        let summaries = summarize(&today, Some(&yesterday), &[]);
        let delta = summaries[0].delta.as_ref().unwrap();
        assert_eq!(delta.mean_price, Some(100.0));
        assert_eq!(delta.mean_price_pct, None);
    }

    #[test]
    fn test_incomplete_today_has_no_delta() {
        let mut today = snapshot(16, vec![listing("1", "8928", TradeType::A1, 100)]);
        today.mark_incomplete("8928", TradeType::A1, "partial (HTTP status 500)");
        let yesterday = snapshot(
            15,
            vec![
                listing("1", "8928", TradeType::A1, 100),
                listing("2", "8928", TradeType::A1, 110),
                listing("3", "8928", TradeType::A1, 120),
            ],
        );

        let summaries = summarize(&today, Some(&yesterday), &[]);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].count, 1);
        assert!(!summaries[0].complete);
        assert!(summaries[0].delta.is_none());
    }

    #[test]
    fn test_incomplete_yesterday_has_no_delta() {
        let today = snapshot(
            16,
            vec![listing("1", "8928", TradeType::A1, 100), listing("2", "8928", TradeType::A1, 110)],
        );
        let mut yesterday = snapshot(15, vec![listing("1", "8928", TradeType::A1, 100)]);
        yesterday.mark_incomplete("8928", TradeType::A1, "partial (HTTP status 500)");

        let summaries = summarize(&today, Some(&yesterday), &[]);
        assert!(summaries[0].complete);
        // Listing 2 may have existed yesterday beyond the cut-off page
        assert!(summaries[0].delta.is_none());
    }

    #[test]
    fn test_failed_expected_pair_is_not_summarized() {
        let mut today = snapshot(16, vec![listing("1", "8928", TradeType::A1, 100)]);
        today.mark_incomplete("8928", TradeType::B1, "failed (HTTP status 500)");
        let expected = vec![
            ("8928".to_string(), TradeType::A1),
            ("8928".to_string(), TradeType::B1),
        ];

        let summaries = summarize(&today, None, &expected);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].trade_type, TradeType::A1);
        assert!(summaries[0].complete);
    }
}

//! Data models for listings, trade types, and dated snapshots.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Transaction kind of a listing, using the upstream trade type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TradeType {
    /// 매매 (sale)
    A1,
    /// 전세 (lease on a lump-sum deposit)
    B1,
    /// 월세 (deposit plus monthly rent)
    B2,
}

impl TradeType {
    /// Returns the upstream code used in query strings.
    pub fn code(&self) -> &'static str {
        match self {
            TradeType::A1 => "A1",
            TradeType::B1 => "B1",
            TradeType::B2 => "B2",
        }
    }

    /// Returns the Korean label.
    pub fn label(&self) -> &'static str {
        match self {
            TradeType::A1 => "매매",
            TradeType::B1 => "전세",
            TradeType::B2 => "월세",
        }
    }

    /// Returns the English description.
    pub fn description(&self) -> &'static str {
        match self {
            TradeType::A1 => "sale",
            TradeType::B1 => "lease",
            TradeType::B2 => "monthly rent with deposit",
        }
    }

    /// True if prices come as a deposit/monthly-rent pair.
    pub fn has_monthly_rent(&self) -> bool {
        matches!(self, TradeType::B2)
    }

    /// Returns all trade types.
    pub fn all() -> &'static [TradeType] {
        &[TradeType::A1, TradeType::B1, TradeType::B2]
    }
}

impl fmt::Display for TradeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for TradeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "A1" | "매매" => Ok(TradeType::A1),
            "B1" | "전세" => Ok(TradeType::B1),
            "B2" | "월세" => Ok(TradeType::B2),
            _ => Err(format!("Unknown trade type: {}. Use: A1, B1, B2", s)),
        }
    }
}

/// One listing observed in a collection run.
///
/// Prices are in 만원 (10,000 KRW). For `B2` the price is the deposit and
/// `monthly_rent` holds the rent; for other trade types `monthly_rent` is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// Upstream article number, unique per listing
    pub listing_id: String,
    /// Complex (danji) identifier
    pub entity_id: String,
    pub trade_type: TradeType,
    /// Run date this listing belongs to
    pub date: NaiveDate,
    /// Normalized price: sale price, lease deposit, or rent deposit
    pub price: i64,
    pub monthly_rent: Option<i64>,
    /// Exclusive area in square meters
    pub area_m2: Option<f64>,
    /// Floor label as published ("5", "고", "저")
    pub floor: String,
    pub total_floors: Option<u32>,
    pub direction: String,
    pub article_name: String,
    pub agent_name: String,
    pub confirmed_at: String,
    pub description: String,
    pub tags: Vec<String>,
    pub observed_at: DateTime<Utc>,
}

impl Listing {
    /// Human-readable one-liner, e.g. `5층 / 84.9㎡ / 12000만원 / 하나부동산`.
    pub fn short_description(&self) -> String {
        let floor = if self.floor.chars().all(|c| c.is_ascii_digit()) {
            format!("{}층", self.floor)
        } else {
            self.floor.clone()
        };

        let area = self.area_m2.map(|a| format!("{}㎡", a)).unwrap_or_else(|| "-".to_string());

        let price = match self.monthly_rent {
            Some(rent) => format!("{}만원/{}만원", self.price, rent),
            None => format!("{}만원", self.price),
        };

        format!("{} / {} / {} / {}", floor, area, price, self.agent_name)
    }
}

/// Listings grouped by entity id, ordered for deterministic output.
pub type ListingsByEntity = BTreeMap<String, Vec<Listing>>;

/// A pair whose listings in a snapshot are not the full inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncompletePair {
    pub entity_id: String,
    pub trade_type: TradeType,
    pub reason: String,
}

/// All listings collected in one dated run.
///
/// Pairs listed in `incomplete` were cut short or never fetched, so their
/// listings (if any) must not be compared against another day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub date: NaiveDate,
    pub listings: Vec<Listing>,
    #[serde(default)]
    pub incomplete: Vec<IncompletePair>,
}

impl Snapshot {
    /// Creates a snapshot from a flat list of listings.
    pub fn new(date: NaiveDate, listings: Vec<Listing>) -> Self {
        Self { date, listings, incomplete: Vec::new() }
    }

    /// Flattens a per-entity collection into a snapshot.
    pub fn from_entities(date: NaiveDate, by_entity: &ListingsByEntity) -> Self {
        let listings = by_entity.values().flat_map(|l| l.iter().cloned()).collect();
        Self::new(date, listings)
    }

    /// Records that a pair's listings are not complete.
    pub fn mark_incomplete(
        &mut self,
        entity_id: &str,
        trade_type: TradeType,
        reason: impl Into<String>,
    ) {
        self.incomplete.push(IncompletePair {
            entity_id: entity_id.to_string(),
            trade_type,
            reason: reason.into(),
        });
    }

    /// Returns true unless the pair was marked incomplete.
    pub fn is_complete_for(&self, entity_id: &str, trade_type: TradeType) -> bool {
        !self.incomplete.iter().any(|p| p.entity_id == entity_id && p.trade_type == trade_type)
    }

    /// Returns the number of listings.
    pub fn len(&self) -> usize {
        self.listings.len()
    }

    /// Returns true if the snapshot holds no listings.
    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }
}

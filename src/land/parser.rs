//! Maps raw upstream articles to [`Listing`]s.

use crate::error::ItemError;
use crate::land::models::{Listing, TradeType};
use crate::land::price;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};
use tracing::trace;

/// Converts raw articles of one (complex, trade type) pair into listings.
pub struct ArticleParser {
    entity_id: String,
    trade_type: TradeType,
    date: NaiveDate,
    observed_at: DateTime<Utc>,
}

impl ArticleParser {
    /// Creates a parser stamping listings with the given run date and time.
    pub fn new(
        entity_id: impl Into<String>,
        trade_type: TradeType,
        date: NaiveDate,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self { entity_id: entity_id.into(), trade_type, date, observed_at }
    }

    /// Parses a single article.
    pub fn parse(&self, article: &Value) -> Result<Listing, ItemError> {
        let obj = article.as_object().ok_or(ItemError::NotAnObject)?;

        let listing_id = text(obj, "articleNo");
        if listing_id.is_empty() {
            return Err(ItemError::MissingField("articleNo"));
        }

        let raw_price = self.raw_price(obj);
        let parsed = price::parse_for_trade(&raw_price, self.trade_type)?;

        let (floor, total_floors) = parse_floor_info(&text(obj, "floorInfo"));

        let listing = Listing {
            listing_id,
            entity_id: self.entity_id.clone(),
            trade_type: self.trade_type,
            date: self.date,
            price: parsed.amount,
            monthly_rent: parsed.monthly_rent,
            area_m2: number(obj, "area2").or_else(|| number(obj, "area1")),
            floor,
            total_floors,
            direction: text(obj, "direction"),
            article_name: text(obj, "articleName"),
            agent_name: text(obj, "realtorName"),
            confirmed_at: text(obj, "articleConfirmYmd"),
            description: text(obj, "articleFeatureDesc"),
            tags: tags(obj),
            observed_at: self.observed_at,
        };

        trace!("Parsed article {} at {}만원", listing.listing_id, listing.price);
        Ok(listing)
    }

    /// Price text as the price parser expects it for this trade type.
    ///
    /// Monthly rent articles may carry the deposit and rent in separate fields.
    fn raw_price(&self, obj: &Map<String, Value>) -> String {
        let deal = text(obj, "dealOrWarrantPrc");
        let rent = text(obj, "rentPrc");

        if self.trade_type.has_monthly_rent() && !deal.contains('/') && !rent.is_empty() {
            return format!("{}/{}", deal, rent);
        }
        if deal.is_empty() {
            rent
        } else {
            deal
        }
    }
}

/// Splits `"5/15"` into the floor label and the building height.
fn parse_floor_info(raw: &str) -> (String, Option<u32>) {
    match raw.split_once('/') {
        Some((floor, total)) => (floor.trim().to_string(), total.trim().parse().ok()),
        None => (raw.trim().to_string(), None),
    }
}

/// String value of a field; numbers are rendered, anything else is empty.
fn text(obj: &Map<String, Value>, key: &str) -> String {
    match obj.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Numeric value of a field that may arrive as a number or as `"84.9㎡"`.
fn number(obj: &Map<String, Value>, key: &str) -> Option<f64> {
    match obj.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('㎡').trim().parse().ok(),
        _ => None,
    }
}

fn tags(obj: &Map<String, Value>) -> Vec<String> {
    match obj.get("tagList") {
        Some(Value::Array(items)) => {
            items.iter().filter_map(Value::as_str).map(str::to_string).collect()
        }
        Some(Value::String(s)) if !s.is_empty() => {
            s.split(',').map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect()
        }
        _ => Vec::new(),
    }
}

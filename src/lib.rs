//! land-tracker - Daily Naver Real Estate listing collector
//!
//! Holds a browser session that passes the upstream anti-bot checks, pages
//! through listings with bounded retry, normalizes Korean prices to 만원,
//! and summarizes each complex against the previous day.

pub mod collector;
pub mod commands;
pub mod config;
pub mod error;
pub mod format;
pub mod land;
pub mod store;
pub mod summary;

pub use collector::{CollectionReport, Collector, PairStatus};
pub use config::Config;
pub use land::models::{Listing, Snapshot, TradeType};
pub use summary::{summarize, ComplexSummary, SummaryDelta};

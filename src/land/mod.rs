//! Naver Real Estate specific modules: sessions, fetching, parsing, and models.

pub mod browser;
pub mod client;
pub mod direct;
pub mod models;
pub mod parser;
pub mod price;
pub mod session;

pub use browser::{BrowserSession, SessionManager};
pub use client::{ArticlePage, FetchClient, RetryPolicy};
pub use direct::{DirectRequester, DirectSessionProvider};
pub use models::{IncompletePair, Listing, ListingsByEntity, Snapshot, TradeType};
pub use parser::ArticleParser;
pub use session::{ApiResponse, AuthenticatedRequester, SessionProvider};

//! Error taxonomy for the collection pipeline.
//!
//! Errors are scoped by the unit of work they can spoil: an item, a
//! (complex, trade type) pair, or the whole run.

use thiserror::Error;

/// A price string that does not follow the Korean price grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty price string")]
    Empty,

    #[error("unexpected token in price {input:?}")]
    UnexpectedToken { input: String },

    #[error("missing '/' separator in deposit/rent price {input:?}")]
    MissingSeparator { input: String },

    #[error("more than one '/' separator in price {input:?}")]
    ExtraSeparator { input: String },

    #[error("price {input:?} overflows")]
    Overflow { input: String },
}

/// Why a single upstream article was skipped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ItemError {
    #[error(transparent)]
    Price(#[from] ParseError),

    #[error("article is missing {0}")]
    MissingField(&'static str),

    #[error("article is not an object")]
    NotAnObject,
}

/// Failure inside an [`AuthenticatedRequester`](crate::land::AuthenticatedRequester).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// Network-level failure; worth retrying.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The request went through but the body was unusable.
    #[error("could not decode response: {0}")]
    Decode(String),
}

/// Page-level fetch failure. Aborts collection of the owning pair only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("session rejected by upstream (HTTP {0})")]
    Unauthorized(u16),

    #[error("request failed with status: {0}")]
    HttpStatus(u16),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Run-level failure: without a session nothing can be collected.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("warm-up navigation failed: {0}")]
    Navigation(String),

    #[error("no session cookie appeared within {0}s")]
    Timeout(u64),

    #[error("no captured cookies configured for direct session")]
    MissingCookies,

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

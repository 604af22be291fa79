//! Authenticated request capability and session providers.
//!
//! The upstream API only answers requests that carry the cookies its web
//! front-end hands out. [`AuthenticatedRequester`] hides how those cookies
//! travel: inside a live browser page ([`BrowserSession`](super::browser::BrowserSession))
//! or as a captured jar on a plain HTTP client ([`DirectRequester`](super::direct::DirectRequester)).

use crate::error::{RequestError, SessionError};
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

/// Status and decoded JSON body of one upstream response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// Decoded body; `Value::Null` when the status was not a success
    pub body: Value,
}

impl ApiResponse {
    /// Creates a response.
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A capability that can perform GET requests the upstream accepts as
/// coming from an established session.
#[async_trait]
pub trait AuthenticatedRequester: Send + Sync {
    /// Issues a GET and returns the status plus JSON body.
    async fn get_json(&self, url: &str) -> Result<ApiResponse, RequestError>;

    /// Releases whatever the session holds. Must be safe to call twice.
    async fn dispose(&mut self);
}

/// Produces ready-to-use sessions.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Establishes a session. No retries happen here.
    async fn warm_up(&self) -> Result<Box<dyn AuthenticatedRequester>, SessionError>;
}

/// Formats cookies as a `Cookie` request header value.
pub fn cookie_header<'a>(cookies: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    cookies
        .into_iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Saves a `Cookie` header so a later run can skip the browser.
pub async fn save_cookie_header(path: &Path, header: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, header).await
}

/// Loads a saved `Cookie` header; `None` if the file is missing or blank.
pub async fn load_cookie_header(path: &Path) -> std::io::Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => {
            let header = content.trim();
            Ok((!header.is_empty()).then(|| header.to_string()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Returns true once the jar holds a cookie that marks an established session.
///
/// With no configured names any cookie counts.
pub fn has_session_cookie<'a>(
    names: impl IntoIterator<Item = &'a str>,
    wanted: &[String],
) -> bool {
    let mut names = names.into_iter().peekable();
    if wanted.is_empty() {
        return names.peek().is_some();
    }
    names.any(|name| wanted.iter().any(|w| w == name))
}

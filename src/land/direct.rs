//! Browserless session: a wreq client replaying a captured cookie jar.

use crate::config::Config;
use crate::error::{RequestError, SessionError};
use crate::land::session::{
    load_cookie_header, ApiResponse, AuthenticatedRequester, SessionProvider,
};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};
use wreq::Client;
use wreq_util::Emulation;

/// Sends requests with Chrome TLS emulation and a fixed `Cookie` header.
pub struct DirectRequester {
    client: Client,
    cookie_header: String,
    referer: String,
}

impl DirectRequester {
    /// Creates a requester carrying the given `Cookie` header.
    pub fn new(config: &Config, cookie_header: impl Into<String>) -> Result<Self, SessionError> {
        let mut builder = Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10));

        if let Some(proxy_url) = &config.proxy {
            debug!("Configuring proxy: {}", proxy_url);
            let proxy = wreq::Proxy::all(proxy_url)
                .map_err(|e| SessionError::Client(format!("invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|e| SessionError::Client(e.to_string()))?;

        Ok(Self {
            client,
            cookie_header: cookie_header.into(),
            referer: format!("{}/", config.base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl AuthenticatedRequester for DirectRequester {
    async fn get_json(&self, url: &str) -> Result<ApiResponse, RequestError> {
        let response = self
            .client
            .get(url)
            .emulation(Emulation::Chrome131)
            .header("Accept", "application/json, text/plain, */*")
            .header("Accept-Language", "ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7")
            .header("Referer", self.referer.as_str())
            .header("Cookie", self.cookie_header.as_str())
            .send()
            .await
            .map_err(|e| RequestError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        debug!("Response status: {}", status);

        let text = response.text().await.map_err(|e| RequestError::Transport(e.to_string()))?;

        if !(200..300).contains(&status) {
            return Ok(ApiResponse::new(status, Value::Null));
        }

        let body = serde_json::from_str(&text).map_err(|e| RequestError::Decode(e.to_string()))?;
        Ok(ApiResponse::new(status, body))
    }

    async fn dispose(&mut self) {
        self.cookie_header.clear();
    }
}

/// Provides direct sessions from the configured cookie header, or from the
/// cookies the last browser warm-up saved.
pub struct DirectSessionProvider {
    config: Config,
}

impl DirectSessionProvider {
    /// Creates a provider for the given configuration.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    async fn resolve_cookie(&self) -> Result<String, SessionError> {
        let configured = self.config.cookie.as_deref().map(str::trim).filter(|c| !c.is_empty());
        if let Some(cookie) = configured {
            return Ok(cookie.to_string());
        }

        let path = self.config.cookie_file();
        match load_cookie_header(&path).await {
            Ok(Some(cookie)) => {
                info!("Using cookies saved at {}", path.display());
                Ok(cookie)
            }
            Ok(None) => Err(SessionError::MissingCookies),
            Err(e) => {
                warn!("Could not read {}: {}", path.display(), e);
                Err(SessionError::MissingCookies)
            }
        }
    }
}

#[async_trait]
impl SessionProvider for DirectSessionProvider {
    async fn warm_up(&self) -> Result<Box<dyn AuthenticatedRequester>, SessionError> {
        let cookie = self.resolve_cookie().await?;

        info!("Using captured cookies for a browserless session");
        Ok(Box::new(DirectRequester::new(&self.config, cookie)?))
    }
}

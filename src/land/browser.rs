//! Chromium-held session using chromiumoxide.
//!
//! Requests run as `fetch()` inside the page, so the browser attaches the
//! session cookies itself and the traffic looks like the site's own XHR.

use crate::config::Config;
use crate::error::{RequestError, SessionError};
use crate::land::session::{
    cookie_header, has_session_cookie, save_cookie_header, ApiResponse, AuthenticatedRequester,
    SessionProvider,
};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use rand::RngExt;
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
];

const COOKIE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Launches Chromium and warms a session on the landing page.
pub struct SessionManager {
    config: Config,
}

impl SessionManager {
    /// Creates a manager for the given configuration.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn browser_config(&self, user_agent: &str) -> Result<BrowserConfig, SessionError> {
        let (width, height) = {
            let mut rng = rand::rng();
            (1366 + rng.random_range(0..=200), 768 + rng.random_range(0..=100))
        };

        let mut builder = BrowserConfig::builder()
            .window_size(width, height)
            .request_timeout(Duration::from_secs(self.config.warmup_timeout_secs.max(1)))
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--no-sandbox")
            .arg("--lang=ko-KR")
            .arg(format!("--user-agent={}", user_agent));

        if !self.config.headless {
            builder = builder.with_head();
        }

        if let Some(proxy) = &self.config.proxy {
            info!("Using proxy: {}", proxy);
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        if let Some(path) = &self.config.chrome_path {
            builder = builder.chrome_executable(path);
        }

        builder.build().map_err(SessionError::Launch)
    }

    /// Polls the page's cookie jar until a session cookie shows up.
    async fn wait_for_session_cookie(&self, page: &Page) -> Result<(), SessionError> {
        let timeout = Duration::from_secs(self.config.warmup_timeout_secs);
        let started = Instant::now();

        loop {
            match page.get_cookies().await {
                Ok(cookies) => {
                    let names = cookies.iter().map(|c| c.name.as_str());
                    if has_session_cookie(names, &self.config.session_cookies) {
                        debug!("Session cookie present after {}ms", started.elapsed().as_millis());
                        return Ok(());
                    }
                }
                Err(e) => warn!("Reading cookies failed: {}", e),
            }

            if started.elapsed() >= timeout {
                return Err(SessionError::Timeout(self.config.warmup_timeout_secs));
            }
            tokio::time::sleep(COOKIE_POLL_INTERVAL).await;
        }
    }

    /// Launches the browser, opens the landing page, and waits for cookies.
    pub async fn open(&self) -> Result<BrowserSession, SessionError> {
        let user_agent = USER_AGENTS[rand::rng().random_range(0..USER_AGENTS.len())];
        let config = self.browser_config(user_agent)?;

        let (browser, mut handler) =
            Browser::launch(config).await.map_err(|e| SessionError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    debug!("CDP handler event error");
                }
            }
        });

        // From here on the session owns the browser, so every early return
        // below still tears it down through Drop.
        let mut session = BrowserSession {
            browser: Some(browser),
            page: None,
            handler: Some(handler_task),
            cookie_header: String::new(),
        };

        let page = session
            .browser
            .as_ref()
            .ok_or_else(|| SessionError::Launch("browser already closed".to_string()))?
            .new_page("about:blank")
            .await
            .map_err(|e| SessionError::Launch(e.to_string()))?;

        if let Err(e) = page.enable_stealth_mode_with_agent(user_agent).await {
            warn!("Stealth patches failed (continuing): {}", e);
        }

        let landing = self.config.landing_url();
        info!("Warming up session on {}", landing);

        let timeout = Duration::from_secs(self.config.warmup_timeout_secs.max(1));
        match tokio::time::timeout(timeout, page.goto(landing.as_str())).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(SessionError::Navigation(e.to_string())),
            Err(_) => return Err(SessionError::Timeout(self.config.warmup_timeout_secs)),
        }

        self.wait_for_session_cookie(&page).await?;

        if let Ok(cookies) = page.get_cookies().await {
            session.cookie_header =
                cookie_header(cookies.iter().map(|c| (c.name.as_str(), c.value.as_str())));
        }
        session.page = Some(page);

        info!("Session ready");
        Ok(session)
    }
}

#[async_trait]
impl SessionProvider for SessionManager {
    async fn warm_up(&self) -> Result<Box<dyn AuthenticatedRequester>, SessionError> {
        let session = self.open().await?;

        let cookies = session.captured_cookies();
        if !cookies.is_empty() {
            let path = self.config.cookie_file();
            match save_cookie_header(&path, cookies).await {
                Ok(()) => debug!("Saved session cookies to {}", path.display()),
                Err(e) => warn!("Could not save session cookies to {}: {}", path.display(), e),
            }
        }

        Ok(Box::new(session))
    }
}

/// Result object returned by the in-page fetch script.
#[derive(Debug, Deserialize)]
struct InPageResponse {
    status: u16,
    #[serde(default)]
    body: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// A live browser page with an established session.
pub struct BrowserSession {
    browser: Option<Browser>,
    page: Option<Page>,
    handler: Option<JoinHandle<()>>,
    cookie_header: String,
}

impl BrowserSession {
    /// Cookies captured at warm-up, formatted as a `Cookie` header.
    ///
    /// Saved at warm-up so a [`DirectRequester`](super::direct::DirectRequester)
    /// can reuse the session on a later run.
    pub fn captured_cookies(&self) -> &str {
        &self.cookie_header
    }
}

/// JavaScript that performs the request from inside the page.
///
/// Network failures surface as `{status: 0, error}` instead of a rejected
/// promise so they can be told apart from script errors.
pub fn fetch_script(url: &str) -> String {
    let url = Value::String(url.to_string());
    format!(
        r#"async () => {{
    try {{
        const resp = await fetch({url}, {{
            method: 'GET',
            credentials: 'include',
            headers: {{ 'Accept': 'application/json, text/plain, */*' }},
        }});
        if (!resp.ok) {{
            return {{ status: resp.status, body: null }};
        }}
        const text = await resp.text();
        try {{
            return {{ status: resp.status, body: JSON.parse(text) }};
        }} catch (e) {{
            return {{ status: resp.status, body: null, error: 'invalid JSON: ' + String(e) }};
        }}
    }} catch (e) {{
        return {{ status: 0, body: null, error: String(e) }};
    }}
}}"#
    )
}

fn into_api_response(result: InPageResponse) -> Result<ApiResponse, RequestError> {
    match (result.status, result.error) {
        (0, error) => Err(RequestError::Transport(error.unwrap_or_else(|| "fetch failed".into()))),
        (status, Some(error)) if (200..300).contains(&status) => Err(RequestError::Decode(error)),
        (status, _) => Ok(ApiResponse::new(status, result.body.unwrap_or(Value::Null))),
    }
}

#[async_trait]
impl AuthenticatedRequester for BrowserSession {
    async fn get_json(&self, url: &str) -> Result<ApiResponse, RequestError> {
        let page =
            self.page.as_ref().ok_or_else(|| RequestError::Transport("session closed".into()))?;

        let result = page
            .evaluate(fetch_script(url))
            .await
            .map_err(|e| RequestError::Transport(format!("in-page fetch failed: {}", e)))?;

        let result: InPageResponse = result
            .into_value()
            .map_err(|e| RequestError::Decode(format!("unexpected fetch result: {:?}", e)))?;

        into_api_response(result)
    }

    async fn dispose(&mut self) {
        self.page = None;
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("Closing browser failed: {}", e);
            }
            if let Err(e) = browser.wait().await {
                warn!("Waiting for browser exit failed: {}", e);
            }
            info!("Browser session closed");
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        // Reached without dispose() on cancellation or early error; dropping
        // the Browser kills the Chromium child process.
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        if self.browser.take().is_some() {
            debug!("Browser session dropped without dispose");
        }
    }
}

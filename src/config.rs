//! Configuration management with TOML, environment variables, and CLI overrides.

use crate::land::models::TradeType;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Application configuration with layered loading.
///
/// A `Config` value is handed to the collector at construction, so two runs
/// with different settings never share state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Complex ids to track
    #[serde(default = "default_entity_ids")]
    pub entity_ids: Vec<String>,

    /// Trade types to collect for every complex
    #[serde(default = "default_trade_types")]
    pub trade_types: Vec<TradeType>,

    /// Maximum listings kept per complex, across all trade types
    #[serde(default = "default_max_listings")]
    pub max_listings_per_entity: usize,

    /// Upstream site root
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Nominal number of articles per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Attempts per page, first try included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the second attempt; doubles after that
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Random jitter added to each backoff (kept below the base)
    #[serde(default = "default_backoff_jitter_ms")]
    pub backoff_jitter_ms: u64,

    /// Lower bound of the pause between requests
    #[serde(default = "default_delay_min_ms")]
    pub delay_min_ms: u64,

    /// Upper bound of the pause between requests
    #[serde(default = "default_delay_max_ms")]
    pub delay_max_ms: u64,

    /// Run Chromium without a window
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Proxy URL (e.g., socks5://host:port)
    #[serde(default)]
    pub proxy: Option<String>,

    /// Explicit Chromium binary; autodetected when unset
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,

    /// Page visited to obtain session cookies
    #[serde(default)]
    pub landing_url: Option<String>,

    /// Cookie names that mark an established session
    #[serde(default = "default_session_cookies")]
    pub session_cookies: Vec<String>,

    /// How long warm-up waits for a session cookie
    #[serde(default = "default_warmup_timeout_secs")]
    pub warmup_timeout_secs: u64,

    /// Captured `Cookie` header for browserless runs
    #[serde(default)]
    pub cookie: Option<String>,

    /// Directory holding partitions and summaries
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Pause between document store upserts
    #[serde(default = "default_upsert_delay_ms")]
    pub upsert_delay_ms: u64,

    /// Output format
    #[serde(default)]
    pub format: OutputFormat,
}

fn default_entity_ids() -> Vec<String> {
    vec!["8928".to_string()]
}

fn default_trade_types() -> Vec<TradeType> {
    TradeType::all().to_vec()
}

fn default_max_listings() -> usize {
    200
}

fn default_base_url() -> String {
    "https://new.land.naver.com".to_string()
}

fn default_page_size() -> u32 {
    20
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    2000
}

fn default_backoff_jitter_ms() -> u64 {
    1000
}

fn default_delay_min_ms() -> u64 {
    2500
}

fn default_delay_max_ms() -> u64 {
    6000
}

fn default_headless() -> bool {
    true
}

fn default_session_cookies() -> Vec<String> {
    vec!["NNB".to_string()]
}

fn default_warmup_timeout_secs() -> u64 {
    30
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_upsert_delay_ms() -> u64 {
    350
}

impl Default for Config {
    fn default() -> Self {
        Self {
            entity_ids: default_entity_ids(),
            trade_types: default_trade_types(),
            max_listings_per_entity: default_max_listings(),
            base_url: default_base_url(),
            page_size: default_page_size(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_jitter_ms: default_backoff_jitter_ms(),
            delay_min_ms: default_delay_min_ms(),
            delay_max_ms: default_delay_max_ms(),
            headless: default_headless(),
            proxy: None,
            chrome_path: None,
            landing_url: None,
            session_cookies: default_session_cookies(),
            warmup_timeout_secs: default_warmup_timeout_secs(),
            cookie: None,
            data_dir: default_data_dir(),
            upsert_delay_ms: default_upsert_delay_ms(),
            format: OutputFormat::Table,
        }
    }
}

impl Config {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading config from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Loads configuration with fallback to default locations.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::from_file(path);
        }

        let local_config = Path::new("land-tracker.toml");
        if local_config.exists() {
            debug!("Found land-tracker.toml in current directory");
            return Self::from_file(local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("land-tracker").join("config.toml");
            if xdg_config.exists() {
                debug!("Found config in XDG config directory");
                return Self::from_file(xdg_config);
            }
        }

        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Applies environment variable overrides. Unparseable values are ignored.
    pub fn with_env(mut self) -> Self {
        if let Ok(ids) = std::env::var("LAND_ENTITY_IDS") {
            let ids = split_list(&ids);
            if !ids.is_empty() {
                self.entity_ids = ids;
            }
        }

        if let Ok(types) = std::env::var("LAND_TRADE_TYPES") {
            let parsed: Result<Vec<TradeType>, _> =
                split_list(&types).iter().map(|t| t.parse()).collect();
            if let Ok(parsed) = parsed {
                if !parsed.is_empty() {
                    self.trade_types = parsed;
                }
            }
        }

        if let Ok(max) = std::env::var("LAND_MAX_LISTINGS") {
            if let Ok(m) = max.parse() {
                self.max_listings_per_entity = m;
            }
        }

        if let Ok(delay) = std::env::var("LAND_DELAY_MIN_MS") {
            if let Ok(d) = delay.parse() {
                self.delay_min_ms = d;
            }
        }

        if let Ok(delay) = std::env::var("LAND_DELAY_MAX_MS") {
            if let Ok(d) = delay.parse() {
                self.delay_max_ms = d;
            }
        }

        if let Ok(headless) = std::env::var("LAND_HEADLESS") {
            match headless.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" => self.headless = true,
                "0" | "false" | "no" => self.headless = false,
                _ => {}
            }
        }

        if let Ok(proxy) = std::env::var("LAND_PROXY") {
            self.proxy = Some(proxy);
        }

        if let Ok(cookie) = std::env::var("LAND_COOKIE") {
            self.cookie = Some(cookie);
        }

        if let Ok(dir) = std::env::var("LAND_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }

        self
    }

    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.entity_ids.is_empty() {
            anyhow::bail!("No complex ids configured");
        }
        if self.trade_types.is_empty() {
            anyhow::bail!("No trade types configured");
        }
        if self.max_attempts == 0 {
            anyhow::bail!("max_attempts must be at least 1");
        }
        if self.page_size == 0 {
            anyhow::bail!("page_size must be at least 1");
        }
        if self.delay_min_ms > self.delay_max_ms {
            anyhow::bail!(
                "delay_min_ms ({}) is greater than delay_max_ms ({})",
                self.delay_min_ms,
                self.delay_max_ms
            );
        }
        Ok(())
    }

    /// Page visited during warm-up.
    pub fn landing_url(&self) -> String {
        if let Some(url) = &self.landing_url {
            return url.clone();
        }
        match self.entity_ids.first() {
            Some(id) => format!("{}/complexes/{}", self.base_url, urlencoding::encode(id)),
            None => self.base_url.clone(),
        }
    }

    /// Where the browser session's cookies are kept for later `--direct` runs.
    pub fn cookie_file(&self) -> PathBuf {
        self.data_dir.join("session_cookie.txt")
    }

    /// Every (complex id, trade type) pair in collection order.
    pub fn pairs(&self) -> Vec<(String, TradeType)> {
        self.entity_ids
            .iter()
            .flat_map(|id| self.trade_types.iter().map(move |t| (id.clone(), *t)))
            .collect()
    }

    /// Disables every pause. Used by tests and dry runs against local servers.
    pub fn without_delays(mut self) -> Self {
        self.backoff_base_ms = 0;
        self.backoff_jitter_ms = 0;
        self.delay_min_ms = 0;
        self.delay_max_ms = 0;
        self.upsert_delay_ms = 0;
        self
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect()
}

/// Output format for results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Markdown,
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown format: {}. Use: table, json, markdown, csv", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

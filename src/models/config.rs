//! Application configuration structures.

use std::fs;
use std::path::Path;
use std::time::Duration;

use scraper::Selector;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP, pagination and retry settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Selectors used to pull listings out of a page
    #[serde(default)]
    pub extractor: ExtractorConfig,

    /// How previously seen listings are recognised
    #[serde(default)]
    pub index: IndexConfig,

    /// Persistence and retention
    #[serde(default)]
    pub storage: StorageConfig,

    /// Outgoing notification pacing and wording
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Session limits
    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.base_url.trim().is_empty() {
            return Err(AppError::validation("crawler.base_url is empty"));
        }
        url::Url::parse(&self.crawler.base_url)?;
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.window == 0 {
            return Err(AppError::validation("crawler.window must be > 0"));
        }
        if self.crawler.max_pages == 0 {
            return Err(AppError::validation("crawler.max_pages must be > 0"));
        }
        if self.crawler.max_attempts == 0 {
            return Err(AppError::validation("crawler.max_attempts must be > 0"));
        }
        match self.index.lookback {
            Lookback::Recent if self.index.recent_limit == 0 => {
                return Err(AppError::validation("index.recent_limit must be > 0"));
            }
            Lookback::Partition if self.index.partition.is_none() => {
                return Err(AppError::validation(
                    "index.partition is required when lookback is \"partition\"",
                ));
            }
            _ => {}
        }
        if self.storage.capacity == 0 {
            return Err(AppError::validation("storage.capacity must be > 0"));
        }
        if self.session.deadline_secs == 0 {
            return Err(AppError::validation("session.deadline_secs must be > 0"));
        }
        self.extractor.validate()
    }
}

/// HTTP client, pagination and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Catalog listing URL; the page number is appended as a query parameter
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Query parameter carrying the page number
    #[serde(default = "defaults::page_param")]
    pub page_param: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Pages fetched concurrently per batch
    #[serde(default = "defaults::window")]
    pub window: u32,

    /// Hard ceiling on the page number
    #[serde(default = "defaults::max_pages")]
    pub max_pages: u32,

    /// Pause between batches in milliseconds
    #[serde(default = "defaults::batch_pause")]
    pub batch_pause_ms: u64,

    /// Attempts per page before it is given up
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Base of the linear backoff between attempts in milliseconds
    #[serde(default = "defaults::retry_base_delay")]
    pub retry_base_delay_ms: u64,
}

impl CrawlerConfig {
    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            page_param: defaults::page_param(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            window: defaults::window(),
            max_pages: defaults::max_pages(),
            batch_pause_ms: defaults::batch_pause(),
            max_attempts: defaults::max_attempts(),
            retry_base_delay_ms: defaults::retry_base_delay(),
        }
    }
}

/// CSS selectors and attribute rules for listing cards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// One element per listing
    #[serde(default = "defaults::card_selector")]
    pub card_selector: String,

    #[serde(default = "defaults::title_selector")]
    pub title_selector: String,

    #[serde(default = "defaults::model_selector")]
    pub model_selector: String,

    #[serde(default = "defaults::category_selector")]
    pub category_selector: String,

    #[serde(default = "defaults::price_selector")]
    pub price_selector: String,

    #[serde(default = "defaults::location_selector")]
    pub location_selector: String,

    /// Attribute (on the card or a descendant) holding the listing id
    #[serde(default = "defaults::id_attr")]
    pub id_attr: String,

    /// Regex whose first capture group is the listing id
    #[serde(default = "defaults::id_pattern")]
    pub id_pattern: String,

    /// Link whose target is the full-size image
    #[serde(default = "defaults::image_link_selector")]
    pub image_link_selector: String,

    /// Element with an inline `background: url(...)` style, used when no image link exists
    #[serde(default = "defaults::image_style_selector")]
    pub image_style_selector: String,

    /// Pagination control for the next page
    #[serde(default = "defaults::next_selector")]
    pub next_selector: String,

    /// Class marking the next control as disabled
    #[serde(default = "defaults::disabled_class")]
    pub disabled_class: String,

    /// Treat a page without any card element as a failed load
    #[serde(default = "defaults::require_cards")]
    pub require_cards: bool,
}

impl ExtractorConfig {
    /// Check that every selector and pattern parses.
    pub fn validate(&self) -> Result<()> {
        for selector in [
            &self.card_selector,
            &self.title_selector,
            &self.model_selector,
            &self.category_selector,
            &self.price_selector,
            &self.location_selector,
            &self.image_link_selector,
            &self.image_style_selector,
            &self.next_selector,
        ] {
            Selector::parse(selector).map_err(|e| AppError::selector(selector, format!("{e:?}")))?;
        }
        regex::Regex::new(&self.id_pattern)?;
        if self.id_attr.trim().is_empty() {
            return Err(AppError::validation("extractor.id_attr is empty"));
        }
        Ok(())
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            card_selector: defaults::card_selector(),
            title_selector: defaults::title_selector(),
            model_selector: defaults::model_selector(),
            category_selector: defaults::category_selector(),
            price_selector: defaults::price_selector(),
            location_selector: defaults::location_selector(),
            id_attr: defaults::id_attr(),
            id_pattern: defaults::id_pattern(),
            image_link_selector: defaults::image_link_selector(),
            image_style_selector: defaults::image_style_selector(),
            next_selector: defaults::next_selector(),
            disabled_class: defaults::disabled_class(),
            require_cards: defaults::require_cards(),
        }
    }
}

/// What makes a listing "already seen".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IdentityStrategy {
    /// A listing id is reported once, whatever happens to it later
    Identity,
    /// A listing is reported again when its title or price changes
    Fingerprint,
}

/// Which stored records seed the index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Lookback {
    /// The most recent `recent_limit` records
    Recent,
    /// Every record tagged with one partition key
    Partition,
}

/// Identity index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "defaults::strategy")]
    pub strategy: IdentityStrategy,

    #[serde(default = "defaults::lookback")]
    pub lookback: Lookback,

    #[serde(default = "defaults::recent_limit")]
    pub recent_limit: usize,

    /// Partition key compared against when `lookback = "partition"`
    #[serde(default)]
    pub partition: Option<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            strategy: defaults::strategy(),
            lookback: defaults::lookback(),
            recent_limit: defaults::recent_limit(),
            partition: None,
        }
    }
}

/// When new listings are written during a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PersistMode {
    /// After every batch of pages
    PerPage,
    /// Once, after the crawl finished
    EndOfRun,
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Maximum number of stored records
    #[serde(default = "defaults::capacity")]
    pub capacity: usize,

    #[serde(default = "defaults::persist")]
    pub persist: PersistMode,

    /// Rewrite already known listings too, so listings still on sale stay
    /// inside the recent lookback window
    #[serde(default = "defaults::refresh_known")]
    pub refresh_known: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            capacity: defaults::capacity(),
            persist: defaults::persist(),
            refresh_known: defaults::refresh_known(),
        }
    }
}

/// Notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Pause between consecutive sends in milliseconds
    #[serde(default = "defaults::pace")]
    pub pace_ms: u64,

    /// Send a closing count message after the listings
    #[serde(default = "defaults::summary")]
    pub summary: bool,

    /// Caption template, see [`crate::models::Record::format`]
    #[serde(default = "defaults::caption")]
    pub caption: String,
}

impl NotifyConfig {
    pub fn pace(&self) -> Duration {
        Duration::from_millis(self.pace_ms)
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            pace_ms: defaults::pace(),
            summary: defaults::summary(),
            caption: defaults::caption(),
        }
    }
}

/// Session limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Upper bound on one check, crawl and notifications included
    #[serde(default = "defaults::deadline")]
    pub deadline_secs: u64,
}

impl SessionConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            deadline_secs: defaults::deadline(),
        }
    }
}

mod defaults {
    use super::{IdentityStrategy, Lookback, PersistMode};

    // Crawler defaults
    pub fn base_url() -> String {
        "https://lombard-centrall.com.ua/shop".into()
    }
    pub fn page_param() -> String {
        "page".into()
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".into()
    }
    pub fn timeout() -> u64 {
        90
    }
    pub fn window() -> u32 {
        10
    }
    pub fn max_pages() -> u32 {
        1400
    }
    pub fn batch_pause() -> u64 {
        1000
    }
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn retry_base_delay() -> u64 {
        2000
    }

    // Extractor defaults
    pub fn card_selector() -> String {
        ".card.w-100".into()
    }
    pub fn title_selector() -> String {
        ".card-body div[style*='font-size: 16px']".into()
    }
    pub fn model_selector() -> String {
        ".card-body div[style*='font-size: 14px']".into()
    }
    pub fn category_selector() -> String {
        ".card-body div[style*='font-size: 12px']".into()
    }
    pub fn price_selector() -> String {
        ".card-body .d-flex.justify-content-between div:first-child".into()
    }
    pub fn location_selector() -> String {
        ".card-body div[style*='font-size: 11px']".into()
    }
    pub fn id_attr() -> String {
        "wire:click".into()
    }
    pub fn id_pattern() -> String {
        r"id:\s*(\d+)".into()
    }
    pub fn image_link_selector() -> String {
        "a[data-fancybox]".into()
    }
    pub fn image_style_selector() -> String {
        "div[style*='background']".into()
    }
    pub fn next_selector() -> String {
        "ul.pagination li:last-child".into()
    }
    pub fn disabled_class() -> String {
        "disabled".into()
    }
    pub fn require_cards() -> bool {
        true
    }

    // Index defaults
    pub fn strategy() -> IdentityStrategy {
        IdentityStrategy::Fingerprint
    }
    pub fn lookback() -> Lookback {
        Lookback::Recent
    }
    pub fn recent_limit() -> usize {
        1000
    }

    // Storage defaults
    pub fn capacity() -> usize {
        5000
    }
    pub fn persist() -> PersistMode {
        PersistMode::PerPage
    }
    pub fn refresh_known() -> bool {
        true
    }

    // Notify defaults
    pub fn pace() -> u64 {
        400
    }
    pub fn summary() -> bool {
        true
    }
    pub fn caption() -> String {
        "📦 {title} ({model})\n💰 {category}\n {price}\n🔗 {link}\n📍 {location}".into()
    }

    // Session defaults
    pub fn deadline() -> u64 {
        900
    }
}

// src/services/fetcher.rs

//! Single-page fetching with retries.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use url::Url;

use crate::error::Result;
use crate::models::{CrawlerConfig, Record};
use crate::services::extractor::PageExtractor;
use crate::utils::http::{create_async_client, fetch_text};
use crate::utils::retry::{Pause, RetryPolicy};
use crate::utils::{page_url, parse_base};

/// Where catalog pages come from.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Link recorded on listings found on `page`.
    fn page_url(&self, page: u32) -> String;

    /// Load the markup of one page.
    async fn load(&self, page: u32) -> Result<String>;
}

/// Catalog pages served over plain HTTP.
///
/// Only the document itself is requested, never its images, stylesheets or
/// fonts.
pub struct HttpPageSource {
    client: reqwest::Client,
    base: Url,
    page_param: String,
}

impl HttpPageSource {
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        Ok(Self {
            client: create_async_client(config)?,
            base: parse_base(&config.base_url)?,
            page_param: config.page_param.clone(),
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    fn page_url(&self, page: u32) -> String {
        page_url(&self.base, &self.page_param, page)
    }

    async fn load(&self, page: u32) -> Result<String> {
        let url = self.page_url(page);
        fetch_text(&self.client, &url, page).await
    }
}

/// Outcome of fetching one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageResult {
    pub page: u32,
    pub records: Vec<Record>,
    /// The page believes there are further pages
    pub has_more: bool,
    /// Attempts spent on the page
    pub attempts: u32,
    /// Every attempt failed
    pub exhausted: bool,
}

/// Loads a page, extracts it, and retries transient failures.
pub struct PageFetcher {
    source: Arc<dyn PageSource>,
    extractor: Arc<dyn PageExtractor>,
    retry: RetryPolicy,
    pause: Arc<dyn Pause>,
}

impl PageFetcher {
    pub fn new(
        source: Arc<dyn PageSource>,
        extractor: Arc<dyn PageExtractor>,
        retry: RetryPolicy,
        pause: Arc<dyn Pause>,
    ) -> Self {
        Self {
            source,
            extractor,
            retry,
            pause,
        }
    }

    /// Fetch one page.
    ///
    /// Never fails: once the retries are used up the page counts as empty
    /// and not continuing, so one bad page cannot abort a crawl.
    pub async fn fetch(&self, page: u32) -> PageResult {
        let url = self.source.page_url(page);
        let mut attempts = 0;

        let outcome = self
            .retry
            .run(self.pause.as_ref(), |attempt| {
                attempts = attempt;
                let url = &url;
                async move {
                    log::debug!("[Parser] Attempt {} to fetch page {}: {}", attempt, page, url);
                    let result = match self.source.load(page).await {
                        Ok(html) => self.extractor.extract(page, &html),
                        Err(e) => Err(e),
                    };
                    if let Err(e) = &result {
                        log::warn!("[Parser] Attempt {} failed for page {}: {}", attempt, page, e);
                    }
                    result
                }
            })
            .await;

        match outcome {
            Ok(content) => {
                let has_more = content.has_more();
                let observed_at = Utc::now();
                let records: Vec<Record> = content
                    .listings
                    .into_iter()
                    .map(|listing| listing.into_record(url.clone(), observed_at))
                    .collect();
                log::debug!(
                    "[Parser] Page {} loaded: {} listings, more: {}",
                    page,
                    records.len(),
                    has_more
                );
                PageResult {
                    page,
                    records,
                    has_more,
                    attempts,
                    exhausted: false,
                }
            }
            Err(e) => {
                log::error!("[Parser] Giving up on page {} after {} attempts: {}", page, attempts, e);
                PageResult {
                    page,
                    records: Vec::new(),
                    has_more: false,
                    attempts,
                    exhausted: true,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::testing::{LineExtractor, RecordingPause, ScriptedSource};

    fn fetcher(source: Arc<ScriptedSource>, pause: Arc<RecordingPause>) -> PageFetcher {
        PageFetcher::new(
            source,
            Arc::new(LineExtractor),
            RetryPolicy::new(3, Duration::from_millis(2000)),
            pause,
        )
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let source = Arc::new(ScriptedSource::new().page(1, "1|Lamp|100\n2|Chair|200"));
        let pause = Arc::new(RecordingPause::default());

        let result = fetcher(source, pause.clone()).fetch(1).await;

        assert_eq!(result.records.len(), 2);
        assert!(result.has_more);
        assert_eq!(result.attempts, 1);
        assert!(!result.exhausted);
        assert_eq!(result.records[0].source_link, "scripted://catalog?page=1");
        assert!(pause.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_recovers_from_transient_failures() {
        let source = Arc::new(ScriptedSource::new().page(4, "9|Bike|900").failing(4, 2));
        let pause = Arc::new(RecordingPause::default());

        let result = fetcher(source.clone(), pause.clone()).fetch(4).await;

        assert_eq!(result.records.len(), 1);
        assert_eq!(result.attempts, 3);
        assert_eq!(source.calls(4), 3);
        assert_eq!(
            pause.recorded(),
            vec![Duration::from_millis(2000), Duration::from_millis(4000)]
        );
    }

    #[tokio::test]
    async fn test_exhausted_page_is_empty_and_final() {
        let source = Arc::new(ScriptedSource::new().page(2, "5|Sofa|500").failing(2, u32::MAX));
        let pause = Arc::new(RecordingPause::default());

        let result = fetcher(source.clone(), pause).fetch(2).await;

        assert!(result.records.is_empty());
        assert!(!result.has_more);
        assert!(result.exhausted);
        assert_eq!(source.calls(2), 3);
    }

    #[tokio::test]
    async fn test_missing_markup_is_retried() {
        let source = Arc::new(ScriptedSource::new().page(3, "#broken"));
        let pause = Arc::new(RecordingPause::default());

        let result = fetcher(source.clone(), pause).fetch(3).await;

        assert!(result.exhausted);
        assert_eq!(source.calls(3), 3);
    }

    #[tokio::test]
    async fn test_last_marker_stops_pagination() {
        let source = Arc::new(ScriptedSource::new().page(6, "1|Lamp|100\n#last"));
        let pause = Arc::new(RecordingPause::default());

        let result = fetcher(source, pause).fetch(6).await;

        assert_eq!(result.records.len(), 1);
        assert!(!result.has_more);
        assert!(!result.exhausted);
    }
}

// src/services/crawler.rs

//! Batched catalog crawling.
//!
//! Pages are requested in fixed-width batches. A batch is fetched
//! concurrently and awaited as a whole before the next one starts.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};

use crate::error::Result;
use crate::models::{Config, Record};
use crate::services::extractor::SelectorExtractor;
use crate::services::fetcher::{HttpPageSource, PageFetcher, PageResult};
use crate::utils::retry::{Pause, RetryPolicy, TokioPause};

/// Batch geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlLimits {
    /// Pages per batch
    pub window: u32,
    /// Highest page number ever requested
    pub max_pages: u32,
    /// Courtesy pause between batches
    pub batch_pause: Duration,
}

impl CrawlLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            window: config.crawler.window.max(1),
            max_pages: config.crawler.max_pages,
            batch_pause: config.crawler.batch_pause(),
        }
    }
}

/// Counters for one crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub batches: u32,
    pub pages_requested: u32,
    pub pages_exhausted: u32,
    pub records_seen: usize,
    /// Stopped because of the page ceiling rather than the catalog ending
    pub hit_page_ceiling: bool,
}

/// Records of a finished crawl.
#[derive(Debug, Clone, Default)]
pub struct CrawlOutput {
    /// Unique by identity; the first page a listing appeared on wins
    pub records: Vec<Record>,
    pub summary: CrawlSummary,
}

/// Drives a [`PageFetcher`] across the catalog.
pub struct BatchCrawler {
    fetcher: PageFetcher,
    limits: CrawlLimits,
    pause: Arc<dyn Pause>,
}

impl BatchCrawler {
    pub fn new(fetcher: PageFetcher, limits: CrawlLimits, pause: Arc<dyn Pause>) -> Self {
        Self {
            fetcher,
            limits,
            pause,
        }
    }

    /// Build an HTTP crawler from configuration.
    ///
    /// Fails when the HTTP client or selectors cannot be set up; nothing is
    /// fetched yet.
    pub fn from_config(config: &Config) -> Result<Self> {
        let source = HttpPageSource::new(&config.crawler)?;
        let extractor = SelectorExtractor::new(&config.extractor)?.with_base(source.base().clone());
        let pause: Arc<dyn Pause> = Arc::new(TokioPause);
        let fetcher = PageFetcher::new(
            Arc::new(source),
            Arc::new(extractor),
            RetryPolicy::from(&config.crawler),
            Arc::clone(&pause),
        );
        Ok(Self::new(fetcher, CrawlLimits::from_config(config), pause))
    }

    pub fn limits(&self) -> CrawlLimits {
        self.limits
    }

    /// Start a crawl that is advanced one batch at a time.
    pub fn start(&self) -> Crawl<'_> {
        Crawl {
            crawler: self,
            next_page: 1,
            more: true,
            summary: CrawlSummary::default(),
        }
    }

    /// Crawl to the end and collect every record.
    pub async fn crawl(&self) -> CrawlOutput {
        let mut crawl = self.start();
        let mut seen = HashSet::new();
        let mut records = Vec::new();

        while let Some(batch) = crawl.next_batch().await {
            for page in batch {
                for record in page.records {
                    if seen.insert(record.identity.clone()) {
                        records.push(record);
                    }
                }
            }
        }

        log::info!(
            "[Crawl] Finished: {} pages, {} unique listings",
            crawl.summary().pages_requested,
            records.len()
        );

        CrawlOutput {
            records,
            summary: crawl.into_summary(),
        }
    }
}

/// An in-progress crawl.
pub struct Crawl<'a> {
    crawler: &'a BatchCrawler,
    next_page: u32,
    more: bool,
    summary: CrawlSummary,
}

impl Crawl<'_> {
    /// Fetch the next batch, sorted by page number.
    ///
    /// Returns `None` once every page of the previous batch reported no
    /// continuation, or the page ceiling was passed.
    pub async fn next_batch(&mut self) -> Option<Vec<PageResult>> {
        let limits = self.crawler.limits;
        if !self.more {
            return None;
        }
        if self.next_page > limits.max_pages {
            self.summary.hit_page_ceiling = true;
            log::info!("[Crawl] Page ceiling {} reached", limits.max_pages);
            return None;
        }

        if self.summary.batches > 0 {
            self.crawler.pause.pause(limits.batch_pause).await;
        }

        let window = limits.window.max(1);
        let first = self.next_page;
        let last = first.saturating_add(window - 1).min(limits.max_pages);
        log::info!(
            "[Crawl] Fetching {} pages starting from {}",
            last - first + 1,
            first
        );

        let fetcher = &self.crawler.fetcher;
        let mut results: Vec<PageResult> = stream::iter(first..=last)
            .map(|page| fetcher.fetch(page))
            .buffer_unordered(window as usize)
            .collect()
            .await;
        results.sort_by_key(|r| r.page);

        // One page glitching to "no more" does not end the crawl while a
        // sibling still sees content.
        self.more = results.iter().any(|r| r.has_more);
        // Fixed stride: the cursor moves a whole window whatever the pages held.
        self.next_page = first.saturating_add(window);

        self.summary.batches += 1;
        self.summary.pages_requested += last - first + 1;
        self.summary.pages_exhausted += results.iter().filter(|r| r.exhausted).count() as u32;
        self.summary.records_seen += results.iter().map(|r| r.records.len()).sum::<usize>();

        Some(results)
    }

    pub fn summary(&self) -> &CrawlSummary {
        &self.summary
    }

    pub fn into_summary(self) -> CrawlSummary {
        self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::services::extractor::PageExtractor;
    use crate::testing::{LineExtractor, RecordingPause, ScriptedSource};

    fn crawler(source: Arc<ScriptedSource>, window: u32, max_pages: u32) -> (BatchCrawler, Arc<RecordingPause>) {
        let pause = Arc::new(RecordingPause::default());
        let extractor: Arc<dyn PageExtractor> = Arc::new(LineExtractor);
        let fetcher = PageFetcher::new(
            source,
            extractor,
            RetryPolicy::new(3, Duration::from_millis(10)),
            pause.clone(),
        );
        let limits = CrawlLimits {
            window,
            max_pages,
            batch_pause: Duration::from_millis(1000),
        };
        (BatchCrawler::new(fetcher, limits, pause.clone()), pause)
    }

    fn catalog(pages: u32, per_page: u32) -> ScriptedSource {
        let mut source = ScriptedSource::new();
        for page in 1..=pages {
            let lines: Vec<String> = (0..per_page)
                .map(|i| {
                    let id = page * 100 + i;
                    format!("{id}|Item {id}|{id} UAH")
                })
                .collect();
            source = source.page(page, &lines.join("\n"));
        }
        source
    }

    #[tokio::test]
    async fn test_stops_when_batch_has_no_continuation() {
        let source = Arc::new(catalog(7, 2));
        let (crawler, pause) = crawler(source.clone(), 3, 1400);

        let output = crawler.crawl().await;

        // Page 7 still has content, so 7-9 continues; 10-12 are all empty.
        assert_eq!(output.summary.batches, 4);
        assert_eq!(output.summary.pages_requested, 12);
        assert_eq!(output.records.len(), 14);
        assert!(!output.summary.hit_page_ceiling);
        assert_eq!(source.requested_pages(), (1..=12).collect::<Vec<_>>());
        // Only between batches.
        assert_eq!(pause.recorded(), vec![Duration::from_millis(1000); 3]);
    }

    #[tokio::test]
    async fn test_page_ceiling_truncates_last_batch() {
        let source = Arc::new(catalog(50, 1));
        let (crawler, _) = crawler(source.clone(), 4, 10);

        let output = crawler.crawl().await;

        assert!(output.summary.hit_page_ceiling);
        assert_eq!(output.summary.pages_requested, 10);
        assert_eq!(source.requested_pages(), (1..=10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_single_failing_page_does_not_stop_crawl() {
        let source = Arc::new(catalog(6, 1).failing(2, u32::MAX));
        let (crawler, _) = crawler(source, 3, 1400);

        let output = crawler.crawl().await;

        let ids: Vec<&str> = output.records.iter().map(|r| r.identity.as_str()).collect();
        assert_eq!(ids, vec!["100", "300", "400", "500", "600"]);
        assert_eq!(output.summary.pages_exhausted, 1);
    }

    #[tokio::test]
    async fn test_batch_order_is_page_order() {
        let source = Arc::new(catalog(5, 2).scrambled());
        let (crawler, _) = crawler(source, 5, 5);

        let mut crawl = crawler.start();
        let batch = crawl.next_batch().await.unwrap();
        let pages: Vec<u32> = batch.iter().map(|r| r.page).collect();
        assert_eq!(pages, vec![1, 2, 3, 4, 5]);

        let first_run: Vec<String> = crawler
            .crawl()
            .await
            .records
            .into_iter()
            .map(|r| r.identity)
            .collect();
        let second_run: Vec<String> = crawler
            .crawl()
            .await
            .records
            .into_iter()
            .map(|r| r.identity)
            .collect();
        assert_eq!(first_run, second_run);
        assert_eq!(first_run.first().map(String::as_str), Some("100"));
    }

    #[tokio::test]
    async fn test_duplicate_identity_keeps_first_page() {
        let source = Arc::new(
            ScriptedSource::new()
                .page(1, "7|Original|100")
                .page(2, "7|Moved|150\n8|Other|80"),
        );
        let (crawler, _) = crawler(source, 2, 2);

        let output = crawler.crawl().await;

        assert_eq!(output.records.len(), 2);
        assert_eq!(output.records[0].title, "Original");
        assert!(output.records[0].source_link.ends_with("page=1"));
    }

    #[tokio::test]
    async fn test_empty_catalog_terminates_after_one_batch() {
        let source = Arc::new(ScriptedSource::new());
        let (crawler, _) = crawler(source, 10, 1400);

        let output = crawler.crawl().await;

        assert_eq!(output.summary.batches, 1);
        assert!(output.records.is_empty());
    }
}

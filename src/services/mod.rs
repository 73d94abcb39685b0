//! Service layer for the catalog watcher.
//!
//! This module contains the crawling machinery:
//! - Listing extraction (`SelectorExtractor`)
//! - Single-page fetching with retries (`PageFetcher`)
//! - Batched pagination (`BatchCrawler`)
//! - Notification dispatch (`Dispatcher`)

pub mod crawler;
pub mod extractor;
pub mod fetcher;
pub mod notifier;

pub use crawler::{BatchCrawler, Crawl, CrawlLimits, CrawlOutput, CrawlSummary};
pub use extractor::{PageContent, PageExtractor, SelectorExtractor};
pub use fetcher::{HttpPageSource, PageFetcher, PageResult, PageSource};
pub use notifier::{DispatchOutcome, Dispatcher, LogNotifier, Notifier};

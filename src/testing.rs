//! Fakes shared by unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{Listing, NO_IMAGE, Record};
use crate::services::{Notifier, PageContent, PageExtractor, PageSource};
use crate::storage::{MemoryStore, RecordFilter, RecordStore, StoredRecord};
use crate::utils::retry::Pause;

/// Record observed on 2026-02-02 with the given fields.
pub(crate) fn record(identity: &str, title: &str, price: &str) -> Record {
    Listing {
        identity: identity.to_string(),
        title: title.to_string(),
        model: String::new(),
        category: String::new(),
        price: price.to_string(),
        image: NO_IMAGE.to_string(),
        location: String::new(),
    }
    .into_record(
        "scripted://catalog?page=1",
        Utc.with_ymd_and_hms(2026, 2, 2, 12, 0, 0).unwrap(),
    )
}

/// Record tagged with an explicit partition.
pub(crate) fn record_on(identity: &str, partition: &str) -> Record {
    let mut r = record(identity, "Item", "1");
    r.partition_key = Some(partition.to_string());
    r
}

/// Pause that only remembers what it was asked to wait.
#[derive(Debug, Default)]
pub(crate) struct RecordingPause {
    calls: Mutex<Vec<Duration>>,
}

impl RecordingPause {
    pub(crate) fn recorded(&self) -> Vec<Duration> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Pause for RecordingPause {
    async fn pause(&self, duration: Duration) {
        self.calls.lock().unwrap().push(duration);
    }
}

/// Extractor over a line format: `id|title|price` per listing, `#last`
/// disables the next-page control, `#broken` makes the page unreadable.
pub(crate) struct LineExtractor;

impl PageExtractor for LineExtractor {
    fn extract(&self, page: u32, html: &str) -> Result<PageContent> {
        if html.trim() == "#broken" {
            return Err(AppError::ContentMissing {
                page,
                selector: "line".into(),
            });
        }

        let mut content = PageContent::default();
        for line in html.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if line == "#last" {
                content.next_disabled = true;
                continue;
            }
            let mut parts = line.split('|');
            let listing = Listing {
                identity: parts.next().unwrap_or("").to_string(),
                title: parts.next().unwrap_or("").to_string(),
                price: parts.next().unwrap_or("").to_string(),
                model: String::new(),
                category: String::new(),
                image: NO_IMAGE.to_string(),
                location: String::new(),
            };
            if listing.is_complete() {
                content.listings.push(listing);
            }
        }
        Ok(content)
    }
}

/// Catalog served from memory, with scripted failures.
#[derive(Debug, Default)]
pub(crate) struct ScriptedSource {
    pages: Mutex<HashMap<u32, String>>,
    failures: Mutex<HashMap<u32, u32>>,
    calls: Mutex<HashMap<u32, u32>>,
    scrambled: bool,
}

impl ScriptedSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn page(self, page: u32, body: &str) -> Self {
        self.set_page(page, body);
        self
    }

    /// Fail the first `times` loads of a page.
    pub(crate) fn failing(self, page: u32, times: u32) -> Self {
        self.failures.lock().unwrap().insert(page, times);
        self
    }

    /// Make later pages finish before earlier ones.
    pub(crate) fn scrambled(mut self) -> Self {
        self.scrambled = true;
        self
    }

    pub(crate) fn set_page(&self, page: u32, body: &str) {
        self.pages.lock().unwrap().insert(page, body.to_string());
    }

    pub(crate) fn clear(&self) {
        self.pages.lock().unwrap().clear();
    }

    pub(crate) fn calls(&self, page: u32) -> u32 {
        self.calls.lock().unwrap().get(&page).copied().unwrap_or(0)
    }

    pub(crate) fn requested_pages(&self) -> Vec<u32> {
        let mut pages: Vec<u32> = self.calls.lock().unwrap().keys().copied().collect();
        pages.sort_unstable();
        pages
    }
}

#[async_trait]
impl PageSource for ScriptedSource {
    fn page_url(&self, page: u32) -> String {
        format!("scripted://catalog?page={page}")
    }

    async fn load(&self, page: u32) -> Result<String> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let entry = calls.entry(page).or_insert(0);
            *entry += 1;
            *entry
        };

        if self.scrambled {
            for _ in 0..(20u32.saturating_sub(page)) {
                tokio::task::yield_now().await;
            }
        }

        let failures = self.failures.lock().unwrap().get(&page).copied().unwrap_or(0);
        if call <= failures {
            return Err(AppError::HttpStatus { page, status: 503 });
        }

        Ok(self
            .pages
            .lock()
            .unwrap()
            .get(&page)
            .cloned()
            .unwrap_or_default())
    }
}

/// Something a [`RecordingNotifier`] delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Sent {
    Record(String, String),
    Text(String, String),
}

/// Notifier that remembers deliveries.
#[derive(Debug, Default)]
pub(crate) struct RecordingNotifier {
    sent: Mutex<Vec<Sent>>,
    records_sent: AtomicUsize,
    cancel_after: Option<(usize, CancellationToken)>,
    failing_on: Option<String>,
}

impl RecordingNotifier {
    /// Cancel `token` once `n` listings were delivered.
    pub(crate) fn cancel_after(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((n, token));
        self
    }

    /// Reject the listing with this identity.
    pub(crate) fn failing_on(mut self, identity: &str) -> Self {
        self.failing_on = Some(identity.to_string());
        self
    }

    pub(crate) fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn sent_identities(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Record(_, id) => Some(id),
                Sent::Text(..) => None,
            })
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_record(&self, destination: &str, record: &Record, _caption: &str) -> Result<()> {
        if self.failing_on.as_deref() == Some(record.identity.as_str()) {
            return Err(AppError::crawl("notify", "rejected"));
        }
        self.sent
            .lock()
            .unwrap()
            .push(Sent::Record(destination.to_string(), record.identity.clone()));
        let delivered = self.records_sent.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((n, token)) = &self.cancel_after {
            if delivered >= *n {
                token.cancel();
            }
        }
        Ok(())
    }

    async fn send_text(&self, destination: &str, text: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push(Sent::Text(destination.to_string(), text.to_string()));
        Ok(())
    }
}

/// Memory store whose writes start failing after a number of write calls.
#[derive(Debug, Default)]
pub(crate) struct FlakyStore {
    inner: MemoryStore,
    writes_allowed: Option<usize>,
    writes: AtomicUsize,
    reads_fail: bool,
}

impl FlakyStore {
    pub(crate) fn failing_writes_after(writes: usize) -> Self {
        Self {
            writes_allowed: Some(writes),
            ..Self::default()
        }
    }

    pub(crate) fn unreachable() -> Self {
        Self {
            reads_fail: true,
            writes_allowed: Some(0),
            ..Self::default()
        }
    }

    fn check_read(&self) -> Result<()> {
        if self.reads_fail {
            return Err(AppError::store("connection refused"));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<()> {
        let n = self.writes.fetch_add(1, Ordering::SeqCst);
        match self.writes_allowed {
            Some(allowed) if n >= allowed => Err(AppError::store("write rejected")),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn load_recent(&self, limit: usize) -> Result<Vec<Record>> {
        self.check_read()?;
        self.inner.load_recent(limit).await
    }

    async fn load_oldest(&self, limit: usize) -> Result<Vec<StoredRecord>> {
        self.check_read()?;
        self.inner.load_oldest(limit).await
    }

    async fn load_by_partition(&self, key: &str) -> Result<Vec<Record>> {
        self.check_read()?;
        self.inner.load_by_partition(key).await
    }

    async fn upsert(&self, record: Record) -> Result<()> {
        self.check_write()?;
        self.inner.upsert(record).await
    }

    async fn upsert_many(&self, records: Vec<Record>) -> Result<usize> {
        self.check_write()?;
        self.inner.upsert_many(records).await
    }

    async fn delete_many(&self, predicate: RecordFilter<'_>) -> Result<usize> {
        self.check_read()?;
        self.inner.delete_many(predicate).await
    }

    async fn evict_to(&self, capacity: usize) -> Result<usize> {
        self.check_read()?;
        self.inner.evict_to(capacity).await
    }

    async fn count(&self) -> Result<usize> {
        self.check_read()?;
        self.inner.count().await
    }
}

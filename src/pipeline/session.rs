// src/pipeline/session.rs

//! Change-detection sessions.
//!
//! A [`Watcher`] holds everything a check needs and hands out one
//! [`ChangeSession`] per request. A session crawls the catalog, classifies
//! every listing against the [`IdentityIndex`], persists what it saw and
//! finally notifies the caller about new listings.
//!
//! At most one session per caller runs at a time; the [`SessionRegistry`]
//! rejects overlapping requests instead of queueing them.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{Config, IndexConfig, Lookback, PersistMode, Record};
use crate::pipeline::index::IdentityIndex;
use crate::services::{BatchCrawler, CrawlSummary, DispatchOutcome, Dispatcher, Notifier};
use crate::storage::{RecordStore, enforce_capacity};
use crate::utils::retry::TokioPause;

/// Lifecycle of a [`ChangeSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Callers with a session in flight.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    running: Arc<Mutex<HashSet<String>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the caller's slot, or fail if it is taken.
    pub fn acquire(&self, caller: &str) -> Result<SessionPermit> {
        if !self.lock().insert(caller.to_string()) {
            return Err(AppError::SessionRunning {
                caller: caller.to_string(),
            });
        }
        Ok(SessionPermit {
            caller: caller.to_string(),
            running: Arc::clone(&self.running),
        })
    }

    pub fn is_running(&self, caller: &str) -> bool {
        self.lock().contains(caller)
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Frees the caller's slot when dropped.
#[derive(Debug)]
pub struct SessionPermit {
    caller: String,
    running: Arc<Mutex<HashSet<String>>>,
}

impl Drop for SessionPermit {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.caller);
    }
}

/// Outcome of a finished session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub caller: String,
    pub state: SessionState,
    /// Listings not known before this run, in page order
    pub new_records: Vec<Record>,
    pub crawl: CrawlSummary,
    /// Records written to the store, new and refreshed
    pub persisted: usize,
    pub evicted: usize,
    /// `None` when the watcher has no dispatcher
    pub dispatch: Option<DispatchOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SessionReport {
    /// One-line summary for logs and replies.
    pub fn summary(&self) -> String {
        let secs = (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0;
        let mut line = format!(
            "{}: {} with {} new listings ({} pages, {} failed, {} persisted, {} evicted, {:.1}s)",
            self.caller,
            self.state,
            self.new_records.len(),
            self.crawl.pages_requested,
            self.crawl.pages_exhausted,
            self.persisted,
            self.evicted,
            secs
        );
        if self.crawl.hit_page_ceiling {
            line.push_str(", page ceiling reached");
        }
        line
    }
}

/// Shared wiring for change-detection sessions.
#[derive(Clone)]
pub struct Watcher {
    crawler: Arc<BatchCrawler>,
    store: Arc<dyn RecordStore>,
    dispatcher: Option<Arc<Dispatcher>>,
    config: Arc<Config>,
    registry: SessionRegistry,
}

impl Watcher {
    pub fn new(crawler: BatchCrawler, store: Arc<dyn RecordStore>, config: Config) -> Self {
        Self {
            crawler: Arc::new(crawler),
            store,
            dispatcher: None,
            config: Arc::new(config),
            registry: SessionRegistry::new(),
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Some(Arc::new(dispatcher));
        self
    }

    /// Build an HTTP-backed watcher.
    pub fn from_config(
        config: Config,
        store: Arc<dyn RecordStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        config.validate()?;
        let crawler = BatchCrawler::from_config(&config)?;
        let dispatcher = Dispatcher::new(notifier, Arc::new(TokioPause), config.notify.clone());
        Ok(Self::new(crawler, store, config).with_dispatcher(dispatcher))
    }

    /// Open a session for `caller`, reporting to `destination`.
    ///
    /// Fails with [`AppError::SessionRunning`] while another session for
    /// the same caller is alive.
    pub fn begin(&self, caller: &str, destination: &str) -> Result<ChangeSession> {
        let permit = self.registry.acquire(caller)?;
        Ok(ChangeSession {
            watcher: self.clone(),
            caller: caller.to_string(),
            destination: destination.to_string(),
            index: self.config.index.clone(),
            deadline: self.config.session.deadline(),
            cancel: CancellationToken::new(),
            state: SessionState::Idle,
            permit: Some(permit),
        })
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }
}

/// One check-for-changes run.
pub struct ChangeSession {
    watcher: Watcher,
    caller: String,
    destination: String,
    index: IndexConfig,
    deadline: Duration,
    cancel: CancellationToken,
    state: SessionState,
    permit: Option<SessionPermit>,
}

impl ChangeSession {
    /// Compare against one partition instead of the configured lookback.
    pub fn with_partition(mut self, key: impl Into<String>) -> Self {
        self.index.lookback = Lookback::Partition;
        self.index.partition = Some(key.into());
        self
    }

    /// Use an externally owned token, e.g. a child of a shutdown token.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn caller(&self) -> &str {
        &self.caller
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Handle for stopping the session from elsewhere.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the session to completion.
    ///
    /// The caller's slot is released whatever the outcome. A session runs
    /// once; calling this again is an error.
    pub async fn run(&mut self) -> Result<SessionReport> {
        if self.state != SessionState::Idle {
            return Err(AppError::crawl(
                &self.caller,
                format!("session already {}", self.state),
            ));
        }
        self.state = SessionState::Running;
        log::info!("[Check] Starting check for {}", self.caller);

        let result = match tokio::time::timeout(self.deadline, self.execute()).await {
            Ok(result) => result,
            Err(_) => {
                self.cancel.cancel();
                Err(AppError::SessionTimeout {
                    caller: self.caller.clone(),
                    secs: self.deadline.as_secs(),
                })
            }
        };
        self.permit.take();

        match result {
            Ok(report) => {
                self.state = report.state;
                log::info!("[Check] {}", report.summary());
                Ok(report)
            }
            Err(e) => {
                self.state = SessionState::Failed;
                log::error!("[Check] Check for {} failed: {}", self.caller, e);
                if let Some(dispatcher) = &self.watcher.dispatcher {
                    dispatcher.report_failure(&self.destination, &e).await;
                }
                Err(e)
            }
        }
    }

    async fn execute(&self) -> Result<SessionReport> {
        let started_at = Utc::now();
        let config = &self.watcher.config;
        let refresh_known = config.storage.refresh_known;

        let mut index = IdentityIndex::load(self.watcher.store.as_ref(), &self.index).await?;
        let mut crawl = self.watcher.crawler.start();
        let mut seen = HashSet::new();
        let mut new_records = Vec::new();
        let mut pending = Vec::new();
        let mut persisted = 0;
        let mut evicted = 0;

        loop {
            if self.cancel.is_cancelled() {
                log::info!("[Check] Crawl for {} cancelled", self.caller);
                break;
            }
            let Some(batch) = crawl.next_batch().await else {
                break;
            };

            let mut writes = Vec::new();
            for page in batch {
                for record in page.records {
                    if !seen.insert(record.identity.clone()) {
                        continue;
                    }
                    if index.insert(&record) {
                        log::info!(
                            "[Check] New listing: {}, ID: {}",
                            record.title,
                            record.identity
                        );
                        new_records.push(record.clone());
                        writes.push(record);
                    } else if refresh_known {
                        writes.push(record);
                    }
                }
            }

            match config.storage.persist {
                PersistMode::PerPage => {
                    let (written, removed) = self.save(writes).await?;
                    persisted += written;
                    evicted += removed;
                }
                PersistMode::EndOfRun => pending.extend(writes),
            }
        }

        let (written, removed) = self.save(pending).await?;
        persisted += written;
        evicted += removed;

        let crawl = crawl.into_summary();
        log::info!(
            "[Check] Found {} new listings for {}",
            new_records.len(),
            self.caller
        );

        let dispatch = match &self.watcher.dispatcher {
            Some(dispatcher) => Some(
                dispatcher
                    .dispatch(&self.destination, &new_records, &self.cancel)
                    .await,
            ),
            None => None,
        };

        let state = if self.cancel.is_cancelled() {
            SessionState::Cancelled
        } else {
            SessionState::Completed
        };

        Ok(SessionReport {
            caller: self.caller.clone(),
            state,
            new_records,
            crawl,
            persisted,
            evicted,
            dispatch,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn save(&self, records: Vec<Record>) -> Result<(usize, usize)> {
        if records.is_empty() {
            return Ok((0, 0));
        }
        let store = self.watcher.store.as_ref();
        let written = store.upsert_many(records).await?;
        let evicted = enforce_capacity(store, self.watcher.config.storage.capacity).await?;
        log::debug!("[Store] Saved {} records", written);
        Ok((written, evicted))
    }
}

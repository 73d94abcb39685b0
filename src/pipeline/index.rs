//! Identity index for change detection.
//!
//! Holds the keys of previously stored listings so a freshly crawled one
//! can be classified as new or known. Depending on the strategy the key is
//! the listing id or a fingerprint over id, title and price.

use std::collections::HashSet;

use crate::error::{AppError, Result};
use crate::models::{IdentityStrategy, IndexConfig, Lookback, Record};
use crate::storage::RecordStore;

/// Set of already-seen listing keys.
#[derive(Debug, Clone)]
pub struct IdentityIndex {
    strategy: IdentityStrategy,
    keys: HashSet<String>,
}

impl IdentityIndex {
    /// Create an empty index.
    pub fn new(strategy: IdentityStrategy) -> Self {
        Self {
            strategy,
            keys: HashSet::new(),
        }
    }

    /// Create an index seeded with records.
    pub fn from_records<'a>(
        strategy: IdentityStrategy,
        records: impl IntoIterator<Item = &'a Record>,
    ) -> Self {
        let mut index = Self::new(strategy);
        for record in records {
            index.insert(record);
        }
        index
    }

    /// Seed an index from the store according to configuration.
    ///
    /// `Recent` looks at the newest `recent_limit` records only, so memory
    /// and read cost stay bounded however large the store grows.
    pub async fn load(store: &dyn RecordStore, config: &IndexConfig) -> Result<Self> {
        let records = match config.lookback {
            Lookback::Recent => store.load_recent(config.recent_limit).await?,
            Lookback::Partition => {
                let key = config.partition.as_deref().ok_or_else(|| {
                    AppError::config("index.partition must be set when lookback is \"partition\"")
                })?;
                store.load_by_partition(key).await?
            }
        };

        let index = Self::from_records(config.strategy, &records);
        log::info!(
            "[Check] Loaded {} known listings ({:?}, {:?})",
            index.len(),
            config.lookback,
            config.strategy
        );
        Ok(index)
    }

    fn key(&self, record: &Record) -> String {
        match self.strategy {
            IdentityStrategy::Identity => record.identity.clone(),
            IdentityStrategy::Fingerprint => record.fingerprint(),
        }
    }

    /// Whether the record was seen before.
    pub fn is_known(&self, record: &Record) -> bool {
        self.keys.contains(&self.key(record))
    }

    /// Remember a record. Returns `true` if it was not known yet.
    pub fn insert(&mut self, record: &Record) -> bool {
        let key = self.key(record);
        self.keys.insert(key)
    }

    pub fn strategy(&self) -> IdentityStrategy {
        self.strategy
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

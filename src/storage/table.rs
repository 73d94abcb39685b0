//! In-memory record table shared by the store backends.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Record;
use crate::storage::StoredRecord;

/// Sequence-ordered rows with an identity lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct RecordTable {
    next_seq: u64,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    /// Ascending by `seq`
    records: Vec<StoredRecord>,
    #[serde(skip)]
    by_identity: HashMap<String, u64>,
}

impl RecordTable {
    /// Rebuild the identity lookup after deserialization.
    pub(crate) fn reindex(&mut self) {
        self.records.sort_by_key(|r| r.seq);
        self.by_identity = self
            .records
            .iter()
            .map(|r| (r.record.identity.clone(), r.seq))
            .collect();
        let max_seq = self.records.last().map_or(0, |r| r.seq + 1);
        self.next_seq = self.next_seq.max(max_seq);
    }

    pub(crate) fn upsert(&mut self, record: Record) {
        if let Some(old_seq) = self.by_identity.remove(&record.identity) {
            if let Ok(pos) = self.records.binary_search_by_key(&old_seq, |r| r.seq) {
                self.records.remove(pos);
            }
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_identity.insert(record.identity.clone(), seq);
        self.records.push(StoredRecord { seq, record });
        self.updated_at = Some(Utc::now());
    }

    pub(crate) fn recent(&self, limit: usize) -> Vec<Record> {
        self.records
            .iter()
            .rev()
            .take(limit)
            .map(|r| r.record.clone())
            .collect()
    }

    pub(crate) fn oldest(&self, limit: usize) -> Vec<StoredRecord> {
        self.records.iter().take(limit).cloned().collect()
    }

    pub(crate) fn partition(&self, key: &str) -> Vec<Record> {
        self.records
            .iter()
            .filter(|r| r.record.partition_key.as_deref() == Some(key))
            .map(|r| r.record.clone())
            .collect()
    }

    pub(crate) fn delete_where(&mut self, predicate: impl Fn(&StoredRecord) -> bool) -> usize {
        let before = self.records.len();
        let by_identity = &mut self.by_identity;
        self.records.retain(|r| {
            if predicate(r) {
                by_identity.remove(&r.record.identity);
                false
            } else {
                true
            }
        });
        let removed = before - self.records.len();
        if removed > 0 {
            self.updated_at = Some(Utc::now());
        }
        removed
    }

    /// Drop the oldest rows until at most `capacity` remain.
    pub(crate) fn evict_to(&mut self, capacity: usize) -> usize {
        let excess = self.records.len().saturating_sub(capacity);
        if excess == 0 {
            return 0;
        }
        for gone in self.records.drain(..excess) {
            self.by_identity.remove(&gone.record.identity);
        }
        self.updated_at = Some(Utc::now());
        excess
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

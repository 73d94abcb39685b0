//! In-process storage backend.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::models::Record;
use crate::storage::table::RecordTable;
use crate::storage::{RecordFilter, RecordStore, StoredRecord};

/// Records kept in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    table: RwLock<RecordTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn load_recent(&self, limit: usize) -> Result<Vec<Record>> {
        Ok(self.table.read().await.recent(limit))
    }

    async fn load_oldest(&self, limit: usize) -> Result<Vec<StoredRecord>> {
        Ok(self.table.read().await.oldest(limit))
    }

    async fn load_by_partition(&self, key: &str) -> Result<Vec<Record>> {
        Ok(self.table.read().await.partition(key))
    }

    async fn upsert(&self, record: Record) -> Result<()> {
        self.table.write().await.upsert(record);
        Ok(())
    }

    async fn upsert_many(&self, records: Vec<Record>) -> Result<usize> {
        let count = records.len();
        let mut table = self.table.write().await;
        for record in records {
            table.upsert(record);
        }
        Ok(count)
    }

    async fn delete_many(&self, predicate: RecordFilter<'_>) -> Result<usize> {
        Ok(self.table.write().await.delete_where(predicate))
    }

    async fn evict_to(&self, capacity: usize) -> Result<usize> {
        Ok(self.table.write().await.evict_to(capacity))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.table.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::testing::{record, record_on};

    #[tokio::test]
    async fn test_recent_is_newest_first() {
        let store = MemoryStore::new();
        for id in ["1", "2", "3"] {
            store.upsert(record(id, "T", "P")).await.unwrap();
        }

        let recent = store.load_recent(2).await.unwrap();
        let ids: Vec<&str> = recent.iter().map(|r| r.identity.as_str()).collect();
        assert_eq!(ids, vec!["3", "2"]);
    }

    #[tokio::test]
    async fn test_load_by_partition() {
        let store = MemoryStore::new();
        store.upsert(record_on("1", "2026-02-01")).await.unwrap();
        store.upsert(record_on("2", "2026-02-02")).await.unwrap();
        store.upsert(record_on("3", "2026-02-01")).await.unwrap();

        let day: Vec<String> = store
            .load_by_partition("2026-02-01")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.identity)
            .collect();
        assert_eq!(day, vec!["1", "3"]);
    }

    #[tokio::test]
    async fn test_delete_many() {
        let store = MemoryStore::new();
        store
            .upsert_many(vec![record("1", "A", "1"), record("2", "B", "2")])
            .await
            .unwrap();

        let removed = store
            .delete_many(&|r: &StoredRecord| r.record.title == "A")
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_upserts_same_identity() {
        let store = Arc::new(MemoryStore::new());
        let a = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.upsert(record("7", "From A", "1")).await })
        };
        let b = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.upsert(record("7", "From B", "1")).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
    }
}

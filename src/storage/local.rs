//! Local filesystem storage implementation.
//!
//! Keeps the whole table in memory and rewrites `records.json` after every
//! mutation. Writes go to a temporary file first and are renamed into
//! place, so a crash never leaves a half-written table behind.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! └── records.json          # { next_seq, updated_at, records: [...] }
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::Record;
use crate::storage::table::RecordTable;
use crate::storage::{RecordFilter, RecordStore, StoredRecord};

const RECORDS_KEY: &str = "records.json";

/// Local filesystem storage backend.
pub struct LocalStore {
    root_dir: PathBuf,
    table: Mutex<RecordTable>,
}

impl LocalStore {
    /// Open the store rooted at the given directory, loading existing records.
    pub async fn open(root_dir: impl Into<PathBuf>) -> Result<Self> {
        let root_dir = root_dir.into();
        tokio::fs::create_dir_all(&root_dir).await?;

        let mut table: RecordTable = read_json(&root_dir.join(RECORDS_KEY))
            .await
            .map_err(|e| AppError::store(format!("cannot read {}: {}", RECORDS_KEY, e)))?
            .unwrap_or_default();
        table.reindex();

        log::debug!(
            "[Store] Opened {} with {} records",
            root_dir.display(),
            table.len()
        );

        Ok(Self {
            root_dir,
            table: Mutex::new(table),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// Time of the last mutation, if any.
    pub async fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.table.lock().await.updated_at()
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Apply `change` to a copy of the table and keep the copy only once it
    /// is on disk. `change` reports whether it touched anything; untouched
    /// tables skip the write.
    async fn mutate<T: Send>(
        &self,
        change: impl FnOnce(&mut RecordTable) -> (T, bool) + Send,
    ) -> Result<T> {
        let mut table = self.table.lock().await;
        let mut next = table.clone();
        let (out, changed) = change(&mut next);
        if changed {
            self.persist(&next).await?;
            *table = next;
        }
        Ok(out)
    }

    async fn persist(&self, table: &RecordTable) -> Result<()> {
        write_json(&self.path(RECORDS_KEY), table)
            .await
            .map_err(|e| AppError::store(format!("cannot write {}: {}", RECORDS_KEY, e)))
    }
}

/// Write bytes atomically (write to temp, then rename).
async fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    drop(file);

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// Write JSON data.
pub(crate) async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_bytes(path, &bytes).await
}

/// Read bytes, returning None if file doesn't exist.
async fn read_bytes(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::Io(e)),
    }
}

/// Read JSON data.
pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match read_bytes(path).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

#[async_trait]
impl RecordStore for LocalStore {
    async fn load_recent(&self, limit: usize) -> Result<Vec<Record>> {
        Ok(self.table.lock().await.recent(limit))
    }

    async fn load_oldest(&self, limit: usize) -> Result<Vec<StoredRecord>> {
        Ok(self.table.lock().await.oldest(limit))
    }

    async fn load_by_partition(&self, key: &str) -> Result<Vec<Record>> {
        Ok(self.table.lock().await.partition(key))
    }

    async fn upsert(&self, record: Record) -> Result<()> {
        self.mutate(|table| {
            table.upsert(record);
            ((), true)
        })
        .await
    }

    async fn upsert_many(&self, records: Vec<Record>) -> Result<usize> {
        let count = records.len();
        if count == 0 {
            return Ok(0);
        }
        self.mutate(|table| {
            for record in records {
                table.upsert(record);
            }
            ((), true)
        })
        .await?;
        log::debug!("[Store] Saved {} records", count);
        Ok(count)
    }

    async fn delete_many(&self, predicate: RecordFilter<'_>) -> Result<usize> {
        self.mutate(|table| {
            let removed = table.delete_where(predicate);
            (removed, removed > 0)
        })
        .await
    }

    async fn evict_to(&self, capacity: usize) -> Result<usize> {
        self.mutate(|table| {
            let evicted = table.evict_to(capacity);
            (evicted, evicted > 0)
        })
        .await
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.table.lock().await.len())
    }
}

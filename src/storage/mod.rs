//! Storage abstractions for listing persistence.
//!
//! Records are keyed by identity and carry an insertion sequence number.
//! Writing a record whose identity is already stored replaces it and moves
//! it to the newest position, so "oldest" always means "least recently
//! written".
//!
//! ## File layout ([`LocalStore`])
//!
//! ```text
//! {root}/
//! ├── config.toml           # Watcher configuration
//! └── records.json          # Stored records, oldest first
//! ```

pub mod local;
pub mod memory;
pub mod retention;
mod table;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::Record;

// Re-export for convenience
pub use local::LocalStore;
pub use memory::MemoryStore;
pub use retention::enforce_capacity;

/// A record together with its insertion sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredRecord {
    pub seq: u64,
    #[serde(flatten)]
    pub record: Record,
}

/// Predicate used by [`RecordStore::delete_many`].
pub type RecordFilter<'a> = &'a (dyn Fn(&StoredRecord) -> bool + Send + Sync);

/// Trait for record storage backends.
///
/// Implementations must tolerate concurrent use from independent sessions.
/// Colliding writes of the same identity resolve as last-write-wins.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Most recently written records, newest first.
    async fn load_recent(&self, limit: usize) -> Result<Vec<Record>>;

    /// Least recently written records, oldest first.
    async fn load_oldest(&self, limit: usize) -> Result<Vec<StoredRecord>>;

    /// Every record tagged with a partition key, oldest first.
    async fn load_by_partition(&self, key: &str) -> Result<Vec<Record>>;

    /// Insert, or replace the record with the same identity.
    async fn upsert(&self, record: Record) -> Result<()>;

    /// Upsert records in order. Returns how many were written.
    async fn upsert_many(&self, records: Vec<Record>) -> Result<usize> {
        let count = records.len();
        for record in records {
            self.upsert(record).await?;
        }
        Ok(count)
    }

    /// Delete every record matching the predicate. Returns how many went.
    async fn delete_many(&self, predicate: RecordFilter<'_>) -> Result<usize>;

    /// Delete the least recently written records until at most `capacity`
    /// remain, as one step. Returns how many went.
    async fn evict_to(&self, capacity: usize) -> Result<usize>;

    /// Number of stored records.
    async fn count(&self) -> Result<usize>;
}

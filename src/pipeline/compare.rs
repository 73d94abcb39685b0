// src/pipeline/compare.rs

//! Offline comparison of two record sets.
//!
//! Either two partitions of the store (typically two days) or two exported
//! JSON snapshots. Records are matched by identity only.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::Record;
use crate::storage::RecordStore;
use crate::storage::local::{read_json, write_json};

/// Difference between an older and a newer record set.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PartitionDiff {
    /// Records of the newer set whose identity the older set lacks
    pub added: Vec<Record>,
    /// Identities only the older set has
    pub removed: Vec<String>,
}

impl PartitionDiff {
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }

    pub fn change_count(&self) -> usize {
        self.added.len() + self.removed.len()
    }

    /// Write the added records as a JSON array, readable as a snapshot.
    pub async fn save_added(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json(path.as_ref(), &self.added).await
    }
}

/// Diff two record sets, keeping the order of `current`.
pub fn diff_records(previous: &[Record], current: &[Record]) -> PartitionDiff {
    let prev_ids: HashSet<&str> = previous.iter().map(|r| r.identity.as_str()).collect();
    let curr_ids: HashSet<&str> = current.iter().map(|r| r.identity.as_str()).collect();

    let mut emitted = HashSet::new();
    let added = current
        .iter()
        .filter(|r| !prev_ids.contains(r.identity.as_str()))
        .filter(|r| emitted.insert(r.identity.as_str()))
        .cloned()
        .collect();

    let mut dropped = HashSet::new();
    let removed = previous
        .iter()
        .map(|r| r.identity.as_str())
        .filter(|id| !curr_ids.contains(id) && dropped.insert(*id))
        .map(str::to_string)
        .collect();

    PartitionDiff { added, removed }
}

/// Compare partition `from` with the later partition `to`.
pub async fn compare_partitions(
    store: &dyn RecordStore,
    from: &str,
    to: &str,
) -> Result<PartitionDiff> {
    let (previous, current) =
        tokio::try_join!(store.load_by_partition(from), store.load_by_partition(to))?;

    log::info!(
        "[Compare] {} has {} records, {} has {}",
        from,
        previous.len(),
        to,
        current.len()
    );
    Ok(diff_records(&previous, &current))
}

/// Compare two JSON files, each holding an array of records.
pub async fn compare_snapshot_files(
    previous: impl AsRef<Path>,
    current: impl AsRef<Path>,
) -> Result<PartitionDiff> {
    let (previous, current) = tokio::try_join!(
        load_snapshot(previous.as_ref()),
        load_snapshot(current.as_ref())
    )?;
    Ok(diff_records(&previous, &current))
}

async fn load_snapshot(path: &Path) -> Result<Vec<Record>> {
    read_json(path)
        .await?
        .ok_or_else(|| AppError::validation(format!("snapshot not found: {}", path.display())))
}

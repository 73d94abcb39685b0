//! Capacity bound for stored records.

use crate::error::Result;
use crate::storage::RecordStore;

/// Evict the least recently written records until at most `capacity` remain.
///
/// Counting and deleting happen inside the store in one step, so sessions
/// sharing a store never evict past the capacity between them. Returns the
/// number of records removed.
pub async fn enforce_capacity(store: &dyn RecordStore, capacity: usize) -> Result<usize> {
    let evicted = store.evict_to(capacity).await?;
    if evicted > 0 {
        log::info!(
            "[Store] Evicted {} oldest records (capacity {})",
            evicted,
            capacity
        );
    }
    Ok(evicted)
}

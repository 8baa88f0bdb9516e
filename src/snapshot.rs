//! Snapshot store: candidate masternode lists captured at gap blocks.
//!
//! Unlike the legacy v1 snapshot (which tallies on-chain authorization votes), a v2
//! snapshot is a plain record of "these are the masternodes for the next epoch",
//! computed once at the gap block and cached/persisted under a stable key so later
//! lookups don't need to re-walk the chain.

use crate::errors::{EngineError, EngineResult};
use alloy_primitives::{Address, B256};
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Key-value store consumed for snapshot persistence. The engine writes only records
/// under its own key prefix ([`snapshot_key`]); it shares the store with the rest of
/// the node.
pub trait SnapshotPersistence: Send + Sync {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
    fn put(&self, key: &[u8], value: &[u8]);
}

/// Candidate masternode list for the epoch following the gap block at `number`/`hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub number: u64,
    pub hash: B256,
    /// JSON field name `masterNodes` is load-bearing for backward-compatible
    /// key-value store lookups against existing deployments; do not rename.
    #[serde(rename = "masterNodes")]
    pub next_epoch_candidates: Vec<Address>,
}

impl Snapshot {
    pub fn new(number: u64, hash: B256, next_epoch_candidates: Vec<Address>) -> Self {
        Self { number, hash, next_epoch_candidates }
    }
}

/// External storage key for a snapshot at `hash`. The `"XDPoS-V2-"` prefix is an
/// external wire/storage-format literal mandated for backward compatibility with
/// existing key-value records; it is not a stylistic choice and must not be renamed.
pub fn snapshot_key(hash: B256) -> Vec<u8> {
    let mut key = Vec::with_capacity(9 + 32);
    key.extend_from_slice(b"XDPoS-V2-");
    key.extend_from_slice(hash.as_slice());
    key
}

const SNAPSHOT_CACHE_CAPACITY: usize = 256;

/// In-memory ARC-style cache plus persistent backing store for snapshots.
pub struct SnapshotStore {
    cache: Mutex<LruCache<B256, Arc<Snapshot>>>,
    persistence: Arc<dyn SnapshotPersistence>,
}

impl SnapshotStore {
    pub fn new(persistence: Arc<dyn SnapshotPersistence>) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(SNAPSHOT_CACHE_CAPACITY).unwrap())),
            persistence,
        }
    }

    /// Persist `snapshot` and place it in the cache.
    pub fn store(&self, snapshot: Snapshot) -> EngineResult<()> {
        let key = snapshot_key(snapshot.hash);
        let value = serde_json::to_vec(&snapshot).map_err(|e| EngineError::Custom(e.to_string()))?;
        self.persistence.put(&key, &value);
        self.cache.lock().put(snapshot.hash, Arc::new(snapshot));
        Ok(())
    }

    /// Load a snapshot by the hash it was stored under, checking the cache first.
    pub fn load(&self, hash: B256) -> EngineResult<Arc<Snapshot>> {
        if let Some(snap) = self.cache.lock().get(&hash) {
            return Ok(snap.clone());
        }
        let key = snapshot_key(hash);
        let bytes = self.persistence.get(&key).ok_or(EngineError::SnapshotNotFound)?;
        let snapshot: Snapshot =
            serde_json::from_slice(&bytes).map_err(|e| EngineError::Custom(e.to_string()))?;
        let snapshot = Arc::new(snapshot);
        self.cache.lock().put(hash, snapshot.clone());
        Ok(snapshot)
    }

    /// §4.2 `getSnapshot(number, isGapNumber)`: resolve the snapshot anchored at
    /// `number`. If `is_gap_number` is false, `number` is first aligned down to its
    /// epoch's gap block via [`EngineConfig::gap_number_for`].
    pub fn get_snapshot(
        &self,
        chain: &dyn crate::chain::ChainReader,
        config: &crate::config::EngineConfig,
        number: u64,
        is_gap_number: bool,
    ) -> EngineResult<Arc<Snapshot>> {
        let gap_number = if is_gap_number { number } else { config.gap_number_for(number) };
        let header = chain
            .header_by_number(gap_number)
            .ok_or(EngineError::GetHeaderByNumberFailed(gap_number))?;
        self.load(header.hash_slow())
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct InMemoryPersistence {
        map: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
    }

    impl SnapshotPersistence for InMemoryPersistence {
        fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
            self.map.lock().get(key).cloned()
        }

        fn put(&self, key: &[u8], value: &[u8]) {
            self.map.lock().insert(key.to_vec(), value.to_vec());
        }
    }
}

//! Generic bounded aggregator for votes and timeouts, keyed by pool key
//! (`"<round>:<gapNumber>[:...]"`, see [`crate::types::Vote::pool_key`] and
//! [`crate::types::Timeout::pool_key`]).

use std::collections::HashMap;

/// Round-keyed aggregation pool. Each insertion reports the resulting bucket size and a
/// snapshot of its current contents so the caller can decide whether to attempt
/// threshold promotion without taking a second lock.
pub struct Pool<T: Clone> {
    buckets: HashMap<String, Vec<T>>,
}

impl<T: Clone> Pool<T> {
    pub fn new() -> Self {
        Self { buckets: HashMap::new() }
    }

    /// Insert `item` under `key`, returning `(bucket_size, bucket_snapshot)`.
    pub fn add(&mut self, key: String, item: T) -> (usize, Vec<T>) {
        let bucket = self.buckets.entry(key).or_default();
        bucket.push(item);
        (bucket.len(), bucket.clone())
    }

    pub fn get(&self, key: &str) -> Option<&[T]> {
        self.buckets.get(key).map(Vec::as_slice)
    }

    /// Remove everything under `key`, typically once it has produced a certificate.
    pub fn clear_by_key(&mut self, key: &str) {
        self.buckets.remove(key);
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.buckets.keys()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    /// Drop every key whose round (the leading `<round>:` segment) is more than
    /// `hygiene_window` rounds behind `current_round`. Keys that don't parse as
    /// `<round>:...` are left alone rather than dropped, since a malformed key
    /// indicates a bug elsewhere, not staleness.
    pub fn evict_stale(&mut self, current_round: u64, hygiene_window: u64) {
        let floor = current_round.saturating_sub(hygiene_window);
        self.buckets.retain(|key, _| {
            match key.split(':').next().and_then(|s| s.parse::<u64>().ok()) {
                Some(round) => round >= floor,
                None => true,
            }
        });
    }
}

impl<T: Clone> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

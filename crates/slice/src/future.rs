//! Bounded reorder buffer for headers whose parents have not arrived yet.

use std::num::NonZeroUsize;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy_primitives::B256;
use lru::LruCache;
use parking_lot::Mutex;

use trellis_types::{Header, Tier};

use crate::{MAX_FUTURE_HEADER_LEAD_SECS, MAX_FUTURE_HEADERS, SliceError};

/// LRU of headers waiting for their ancestry, replayed periodically in
/// ascending number order.
#[derive(Debug)]
pub(crate) struct FutureHeaderBuffer {
    tier: Tier,
    cache: Mutex<LruCache<B256, Header>>,
}

impl FutureHeaderBuffer {
    /// Empty buffer for a slice at `tier`.
    pub(crate) fn new(tier: Tier) -> Self {
        Self {
            tier,
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(MAX_FUTURE_HEADERS).unwrap())),
        }
    }

    /// Admits `header`, rejecting timestamps more than the allowed lead
    /// ahead of local time. Admission is idempotent on the header hash.
    pub(crate) fn add(&self, header: Header) -> Result<(), SliceError> {
        let max = unix_now() + MAX_FUTURE_HEADER_LEAD_SECS;
        if header.time() > max {
            return Err(SliceError::FutureBlock);
        }
        let mut cache = self.cache.lock();
        let hash = header.hash();
        if !cache.contains(&hash) {
            cache.put(hash, header);
        }
        Ok(())
    }

    /// Drops the header for `hash`, if buffered.
    pub(crate) fn remove(&self, hash: B256) {
        self.cache.lock().pop(&hash);
    }

    /// Snapshot of buffered headers in ascending local-number order.
    pub(crate) fn sorted_snapshot(&self) -> Vec<Header> {
        let cache = self.cache.lock();
        let mut headers: Vec<Header> = cache.iter().map(|(_, header)| header.clone()).collect();
        let tier = self.tier;
        headers.sort_by_key(|header| header.number(tier));
        headers
    }
}

#[cfg(test)]
impl FutureHeaderBuffer {
    pub(crate) fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub(crate) fn contains(&self, hash: B256) -> bool {
        self.cache.lock().contains(&hash)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

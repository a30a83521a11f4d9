//! Cache plus persisted map of per-block pending ETXs, and the rollup
//! aggregation walked from block manifests.

use std::num::NonZeroUsize;
use std::sync::Arc;

use alloy_primitives::B256;
use lru::LruCache;
use parking_lot::Mutex;

use trellis_storage::{KeyValueStore, schema};
use trellis_types::{
    Block, HIERARCHY_DEPTH, PendingEtxs, PerTierEtxs, Tier, transactions_root,
};

use crate::{MAX_PENDING_ETX_BLOCKS, SliceError};

/// Write-through store of per-block pending ETX lists.
pub(crate) struct PendingEtxStore {
    db: Arc<dyn KeyValueStore>,
    cache: Mutex<LruCache<B256, PerTierEtxs>>,
}

impl PendingEtxStore {
    /// Store over `db` with an empty cache.
    pub(crate) fn new(db: Arc<dyn KeyValueStore>) -> Self {
        Self {
            db,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(MAX_PENDING_ETX_BLOCKS).unwrap(),
            )),
        }
    }

    /// Stores `pending` exactly once per block hash; repeat adds are a
    /// no-op.
    pub(crate) fn add(&self, pending: PendingEtxs) -> Result<(), SliceError> {
        let mut cache = self.cache.lock();
        if cache.contains(&pending.hash) {
            return Ok(());
        }
        schema::write_pending_etxs(self.db.as_ref(), pending.hash, &pending.etxs)?;
        cache.put(pending.hash, pending.etxs);
        Ok(())
    }

    /// Pending ETXs for `hash`, cache first then storage.
    pub(crate) fn get(&self, hash: B256) -> Result<Option<PerTierEtxs>, SliceError> {
        if let Some(etxs) = self.cache.lock().get(&hash) {
            return Ok(Some(etxs.clone()));
        }
        Ok(schema::read_pending_etxs(self.db.as_ref(), hash)?)
    }

    /// Aggregates the per-tier ETX lists referenced by `block`'s
    /// sub-manifest and verifies the next-tier rollup against the hash the
    /// header advertises. Zone slices have no manifest to walk and return
    /// empty lists.
    pub(crate) fn collect_sub_rollups(
        &self,
        tier: Tier,
        block: &Block,
    ) -> Result<PerTierEtxs, SliceError> {
        let mut rollups = PerTierEtxs::default();
        let Some(sub_tier) = tier.sub() else {
            return Ok(rollups);
        };

        for hash in block.sub_manifest() {
            let Some(etxs) = self.get(*hash)? else {
                return Err(SliceError::MissingPendingEtxs(*hash));
            };
            for ctx in tier.index()..HIERARCHY_DEPTH {
                rollups[ctx].extend(etxs[ctx].iter().cloned());
            }
        }

        let computed = transactions_root(&rollups[sub_tier.index()]);
        let advertised = block.header().etx_rollup_hash(sub_tier);
        if computed != advertised {
            return Err(SliceError::RollupHashMismatch { computed, advertised });
        }
        Ok(rollups)
    }
}

//! The pending-header cache: terminus-keyed composited candidates plus the
//! head entry the miner currently builds against.
//!
//! Compositing is tier-local. [`combine`] only rewrites the fields at one
//! tier index, so a Region slice can reorg its local tier without
//! disturbing Prime-tier fields already contributed.

use std::collections::HashMap;

use alloy_primitives::B256;
use tracing::warn;

use trellis_types::{Header, Location, PendingHeader, Tier};

use crate::SliceError;

/// Map from terminus hash to composited pending header, plus the head hash
/// naming the mined-against entry.
#[derive(Debug)]
pub(crate) struct PendingHeaderCache {
    tier: Tier,
    entries: HashMap<B256, PendingHeader>,
    head_hash: B256,
}

impl PendingHeaderCache {
    /// Empty cache for a slice at `tier`.
    pub(crate) fn new(tier: Tier) -> Self {
        Self { tier, entries: HashMap::new(), head_hash: B256::ZERO }
    }

    /// Hash of the mined-against entry; zero when unset.
    pub(crate) fn head_hash(&self) -> B256 {
        self.head_hash
    }

    /// Points the head at `hash`.
    pub(crate) fn set_head_hash(&mut self, hash: B256) {
        self.head_hash = hash;
    }

    /// Entry at `hash`.
    pub(crate) fn get(&self, hash: B256) -> Option<&PendingHeader> {
        self.entries.get(&hash)
    }

    /// The mined-against entry.
    pub(crate) fn head(&self) -> Option<&PendingHeader> {
        self.entries.get(&self.head_hash)
    }

    /// Mutable mined-against entry.
    pub(crate) fn head_mut(&mut self) -> Option<&mut PendingHeader> {
        let head = self.head_hash;
        self.entries.get_mut(&head)
    }

    /// Inserts `entry` under its terminus key, returning the displaced
    /// entry.
    pub(crate) fn insert(&mut self, entry: PendingHeader) -> Option<PendingHeader> {
        self.entries.insert(entry.termini.terminus(), entry)
    }

    /// Number of cached entries.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Snapshot of every entry, for shutdown persistence.
    pub(crate) fn entries(&self) -> Vec<(B256, PendingHeader)> {
        self.entries.iter().map(|(k, v)| (*k, v.clone())).collect()
    }

    /// Replaces the cache contents, used on restart rehydration.
    pub(crate) fn restore(&mut self, entries: Vec<(B256, PendingHeader)>, head_hash: B256) {
        self.entries = entries.into_iter().collect();
        self.head_hash = head_hash;
    }

    /// Composites a freshly generated local candidate with the cached entry
    /// on the same terminus, falling back to the dominant pending header on
    /// a dom-driven append.
    pub(crate) fn compute_pending_header(
        &self,
        local: PendingHeader,
        dom: Option<&Header>,
        dom_origin: bool,
    ) -> PendingHeader {
        if let Some(cached) = self.entries.get(&local.termini.terminus()) {
            let combined = combine(&local.header, &cached.header, self.tier);
            return PendingHeader::new(combined, local.termini);
        }
        if dom_origin {
            if let Some(dom) = dom {
                let combined = combine(&local.header, dom, self.tier);
                return PendingHeader::new(combined, local.termini);
            }
        }
        local
    }

    /// Folds a dominant pending header into the cached entry at the
    /// referenced sub-terminus, for each tier in `tiers`, restamping the
    /// entry with the local location.
    pub(crate) fn update_from_dom(
        &mut self,
        pending_header: &PendingHeader,
        terminus_slot: usize,
        tiers: &[Tier],
        reorg: bool,
        local_location: Location,
    ) -> Result<(), SliceError> {
        let key = pending_header.termini.sub_terminus(terminus_slot);
        let Some(entry) = self.entries.get_mut(&key) else {
            warn!(target: "slice::ph_cache", terminus = %key, "no pending header found for dom update");
            return Err(SliceError::MissingCacheEntry(key));
        };
        for tier in tiers {
            let combined = combine(&pending_header.header, &entry.header, *tier);
            entry.header = combined;
        }
        entry.header.set_location(local_location);
        if reorg {
            self.head_hash = key;
        }
        Ok(())
    }

    /// Drops entries more than `retention` blocks behind `current_number`.
    pub(crate) fn gc(&mut self, current_number: u64, retention: u64) {
        let tier = self.tier;
        self.entries
            .retain(|_, entry| entry.header.number(tier) + retention >= current_number);
    }
}

/// Copies `target` and overwrites, at `tier` only, the fields contributed
/// by `source`. The untiered `extra` field follows `source` unconditionally.
pub(crate) fn combine(source: &Header, target: &Header, tier: Tier) -> Header {
    let mut combined = target.clone();

    combined.set_parent_hash(tier, source.parent_hash(tier));
    combined.set_uncle_hash(tier, source.uncle_hash(tier));
    combined.set_number(tier, source.number(tier));
    combined.set_extra(source.extra().clone());
    combined.set_base_fee(tier, source.base_fee(tier));
    combined.set_gas_limit(tier, source.gas_limit(tier));
    combined.set_gas_used(tier, source.gas_used(tier));
    combined.set_tx_hash(tier, source.tx_hash(tier));
    combined.set_etx_hash(tier, source.etx_hash(tier));
    combined.set_etx_rollup_hash(tier, source.etx_rollup_hash(tier));
    combined.set_manifest_hash(tier, source.manifest_hash(tier));
    combined.set_receipt_hash(tier, source.receipt_hash(tier));
    combined.set_state_root(tier, source.state_root(tier));
    combined.set_difficulty(tier, source.difficulty(tier));
    combined.set_coinbase(tier, source.coinbase(tier));
    combined.set_bloom(tier, source.bloom(tier));

    combined
}

//! The slice coordinator.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use alloy_primitives::{B256, U256};
use tokio::sync::RwLock;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use trellis_storage::{KeyValueStore, WriteBatch, schema};
use trellis_types::{
    Block, BlockManifest, Body, HIERARCHY_DEPTH, Header, Location, PendingEtxs, PendingHeader,
    PerTierEtxs, Termini, Tier,
};

use crate::{
    FUTURE_HEADER_REPLAY_PERIOD, Genesis, PENDING_HEADER_CACHE_LIMIT, PENDING_HEADER_GC_PERIOD,
    SliceConfig, SliceError,
    client::{DomClient, SliceClient, SubClientMap},
    future::FutureHeaderBuffer,
    pending_etx::PendingEtxStore,
    ph_cache::PendingHeaderCache,
    relay::{RelayHandle, spawn_relay_worker},
    traits::{ChainError, ConsensusEngine, HeaderChain, MinerWorker, TxPool},
};

/// The slice coordinator for one tier of the hierarchy.
///
/// A slice holds up to three references outward: a dominant client (absent
/// at Prime), subordinate clients (absent at Zone), and the local header
/// chain. Incoming headers are threaded through the hierarchical append
/// protocol; the pending-header cache shared with the mining feed is the
/// only state guarded by the coordinator itself, chain storage being the
/// authoritative ground truth.
pub struct Slice<C: SliceClient> {
    config: SliceConfig,
    db: Arc<dyn KeyValueStore>,
    hc: Arc<dyn HeaderChain>,
    engine: Arc<dyn ConsensusEngine>,
    miner: Arc<dyn MinerWorker>,
    tx_pool: Arc<dyn TxPool>,

    dom: DomClient<C>,
    subs: SubClientMap<C>,
    relays: [Option<RelayHandle>; HIERARCHY_DEPTH],

    future_headers: FutureHeaderBuffer,
    pending_etxs: PendingEtxStore,
    ph_cache: RwLock<PendingHeaderCache>,

    cancel: CancellationToken,
}

impl<C: SliceClient> fmt::Debug for Slice<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slice")
            .field("tier", &self.config.tier)
            .field("location", &self.config.location)
            .finish_non_exhaustive()
    }
}

impl<C: SliceClient> Slice<C> {
    /// Builds a slice, runs first-boot or restart initialization, and
    /// spawns the periodic future-header replay and cache GC tasks.
    #[allow(clippy::too_many_arguments)]
    pub async fn new(
        config: SliceConfig,
        db: Arc<dyn KeyValueStore>,
        hc: Arc<dyn HeaderChain>,
        engine: Arc<dyn ConsensusEngine>,
        miner: Arc<dyn MinerWorker>,
        tx_pool: Arc<dyn TxPool>,
        dom: DomClient<C>,
        subs: SubClientMap<C>,
        genesis: Genesis,
    ) -> Result<Arc<Self>, SliceError> {
        let cancel = CancellationToken::new();

        let mut relays: [Option<RelayHandle>; HIERARCHY_DEPTH] = [None, None, None];
        for (slot, client) in subs.iter() {
            relays[slot] = Some(spawn_relay_worker(slot, client.clone(), cancel.clone()));
        }

        let slice = Arc::new(Self {
            ph_cache: RwLock::new(PendingHeaderCache::new(config.tier)),
            future_headers: FutureHeaderBuffer::new(config.tier),
            pending_etxs: PendingEtxStore::new(db.clone()),
            config,
            db,
            hc,
            engine,
            miner,
            tx_pool,
            dom,
            subs,
            relays,
            cancel,
        });

        slice.init(genesis).await?;

        slice.clone().spawn_future_header_task();
        slice.clone().spawn_gc_task();

        Ok(slice)
    }

    /// Slice configuration.
    pub fn config(&self) -> &SliceConfig {
        &self.config
    }

    /// The local header chain.
    pub fn header_chain(&self) -> &Arc<dyn HeaderChain> {
        &self.hc
    }

    /// The consensus engine.
    pub fn engine(&self) -> &Arc<dyn ConsensusEngine> {
        &self.engine
    }

    /// The miner worker.
    pub fn miner(&self) -> &Arc<dyn MinerWorker> {
        &self.miner
    }

    /// The transaction pool.
    pub fn tx_pool(&self) -> &Arc<dyn TxPool> {
        &self.tx_pool
    }

    /// Takes a proposed header, reconstructs the local block, and attempts
    /// to hierarchically append it to the block graph.
    ///
    /// When the call originates from the dominant tier (`dom_origin`),
    /// `dom_terminus` carries the dominant view of the coincident ancestry
    /// and `td` and `reorg` are authoritative. Self-originated calls pass a
    /// zero terminus and recompute both locally.
    pub async fn append(
        self: &Arc<Self>,
        header: Header,
        dom_pending_header: Option<Header>,
        dom_terminus: B256,
        td: U256,
        dom_origin: bool,
        reorg: bool,
    ) -> Result<PerTierEtxs, SliceError> {
        let tier = self.config.tier;
        let location = header.location();
        let hash = header.hash();
        let is_coincident = self.engine.is_dom_coincident(&header);

        // A block already in the database is a silent success.
        if self.hc.has_header(hash, header.number(tier)) {
            self.future_headers.remove(hash);
            warn!(target: "slice", %hash, "block has already been appended");
            return Ok(PerTierEtxs::default());
        }

        let block = self.construct_local_block(&header)?;

        info!(
            target: "slice",
            %hash,
            number = ?header.number_array(),
            %location,
            parent = %header.parent_hash(tier),
            "starting slice append"
        );

        let mut batch = WriteBatch::new();

        let (parent_sub_terminus, new_termini) = self.pcrc(&mut batch, &header, dom_terminus)?;

        self.hc.append(&mut batch, &block).map_err(SliceError::AppendFailed)?;

        let (td, reorg) = if dom_origin {
            (td, reorg)
        } else {
            let td = self.calc_td(&header)?;
            (td, self.hlcr(td))
        };

        // The compute and the write of the cache are split from here on;
        // the lock is held through the subordinate round-trip so the cache
        // write observes the child's result.
        let mut cache = self.ph_cache.write().await;

        let local_pending_header = self.miner.generate_pending_header(&block)?;

        let pending_header = cache.compute_pending_header(
            PendingHeader::new(local_pending_header, new_termini),
            dom_pending_header.as_ref(),
            dom_origin,
        );

        let mut new_pending_etxs = if tier == Tier::Zone {
            PerTierEtxs::default()
        } else {
            let sub = self.subs.get(location.sub_index(tier))?;
            sub.append(
                header.clone(),
                pending_header.header.clone(),
                parent_sub_terminus,
                td,
                true,
                reorg,
            )
            .await?
        };

        // A coincident block forwards the full rollup since the previous
        // coincidence; everything else forwards only its own emissions.
        if is_coincident {
            new_pending_etxs[tier.index()] = self.hc.collect_etx_rollup(&block)?;
        } else {
            new_pending_etxs[tier.index()] = block.ext_transactions().to_vec();
        }

        schema::write_td(&mut batch, hash, header.number(tier), td);
        batch.write(self.db.as_ref()).map_err(SliceError::CommitFailed)?;

        self.set_header_chain_head(&block, reorg)?;

        let previous = cache.insert(pending_header.clone());
        let update_miner =
            self.pick_ph_cache_head(&mut cache, reorg, &pending_header, previous.as_ref());

        self.relay_ph(&mut cache, &pending_header, update_miner, reorg, dom_origin, location);

        drop(cache);

        self.future_headers.remove(hash);
        if dom_origin {
            let slice = self.clone();
            tokio::spawn(async move { slice.proc_future_headers().await });
        }

        info!(
            target: "slice",
            %hash,
            number = header.number(tier),
            txs = block.transactions().len(),
            etxs = block.ext_transactions().len(),
            "appended new block"
        );

        Ok(new_pending_etxs)
    }

    /// Previous-coincident reference check: validates the coincident
    /// ancestry against the dominant view and produces the new termini and
    /// the terminus handed to the subordinate recursion.
    fn pcrc(
        &self,
        batch: &mut WriteBatch,
        header: &Header,
        mut dom_terminus: B256,
    ) -> Result<(B256, Termini), SliceError> {
        let tier = self.config.tier;
        let location = header.location();
        let is_coincident = self.engine.is_dom_coincident(header);

        debug!(
            target: "slice",
            parent = %header.parent_hash(tier),
            number = header.number(tier),
            %location,
            "running pcrc"
        );

        let raw = self.hc.get_termini_by_hash(header.parent_hash(tier)).unwrap_or_default();
        let termini =
            Termini::try_from(raw).map_err(|len| SliceError::TerminiShape { len })?;
        let mut new_termini = termini;

        // Genesis escape for the dom terminus.
        if header.parent_hash(Tier::Prime) == self.config.genesis_hash {
            dom_terminus = self.config.genesis_hash;
        }

        if tier != Tier::Zone {
            new_termini.set_sub_terminus(location.sub_index(tier), header.hash());
        }

        if tier == Tier::Prime || is_coincident {
            new_termini.set_terminus(header.hash());
        }

        // Every coincident ancestor seen locally must agree with the
        // dominant chain of coincident ancestors; a disagreement would
        // merge the graph into a non-tree shape.
        if is_coincident && termini.terminus() != dom_terminus {
            warn!(
                target: "slice",
                number = ?header.number_array(),
                hash = %header.hash(),
                dom = %dom_terminus,
                local = %termini.terminus(),
                "cyclic block rejected"
            );
            return Err(SliceError::CyclicReference {
                dom: dom_terminus,
                local: termini.terminus(),
            });
        }

        schema::write_termini(batch, header.hash(), new_termini.as_slice());

        let parent_sub_terminus = if tier == Tier::Zone {
            B256::ZERO
        } else {
            termini.sub_terminus(location.sub_index(tier))
        };
        Ok((parent_sub_terminus, new_termini))
    }

    /// Hierarchical longest-chain rule: strictly greater total difficulty
    /// wins. A tie is not a reorg.
    fn hlcr(&self, extern_td: U256) -> bool {
        let current_td =
            self.hc.get_td_by_hash(self.hc.current_header().hash()).unwrap_or_default();
        debug!(target: "slice", %current_td, %extern_td, "hlcr");
        extern_td > current_td
    }

    /// Total difficulty of `header`, from the parent's stored difficulty.
    fn calc_td(&self, header: &Header) -> Result<U256, SliceError> {
        if self.engine.is_dom_coincident(header) {
            // A subordinate cannot price a dominant block on its own; the
            // dominant tier must drive this append.
            return Err(SliceError::SubNotSynced);
        }
        let tier = self.config.tier;
        let prior = self
            .hc
            .get_td(header.parent_hash(tier), header.number(tier).saturating_sub(1))
            .ok_or(SliceError::FutureBlock)?;
        Ok(prior + header.difficulty(tier))
    }

    /// Advances the chain head on a reorg and publishes the matching event.
    fn set_header_chain_head(&self, block: &Block, reorg: bool) -> Result<(), SliceError> {
        if reorg {
            self.hc.set_current_header(block.header())?;
            self.hc.publish_chain_head(block);
        } else {
            self.hc.publish_chain_side(block);
        }
        Ok(())
    }

    /// Decides whether the freshly written cache entry becomes the
    /// mined-against head; the sole route to head mutation during append.
    fn pick_ph_cache_head(
        &self,
        cache: &mut PendingHeaderCache,
        reorg: bool,
        entry: &PendingHeader,
        previous: Option<&PendingHeader>,
    ) -> bool {
        if reorg {
            cache.set_head_hash(entry.termini.terminus());
            return true;
        }

        let tier = self.config.tier;
        if let Some(previous) = previous {
            if entry.header.number(tier) > previous.header.number(tier) {
                self.promote_on_parent_td(cache, entry);
                return true;
            }
        }
        false
    }

    /// Moves the head when the candidate's parent total difficulty strictly
    /// exceeds the current head's parent total difficulty.
    fn promote_on_parent_td(&self, cache: &mut PendingHeaderCache, entry: &PendingHeader) {
        let tier = self.config.tier;
        let extern_td = self.hc.get_td_by_hash(entry.header.parent_hash(tier));
        let current_td = cache
            .head()
            .and_then(|head| self.hc.get_td_by_hash(head.header.parent_hash(tier)));
        if let (Some(extern_td), Some(current_td)) = (extern_td, current_td) {
            if extern_td > current_td {
                cache.set_head_hash(entry.termini.terminus());
            }
        }
    }

    /// Relays the composited entry at the end of append: Zone publishes to
    /// the miner feed, dominant tiers fan out to subordinates unless this
    /// append was itself dom-driven (the dominant tier that drove us will
    /// drive our siblings itself).
    fn relay_ph(
        &self,
        cache: &mut PendingHeaderCache,
        entry: &PendingHeader,
        update_miner: bool,
        reorg: bool,
        dom_origin: bool,
        location: Location,
    ) {
        if self.config.tier == Tier::Zone {
            if update_miner {
                let local = self.config.location;
                if let Some(head) = cache.head_mut() {
                    head.header.set_location(local);
                    self.miner.publish_pending_header(head.header.clone());
                }
            }
            return;
        }
        if !dom_origin {
            for relay in self.relays.iter().flatten() {
                relay.enqueue(entry.clone(), reorg, location);
            }
        }
    }

    /// Handles a pending header relayed from the dominant tier: composites
    /// it into the cache and propagates downward, or to the miner feed at
    /// Zone.
    pub async fn sub_relay_pending_header(
        &self,
        pending_header: PendingHeader,
        reorg: bool,
        location: Location,
    ) {
        let mut cache = self.ph_cache.write().await;
        match self.config.tier {
            Tier::Region => {
                let slot = self.config.location.region as usize;
                // The synchronous append path already composited the region
                // the dominant call drove.
                if location.region != self.config.location.region
                    && cache
                        .update_from_dom(
                            &pending_header,
                            slot,
                            &[Tier::Prime],
                            reorg,
                            self.config.location,
                        )
                        .is_err()
                {
                    return;
                }

                let key = pending_header.termini.sub_terminus(slot);
                let Some(entry) = cache.get(key).cloned() else {
                    warn!(target: "slice", terminus = %key, "no cached entry to fan out");
                    return;
                };
                for relay in self.relays.iter().flatten() {
                    relay.enqueue(entry.clone(), reorg, location);
                }
            }
            Tier::Zone => {
                // The synchronous path already fed the miner for the zone
                // the pending header was built on.
                if location != self.config.location {
                    let slot = self.config.location.zone as usize;
                    if cache
                        .update_from_dom(
                            &pending_header,
                            slot,
                            &[Tier::Prime, Tier::Region],
                            reorg,
                            self.config.location,
                        )
                        .is_err()
                    {
                        return;
                    }
                    if let Some(best) = cache.head() {
                        self.miner.publish_pending_header(best.header.clone());
                    }
                }
            }
            Tier::Prime => {}
        }
    }

    /// Current pending header for the miner.
    pub async fn get_pending_header(&self) -> Result<Header, SliceError> {
        let cache = self.ph_cache.read().await;
        cache
            .head()
            .map(|entry| entry.header.clone())
            .ok_or(SliceError::EmptyPendingHeader)
    }

    /// Manifest of ancestor hashes since the last coincident block.
    pub fn get_manifest(&self, block_hash: B256) -> Result<BlockManifest, SliceError> {
        let header = self
            .hc
            .get_header_by_hash(block_hash)
            .ok_or(ChainError::UnknownHeader(block_hash))?;
        Ok(self.hc.collect_block_manifest(&header)?)
    }

    /// Manifest fetched from the subordinate that produced `block_hash`.
    pub async fn get_sub_manifest(
        &self,
        location: Location,
        block_hash: B256,
    ) -> Result<BlockManifest, SliceError> {
        let sub = self.subs.get(location.sub_index(self.config.tier))?;
        Ok(sub.get_manifest(block_hash).await?)
    }

    /// Stores pending ETXs exactly once per block hash.
    pub fn add_pending_etxs(&self, pending: PendingEtxs) -> Result<(), SliceError> {
        info!(target: "slice", block = %pending.hash, "received pending etxs");
        self.pending_etxs.add(pending)
    }

    /// Aggregates the per-tier rollups referenced by `block`'s sub-manifest
    /// and verifies the next-tier rollup hash.
    pub fn collect_sub_rollups(&self, block: &Block) -> Result<PerTierEtxs, SliceError> {
        self.pending_etxs.collect_sub_rollups(self.config.tier, block)
    }

    /// Ships pending ETXs to the dominant peer for later coincident
    /// reference.
    pub async fn send_pending_etxs_to_dom(
        &self,
        pending: PendingEtxs,
    ) -> Result<(), SliceError> {
        let dom = self.dom.get()?;
        Ok(dom.send_pending_etxs_to_dom(pending).await?)
    }

    /// Admits `header` into the future-header buffer.
    pub fn add_future_header(&self, header: Header) -> Result<(), SliceError> {
        self.future_headers.add(header)
    }

    /// Reconstructs the block for `header`: an empty body when the header
    /// commits to none, otherwise the stored pending body keyed by the
    /// header's state root.
    pub fn construct_local_block(&self, header: &Header) -> Result<Block, SliceError> {
        let tier = self.config.tier;
        if header.is_empty_body(tier) {
            return Ok(Block::new_with_header(header.clone()));
        }
        let body = self
            .pending_block_body(header.state_root(tier))?
            .ok_or(SliceError::MissingBody)?;
        Ok(Block::new_with_header(header.clone()).with_body(body))
    }

    /// Stored pending body keyed by state root.
    pub fn pending_block_body(&self, root: B256) -> Result<Option<Body>, SliceError> {
        Ok(schema::read_pending_body(self.db.as_ref(), root)?)
    }

    /// Replays buffered future headers in ascending number order. Failures
    /// other than the sub-not-synced sentinel evict the header.
    pub async fn proc_future_headers(self: &Arc<Self>) {
        for header in self.future_headers.sorted_snapshot() {
            let hash = header.hash();
            let attempt: Pin<Box<dyn Future<Output = Result<PerTierEtxs, SliceError>> + Send + '_>> =
                Box::pin(self.append(header, None, B256::ZERO, U256::ZERO, false, false));
            if let Err(err) = attempt.await {
                if !err.is_sub_not_synced() {
                    self.future_headers.remove(hash);
                    debug!(target: "slice", %hash, %err, "evicted future header");
                }
            }
        }
    }

    /// Sweeps cache entries older than the retention window.
    pub async fn gc_pending_headers(&self) {
        let current = self.hc.current_header().number(self.config.tier);
        let mut cache = self.ph_cache.write().await;
        cache.gc(current, PENDING_HEADER_CACHE_LIMIT);
    }

    fn spawn_future_header_task(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut ticker = interval(FUTURE_HEADER_REPLAY_PERIOD);
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = ticker.tick() => self.proc_future_headers().await,
                }
            }
        });
    }

    fn spawn_gc_task(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut ticker = interval(PENDING_HEADER_GC_PERIOD);
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = ticker.tick() => self.gc_pending_headers().await,
                }
            }
        });
    }

    /// First-boot initialization from genesis plus the knot, or state
    /// rehydration on restart.
    async fn init(self: &Arc<Self>, genesis: Genesis) -> Result<(), SliceError> {
        let genesis_hash = self.config.genesis_hash;
        let tier = self.config.tier;

        if self.hc.get_header(genesis_hash, 0).is_none() {
            return Err(ChainError::UnknownHeader(genesis_hash).into());
        }

        // The genesis block carries no ETXs, but the record must exist so
        // the first coincident rollup walk terminates.
        self.add_pending_etxs(PendingEtxs::new(genesis_hash, PerTierEtxs::default()))?;

        if self.hc.is_empty() {
            let mut batch = WriteBatch::new();
            schema::write_termini(
                &mut batch,
                genesis_hash,
                Termini::genesis(genesis_hash).as_slice(),
            );
            batch.write(self.db.as_ref())?;
            self.ph_cache.write().await.set_head_hash(genesis_hash);

            for block in genesis.knot {
                let location = block.location();
                match tier {
                    Tier::Prime => {
                        schema::write_pending_body(
                            self.db.as_ref(),
                            block.state_root(tier),
                            block.body(),
                        )?;
                        let difficulty = block.difficulty(tier);
                        let header = block.header().clone();
                        if let Err(err) =
                            self.append(header, None, genesis_hash, difficulty, false, false).await
                        {
                            warn!(
                                target: "slice",
                                hash = %block.hash(),
                                %location,
                                %err,
                                "failed to append knot block"
                            );
                        }
                    }
                    Tier::Region if location.region == self.config.location.region => {
                        schema::write_pending_body(
                            self.db.as_ref(),
                            block.state_root(tier),
                            block.body(),
                        )?;
                    }
                    Tier::Zone if location == self.config.location => {
                        schema::write_pending_body(
                            self.db.as_ref(),
                            block.state_root(tier),
                            block.body(),
                        )?;
                    }
                    _ => {}
                }
            }
        } else {
            self.load_last_state().await?;
        }
        Ok(())
    }

    /// Rehydrates the pending-header cache and head hash from storage.
    async fn load_last_state(&self) -> Result<(), SliceError> {
        let entries = schema::read_ph_cache(self.db.as_ref())?;
        let head_hash =
            schema::read_current_pending_header_hash(self.db.as_ref())?.unwrap_or_default();
        self.ph_cache.write().await.restore(entries, head_hash);
        Ok(())
    }

    /// Persists the pending-header cache and head hash, stops the periodic
    /// tasks, and shuts down the collaborators.
    pub async fn stop(&self) -> Result<(), SliceError> {
        {
            let cache = self.ph_cache.read().await;
            schema::write_current_pending_header_hash(self.db.as_ref(), cache.head_hash())?;
            schema::write_ph_cache(self.db.as_ref(), cache.entries())?;
        }

        self.cancel.cancel();

        self.hc.stop();
        self.tx_pool.stop();
        self.miner.stop();
        Ok(())
    }
}

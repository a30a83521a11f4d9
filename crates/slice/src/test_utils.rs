//! In-process collaborator doubles shared by the coordinator tests.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{B256, U256};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use url::Url;

use trellis_storage::{KeyValueStore, WriteBatch, schema};
use trellis_types::{
    Block, BlockManifest, Header, Location, PendingEtxs, PendingHeader, PerTierEtxs, Tier,
    Transaction,
};

use crate::client::{ClientError, SliceClient};
use crate::traits::{ChainError, ConsensusEngine, HeaderChain, MinerError, MinerWorker, TxPool};

/// Polls `cond` until it holds or a short deadline passes.
pub(crate) async fn wait_until(cond: impl Fn() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

/// Scripted coincidence engine: a header is dominant-coincident iff its
/// hash was marked.
#[derive(Debug, Default)]
pub(crate) struct ScriptedEngine {
    coincident: RwLock<HashSet<B256>>,
}

impl ScriptedEngine {
    pub(crate) fn mark(&self, hash: B256) {
        self.coincident.write().insert(hash);
    }
}

impl ConsensusEngine for ScriptedEngine {
    fn is_dom_coincident(&self, header: &Header) -> bool {
        self.coincident.read().contains(&header.hash())
    }
}

const TEST_HEADER_PREFIX: &[u8] = b"th";
const TEST_BLOCK_PREFIX: &[u8] = b"tb";
const TEST_CURRENT_KEY: &[u8] = b"tcur";

fn header_key(hash: B256) -> Vec<u8> {
    [TEST_HEADER_PREFIX, hash.as_slice()].concat()
}

fn block_key(hash: B256) -> Vec<u8> {
    [TEST_BLOCK_PREFIX, hash.as_slice()].concat()
}

struct ChainState {
    headers: HashMap<B256, Header>,
    blocks: HashMap<B256, Block>,
    current: Header,
}

/// Header-chain double persisting through the shared key-value store, so
/// restart scenarios observe real durability.
pub(crate) struct MemoryHeaderChain {
    db: Arc<dyn KeyValueStore>,
    engine: Arc<ScriptedEngine>,
    tier: Tier,
    genesis: Header,
    state: RwLock<ChainState>,
    pub(crate) head_events: Mutex<Vec<B256>>,
    pub(crate) side_events: Mutex<Vec<B256>>,
}

impl MemoryHeaderChain {
    /// Seeds the chain with `genesis` at total difficulty zero and restores
    /// the persisted head, when one exists.
    pub(crate) fn new(
        db: Arc<dyn KeyValueStore>,
        engine: Arc<ScriptedEngine>,
        tier: Tier,
        genesis: Header,
    ) -> Arc<Self> {
        let genesis_hash = genesis.hash();
        let mut headers = HashMap::new();
        headers.insert(genesis_hash, genesis.clone());

        let mut batch = WriteBatch::new();
        schema::write_td(&mut batch, genesis_hash, 0, U256::ZERO);
        batch.put(header_key(genesis_hash), alloy_rlp::encode(&genesis));
        batch.write(db.as_ref()).unwrap();

        let current = db
            .get(TEST_CURRENT_KEY)
            .unwrap()
            .map(|raw| alloy_rlp::decode_exact::<Header>(raw.as_slice()).unwrap())
            .unwrap_or_else(|| genesis.clone());

        Arc::new(Self {
            db,
            engine,
            tier,
            genesis,
            state: RwLock::new(ChainState { headers, blocks: HashMap::new(), current }),
            head_events: Mutex::new(Vec::new()),
            side_events: Mutex::new(Vec::new()),
        })
    }

    fn header_from_db(&self, hash: B256) -> Option<Header> {
        let raw = self.db.get(&header_key(hash)).ok()??;
        alloy_rlp::decode_exact::<Header>(raw.as_slice()).ok()
    }

    fn block_from_db(&self, hash: B256) -> Option<Block> {
        let raw = self.db.get(&block_key(hash)).ok()??;
        alloy_rlp::decode_exact::<Block>(raw.as_slice()).ok()
    }

    fn get_block(&self, hash: B256) -> Option<Block> {
        if let Some(block) = self.state.read().blocks.get(&hash) {
            return Some(block.clone());
        }
        self.block_from_db(hash)
    }
}

impl HeaderChain for MemoryHeaderChain {
    fn has_header(&self, hash: B256, number: u64) -> bool {
        self.get_header(hash, number).is_some()
    }

    fn get_header(&self, hash: B256, number: u64) -> Option<Header> {
        self.get_header_by_hash(hash).filter(|header| header.number(self.tier) == number)
    }

    fn get_header_by_hash(&self, hash: B256) -> Option<Header> {
        if let Some(header) = self.state.read().headers.get(&hash) {
            return Some(header.clone());
        }
        self.header_from_db(hash)
    }

    fn get_termini_by_hash(&self, hash: B256) -> Option<Vec<B256>> {
        schema::read_termini(self.db.as_ref(), hash).ok().flatten()
    }

    fn get_td(&self, hash: B256, number: u64) -> Option<U256> {
        schema::read_td(self.db.as_ref(), hash, number).ok().flatten()
    }

    fn get_td_by_hash(&self, hash: B256) -> Option<U256> {
        let header = self.get_header_by_hash(hash)?;
        self.get_td(hash, header.number(self.tier))
    }

    fn append(&self, batch: &mut WriteBatch, block: &Block) -> Result<(), ChainError> {
        let parent = block.header().parent_hash(self.tier);
        if self.get_header_by_hash(parent).is_none() {
            return Err(ChainError::UnknownAncestor(parent));
        }
        let hash = block.hash();
        batch.put(header_key(hash), alloy_rlp::encode(block.header()));
        batch.put(block_key(hash), alloy_rlp::encode(block));

        let mut state = self.state.write();
        state.headers.insert(hash, block.header().clone());
        state.blocks.insert(hash, block.clone());
        Ok(())
    }

    fn set_current_header(&self, header: &Header) -> Result<(), ChainError> {
        self.db
            .put(TEST_CURRENT_KEY, &alloy_rlp::encode(header))
            .map_err(ChainError::Storage)?;
        self.state.write().current = header.clone();
        Ok(())
    }

    fn current_header(&self) -> Header {
        self.state.read().current.clone()
    }

    fn is_empty(&self) -> bool {
        self.db.get(TEST_CURRENT_KEY).unwrap().is_none()
    }

    fn collect_etx_rollup(&self, block: &Block) -> Result<Vec<Transaction>, ChainError> {
        // Walk back to the previous coincident ancestor, oldest first.
        let mut segment = vec![block.clone()];
        let mut parent_hash = block.header().parent_hash(self.tier);
        while parent_hash != self.genesis.hash() {
            let Some(parent) = self.get_block(parent_hash) else { break };
            if self.engine.is_dom_coincident(parent.header()) {
                break;
            }
            parent_hash = parent.header().parent_hash(self.tier);
            segment.push(parent);
        }
        segment.reverse();
        Ok(segment.iter().flat_map(|b| b.ext_transactions().to_vec()).collect())
    }

    fn collect_block_manifest(&self, header: &Header) -> Result<BlockManifest, ChainError> {
        let mut manifest = vec![header.hash()];
        let mut parent_hash = header.parent_hash(self.tier);
        while parent_hash != self.genesis.hash() {
            let Some(parent) = self.get_header_by_hash(parent_hash) else { break };
            if self.engine.is_dom_coincident(&parent) {
                break;
            }
            manifest.push(parent_hash);
            parent_hash = parent.parent_hash(self.tier);
        }
        manifest.reverse();
        Ok(manifest)
    }

    fn publish_chain_head(&self, block: &Block) {
        self.head_events.lock().push(block.hash());
    }

    fn publish_chain_side(&self, block: &Block) {
        self.side_events.lock().push(block.hash());
    }

    fn stop(&self) {}
}

/// Miner double: derives the next candidate from the appended block and
/// records everything published on the pending-header feed.
#[derive(Debug)]
pub(crate) struct RecordingMiner {
    tier: Tier,
    pub(crate) published: Mutex<Vec<Header>>,
}

impl RecordingMiner {
    pub(crate) fn new(tier: Tier) -> Arc<Self> {
        Arc::new(Self { tier, published: Mutex::new(Vec::new()) })
    }
}

impl MinerWorker for RecordingMiner {
    fn generate_pending_header(&self, block: &Block) -> Result<Header, MinerError> {
        let tier = self.tier;
        let mut header = block.header().clone();
        header.set_parent_hash(tier, block.hash());
        header.set_number(tier, block.number(tier) + 1);
        header.set_tx_hash(tier, trellis_types::EMPTY_LIST_HASH);
        header.set_uncle_hash(tier, trellis_types::EMPTY_LIST_HASH);
        header.set_etx_hash(tier, trellis_types::EMPTY_LIST_HASH);
        header.set_manifest_hash(tier, trellis_types::EMPTY_LIST_HASH);
        Ok(header)
    }

    fn publish_pending_header(&self, header: Header) {
        self.published.lock().push(header);
    }

    fn stop(&self) {}
}

/// Mempool double.
#[derive(Debug, Default)]
pub(crate) struct NoopTxPool;

impl TxPool for NoopTxPool {
    fn stop(&self) {}
}

/// One recorded subordinate append.
#[derive(Debug, Clone)]
pub(crate) struct AppendCall {
    pub(crate) hash: B256,
    pub(crate) dom_terminus: B256,
    pub(crate) td: U256,
    pub(crate) reorg: bool,
}

/// One recorded sub-relay.
#[derive(Debug, Clone)]
pub(crate) struct RelayCall {
    pub(crate) pending_header: PendingHeader,
    pub(crate) reorg: bool,
    pub(crate) origin: Location,
}

/// Programmable peer double recording every call.
#[derive(Debug, Default)]
pub(crate) struct RecordingClient {
    pub(crate) appends: Mutex<Vec<AppendCall>>,
    pub(crate) relays: Mutex<Vec<RelayCall>>,
    pub(crate) sent_etxs: Mutex<Vec<PendingEtxs>>,
    /// When set, `append` fails with this remote message.
    pub(crate) fail_append_with: Mutex<Option<String>>,
}

#[async_trait]
impl SliceClient for RecordingClient {
    async fn dial(_url: &Url) -> Result<Self, ClientError> {
        Ok(Self::default())
    }

    async fn append(
        &self,
        header: Header,
        _dom_pending_header: Header,
        dom_terminus: B256,
        td: U256,
        _dom_origin: bool,
        reorg: bool,
    ) -> Result<PerTierEtxs, ClientError> {
        if let Some(msg) = self.fail_append_with.lock().clone() {
            return Err(ClientError::Remote(msg));
        }
        self.appends.lock().push(AppendCall {
            hash: header.hash(),
            dom_terminus,
            td,
            reorg,
        });
        Ok(PerTierEtxs::default())
    }

    async fn sub_relay_pending_header(
        &self,
        pending_header: PendingHeader,
        reorg: bool,
        location: Location,
    ) -> Result<(), ClientError> {
        self.relays.lock().push(RelayCall { pending_header, reorg, origin: location });
        Ok(())
    }

    async fn get_manifest(&self, _block_hash: B256) -> Result<BlockManifest, ClientError> {
        Ok(BlockManifest::new())
    }

    async fn send_pending_etxs_to_dom(
        &self,
        pending_etxs: PendingEtxs,
    ) -> Result<(), ClientError> {
        self.sent_etxs.lock().push(pending_etxs);
        Ok(())
    }
}

/// Builds a direct child of `parent` at `tier`, with an empty body.
pub(crate) fn child_header(
    parent: &Header,
    tier: Tier,
    location: Location,
    difficulty: u64,
    nonce: u64,
) -> Header {
    let mut header = parent.clone();
    header.set_parent_hash(tier, parent.hash());
    header.set_number(tier, parent.number(tier) + 1);
    header.set_difficulty(tier, U256::from(difficulty));
    header.set_location(location);
    header.set_nonce(nonce);
    header
}

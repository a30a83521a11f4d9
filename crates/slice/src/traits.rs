//! Contracts for the local collaborators the coordinator consumes.
//!
//! Block execution, chain storage, mining, and the mempool are external
//! components; the coordinator only depends on the surfaces below.

use alloy_primitives::{B256, U256};
use thiserror::Error;
use trellis_storage::WriteBatch;
use trellis_types::{Block, BlockManifest, Header, Transaction};

/// Errors surfaced by the header-chain collaborator.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The block was rejected by chain validation.
    #[error("block rejected: {0}")]
    InvalidBlock(String),

    /// A required ancestor is missing from the chain store.
    #[error("unknown ancestor {0}")]
    UnknownAncestor(B256),

    /// The requested header does not exist.
    #[error("header {0} not found")]
    UnknownHeader(B256),

    /// Backing storage failure.
    #[error(transparent)]
    Storage(#[from] trellis_storage::StorageError),
}

/// Errors surfaced by the miner worker.
#[derive(Debug, Error)]
pub enum MinerError {
    /// The worker could not assemble a candidate header on the block.
    #[error("pending header generation failed: {0}")]
    Generation(String),
}

/// The local header-chain store and its total-difficulty index.
///
/// `append` queues the block into the caller's batch; nothing becomes
/// visible until the batch commits. The two publish methods are the
/// chain-head and chain-side feeds.
pub trait HeaderChain: Send + Sync {
    /// True when the chain holds `hash` at `number`.
    fn has_header(&self, hash: B256, number: u64) -> bool;

    /// Header for `hash`, when it sits at `number`.
    fn get_header(&self, hash: B256, number: u64) -> Option<Header>;

    /// Header for `hash` at any height.
    fn get_header_by_hash(&self, hash: B256) -> Option<Header>;

    /// Raw termini tuple stored for `hash`, unshaped.
    fn get_termini_by_hash(&self, hash: B256) -> Option<Vec<B256>>;

    /// Total difficulty of `(hash, number)`.
    fn get_td(&self, hash: B256, number: u64) -> Option<U256>;

    /// Total difficulty of `hash` at whatever height it sits.
    fn get_td_by_hash(&self, hash: B256) -> Option<U256>;

    /// Validates `block` and queues its write into `batch`.
    fn append(&self, batch: &mut WriteBatch, block: &Block) -> Result<(), ChainError>;

    /// Advances the current header.
    fn set_current_header(&self, header: &Header) -> Result<(), ChainError>;

    /// The current chain head.
    fn current_header(&self) -> Header;

    /// True when only genesis has been appended.
    fn is_empty(&self) -> bool;

    /// Full ETX rollup accumulated since the previous coincident ancestor.
    fn collect_etx_rollup(&self, block: &Block) -> Result<Vec<Transaction>, ChainError>;

    /// Manifest of ancestor hashes since the previous coincident ancestor.
    fn collect_block_manifest(&self, header: &Header) -> Result<BlockManifest, ChainError>;

    /// Publishes `block` on the chain-head feed.
    fn publish_chain_head(&self, block: &Block);

    /// Publishes `block` on the chain-side feed.
    fn publish_chain_side(&self, block: &Block);

    /// Shuts the chain down.
    fn stop(&self);
}

/// Consensus-engine surface.
pub trait ConsensusEngine: Send + Sync {
    /// True when `header` qualifies as a block at the dominant tier.
    fn is_dom_coincident(&self, header: &Header) -> bool;
}

/// Candidate-header assembly surface of the miner.
pub trait MinerWorker: Send + Sync {
    /// Builds the next candidate header on top of `block`.
    fn generate_pending_header(&self, block: &Block) -> Result<Header, MinerError>;

    /// Publishes `header` on the miner's pending-header feed.
    fn publish_pending_header(&self, header: Header);

    /// Shuts the worker down.
    fn stop(&self);
}

/// Transaction-pool lifecycle surface.
pub trait TxPool: Send + Sync {
    /// Shuts the pool down.
    fn stop(&self);
}

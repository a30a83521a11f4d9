use alloy_primitives::B256;
use thiserror::Error;
use trellis_storage::StorageError;

use crate::{
    client::ClientError,
    traits::{ChainError, MinerError},
};

/// Canonical message of the sub-not-synced sentinel.
///
/// The sentinel must survive a client round-trip, where only the message
/// string crosses the boundary; both sides compare against this constant.
pub const SUB_NOT_SYNCED_MSG: &str = "sub not synced to dom";

/// Errors surfaced by slice coordination.
///
/// Duplicate blocks are a silent success and carry no error kind.
#[derive(Debug, Error)]
pub enum SliceError {
    /// The header's body commitments are non-empty and no pending body is
    /// stored under its state root.
    #[error("no pending body matches the header body commitments")]
    MissingBody,

    /// The stored termini tuple for the parent is missing or malformed.
    #[error("termini tuple has {len} entries, expected 4")]
    TerminiShape {
        /// Number of entries actually stored; zero when absent.
        len: usize,
    },

    /// The dominant terminus disagrees with the local coincident ancestry;
    /// accepting the block would merge the graph into a non-tree shape.
    #[error("cyclic reference: dom terminus {dom} does not match local terminus {local}")]
    CyclicReference {
        /// Terminus declared by the dominant caller.
        dom: B256,
        /// Terminus recorded for the local parent.
        local: B256,
    },

    /// The header chain refused the block.
    #[error("chain append failed")]
    AppendFailed(#[source] ChainError),

    /// The parent's total difficulty is not yet known, or the header is too
    /// far ahead of local time.
    #[error("block is ahead of the local chain")]
    FutureBlock,

    /// A manifest references a block with no stored pending ETXs.
    #[error("no pending etxs stored for manifest entry {0}")]
    MissingPendingEtxs(B256),

    /// The aggregated sub rollup disagrees with the advertised rollup hash.
    #[error("sub rollup hash mismatch: computed {computed}, header advertises {advertised}")]
    RollupHashMismatch {
        /// Hash of the aggregated rollup.
        computed: B256,
        /// Hash the header carries.
        advertised: B256,
    },

    /// The write batch failed to commit; no cache mutation took place.
    #[error("batch commit failed")]
    CommitFailed(#[source] StorageError),

    /// No cache entry exists at the referenced terminus.
    #[error("no pending header cached at terminus {0}")]
    MissingCacheEntry(B256),

    /// The subordinate has not yet synced the dominant chain up to this
    /// block; the future-header buffer retains the header for replay.
    #[error("sub not synced to dom")]
    SubNotSynced,

    /// No pending header has been seeded yet.
    #[error("empty pending header")]
    EmptyPendingHeader,

    /// The subordinate slot has no connected client.
    #[error("no subordinate client in slot {0}")]
    EmptySubSlot(usize),

    /// The dominant client dial has not resolved yet; retriable.
    #[error("dominant client is not connected yet")]
    DomClientNotReady,

    /// This tier has no dominant parent.
    #[error("tier has no dominant parent")]
    NoDominantTier,

    /// Pending-header generation failed in the miner worker.
    #[error(transparent)]
    Miner(#[from] MinerError),

    /// Header-chain collaborator failure outside the append call itself.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Storage failure outside the commit point.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Subordinate or dominant client failure.
    #[error(transparent)]
    Client(#[from] ClientError),
}

impl SliceError {
    /// True for the sub-not-synced sentinel, in local or client-wrapped
    /// form. The future-header buffer keeps such headers for a later
    /// retry instead of evicting them.
    pub fn is_sub_not_synced(&self) -> bool {
        match self {
            Self::SubNotSynced => true,
            Self::Client(ClientError::Remote(msg)) => msg == SUB_NOT_SYNCED_MSG,
            _ => false,
        }
    }
}

//! The slice coordinator for one tier of the trellis hierarchy.
//!
//! A slice threads incoming block headers through the hierarchical append
//! protocol, decides which fork is canonical under the hierarchical
//! total-difficulty rule, maintains the pending-header cache miners build
//! against, and brokers cross-tier settlement messages (ETXs) between
//! tiers.
//!
//! The block-execution engine, header-chain store, transaction pool, miner
//! worker, database, and peer clients are external collaborators consumed
//! through the contracts in [`traits`] and [`client`].

use std::time::Duration;

mod config;
pub use config::{Genesis, SliceConfig};

mod error;
pub use error::{SUB_NOT_SYNCED_MSG, SliceError};

mod traits;
pub use traits::{ChainError, ConsensusEngine, HeaderChain, MinerError, MinerWorker, TxPool};

mod client;
pub use client::{ClientError, DomClient, SliceClient, SubClientMap};

mod relay;

mod ph_cache;

mod future;

mod pending_etx;

mod slice;
pub use slice::Slice;

#[cfg(test)]
mod test_utils;

/// Capacity of the future-header reorder buffer.
pub(crate) const MAX_FUTURE_HEADERS: usize = 256;

/// Capacity of the pending-ETX cache.
pub(crate) const MAX_PENDING_ETX_BLOCKS: usize = 256;

/// Maximum lead, in seconds, a future header's timestamp may have over
/// local time at admission.
pub(crate) const MAX_FUTURE_HEADER_LEAD_SECS: u64 = 30;

/// Pending-header cache retention, in blocks behind the current head.
pub(crate) const PENDING_HEADER_CACHE_LIMIT: u64 = 500;

/// Period of the pending-header cache sweep.
pub(crate) const PENDING_HEADER_GC_PERIOD: Duration = Duration::from_secs(5 * 60);

/// Period of the future-header replay.
pub(crate) const FUTURE_HEADER_REPLAY_PERIOD: Duration = Duration::from_secs(3);

//! Core data types shared across the trellis slice coordinator.
//!
//! Trellis is a hierarchical chain: a top-level Prime chain supervises
//! several Region chains, each of which supervises several Zone chains.
//! Every chain-commitment field on a [`Header`] carries one value per
//! hierarchy level, so a block at a given tier also commits to state at the
//! tiers above it.

mod tier;
pub use tier::{HIERARCHY_DEPTH, Location, TERMINUS_INDEX, Tier};

mod tier_array;
use tier_array::TierArray;

mod transaction;
pub use transaction::{EMPTY_LIST_HASH, PerTierEtxs, Transaction, transactions_root};

mod header;
pub use header::{Block, Body, Header};

mod pending;
pub use pending::{BlockManifest, PendingEtxs, PendingHeader, Termini};

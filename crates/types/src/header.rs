use alloy_primitives::{Address, B256, Bloom, Bytes, U256, keccak256};
use alloy_rlp::{RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};

use crate::{
    BlockManifest, EMPTY_LIST_HASH, HIERARCHY_DEPTH, Location, Tier, TierArray, Transaction,
};

/// A tier-indexed block header.
///
/// Every chain-commitment field carries one value per hierarchy level. The
/// coordinator treats the execution fields as opaque; it only reads and
/// rewrites them tier-locally when compositing pending headers.
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable, Serialize, Deserialize)]
pub struct Header {
    parent_hash: TierArray<B256, HIERARCHY_DEPTH>,
    uncle_hash: TierArray<B256, HIERARCHY_DEPTH>,
    coinbase: TierArray<Address, HIERARCHY_DEPTH>,
    state_root: TierArray<B256, HIERARCHY_DEPTH>,
    tx_hash: TierArray<B256, HIERARCHY_DEPTH>,
    etx_hash: TierArray<B256, HIERARCHY_DEPTH>,
    etx_rollup_hash: TierArray<B256, HIERARCHY_DEPTH>,
    manifest_hash: TierArray<B256, HIERARCHY_DEPTH>,
    receipt_hash: TierArray<B256, HIERARCHY_DEPTH>,
    bloom: TierArray<Bloom, HIERARCHY_DEPTH>,
    difficulty: TierArray<U256, HIERARCHY_DEPTH>,
    number: TierArray<u64, HIERARCHY_DEPTH>,
    gas_limit: TierArray<u64, HIERARCHY_DEPTH>,
    gas_used: TierArray<u64, HIERARCHY_DEPTH>,
    base_fee: TierArray<U256, HIERARCHY_DEPTH>,
    location: Location,
    time: u64,
    extra: Bytes,
    nonce: u64,
}

macro_rules! tiered_accessors {
    ($($(#[$doc:meta])* $field:ident: $ty:ty => $setter:ident),* $(,)?) => {
        impl Header {
            $(
                $(#[$doc])*
                pub fn $field(&self, tier: Tier) -> $ty {
                    self.$field.0[tier.index()]
                }

                /// Sets the field value at the given tier.
                pub fn $setter(&mut self, tier: Tier, value: $ty) {
                    self.$field.0[tier.index()] = value;
                }
            )*
        }
    };
}

tiered_accessors! {
    /// Parent hash at the given tier.
    parent_hash: B256 => set_parent_hash,
    /// Uncle-set commitment at the given tier.
    uncle_hash: B256 => set_uncle_hash,
    /// Fee recipient at the given tier.
    coinbase: Address => set_coinbase,
    /// State root at the given tier.
    state_root: B256 => set_state_root,
    /// Transaction-set commitment at the given tier.
    tx_hash: B256 => set_tx_hash,
    /// Emitted-ETX commitment at the given tier.
    etx_hash: B256 => set_etx_hash,
    /// ETX-rollup commitment at the given tier.
    etx_rollup_hash: B256 => set_etx_rollup_hash,
    /// Sub-manifest commitment at the given tier.
    manifest_hash: B256 => set_manifest_hash,
    /// Receipt-set commitment at the given tier.
    receipt_hash: B256 => set_receipt_hash,
    /// Log bloom at the given tier.
    bloom: Bloom => set_bloom,
    /// Difficulty at the given tier.
    difficulty: U256 => set_difficulty,
    /// Block number at the given tier.
    number: u64 => set_number,
    /// Gas limit at the given tier.
    gas_limit: u64 => set_gas_limit,
    /// Gas used at the given tier.
    gas_used: u64 => set_gas_used,
    /// Base fee at the given tier.
    base_fee: U256 => set_base_fee,
}

impl Header {
    /// Identity of the header: the keccak hash of its RLP encoding.
    pub fn hash(&self) -> B256 {
        keccak256(alloy_rlp::encode(self))
    }

    /// Chain coordinates of the header.
    pub const fn location(&self) -> Location {
        self.location
    }

    /// Sets the chain coordinates.
    pub fn set_location(&mut self, location: Location) {
        self.location = location;
    }

    /// Unix timestamp of the header.
    pub const fn time(&self) -> u64 {
        self.time
    }

    /// Sets the timestamp.
    pub fn set_time(&mut self, time: u64) {
        self.time = time;
    }

    /// The untiered extra-data field.
    pub const fn extra(&self) -> &Bytes {
        &self.extra
    }

    /// Sets the extra-data field.
    pub fn set_extra(&mut self, extra: Bytes) {
        self.extra = extra;
    }

    /// Sealing nonce.
    pub const fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Sets the sealing nonce.
    pub fn set_nonce(&mut self, nonce: u64) {
        self.nonce = nonce;
    }

    /// Block numbers across all tiers, for logging.
    pub const fn number_array(&self) -> [u64; HIERARCHY_DEPTH] {
        self.number.0
    }

    /// True when every body commitment at the tier is the empty-set hash.
    pub fn is_empty_body(&self, tier: Tier) -> bool {
        self.tx_hash(tier) == EMPTY_LIST_HASH
            && self.uncle_hash(tier) == EMPTY_LIST_HASH
            && self.etx_hash(tier) == EMPTY_LIST_HASH
            && self.manifest_hash(tier) == EMPTY_LIST_HASH
    }
}

impl Default for Header {
    fn default() -> Self {
        Self {
            parent_hash: TierArray([B256::ZERO; HIERARCHY_DEPTH]),
            uncle_hash: TierArray([EMPTY_LIST_HASH; HIERARCHY_DEPTH]),
            coinbase: TierArray([Address::ZERO; HIERARCHY_DEPTH]),
            state_root: TierArray([B256::ZERO; HIERARCHY_DEPTH]),
            tx_hash: TierArray([EMPTY_LIST_HASH; HIERARCHY_DEPTH]),
            etx_hash: TierArray([EMPTY_LIST_HASH; HIERARCHY_DEPTH]),
            etx_rollup_hash: TierArray([EMPTY_LIST_HASH; HIERARCHY_DEPTH]),
            manifest_hash: TierArray([EMPTY_LIST_HASH; HIERARCHY_DEPTH]),
            receipt_hash: TierArray([B256::ZERO; HIERARCHY_DEPTH]),
            bloom: TierArray([Bloom::ZERO; HIERARCHY_DEPTH]),
            difficulty: TierArray([U256::ZERO; HIERARCHY_DEPTH]),
            number: TierArray([0; HIERARCHY_DEPTH]),
            gas_limit: TierArray([0; HIERARCHY_DEPTH]),
            gas_used: TierArray([0; HIERARCHY_DEPTH]),
            base_fee: TierArray([U256::ZERO; HIERARCHY_DEPTH]),
            location: Location::default(),
            time: 0,
            extra: Bytes::new(),
            nonce: 0,
        }
    }
}

/// A block body: local transactions, uncles, emitted ETXs, and the manifest
/// of subordinate block hashes aggregated since the last coincident block.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, RlpEncodable, RlpDecodable, Serialize, Deserialize,
)]
pub struct Body {
    /// Local transactions.
    pub transactions: Vec<Transaction>,
    /// Uncle headers.
    pub uncles: Vec<Header>,
    /// External transactions emitted by this block.
    pub ext_transactions: Vec<Transaction>,
    /// Subordinate block hashes since the last coincident block.
    pub sub_manifest: BlockManifest,
}

/// A header paired with its body.
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable, Serialize, Deserialize)]
pub struct Block {
    header: Header,
    body: Body,
}

impl Block {
    /// Builds a block with an empty body.
    pub fn new_with_header(header: Header) -> Self {
        Self { header, body: Body::default() }
    }

    /// Replaces the body.
    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// The block header.
    pub const fn header(&self) -> &Header {
        &self.header
    }

    /// The block body.
    pub const fn body(&self) -> &Body {
        &self.body
    }

    /// Identity of the block, derived from the header.
    pub fn hash(&self) -> B256 {
        self.header.hash()
    }

    /// Block number at the given tier.
    pub fn number(&self, tier: Tier) -> u64 {
        self.header.number(tier)
    }

    /// Difficulty at the given tier.
    pub fn difficulty(&self, tier: Tier) -> U256 {
        self.header.difficulty(tier)
    }

    /// State root at the given tier.
    pub fn state_root(&self, tier: Tier) -> B256 {
        self.header.state_root(tier)
    }

    /// Chain coordinates of the block.
    pub const fn location(&self) -> Location {
        self.header.location()
    }

    /// Local transactions.
    pub fn transactions(&self) -> &[Transaction] {
        &self.body.transactions
    }

    /// Uncle headers.
    pub fn uncles(&self) -> &[Header] {
        &self.body.uncles
    }

    /// Emitted external transactions.
    pub fn ext_transactions(&self) -> &[Transaction] {
        &self.body.ext_transactions
    }

    /// Subordinate block hashes since the last coincident block.
    pub fn sub_manifest(&self) -> &BlockManifest {
        &self.body.sub_manifest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_covers_every_field() {
        let base = Header::default();
        let mut with_nonce = base.clone();
        with_nonce.set_nonce(7);
        assert_ne!(base.hash(), with_nonce.hash());

        let mut with_parent = base.clone();
        with_parent.set_parent_hash(Tier::Zone, B256::repeat_byte(1));
        assert_ne!(base.hash(), with_parent.hash());
    }

    #[test]
    fn default_header_has_empty_body() {
        let header = Header::default();
        for tier in [Tier::Prime, Tier::Region, Tier::Zone] {
            assert!(header.is_empty_body(tier));
        }
    }

    #[test]
    fn non_empty_tx_commitment_breaks_emptiness() {
        let mut header = Header::default();
        header.set_tx_hash(Tier::Zone, B256::repeat_byte(9));
        assert!(!header.is_empty_body(Tier::Zone));
        assert!(header.is_empty_body(Tier::Region));
    }
}

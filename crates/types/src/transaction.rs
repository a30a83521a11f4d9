use alloy_primitives::{B256, Bytes, b256, keccak256};
use alloy_rlp::{RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};

use crate::HIERARCHY_DEPTH;

/// Hash of an RLP-encoded empty list; the commitment advertised by header
/// fields whose underlying set is empty.
pub const EMPTY_LIST_HASH: B256 =
    b256!("1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347");

/// An opaque transaction payload.
///
/// The coordinator never inspects transaction contents; execution semantics
/// live in the external block-execution engine. External transactions (ETXs)
/// use the same representation.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, RlpEncodable, RlpDecodable, Serialize, Deserialize,
)]
pub struct Transaction {
    /// Raw transaction payload.
    pub payload: Bytes,
}

impl Transaction {
    /// Builds a transaction over the given payload.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self { payload: payload.into() }
    }

    /// Identity of the transaction.
    pub fn hash(&self) -> B256 {
        keccak256(&self.payload)
    }
}

/// Per-tier external-transaction lists, indexed by [`crate::Tier::index`].
pub type PerTierEtxs = [Vec<Transaction>; HIERARCHY_DEPTH];

/// Commitment over an ordered transaction set.
///
/// The empty set commits to [`EMPTY_LIST_HASH`].
pub fn transactions_root(txs: &[Transaction]) -> B256 {
    let mut out = Vec::new();
    alloy_rlp::encode_list::<_, Transaction>(txs, &mut out);
    keccak256(&out)
}

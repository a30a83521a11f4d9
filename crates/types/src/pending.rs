use alloy_primitives::B256;
use alloy_rlp::{RlpDecodable, RlpEncodable};
use derive_more::Constructor;
use serde::{Deserialize, Serialize};

use crate::{Header, PerTierEtxs, TERMINUS_INDEX, TierArray};

/// Ordered list of subordinate block hashes accumulated since the last
/// coincident block.
pub type BlockManifest = Vec<B256>;

/// The four-hash bookkeeping tuple tracked for every appended header.
///
/// Slots `0..3` hold the most recent header hash seen from each subordinate
/// slot; slot [`TERMINUS_INDEX`] holds the hash of the most recent
/// dominant-coincident ancestor. The tuple is persisted per header hash and
/// validated to exactly four entries when read back.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, RlpEncodable, RlpDecodable, Serialize, Deserialize,
)]
pub struct Termini {
    hashes: TierArray<B256, { TERMINUS_INDEX + 1 }>,
}

impl Termini {
    /// Genesis termini: every slot points at the genesis hash.
    pub const fn genesis(hash: B256) -> Self {
        Self { hashes: TierArray([hash; TERMINUS_INDEX + 1]) }
    }

    /// The most recent dominant-coincident ancestor.
    pub const fn terminus(&self) -> B256 {
        self.hashes.0[TERMINUS_INDEX]
    }

    /// Replaces the terminus slot.
    pub fn set_terminus(&mut self, hash: B256) {
        self.hashes.0[TERMINUS_INDEX] = hash;
    }

    /// The most recent header hash seen from the given subordinate slot.
    pub const fn sub_terminus(&self, slot: usize) -> B256 {
        self.hashes.0[slot]
    }

    /// Replaces a subordinate slot.
    pub fn set_sub_terminus(&mut self, slot: usize, hash: B256) {
        self.hashes.0[slot] = hash;
    }

    /// The tuple as a slice, terminus last.
    pub const fn as_slice(&self) -> &[B256] {
        &self.hashes.0
    }
}

impl TryFrom<Vec<B256>> for Termini {
    /// The offending length.
    type Error = usize;

    fn try_from(raw: Vec<B256>) -> Result<Self, Self::Error> {
        let len = raw.len();
        let hashes: [B256; TERMINUS_INDEX + 1] = raw.try_into().map_err(|_| len)?;
        Ok(Self { hashes: TierArray(hashes) })
    }
}

/// A not-yet-sealed candidate header combining contributions from every
/// tier, keyed in the pending-header cache by its terminus.
#[derive(
    Debug,
    Clone,
    Constructor,
    PartialEq,
    Eq,
    RlpEncodable,
    RlpDecodable,
    Serialize,
    Deserialize,
)]
pub struct PendingHeader {
    /// The composited candidate header.
    pub header: Header,
    /// Termini produced by the append that generated the candidate.
    pub termini: Termini,
}

/// Per-tier external transactions emitted by a single block, forwarded
/// upward on coincidence.
#[derive(Debug, Clone, Constructor, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEtxs {
    /// Hash of the block that emitted the ETXs.
    pub hash: B256,
    /// ETX lists indexed by tier.
    pub etxs: PerTierEtxs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn termini_shape_is_enforced() {
        let four = vec![B256::ZERO; 4];
        assert!(Termini::try_from(four).is_ok());

        let three = vec![B256::ZERO; 3];
        assert_eq!(Termini::try_from(three), Err(3));

        let five = vec![B256::ZERO; 5];
        assert_eq!(Termini::try_from(five), Err(5));
    }

    #[test]
    fn genesis_termini_point_at_genesis() {
        let g = B256::repeat_byte(0xaa);
        let termini = Termini::genesis(g);
        assert_eq!(termini.terminus(), g);
        for slot in 0..TERMINUS_INDEX {
            assert_eq!(termini.sub_terminus(slot), g);
        }
    }

    #[test]
    fn slot_updates_are_independent() {
        let mut termini = Termini::genesis(B256::ZERO);
        let a = B256::repeat_byte(1);
        termini.set_sub_terminus(1, a);
        assert_eq!(termini.sub_terminus(1), a);
        assert_eq!(termini.sub_terminus(0), B256::ZERO);
        assert_eq!(termini.terminus(), B256::ZERO);
    }
}

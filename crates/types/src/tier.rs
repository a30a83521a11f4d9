use alloy_rlp::{RlpDecodable, RlpEncodable};
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Number of levels in the chain hierarchy.
pub const HIERARCHY_DEPTH: usize = 3;

/// Index of the dominant-coincident terminus within a [`crate::Termini`]
/// tuple. The lower indices track the subordinate slots.
pub const TERMINUS_INDEX: usize = 3;

/// A level of the chain hierarchy.
///
/// Prime is dominant to Region, which is dominant to Zone. A slice occupies
/// exactly one tier, fixed at construction.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// The top-level chain. No dominant parent.
    Prime,
    /// A mid-level chain, supervised by Prime.
    Region,
    /// A leaf chain, supervised by a Region. No subordinate children.
    Zone,
}

impl Tier {
    /// Stable index of the tier, used for tier-indexed header fields.
    pub const fn index(self) -> usize {
        match self {
            Self::Prime => 0,
            Self::Region => 1,
            Self::Zone => 2,
        }
    }

    /// Tier for a stable index, when in range.
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Prime),
            1 => Some(Self::Region),
            2 => Some(Self::Zone),
            _ => None,
        }
    }

    /// The tier dominant to this one, if any.
    pub const fn dom(self) -> Option<Self> {
        match self {
            Self::Prime => None,
            Self::Region => Some(Self::Prime),
            Self::Zone => Some(Self::Region),
        }
    }

    /// The tier subordinate to this one, if any.
    pub const fn sub(self) -> Option<Self> {
        match self {
            Self::Prime => Some(Self::Region),
            Self::Region => Some(Self::Zone),
            Self::Zone => None,
        }
    }
}

/// Chain coordinates of a block or slice within the hierarchy.
#[derive(
    Debug,
    Display,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    RlpEncodable,
    RlpDecodable,
    Serialize,
    Deserialize,
)]
#[display("[{region}, {zone}]")]
pub struct Location {
    /// Region index within Prime.
    pub region: u8,
    /// Zone index within the region.
    pub zone: u8,
}

impl Location {
    /// Builds a location from region and zone indices.
    pub const fn new(region: u8, zone: u8) -> Self {
        Self { region, zone }
    }

    /// The subordinate slot this location occupies, seen from `at`.
    ///
    /// At Prime the slot is the region index; below Prime it is the zone
    /// index. Only meaningful at tiers that have subordinates.
    pub const fn sub_index(&self, at: Tier) -> usize {
        match at {
            Tier::Prime => self.region as usize,
            _ => self.zone as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_indices_are_stable() {
        assert_eq!(Tier::Prime.index(), 0);
        assert_eq!(Tier::Region.index(), 1);
        assert_eq!(Tier::Zone.index(), 2);
        for tier in [Tier::Prime, Tier::Region, Tier::Zone] {
            assert_eq!(Tier::from_index(tier.index()), Some(tier));
        }
        assert_eq!(Tier::from_index(3), None);
    }

    #[test]
    fn dom_sub_relations() {
        assert_eq!(Tier::Prime.dom(), None);
        assert_eq!(Tier::Zone.sub(), None);
        assert_eq!(Tier::Region.dom(), Some(Tier::Prime));
        assert_eq!(Tier::Region.sub(), Some(Tier::Zone));
    }

    #[test]
    fn sub_index_depends_on_tier() {
        let loc = Location::new(2, 1);
        assert_eq!(loc.sub_index(Tier::Prime), 2);
        assert_eq!(loc.sub_index(Tier::Region), 1);
    }
}

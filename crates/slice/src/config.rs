use alloy_primitives::B256;
use derive_more::Constructor;
use serde::{Deserialize, Serialize};
use trellis_types::{Block, Location, Tier};

/// Static configuration of a slice instance.
///
/// The tier is fixed at construction and immutable thereafter: Prime has no
/// dominant parent, Zone has no subordinate children.
#[derive(Debug, Clone, Constructor, Serialize, Deserialize)]
pub struct SliceConfig {
    /// Tier this slice occupies.
    pub tier: Tier,
    /// Chain coordinates of this slice.
    pub location: Location,
    /// Hash of the genesis header.
    pub genesis_hash: B256,
}

/// Genesis state: the genesis hash plus the knot of predefined seed blocks
/// installed on first boot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Genesis {
    /// Hash of the genesis header.
    pub hash: B256,
    /// Seed blocks appended after genesis. Prime drives the appends;
    /// Region and Zone slices only persist the bodies matching their
    /// location.
    pub knot: Vec<Block>,
}

impl Genesis {
    /// Genesis with no knot.
    pub fn new(hash: B256) -> Self {
        Self { hash, knot: Vec::new() }
    }

    /// Attaches the knot of seed blocks.
    pub fn with_knot(mut self, knot: Vec<Block>) -> Self {
        self.knot = knot;
        self
    }
}

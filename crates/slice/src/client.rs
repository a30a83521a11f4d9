//! Clients for the dominant parent and subordinate children.
//!
//! The wire transport is an external collaborator; [`SliceClient`] is the
//! surface the coordinator drives. [`SubClientMap`] makes the slot-to-client
//! mapping explicit and rejects calls against empty slots with a typed
//! error. [`DomClient`] wraps the asynchronously dialed dominant handle so
//! callers that race the dial fail fast with a retriable kind instead of
//! dereferencing a missing client.

use std::sync::Arc;

use alloy_primitives::{B256, U256};
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use url::Url;

use trellis_types::{
    BlockManifest, HIERARCHY_DEPTH, Header, Location, PendingEtxs, PendingHeader, PerTierEtxs,
};

use crate::SliceError;

/// Errors crossing the client boundary.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure reaching the peer.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The remote peer rejected the call; only the message survives the
    /// boundary.
    #[error("{0}")]
    Remote(String),
}

/// RPC surface of a peer slice, dominant or subordinate.
#[async_trait]
pub trait SliceClient: Send + Sync + 'static {
    /// Connects to the peer at `url`.
    async fn dial(url: &Url) -> Result<Self, ClientError>
    where
        Self: Sized;

    /// Drives the peer's append for `header`.
    async fn append(
        &self,
        header: Header,
        dom_pending_header: Header,
        dom_terminus: B256,
        td: U256,
        dom_origin: bool,
        reorg: bool,
    ) -> Result<PerTierEtxs, ClientError>;

    /// Relays a composited pending header downward.
    async fn sub_relay_pending_header(
        &self,
        pending_header: PendingHeader,
        reorg: bool,
        location: Location,
    ) -> Result<(), ClientError>;

    /// Fetches the peer's block manifest for `block_hash`.
    async fn get_manifest(&self, block_hash: B256) -> Result<BlockManifest, ClientError>;

    /// Ships pending ETXs upward for later coincident reference.
    async fn send_pending_etxs_to_dom(
        &self,
        pending_etxs: PendingEtxs,
    ) -> Result<(), ClientError>;
}

/// Handle on the dominant peer.
///
/// Non-Prime slices dial their dominant asynchronously after construction;
/// until the dial resolves, [`DomClient::get`] returns
/// [`SliceError::DomClientNotReady`].
#[derive(Debug)]
pub struct DomClient<C> {
    cell: Option<Arc<OnceCell<Arc<C>>>>,
}

impl<C: SliceClient> DomClient<C> {
    /// Handle for a tier with no dominant parent.
    pub fn none() -> Self {
        Self { cell: None }
    }

    /// Handle over an already-connected client.
    pub fn ready(client: Arc<C>) -> Self {
        Self { cell: Some(Arc::new(OnceCell::new_with(Some(client)))) }
    }

    /// Dials `url` in the background.
    ///
    /// A failed dial is a configuration error: it is logged and trips
    /// `cancel`, shutting the slice down.
    pub fn dial_in_background(url: Url, cancel: CancellationToken) -> Self {
        let cell = Arc::new(OnceCell::new());
        let slot = cell.clone();
        tokio::spawn(async move {
            match C::dial(&url).await {
                Ok(client) => {
                    let _ = slot.set(Arc::new(client));
                }
                Err(err) => {
                    error!(target: "slice::client", %url, %err, "dominant client dial failed");
                    cancel.cancel();
                }
            }
        });
        Self { cell: Some(cell) }
    }

    /// The connected client.
    pub fn get(&self) -> Result<Arc<C>, SliceError> {
        let cell = self.cell.as_ref().ok_or(SliceError::NoDominantTier)?;
        cell.get().cloned().ok_or(SliceError::DomClientNotReady)
    }
}

/// Explicit slot-to-client mapping over the three subordinate indices.
///
/// A slot may be empty; calls against an empty slot fail with
/// [`SliceError::EmptySubSlot`].
#[derive(Debug)]
pub struct SubClientMap<C> {
    slots: [Option<Arc<C>>; HIERARCHY_DEPTH],
}

impl<C: SliceClient> SubClientMap<C> {
    /// Map with every slot empty, the Zone shape.
    pub fn empty() -> Self {
        Self { slots: [None, None, None] }
    }

    /// Builds the map from pre-connected clients.
    pub fn from_clients(clients: [Option<Arc<C>>; HIERARCHY_DEPTH]) -> Self {
        Self { slots: clients }
    }

    /// Dials each configured slot.
    ///
    /// An unset slot is logged and left empty; a failed dial is fatal and
    /// returned to the caller.
    pub async fn dial(urls: &[Option<Url>; HIERARCHY_DEPTH]) -> Result<Self, ClientError> {
        let mut slots: [Option<Arc<C>>; HIERARCHY_DEPTH] = [None, None, None];
        for (slot, url) in urls.iter().enumerate() {
            match url {
                Some(url) => slots[slot] = Some(Arc::new(C::dial(url).await?)),
                None => warn!(target: "slice::client", slot, "subordinate slot has no url"),
            }
        }
        Ok(Self { slots })
    }

    /// Client in `slot`.
    pub fn get(&self, slot: usize) -> Result<&Arc<C>, SliceError> {
        self.slots
            .get(slot)
            .and_then(Option::as_ref)
            .ok_or(SliceError::EmptySubSlot(slot))
    }

    /// Iterates over occupied slots.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Arc<C>)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, client)| client.as_ref().map(|c| (slot, c)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RecordingClient;

    #[tokio::test]
    async fn dom_client_states() {
        let none = DomClient::<RecordingClient>::none();
        assert!(matches!(none.get(), Err(SliceError::NoDominantTier)));

        let pending = DomClient::<RecordingClient> {
            cell: Some(Arc::new(OnceCell::new())),
        };
        assert!(matches!(pending.get(), Err(SliceError::DomClientNotReady)));

        let ready = DomClient::ready(Arc::new(RecordingClient::default()));
        assert!(ready.get().is_ok());
    }

    #[tokio::test]
    async fn empty_slot_is_a_typed_error() {
        let subs = SubClientMap::<RecordingClient>::empty();
        assert!(matches!(subs.get(0), Err(SliceError::EmptySubSlot(0))));
        assert!(matches!(subs.get(5), Err(SliceError::EmptySubSlot(5))));

        let subs = SubClientMap::from_clients([
            Some(Arc::new(RecordingClient::default())),
            None,
            None,
        ]);
        assert!(subs.get(0).is_ok());
        assert!(matches!(subs.get(1), Err(SliceError::EmptySubSlot(1))));
        assert_eq!(subs.iter().count(), 1);
    }
}

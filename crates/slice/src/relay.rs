//! Per-child relay queues.
//!
//! Relay fan-out is initiated while the pending-header cache lock is held,
//! but the network round-trips run on dedicated worker tasks. One queue per
//! subordinate slot keeps SubRelay delivery FIFO with respect to the Append
//! that produced each entry.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use trellis_types::{Location, PendingHeader};

use crate::client::SliceClient;

/// A queued pending-header relay for one subordinate.
#[derive(Debug)]
struct RelayJob {
    pending_header: PendingHeader,
    reorg: bool,
    origin: Location,
}

/// Sender half of a subordinate relay queue.
#[derive(Debug, Clone)]
pub(crate) struct RelayHandle {
    tx: mpsc::UnboundedSender<RelayJob>,
}

impl RelayHandle {
    /// Enqueues a relay. Delivery order per child matches enqueue order.
    pub(crate) fn enqueue(&self, pending_header: PendingHeader, reorg: bool, origin: Location) {
        let job = RelayJob { pending_header, reorg, origin };
        if self.tx.send(job).is_err() {
            debug!(target: "slice::relay", "relay worker stopped, dropping job");
        }
    }
}

/// Spawns the drain task for one subordinate slot.
///
/// Relay failures are logged and never propagated; the subordinate catches
/// up through its own future-header replay.
pub(crate) fn spawn_relay_worker<C: SliceClient>(
    slot: usize,
    client: Arc<C>,
    cancel: CancellationToken,
) -> RelayHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<RelayJob>();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                maybe_job = rx.recv() => {
                    let Some(job) = maybe_job else { break };
                    if let Err(err) = client
                        .sub_relay_pending_header(job.pending_header, job.reorg, job.origin)
                        .await
                    {
                        warn!(target: "slice::relay", slot, %err, "pending header relay failed");
                    }
                }
            }
        }
    });
    RelayHandle { tx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{RecordingClient, wait_until};
    use trellis_types::Termini;

    #[tokio::test]
    async fn jobs_drain_in_order() {
        let client = Arc::new(RecordingClient::default());
        let cancel = CancellationToken::new();
        let handle = spawn_relay_worker(0, client.clone(), cancel.clone());

        for zone in 0..3u8 {
            let ph = PendingHeader::new(
                Default::default(),
                Termini::genesis(alloy_primitives::B256::repeat_byte(zone)),
            );
            handle.enqueue(ph, false, Location::new(0, zone));
        }

        wait_until(|| client.relays.lock().len() == 3).await;
        let relays = client.relays.lock();
        let zones: Vec<u8> = relays.iter().map(|call| call.origin.zone).collect();
        assert_eq!(zones, vec![0, 1, 2]);
        cancel.cancel();
    }
}

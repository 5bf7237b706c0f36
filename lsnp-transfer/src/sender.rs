//! Sender-side bookkeeping for outbound file offers (spec §4.8): tracks
//! offers awaiting `FILE_ACCEPT`/`FILE_REJECT` the same way the
//! reliability layer tracks outbound messages awaiting `ACK` — a table of
//! oneshot completion handles, resolved by whichever event reaches it
//! first.

use std::collections::HashMap;

use lsnp_types::FullId;
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferOutcome {
    Accepted,
    Rejected,
}

struct PendingOffer {
    recipient: FullId,
    filename: String,
    completion: Option<oneshot::Sender<OfferOutcome>>,
}

#[derive(Debug, Clone)]
pub struct PendingOfferInfo {
    pub file_id: Uuid,
    pub recipient: FullId,
    pub filename: String,
}

#[derive(Default)]
pub struct OutgoingTransferTable {
    pending: Mutex<HashMap<Uuid, PendingOffer>>,
}

impl OutgoingTransferTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sent `FILE_OFFER`. The caller should race the returned
    /// receiver against a 60s timeout (spec §4.8); on timeout, call
    /// [`Self::cancel`] to clear the entry.
    pub async fn offer(
        &self,
        file_id: Uuid,
        recipient: FullId,
        filename: String,
    ) -> oneshot::Receiver<OfferOutcome> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(
            file_id,
            PendingOffer { recipient, filename, completion: Some(tx) },
        );
        rx
    }

    pub async fn on_accept(&self, file_id: Uuid) {
        self.resolve(file_id, OfferOutcome::Accepted).await;
    }

    pub async fn on_reject(&self, file_id: Uuid) {
        self.resolve(file_id, OfferOutcome::Rejected).await;
    }

    async fn resolve(&self, file_id: Uuid, outcome: OfferOutcome) {
        if let Some(mut entry) = self.pending.lock().await.remove(&file_id) {
            if let Some(tx) = entry.completion.take() {
                let _ = tx.send(outcome);
            }
        }
    }

    /// Drops a pending offer without resolving it, e.g. after the 60s
    /// accept timeout fires.
    pub async fn cancel(&self, file_id: Uuid) {
        self.pending.lock().await.remove(&file_id);
    }

    pub async fn pending_snapshot(&self) -> Vec<PendingOfferInfo> {
        self.pending
            .lock()
            .await
            .iter()
            .map(|(file_id, entry)| PendingOfferInfo {
                file_id: *file_id,
                recipient: entry.recipient.clone(),
                filename: entry.filename.clone(),
            })
            .collect()
    }
}

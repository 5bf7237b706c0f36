//! Reliability layer (spec §4.6): message-id dedup on receive, and
//! ACK-tracked retry with exponential backoff on send.
//!
//! Sender-side bookkeeping is a table of one-shot completion handles keyed
//! by `MESSAGE_ID` — the same shape the reference pack uses for its P2P
//! task-reply channel (a `HashMap<Uuid, oneshot::Sender<_>>` scanned by a
//! single background task), generalized here to also drive retry timing
//! instead of just waiting for a single reply.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lsnp_types::{FullId, RELIABILITY_BASE_INTERVAL_SECS, RELIABILITY_MAX_ATTEMPTS, SEEN_ID_CAP};
use tokio::sync::{oneshot, Mutex};
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed,
}

struct ReliabilityEntry {
    dest: SocketAddr,
    bytes: Vec<u8>,
    attempts: u32,
    next_retry: Instant,
    completion: Option<oneshot::Sender<DeliveryOutcome>>,
}

/// Sender-side retry/ACK tracking plus receiver-side per-sender dedup.
pub struct ReliabilityLayer {
    transport: Arc<Transport>,
    entries: Mutex<HashMap<Uuid, ReliabilityEntry>>,
    seen: Mutex<HashMap<FullId, SeenIdSet>>,
}

impl ReliabilityLayer {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self {
            transport,
            entries: Mutex::new(HashMap::new()),
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Send `bytes` to `dest`, tracked under `message_id`. Resolves once an
    /// ACK arrives, the destination never answers within the retry
    /// schedule, or the entry is cancelled.
    pub async fn send_reliable(
        &self,
        message_id: Uuid,
        dest: SocketAddr,
        bytes: Vec<u8>,
    ) -> DeliveryOutcome {
        let (tx, rx) = oneshot::channel();
        {
            let mut entries = self.entries.lock().await;
            entries.insert(
                message_id,
                ReliabilityEntry {
                    dest,
                    bytes: bytes.clone(),
                    attempts: 0,
                    next_retry: Instant::now()
                        + Duration::from_secs(RELIABILITY_BASE_INTERVAL_SECS),
                    completion: Some(tx),
                },
            );
        }
        if let Err(e) = self.transport.send_unicast(dest, &bytes).await {
            warn!(%e, "initial send failed");
        }
        rx.await.unwrap_or(DeliveryOutcome::Failed)
    }

    /// Cancel a pending send: the entry is removed, in-flight retries
    /// stop, and no failure is reported upstream (spec §5).
    pub async fn cancel(&self, message_id: Uuid) {
        self.entries.lock().await.remove(&message_id);
    }

    /// Resolve a pending send on inbound `ACK`. No-op if the id is unknown
    /// (already resolved, or an ACK for a message we never sent).
    pub async fn on_ack(&self, message_id: Uuid) {
        let entry = self.entries.lock().await.remove(&message_id);
        if let Some(mut entry) = entry {
            if let Some(tx) = entry.completion.take() {
                let _ = tx.send(DeliveryOutcome::Delivered);
            }
        }
    }

    /// Scan the table once and retransmit any entry whose deadline has
    /// passed; fail and remove any entry that has exhausted its attempts.
    /// Call this from a `tokio::time::interval` loop (spec §5's retry
    /// task).
    pub async fn retry_due(&self) {
        let now = Instant::now();
        let mut to_retransmit: Vec<(SocketAddr, Vec<u8>)> = Vec::new();
        let mut to_fail: Vec<Uuid> = Vec::new();

        {
            let mut entries = self.entries.lock().await;
            for (id, entry) in entries.iter_mut() {
                if now < entry.next_retry {
                    continue;
                }
                if entry.attempts >= RELIABILITY_MAX_ATTEMPTS {
                    to_fail.push(*id);
                    continue;
                }
                entry.attempts += 1;
                entry.next_retry = now
                    + Duration::from_secs(RELIABILITY_BASE_INTERVAL_SECS * (1 << entry.attempts));
                to_retransmit.push((entry.dest, entry.bytes.clone()));
                debug!(message_id = %id, attempt = entry.attempts, "retransmitting");
            }
            for id in &to_fail {
                entries.remove(id);
            }
        }

        for (dest, bytes) in to_retransmit {
            if let Err(e) = self.transport.send_unicast(dest, &bytes).await {
                warn!(%e, "retransmit failed");
            }
        }
    }

    /// Number of unacknowledged outbound messages; exposed for tests and
    /// diagnostics.
    pub async fn pending_count(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Receiver-side dedup (spec §4.6 steps 2–3): returns `true` the first
    /// time `message_id` is seen from `sender`, `false` on replay. Either
    /// way the caller re-sends an ACK; only a `true` result should also
    /// dispatch the record.
    pub async fn mark_seen(&self, sender: &FullId, message_id: Uuid) -> bool {
        let mut seen = self.seen.lock().await;
        let set = seen.entry(sender.clone()).or_insert_with(SeenIdSet::new);
        set.insert(message_id)
    }
}

/// Bounded, per-sender set of recently processed message ids (spec §3, §5).
/// Evicts the oldest entry once the cap is reached, so a chatty or
/// malicious peer cannot grow this unbounded.
struct SeenIdSet {
    order: VecDeque<Uuid>,
    members: HashSet<Uuid>,
}

impl SeenIdSet {
    fn new() -> Self {
        Self { order: VecDeque::new(), members: HashSet::new() }
    }

    /// Returns `true` if `id` was not already present.
    fn insert(&mut self, id: Uuid) -> bool {
        if !self.members.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > SEEN_ID_CAP {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
        true
    }
}

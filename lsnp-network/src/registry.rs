//! Peer registry (spec §3, §4.3): every peer this process has ever heard
//! from, keyed by full id. Entries are created on first sight and updated
//! on every subsequent sighting; they are never evicted during a session
//! (stale entries are tolerated, per spec).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use lsnp_types::FullId;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub user_id: FullId,
    pub display_name: String,
    pub addr: SocketAddr,
    pub last_seen: Instant,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ResolveError {
    Ambiguous(Vec<FullId>),
    NotFound,
}

/// Thread-safe table of known peers, shared by the controller, discovery
/// task, and periodic task.
///
/// Writes are serialized through the inner mutex; callers that also hold
/// the social-state or file-transfer locks must take this one first (§5
/// lock ordering: registry → social state → file-transfer).
#[derive(Clone)]
pub struct PeerRegistry {
    inner: Arc<Mutex<HashMap<FullId, PeerRecord>>>,
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Insert a newly discovered peer, or refresh an existing one's
    /// display name, address, and `last_seen`.
    pub async fn upsert(&self, user_id: FullId, display_name: String, addr: SocketAddr) {
        let mut map = self.inner.lock().await;
        map.insert(
            user_id.clone(),
            PeerRecord { user_id, display_name, addr, last_seen: Instant::now() },
        );
    }

    /// Refresh `last_seen` for an already-known peer without touching its
    /// display name or address, e.g. on a bare `PING`.
    pub async fn touch(&self, user_id: &FullId) {
        let mut map = self.inner.lock().await;
        if let Some(record) = map.get_mut(user_id) {
            record.last_seen = Instant::now();
        }
    }

    pub async fn lookup_full(&self, user_id: &FullId) -> Option<PeerRecord> {
        self.inner.lock().await.get(user_id).cloned()
    }

    /// Resolve a bare handle (the part before `@`) to a full id. Returns
    /// `Ambiguous` if more than one known peer shares the handle.
    pub async fn resolve_short(&self, handle: &str) -> Result<FullId, ResolveError> {
        let map = self.inner.lock().await;
        let matches: Vec<FullId> = map
            .keys()
            .filter(|id| id.handle() == handle)
            .cloned()
            .collect();
        match matches.len() {
            0 => Err(ResolveError::NotFound),
            1 => Ok(matches.into_iter().next().unwrap()),
            _ => Err(ResolveError::Ambiguous(matches)),
        }
    }

    pub async fn snapshot(&self) -> Vec<PeerRecord> {
        self.inner.lock().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

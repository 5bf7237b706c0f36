//! Peer controller: the one place that owns the transport, codec, peer
//! registry, reliability table, social state, and file-transfer engine, and
//! dispatches inbound records by `TYPE` into the right one.
//!
//! Generalizes the dispatch-table shape of a network message loop
//! (`match msg { NetworkMessage::Peer { .. } => ..., ... }`) from a handful
//! of message variants to the full LSNP `TYPE` set, and a fixed-interval
//! periodic broadcast loop into a configurable one.

pub mod config;
pub mod game;
pub mod group;

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use lsnp_core::{
    token::{mint, now_unix, validate},
    Dm, FileAccept, FileChunk, FileOffer, FileReceived, FileReject, Like, Post, Record,
};
use lsnp_network::{
    DeliveryOutcome, DiscoveryEvent, DiscoveryService, PeerRecord, PeerRegistry, ReliabilityLayer,
    ResolveError, Transport,
};
use lsnp_social::{InboxEntry, MyPost, PostInfo, SocialState};
use lsnp_transfer::{
    mime_for_path, ChunkOutcome, FileTransferEngine, OfferOutcome, OutgoingTransferTable,
    PendingOfferInfo, TransferSummary,
};
use lsnp_types::{
    FullId, Scope, FILE_OFFER_TIMEOUT_SECS, MAX_CHUNK_SIZE, MAX_DATAGRAM_SIZE,
};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

pub use config::Config;
pub use game::{GameSink, NullGameSink};
pub use group::GroupRouter;

/// Outcome of a `sendfile` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSendOutcome {
    Accepted,
    Rejected,
    TimedOut,
}

pub struct PeerController {
    pub id: FullId,
    config: Config,
    transport: Arc<Transport>,
    registry: PeerRegistry,
    reliability: Arc<ReliabilityLayer>,
    social: SocialState,
    transfer: FileTransferEngine,
    outgoing: OutgoingTransferTable,
    game_sink: Arc<dyn GameSink>,
    group_router: GroupRouter,
    /// File ids this peer has sent and received a `FILE_RECEIVED` for.
    completed_sends: tokio::sync::Mutex<HashSet<Uuid>>,
    default_ttl: AtomicU32,
    verbose: AtomicBool,
}

impl PeerController {
    /// Binds the UDP socket and assembles every owned subsystem. The only
    /// fatal startup failure is the socket bind itself; mDNS
    /// discovery is started separately by [`Self::spawn_tasks`] and is not
    /// fatal if unavailable.
    pub async fn bind(config: Config, game_sink: Arc<dyn GameSink>) -> anyhow::Result<Arc<Self>> {
        let transport = Transport::bind(config.port).await.map_err(|e| {
            tracing::error!(%e, "failed to bind UDP socket");
            e
        })?;
        let id = FullId::new(config.user.clone(), transport.local_ip());
        let transport = Arc::new(transport);
        let reliability = Arc::new(ReliabilityLayer::new(transport.clone()));
        let data_dir = config.data_dir.clone();
        let default_ttl = AtomicU32::new(config.default_ttl_secs);
        let verbose = AtomicBool::new(config.verbose);

        Ok(Arc::new(Self {
            id,
            config,
            transport,
            registry: PeerRegistry::new(),
            reliability,
            social: SocialState::new(),
            transfer: FileTransferEngine::new(data_dir),
            outgoing: OutgoingTransferTable::new(),
            game_sink,
            group_router: GroupRouter::new(),
            completed_sends: tokio::sync::Mutex::new(HashSet::new()),
            default_ttl,
            verbose,
        }))
    }

    /// Spawns the receive, retry, periodic, stall-abort, and post-prune
    /// tasks, plus discovery if the mDNS daemon is available. Returns the
    /// task handles; dropping them does not stop the tasks, only losing
    /// the ability to join them.
    pub fn spawn_tasks(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = vec![
            tokio::spawn(self.clone().receive_loop()),
            tokio::spawn(self.clone().retry_loop()),
            tokio::spawn(self.clone().periodic_loop()),
            tokio::spawn(self.clone().stall_loop()),
            tokio::spawn(self.clone().post_prune_loop()),
        ];

        match DiscoveryService::start(&self.id, &self.config.display_name, self.config.port) {
            Ok((service, mut rx)) => {
                let controller = self.clone();
                handles.push(tokio::spawn(async move {
                    let _service = service;
                    while let Some(event) = rx.recv().await {
                        controller.on_discovery_event(event).await;
                    }
                }));
            }
            Err(e) => warn!(%e, "mDNS discovery unavailable, continuing without it"),
        }

        handles
    }

    // ---- receive path ---------------------------------------------------

    async fn receive_loop(self: Arc<Self>) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let (n, src) = match self.transport.recv(&mut buf).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(%e, "transport recv error");
                    continue;
                }
            };
            let record = match Record::parse(&buf[..n]) {
                Ok(r) => r,
                Err(_) => {
                    if self.verbose.load(Ordering::Relaxed) {
                        debug!(%src, "dropped malformed datagram");
                    }
                    continue;
                }
            };
            let controller = self.clone();
            tokio::spawn(async move { controller.handle_record(record, src).await });
        }
    }

    async fn handle_record(&self, record: Record, src: SocketAddr) {
        let Some(message_type) = record.get("TYPE").map(str::to_string) else {
            self.note_anomaly("dropped record without TYPE");
            return;
        };
        let Some(from) = record.get("FROM").and_then(|s| s.parse::<FullId>().ok()) else {
            self.note_anomaly(&format!("dropped {message_type} without valid FROM"));
            return;
        };

        match message_type.as_str() {
            "ACK" => {
                if let Some(id) = record.get("MESSAGE_ID").and_then(|s| Uuid::parse_str(s).ok()) {
                    self.reliability.on_ack(id).await;
                }
            }
            "PROFILE" => {
                let display_name =
                    record.get("DISPLAY_NAME").unwrap_or_else(|| from.handle()).to_string();
                self.registry.upsert(from, display_name, src).await;
            }
            "PING" => {
                self.ensure_known(&from, src).await;
            }
            other => self.handle_scoped_record(other, &record, from, src).await,
        }
    }

    /// Every `TYPE` other than `ACK`/`PROFILE`/`PING`: token-checked,
    /// deduped, ACKed, and (on first sight) dispatched.
    async fn handle_scoped_record(
        &self,
        message_type: &str,
        record: &Record,
        from: FullId,
        src: SocketAddr,
    ) {
        let Some(expected_scope) = Scope::required_for_type(message_type) else {
            self.note_anomaly(&format!("dropped unknown TYPE {message_type}"));
            return;
        };
        let Some(token) = record.get("TOKEN") else {
            self.note_anomaly(&format!("dropped {message_type} missing TOKEN"));
            return;
        };
        if let Err(e) = validate(token, expected_scope, from.ip, now_unix()) {
            self.note_anomaly(&format!("token validation failed for {from}: {e}"));
            return;
        }
        let Some(message_id) = record.get("MESSAGE_ID").and_then(|s| Uuid::parse_str(s).ok())
        else {
            self.note_anomaly(&format!("dropped {message_type} missing MESSAGE_ID"));
            return;
        };

        self.ensure_known(&from, src).await;
        let is_new = self.reliability.mark_seen(&from, message_id).await;
        if is_new {
            if let Err(e) = self.dispatch(message_type, record, &from).await {
                self.note_anomaly(&format!("handler error for {message_type}: {e}"));
            }
        }
        self.send_ack(message_id, src).await;
    }

    async fn dispatch(&self, message_type: &str, record: &Record, from: &FullId) -> anyhow::Result<()> {
        match message_type {
            "DM" => {
                let dm = Dm::from_record(record)?;
                self.social.receive_dm(from.clone(), dm.content, dm.envelope.timestamp).await;
            }
            "POST" => {
                let post = Post::from_record(record)?;
                self.social
                    .receive_post(
                        from,
                        PostInfo {
                            post_id: post.post_id,
                            content: post.content,
                            ttl: post.ttl,
                            created_at: now_unix(),
                        },
                    )
                    .await;
            }
            "LIKE" => {
                let like = Like::from_record(record)?;
                self.social.apply_like(&like.post_id, from.clone(), like.action).await;
            }
            "FOLLOW" => {
                self.social.add_follower(from.clone()).await;
            }
            "UNFOLLOW" => {
                self.social.remove_follower(from).await;
            }
            "FILE_OFFER" => {
                let offer = FileOffer::from_record(record)?;
                self.transfer
                    .offer_received(offer.file_id, from.clone(), offer.filename, offer.filesize, offer.filetype)
                    .await;
            }
            "FILE_ACCEPT" => {
                let accept = FileAccept::from_record(record)?;
                self.outgoing.on_accept(accept.file_id).await;
            }
            "FILE_REJECT" => {
                let reject = FileReject::from_record(record)?;
                self.outgoing.on_reject(reject.file_id).await;
            }
            "FILE_CHUNK" => {
                let chunk = FileChunk::from_record(record)?;
                let outcome = self
                    .transfer
                    .on_chunk(chunk.file_id, chunk.chunk_index, chunk.total_chunks, &chunk.data_b64)
                    .await?;
                if matches!(outcome, ChunkOutcome::Completed(_)) {
                    self.send_file_received(chunk.file_id, from.clone()).await;
                }
            }
            "FILE_RECEIVED" => {
                let received = FileReceived::from_record(record)?;
                self.completed_sends.lock().await.insert(received.file_id);
            }
            "GAME_INVITE" | "GAME_MOVE" | "GAME_RESULT" => {
                self.game_sink.on_message(from.clone(), record.clone());
            }
            "GROUP_CREATE" => {
                let group_id = record
                    .get("GROUPID")
                    .ok_or_else(|| anyhow::anyhow!("GROUP_CREATE missing GROUPID"))?
                    .to_string();
                let members_raw = record
                    .get("MEMBERS")
                    .ok_or_else(|| anyhow::anyhow!("GROUP_CREATE missing MEMBERS"))?;
                let members = members_raw
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(|s| s.parse::<FullId>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| anyhow::anyhow!("bad MEMBERS field: {e}"))?;
                self.group_router.create_group(group_id, members).await;
            }
            "GROUP_MSG" => {
                let group_id = record
                    .get("GROUPID")
                    .ok_or_else(|| anyhow::anyhow!("GROUP_MSG missing GROUPID"))?;
                let content = record.get("CONTENT").unwrap_or_default();
                self.social
                    .receive_dm(from.clone(), format!("[{group_id}] {content}"), now_unix())
                    .await;
            }
            _ => {}
        }
        Ok(())
    }

    async fn ensure_known(&self, from: &FullId, src: SocketAddr) {
        if self.registry.lookup_full(from).await.is_none() {
            self.registry.upsert(from.clone(), from.handle().to_string(), src).await;
        } else {
            self.registry.touch(from).await;
        }
    }

    fn note_anomaly(&self, message: &str) {
        if self.verbose.load(Ordering::Relaxed) {
            debug!("{message}");
        }
    }

    async fn send_ack(&self, message_id: Uuid, dest: SocketAddr) {
        let record = self
            .base_record("ACK")
            .with("MESSAGE_ID", message_id.to_string());
        self.fire_and_forget(record, dest).await;
    }

    async fn send_file_received(&self, file_id: Uuid, to: FullId) {
        let Ok(dest) = self.resolve_addr(&to).await else { return };
        let record = self
            .base_record("FILE_RECEIVED")
            .with("FILEID", file_id.to_string())
            .with("STATUS", "COMPLETE");
        send_reliable(
            self.reliability.clone(),
            self.id.clone(),
            self.config.token_ttl_secs,
            Scope::File,
            record,
            dest,
        )
        .await;
    }

    // ---- background tasks ------------------------------------------------

    async fn retry_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            self.reliability.retry_due().await;
        }
    }

    async fn stall_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            let aborted = self.transfer.abort_stalled().await;
            for file_id in aborted {
                self.note_anomaly(&format!("aborted stalled transfer {file_id}"));
            }
        }
    }

    async fn post_prune_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            self.social.prune_expired(now_unix()).await;
        }
    }

    async fn periodic_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.periodic_interval_secs));
        loop {
            interval.tick().await;
            self.broadcast_profile().await;
            self.ping_stale_peers().await;
        }
    }

    /// Local "ping" command: sends `PING` to every known peer right away,
    /// independent of the periodic sweep's staleness threshold.
    pub async fn send_ping_all(&self) {
        for peer in self.registry.snapshot().await {
            let record = self.base_record("PING");
            self.fire_and_forget(record, peer.addr).await;
        }
    }

    async fn ping_stale_peers(&self) {
        let threshold = Duration::from_secs(self.config.periodic_interval_secs);
        let now = Instant::now();
        for peer in self.registry.snapshot().await {
            if now.duration_since(peer.last_seen) >= threshold {
                let record = self.base_record("PING");
                self.fire_and_forget(record, peer.addr).await;
            }
        }
    }

    async fn on_discovery_event(&self, event: DiscoveryEvent) {
        match event {
            DiscoveryEvent::PeerFound { user_id, display_name, addr } => {
                self.registry.upsert(user_id, display_name, addr).await;
            }
            // peers are never evicted during a session
            DiscoveryEvent::PeerLost { .. } => {}
        }
    }

    /// Manually registers a peer address, bypassing mDNS discovery. Useful
    /// for a bootstrap peer list on networks where multicast is unavailable,
    /// and for tests that wire two controllers together without a real
    /// mDNS daemon.
    pub async fn learn_peer(&self, id: FullId, display_name: String, addr: SocketAddr) {
        self.registry.upsert(id, display_name, addr).await;
    }

    // ---- outbound commands -------------------------------------------------

    pub async fn broadcast_profile(&self) {
        let record = self
            .base_record("PROFILE")
            .with("DISPLAY_NAME", self.config.display_name.clone());
        match record.serialize() {
            Ok(bytes) => {
                if let Err(e) = self.transport.send_broadcast(&bytes).await {
                    warn!(%e, "profile broadcast failed");
                }
            }
            Err(e) => warn!(%e, "failed to serialize PROFILE"),
        }
    }

    pub async fn send_dm(&self, to: FullId, content: String) -> anyhow::Result<DeliveryOutcome> {
        let dest = self.resolve_addr(&to).await?;
        let record = self.base_record("DM").with("TO", to.to_string()).with("CONTENT", content);
        Ok(self.send_scoped(record, Scope::Chat, dest).await)
    }

    pub async fn send_follow(&self, to: FullId) -> anyhow::Result<DeliveryOutcome> {
        let dest = self.resolve_addr(&to).await?;
        self.social.follow_locally(to).await;
        let record = self.base_record("FOLLOW");
        Ok(self.send_scoped(record, Scope::Follow, dest).await)
    }

    pub async fn send_unfollow(&self, to: FullId) -> anyhow::Result<DeliveryOutcome> {
        let dest = self.resolve_addr(&to).await?;
        self.social.unfollow_locally(&to).await;
        let record = self.base_record("UNFOLLOW");
        Ok(self.send_scoped(record, Scope::Follow, dest).await)
    }

    pub async fn send_like(&self, post_id: String, owner: FullId) -> anyhow::Result<DeliveryOutcome> {
        let action = self.social.toggle_like(&post_id).await;
        let dest = self.resolve_addr(&owner).await?;
        let record = self
            .base_record("LIKE")
            .with("POST_ID", post_id)
            .with("POST_OWNER", owner.to_string())
            .with("ACTION", action.to_string());
        Ok(self.send_scoped(record, Scope::Broadcast, dest).await)
    }

    /// Mints a post and fans it out to the current follower snapshot, one
    /// record per follower: fan-out happens at the source, there is no central feed.
    pub async fn send_post(&self, content: String, ttl: Option<u32>) -> PostInfo {
        let ttl = ttl.unwrap_or_else(|| self.default_ttl.load(Ordering::Relaxed));
        let post = self.social.create_post(content, ttl).await;
        for follower in self.social.followers_snapshot().await {
            let Ok(dest) = self.resolve_addr(&follower).await else { continue };
            let record = self
                .base_record("POST")
                .with("POST_ID", post.post_id.clone())
                .with("CONTENT", post.content.clone())
                .with("TTL", post.ttl.to_string());
            self.spawn_scoped_send(record, Scope::Broadcast, dest);
        }
        post
    }

    pub async fn send_file(
        &self,
        to: FullId,
        path: PathBuf,
        description: Option<String>,
    ) -> anyhow::Result<FileSendOutcome> {
        let bytes = tokio::fs::read(&path).await?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();
        let filesize = bytes.len() as u64;
        let filetype = mime_for_path(&path).to_string();
        let file_id = Uuid::new_v4();
        let dest = self.resolve_addr(&to).await?;

        let offer_rx = self.outgoing.offer(file_id, to, filename.clone()).await;
        let record = self
            .base_record("FILE_OFFER")
            .with("FILEID", file_id.to_string())
            .with("FILENAME", filename)
            .with("FILESIZE", filesize.to_string())
            .with("FILETYPE", filetype)
            .with("DESCRIPTION", description.unwrap_or_default());
        self.spawn_scoped_send(record, Scope::File, dest);

        match tokio::time::timeout(Duration::from_secs(FILE_OFFER_TIMEOUT_SECS), offer_rx).await {
            Ok(Ok(OfferOutcome::Accepted)) => {
                self.send_chunks(file_id, dest, bytes).await;
                Ok(FileSendOutcome::Accepted)
            }
            Ok(Ok(OfferOutcome::Rejected)) => Ok(FileSendOutcome::Rejected),
            _ => {
                self.outgoing.cancel(file_id).await;
                Ok(FileSendOutcome::TimedOut)
            }
        }
    }

    async fn send_chunks(&self, file_id: Uuid, dest: SocketAddr, bytes: Vec<u8>) {
        let chunks: Vec<&[u8]> = bytes.chunks(MAX_CHUNK_SIZE).collect();
        let total_chunks = chunks.len() as u32;
        for (index, chunk) in chunks.into_iter().enumerate() {
            let data_b64 = base64::engine::general_purpose::STANDARD.encode(chunk);
            let record = self
                .base_record("FILE_CHUNK")
                .with("FILEID", file_id.to_string())
                .with("CHUNK_INDEX", index.to_string())
                .with("TOTAL_CHUNKS", total_chunks.to_string())
                .with("CHUNK_SIZE", chunk.len().to_string())
                .with("DATA", data_b64);
            self.spawn_scoped_send(record, Scope::File, dest);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    pub async fn accept_file(&self, file_id: Uuid, sender: FullId) -> anyhow::Result<DeliveryOutcome> {
        if !self.transfer.accept(file_id).await {
            anyhow::bail!("no pending offer {file_id}");
        }
        let dest = self.resolve_addr(&sender).await?;
        let record = self.base_record("FILE_ACCEPT").with("FILEID", file_id.to_string());
        Ok(self.send_scoped(record, Scope::File, dest).await)
    }

    pub async fn reject_file(&self, file_id: Uuid, sender: FullId) -> anyhow::Result<DeliveryOutcome> {
        if !self.transfer.reject(file_id).await {
            anyhow::bail!("no pending offer {file_id}");
        }
        let dest = self.resolve_addr(&sender).await?;
        let record = self.base_record("FILE_REJECT").with("FILEID", file_id.to_string());
        Ok(self.send_scoped(record, Scope::File, dest).await)
    }

    pub async fn send_group_create(&self, group_id: String, members: Vec<FullId>) {
        self.group_router.create_group(group_id.clone(), members.clone()).await;
        let members_field = members.iter().map(FullId::to_string).collect::<Vec<_>>().join(",");
        for member in members {
            if member == self.id {
                continue;
            }
            let Ok(dest) = self.resolve_addr(&member).await else { continue };
            let record = self
                .base_record("GROUP_CREATE")
                .with("GROUPID", group_id.clone())
                .with("MEMBERS", members_field.clone());
            self.spawn_scoped_send(record, Scope::Group, dest);
        }
    }

    pub async fn send_group_msg(&self, group_id: String, content: String) -> anyhow::Result<()> {
        let Some(members) = self.group_router.members(&group_id).await else {
            anyhow::bail!("unknown group {group_id}");
        };
        for member in members {
            if member == self.id {
                continue;
            }
            let Ok(dest) = self.resolve_addr(&member).await else { continue };
            let record = self
                .base_record("GROUP_MSG")
                .with("GROUPID", group_id.clone())
                .with("CONTENT", content.clone());
            self.spawn_scoped_send(record, Scope::Group, dest);
        }
        Ok(())
    }

    /// Cancels a pending outbound send; no failure is reported upstream
    /// once sent.
    pub async fn cancel_pending_file_offer(&self, file_id: Uuid) {
        self.outgoing.cancel(file_id).await;
    }

    // ---- queries used by the command surface ---------------------------

    /// The address this peer's transport is actually bound to. Useful for
    /// out-of-band address exchange (tests, or a bootstrap peer list) when
    /// mDNS discovery isn't available.
    pub fn local_addr(&self) -> SocketAddr {
        SocketAddr::new(self.transport.local_ip().into(), self.transport.port())
    }

    /// Base directory downloaded files are written under (spec §6):
    /// `<data_dir>/<sender_full_id>/downloads/<filename>`.
    pub fn data_dir(&self) -> &std::path::Path {
        &self.config.data_dir
    }

    pub async fn peers(&self) -> Vec<PeerRecord> {
        self.registry.snapshot().await
    }

    pub async fn resolve_short(&self, handle: &str) -> Result<FullId, ResolveError> {
        self.registry.resolve_short(handle).await
    }

    pub async fn dms(&self) -> Vec<InboxEntry> {
        self.social.inbox_snapshot().await
    }

    pub async fn my_posts(&self) -> Vec<MyPost> {
        self.social.my_posts_snapshot().await
    }

    pub async fn posts_seen(&self) -> Vec<PostInfo> {
        self.social.posts_seen_snapshot().await
    }

    pub async fn pending_files(&self) -> Vec<TransferSummary> {
        self.transfer.pending_offers().await
    }

    pub async fn transfers(&self) -> Vec<TransferSummary> {
        self.transfer.all_transfers().await
    }

    pub async fn pending_outgoing_offers(&self) -> Vec<PendingOfferInfo> {
        self.outgoing.pending_snapshot().await
    }

    pub fn set_ttl(&self, ttl_secs: u32) {
        self.default_ttl.store(ttl_secs, Ordering::Relaxed);
    }

    pub fn toggle_verbose(&self) -> bool {
        let new_value = !self.verbose.load(Ordering::Relaxed);
        self.verbose.store(new_value, Ordering::Relaxed);
        new_value
    }

    // ---- helpers --------------------------------------------------------

    fn base_record(&self, message_type: &str) -> Record {
        Record::new()
            .with("TYPE", message_type)
            .with("FROM", self.id.to_string())
            .with("TIMESTAMP", now_unix().to_string())
    }

    async fn resolve_addr(&self, to: &FullId) -> anyhow::Result<SocketAddr> {
        self.registry
            .lookup_full(to)
            .await
            .map(|p| p.addr)
            .ok_or_else(|| anyhow::anyhow!("peer {to} is not known"))
    }

    async fn send_scoped(&self, record: Record, scope: Scope, dest: SocketAddr) -> DeliveryOutcome {
        send_reliable(self.reliability.clone(), self.id.clone(), self.config.token_ttl_secs, scope, record, dest)
            .await
    }

    /// Fire a scoped send in the background without awaiting delivery,
    /// used for fan-out where the caller doesn't block on
    /// every recipient's ACK individually.
    fn spawn_scoped_send(&self, record: Record, scope: Scope, dest: SocketAddr) {
        let reliability = self.reliability.clone();
        let id = self.id.clone();
        let token_ttl = self.config.token_ttl_secs;
        tokio::spawn(async move {
            send_reliable(reliability, id, token_ttl, scope, record, dest).await;
        });
    }

    async fn fire_and_forget(&self, record: Record, dest: SocketAddr) {
        match record.serialize() {
            Ok(bytes) => {
                if let Err(e) = self.transport.send_unicast(dest, &bytes).await {
                    warn!(%e, "send failed");
                }
            }
            Err(e) => warn!(%e, "failed to serialize record"),
        }
    }
}

/// Mints a token for `scope`, tags `record` with a fresh `MESSAGE_ID`, and
/// hands it to the reliability layer. Free function (rather than a method)
/// so fan-out call sites can spawn it without holding a controller
/// reference across the `.await`.
async fn send_reliable(
    reliability: Arc<ReliabilityLayer>,
    from: FullId,
    token_ttl_secs: u64,
    scope: Scope,
    mut record: Record,
    dest: SocketAddr,
) -> DeliveryOutcome {
    let message_id = Uuid::new_v4();
    record
        .set("MESSAGE_ID", message_id.to_string())
        .set("TOKEN", mint(&from, scope, token_ttl_secs));
    let bytes = match record.serialize() {
        Ok(b) => b,
        Err(e) => {
            warn!(%e, "failed to serialize outbound record");
            return DeliveryOutcome::Failed;
        }
    };
    reliability.send_reliable(message_id, dest, bytes).await
}

//! End-to-end scenarios from spec §8, wiring real `PeerController`s together
//! over loopback UDP on ephemeral ports. No mocked transport: these tests
//! bind real sockets and let the reliability layer's actual retry timing
//! run, so `dm_with_loss_recovers_on_retry` takes a couple of seconds.
//!
//! Two tests drop a chosen datagram via a small relay socket sitting
//! between sender and receiver — a man-in-the-middle UDP proxy that
//! forwards everything except the Nth datagram matching a predicate, and
//! passes return traffic (ACKs) straight through. `learn_peer` seeds each
//! controller's registry directly, standing in for mDNS discovery (already
//! covered at the unit level in `lsnp-network`) or a manual bootstrap list.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lsnp_controller::{Config, FileSendOutcome, NullGameSink, PeerController};
use lsnp_core::{token, Record};
use lsnp_network::DeliveryOutcome;
use lsnp_types::{FullId, Scope};
use tokio::net::UdpSocket;
use uuid::Uuid;

async fn spawn_peer(user: &str) -> Arc<PeerController> {
    let mut config = Config::new(user);
    config.port = 0;
    config.data_dir = std::env::temp_dir().join(format!("lsnp-test-{user}-{}", Uuid::new_v4()));
    let controller = PeerController::bind(config, Arc::new(NullGameSink)).await.unwrap();
    let _ = controller.spawn_tasks();
    controller
}

/// Relays datagrams from whichever client first talks to it over to
/// `target`, forwarding `target`'s replies straight back. `should_drop` is
/// consulted only for the client->target direction.
///
/// Binds on `target`'s own IP (not loopback) so that a relayed datagram's
/// source address still matches the original sender's `FROM` token field —
/// token validation checks the sender IP, and the real sender and this
/// relay are both on the same host's address in these tests.
async fn spawn_relay(
    target: SocketAddr,
    mut should_drop: impl FnMut(&[u8]) -> bool + Send + 'static,
) -> SocketAddr {
    let relay = UdpSocket::bind((target.ip(), 0)).await.unwrap();
    let relay_addr = relay.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 65536];
        let mut client_addr: Option<SocketAddr> = None;
        loop {
            let (n, src) = match relay.recv_from(&mut buf).await {
                Ok(v) => v,
                Err(_) => break,
            };
            if src == target {
                if let Some(client) = client_addr {
                    let _ = relay.send_to(&buf[..n], client).await;
                }
                continue;
            }
            client_addr = Some(src);
            if should_drop(&buf[..n]) {
                continue;
            }
            let _ = relay.send_to(&buf[..n], target).await;
        }
    });
    relay_addr
}

#[tokio::test]
async fn profile_discovery_populates_registry_without_a_dm() {
    let b = spawn_peer("bob").await;

    let from = FullId::new("alice", Ipv4Addr::LOCALHOST);
    let profile = Record::new()
        .with("TYPE", "PROFILE")
        .with("FROM", from.to_string())
        .with("TIMESTAMP", "1000")
        .with("DISPLAY_NAME", "Alice");
    let sock = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    sock.send_to(&profile.serialize().unwrap(), b.local_addr()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let peers = b.peers().await;
    assert!(peers.iter().any(|p| p.user_id == from && p.display_name == "Alice"));
}

#[tokio::test]
async fn dm_with_loss_recovers_on_retry() {
    let a = spawn_peer("alice").await;
    let b = spawn_peer("bob").await;

    let dropped_once = AtomicU32::new(0);
    let relay_addr = spawn_relay(b.local_addr(), move |bytes| {
        let is_dm = matches!(Record::parse(bytes), Ok(r) if r.get("TYPE") == Some("DM"));
        is_dm && dropped_once.fetch_add(1, Ordering::SeqCst) == 0
    })
    .await;

    a.learn_peer(b.id.clone(), "bob".into(), relay_addr).await;

    let outcome = a.send_dm(b.id.clone(), "hi".to_string()).await.unwrap();
    assert_eq!(outcome, DeliveryOutcome::Delivered);

    let inbox = b.dms().await;
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].content, "hi");
}

#[tokio::test]
async fn idempotent_receive_dedups_inbox_but_acks_every_replay() {
    let b = spawn_peer("bob").await;
    let ghost = FullId::new("ghost", Ipv4Addr::LOCALHOST);
    let message_id = Uuid::new_v4();
    let record = Record::new()
        .with("TYPE", "DM")
        .with("FROM", ghost.to_string())
        .with("TIMESTAMP", "1000")
        .with("MESSAGE_ID", message_id.to_string())
        .with("TOKEN", token::mint(&ghost, Scope::Chat, 60))
        .with("TO", b.id.to_string())
        .with("CONTENT", "hi");
    let bytes = record.serialize().unwrap();

    let sock = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let mut acks = 0;
    for _ in 0..5 {
        sock.send_to(&bytes, b.local_addr()).await.unwrap();
        let mut buf = [0u8; 256];
        let (n, _) = tokio::time::timeout(Duration::from_secs(1), sock.recv_from(&mut buf))
            .await
            .expect("ack timed out")
            .unwrap();
        let ack = Record::parse(&buf[..n]).unwrap();
        assert_eq!(ack.get("TYPE"), Some("ACK"));
        assert_eq!(ack.get("MESSAGE_ID"), Some(message_id.to_string().as_str()));
        acks += 1;
    }

    assert_eq!(acks, 5);
    assert_eq!(b.dms().await.len(), 1);
}

#[tokio::test]
async fn token_expiry_drops_the_message() {
    let b = spawn_peer("bob").await;
    let ghost = FullId::new("ghost", Ipv4Addr::LOCALHOST);
    let expired_token = token::mint_at(&ghost, Scope::Chat, 1, token::now_unix().saturating_sub(10));
    let record = Record::new()
        .with("TYPE", "DM")
        .with("FROM", ghost.to_string())
        .with("TIMESTAMP", "1000")
        .with("MESSAGE_ID", Uuid::new_v4().to_string())
        .with("TOKEN", expired_token)
        .with("TO", b.id.to_string())
        .with("CONTENT", "should not arrive");

    let sock = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    sock.send_to(&record.serialize().unwrap(), b.local_addr()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(b.dms().await.is_empty());
}

#[tokio::test]
async fn follow_unfollow_post_gates_fanout() {
    let a = spawn_peer("alice").await;
    let b = spawn_peer("bob").await;
    a.learn_peer(b.id.clone(), "bob".into(), b.local_addr()).await;

    a.send_follow(b.id.clone()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    b.send_post("hello".to_string(), None).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(a.posts_seen().await.len(), 1);

    a.send_unfollow(b.id.clone()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    b.send_post("world".to_string(), None).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    let seen = a.posts_seen().await;
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].content, "hello");
}

#[tokio::test]
async fn file_transfer_survives_one_dropped_chunk() {
    let a = spawn_peer("alice").await;
    let b = spawn_peer("bob").await;

    let dropped_chunk_2 = AtomicU32::new(0);
    let relay_addr = spawn_relay(b.local_addr(), move |bytes| {
        let Ok(record) = Record::parse(bytes) else { return false };
        let is_target_chunk =
            record.get("TYPE") == Some("FILE_CHUNK") && record.get("CHUNK_INDEX") == Some("2");
        is_target_chunk && dropped_chunk_2.fetch_add(1, Ordering::SeqCst) == 0
    })
    .await;
    a.learn_peer(b.id.clone(), "bob".into(), relay_addr).await;

    let body: Vec<u8> = (0..3172u32).map(|i| (i % 251) as u8).collect();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("payload.bin");
    tokio::fs::write(&path, &body).await.unwrap();

    let send_task = {
        let a = a.clone();
        let b_id = b.id.clone();
        tokio::spawn(async move { a.send_file(b_id, path, None).await.unwrap() })
    };

    // accept as soon as the offer shows up
    loop {
        if let Some(offer) = b.pending_files().await.into_iter().next() {
            b.accept_file(offer.file_id, offer.sender).await.unwrap();
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let outcome = send_task.await.unwrap();
    assert_eq!(outcome, FileSendOutcome::Accepted);

    wait_for_completion(&b).await;
    let downloaded = b.data_dir().join(a.id.to_string()).join("downloads").join("payload.bin");
    let written = tokio::fs::read(&downloaded).await.unwrap();
    assert_eq!(written, body);
}

async fn wait_for_completion(b: &PeerController) {
    for _ in 0..100 {
        let transfers = b.transfers().await;
        if transfers
            .iter()
            .any(|t| t.filename == "payload.bin" && t.state == lsnp_transfer::IncomingState::Complete)
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("transfer never completed");
}

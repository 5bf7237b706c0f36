use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use lsnp_network::{PeerRegistry, ReliabilityLayer, Transport};
use uuid::Uuid;

#[tokio::test]
async fn two_transports_exchange_unicast() {
    let a = Transport::bind(0).await.unwrap();
    let b = Transport::bind(0).await.unwrap();
    let b_addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), b.port());

    a.send_unicast(b_addr, b"PING").await.unwrap();
    let mut buf = [0u8; 64];
    let (n, _src) = b.recv(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"PING");
}

#[tokio::test]
async fn registry_upsert_is_visible_across_clones() {
    let registry = PeerRegistry::new();
    let clone = registry.clone();

    let alice: lsnp_types::FullId = "alice@192.168.1.5".parse().unwrap();
    clone.upsert(alice.clone(), "Alice".to_string(), "192.168.1.5:50999".parse().unwrap()).await;

    assert_eq!(registry.len().await, 1);
    assert_eq!(registry.resolve_short("alice").await, Ok(alice));
}

#[tokio::test]
async fn reliable_send_between_two_real_sockets_completes_on_ack() {
    let sender_transport = Arc::new(Transport::bind(0).await.unwrap());
    let receiver = Transport::bind(0).await.unwrap();
    let receiver_addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), receiver.port());

    let layer = Arc::new(ReliabilityLayer::new(sender_transport));
    let message_id = Uuid::new_v4();

    let layer2 = layer.clone();
    let send_handle = tokio::spawn(async move {
        layer2.send_reliable(message_id, receiver_addr, b"DM payload".to_vec()).await
    });

    let mut buf = [0u8; 64];
    let (n, _src) = receiver.recv(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"DM payload");

    layer.on_ack(message_id).await;
    let outcome = send_handle.await.unwrap();
    assert_eq!(outcome, lsnp_network::DeliveryOutcome::Delivered);
}

//! Two-peer protocol exchanges over loopback TCP.

use graphite_network::{
    NetworkCommand, NetworkConfig, NetworkEvent, NetworkService, PeerId, WireMessage,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(10);

fn free_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

fn config(listen: SocketAddr, node_id: &str) -> NetworkConfig {
    NetworkConfig {
        listen_addr: listen,
        network_id: "graphite-test".into(),
        node_id: node_id.into(),
        max_peers: 8,
        max_frame: 1024 * 1024,
    }
}

async fn next_event(rx: &mut mpsc::Receiver<NetworkEvent>) -> NetworkEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event stream closed")
}

/// Wait for a specific event kind, skipping others.
async fn wait_for<T>(
    rx: &mut mpsc::Receiver<NetworkEvent>,
    mut pick: impl FnMut(NetworkEvent) -> Option<T>,
) -> T {
    loop {
        if let Some(found) = pick(next_event(rx).await) {
            return found;
        }
    }
}

#[tokio::test]
async fn test_handshake_and_tip_exchange() {
    let addr_a = free_addr();
    let addr_b = free_addr();

    let (service_a, mut events_a, _commands_a, tip_a) = NetworkService::new(config(addr_a, "aa"));
    let (service_b, mut events_b, commands_b, _tip_b) = NetworkService::new(config(addr_b, "bb"));
    tip_a.set(5, "aa55".into());

    tokio::spawn(service_a.run());
    tokio::spawn(service_b.run());
    tokio::time::sleep(Duration::from_millis(100)).await;

    commands_b
        .send(NetworkCommand::Connect { addr: addr_a })
        .await
        .unwrap();

    // Both sides complete the handshake.
    wait_for(&mut events_a, |e| match e {
        NetworkEvent::PeerReady { peer_id } => Some(peer_id),
        _ => None,
    })
    .await;
    wait_for(&mut events_b, |e| match e {
        NetworkEvent::PeerReady { peer_id } => Some(peer_id),
        _ => None,
    })
    .await;

    // B learns A's tip, announced at height 5.
    let (height, hash_hex) = wait_for(&mut events_b, |e| match e {
        NetworkEvent::TipAnnounced {
            height, hash_hex, ..
        } => Some((height, hash_hex)),
        _ => None,
    })
    .await;
    assert_eq!(height, 5);
    assert_eq!(hash_hex, "aa55");
}

#[tokio::test]
async fn test_block_request_routing() {
    let addr_a = free_addr();
    let addr_b = free_addr();

    let (service_a, mut events_a, commands_a, _tip_a) = NetworkService::new(config(addr_a, "aa"));
    let (service_b, mut events_b, commands_b, _tip_b) = NetworkService::new(config(addr_b, "bb"));

    tokio::spawn(service_a.run());
    tokio::spawn(service_b.run());
    tokio::time::sleep(Duration::from_millis(100)).await;

    commands_b
        .send(NetworkCommand::Connect { addr: addr_a })
        .await
        .unwrap();

    let peer_at_a: PeerId = wait_for(&mut events_a, |e| match e {
        NetworkEvent::PeerReady { peer_id } => Some(peer_id),
        _ => None,
    })
    .await;

    commands_a
        .send(NetworkCommand::Send {
            peer_id: peer_at_a,
            message: WireMessage::GetBlock {
                hash_hex: "00ff".into(),
            },
        })
        .await
        .unwrap();

    let hash_hex = wait_for(&mut events_b, |e| match e {
        NetworkEvent::BlockRequested { hash_hex, .. } => Some(hash_hex),
        _ => None,
    })
    .await;
    assert_eq!(hash_hex, "00ff");
}

#[tokio::test]
async fn test_wrong_network_is_disconnected() {
    let addr_a = free_addr();
    let (service_a, mut events_a, _commands_a, _tip_a) = NetworkService::new(config(addr_a, "aa"));
    tokio::spawn(service_a.run());
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut stream = tokio::net::TcpStream::connect(addr_a).await.unwrap();
    stream
        .write_all(
            b"{\"type\":\"version\",\"network_id\":\"other-net\",\"node_id\":\"xx\",\"height\":0,\"hash_hex\":\"\"}\n",
        )
        .await
        .unwrap();

    // The server closes on the mismatch; reads drain to EOF.
    let mut buf = Vec::new();
    let read = tokio::time::timeout(WAIT, stream.read_to_end(&mut buf)).await;
    assert!(read.is_ok(), "server should close the connection");

    // No handshake event fired.
    assert!(
        tokio::time::timeout(Duration::from_millis(300), events_a.recv())
            .await
            .is_err(),
        "no event expected for a rejected peer"
    );
}

#[tokio::test]
async fn test_message_before_handshake_closes_peer() {
    let addr_a = free_addr();
    let (service_a, _events_a, _commands_a, _tip_a) = NetworkService::new(config(addr_a, "aa"));
    tokio::spawn(service_a.run());
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut stream = tokio::net::TcpStream::connect(addr_a).await.unwrap();
    stream.write_all(b"{\"type\":\"getTip\"}\n").await.unwrap();

    let mut buf = Vec::new();
    let read = tokio::time::timeout(WAIT, stream.read_to_end(&mut buf)).await;
    assert!(read.is_ok(), "server should close the connection");
}

#[tokio::test]
async fn test_oversized_frame_closes_peer() {
    let addr_a = free_addr();
    let mut small = config(addr_a, "aa");
    small.max_frame = 512;
    let (service_a, _events_a, _commands_a, _tip_a) = NetworkService::new(small);
    tokio::spawn(service_a.run());
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut stream = tokio::net::TcpStream::connect(addr_a).await.unwrap();
    stream.write_all(&vec![b'z'; 4096]).await.unwrap();

    let mut buf = Vec::new();
    let read = tokio::time::timeout(WAIT, stream.read_to_end(&mut buf)).await;
    assert!(read.is_ok(), "server should close on an oversized frame");
}

//! Integration tests for the relay backend: a client registering,
//! requesting the peer list, and relaying a payload to another client
//! through the server.

use std::net::SocketAddr;
use std::time::Duration;

use dni_discovery::relay::{RelayClient, RelayEvent, RelayServer};
use tokio::time;

#[tokio::test]
async fn client_registers_and_appears_in_list() {
    let server = RelayServer::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let server_addr = server.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.run().await;
    });

    let client = RelayClient::bind(
        server_addr,
        "aaaaaaaaaaaaaaaa".to_string(),
        [1u8; 32],
        "Alice".to_string(),
    )
    .await
    .unwrap();
    time::timeout(Duration::from_secs(2), client.register_with_backoff())
        .await
        .unwrap()
        .unwrap();

    client.request_list().await.unwrap();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move { client.recv_loop(tx).await });

    let event = time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        RelayEvent::PeerList(entries) => {
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].fingerprint, "aaaaaaaaaaaaaaaa");
        }
        RelayEvent::Relayed { .. } => panic!("expected a peer list"),
    }
}

#[tokio::test]
async fn two_clients_relay_a_payload() {
    let server = RelayServer::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let server_addr: SocketAddr = server.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.run().await;
    });

    let alice = RelayClient::bind(
        server_addr,
        "aaaaaaaaaaaaaaaa".to_string(),
        [1u8; 32],
        "Alice".to_string(),
    )
    .await
    .unwrap();
    let bob = RelayClient::bind(
        server_addr,
        "bbbbbbbbbbbbbbbb".to_string(),
        [2u8; 32],
        "Bob".to_string(),
    )
    .await
    .unwrap();

    time::timeout(Duration::from_secs(2), alice.register_with_backoff())
        .await
        .unwrap()
        .unwrap();
    time::timeout(Duration::from_secs(2), bob.register_with_backoff())
        .await
        .unwrap()
        .unwrap();

    let (bob_tx, mut bob_rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move { bob.recv_loop(bob_tx).await });

    alice
        .relay_to("bbbbbbbbbbbbbbbb", b"hello bob")
        .await
        .unwrap();

    let event = time::timeout(Duration::from_secs(2), bob_rx.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        RelayEvent::Relayed {
            src_fingerprint,
            payload,
        } => {
            assert_eq!(src_fingerprint, "aaaaaaaaaaaaaaaa");
            assert_eq!(payload, b"hello bob");
        }
        RelayEvent::PeerList(_) => panic!("expected a relayed payload"),
    }
}

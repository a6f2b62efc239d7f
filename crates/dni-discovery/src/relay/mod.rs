//! Relay backend (§4.4): a dumb, untrusted UDP forwarder clients register
//! with so peers unreachable by LAN discovery can still exchange packets.
//!
//! The relay observes source IP, fingerprints, and payload sizes/timings;
//! it cannot read message contents, since forwarded payloads are full
//! peer-to-peer packets that remain Noise-encrypted end to end.
//!
//! ```rust,no_run
//! use dni_discovery::relay::RelayClient;
//! use std::net::SocketAddr;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let relay_addr: SocketAddr = "relay.example.com:7777".parse()?;
//! let client = RelayClient::bind(
//!     relay_addr,
//!     "0123456789abcdef".to_string(),
//!     [0u8; 32],
//!     "Alice".to_string(),
//! )
//! .await?;
//! client.register_with_backoff().await?;
//! client.relay_to("fedcba9876543210", b"hello").await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod protocol;
pub mod server;

pub use client::{RelayClient, RelayClientState, RelayEvent, REGISTER_INTERVAL};
pub use protocol::{RelayMessage, RelayOpcode, RelayPeerInfo};
pub use server::{RelayServer, EVICTION_TIMEOUT};

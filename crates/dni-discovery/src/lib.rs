//! # dni-discovery
//!
//! The Discovery Fabric (§4.4): two backends running concurrently, merged
//! into a single peer-observation stream.
//!
//! - [`mdns`]: LAN backend via multicast DNS (`_dni-im._udp.local.`).
//! - [`relay`]: a dumb, untrusted UDP forwarder clients register with.
//! - [`manager`]: merges both into `dni_core::peer::PeerEndpoint`
//!   observations, applying the LAN-supersedes-relay-for-30s policy.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod manager;
pub mod mdns;
pub mod relay;

pub use error::DiscoveryError;
pub use manager::{DiscoveryConfig, DiscoveryFabric, LAN_SUPPRESSES_RELAY_FOR};
pub use mdns::{LanDiscovery, LanPeer, SERVICE_TYPE};

//! Peer endpoint tracking (§3, §4.4).
//!
//! Ephemeral, in-memory: where a fingerprint was last observed reachable,
//! and by which discovery backend. Superseded whenever a newer observation
//! arrives, with LAN preferred over relay.

use std::net::SocketAddr;
use std::time::Instant;

use crate::identity::Fingerprint;

/// Which backend produced an endpoint observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerSource {
    /// Learned from an mDNS advertisement on the local network.
    Lan,
    /// Learned from a relay's `LIST_RESP`.
    Relay,
    /// Added explicitly by the user via `add_peer_manual`.
    Manual,
}

impl PeerSource {
    /// Whether `self` should replace an existing observation from `other`.
    ///
    /// LAN supersedes relay (lower latency); manual supersedes both and is
    /// never superseded by a passive discovery observation (§4.4).
    #[must_use]
    pub fn supersedes(self, other: PeerSource) -> bool {
        use PeerSource::{Lan, Manual, Relay};
        match (self, other) {
            (Manual, _) => true,
            (_, Manual) => false,
            (Lan, Relay) => true,
            (Relay, Lan) => false,
            _ => true,
        }
    }
}

/// A reachable address for a peer, as last observed.
#[derive(Debug, Clone)]
pub struct PeerEndpoint {
    /// The peer this endpoint belongs to.
    pub fingerprint: Fingerprint,
    /// Transport-layer address to send packets to.
    pub transport_address: SocketAddr,
    /// When this observation was recorded.
    pub last_seen: Instant,
    /// Which backend produced it.
    pub source: PeerSource,
    /// The peer's claimed static public key, carried in the mDNS TXT
    /// record, the relay's `LIST_RESP`, or supplied directly to
    /// `add_peer_manual`. Needed to open the Noise IK handshake before any
    /// session exists; still subject to TOFU pinning once the handshake
    /// actually completes.
    pub static_pub: [u8; 32],
    /// The peer's claimed display name, if the observation carried one.
    pub display_name: Option<String>,
}

impl PeerEndpoint {
    /// Construct a fresh observation, timestamped now.
    #[must_use]
    pub fn new(
        fingerprint: Fingerprint,
        transport_address: SocketAddr,
        source: PeerSource,
        static_pub: [u8; 32],
    ) -> Self {
        Self {
            fingerprint,
            transport_address,
            last_seen: Instant::now(),
            source,
            static_pub,
            display_name: None,
        }
    }

    /// Attach a display name learned alongside this observation.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Whether `new_source` should replace this endpoint's recorded
    /// observation, per the merging policy (§4.4).
    #[must_use]
    pub fn should_be_superseded_by(&self, new_source: PeerSource) -> bool {
        new_source.supersedes(self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lan_supersedes_relay() {
        assert!(PeerSource::Lan.supersedes(PeerSource::Relay));
        assert!(!PeerSource::Relay.supersedes(PeerSource::Lan));
    }

    #[test]
    fn manual_supersedes_everything() {
        assert!(PeerSource::Manual.supersedes(PeerSource::Lan));
        assert!(PeerSource::Manual.supersedes(PeerSource::Relay));
    }

    #[test]
    fn nothing_supersedes_manual() {
        assert!(!PeerSource::Lan.supersedes(PeerSource::Manual));
        assert!(!PeerSource::Relay.supersedes(PeerSource::Manual));
    }

    #[test]
    fn same_source_refresh_supersedes() {
        assert!(PeerSource::Lan.supersedes(PeerSource::Lan));
    }

    #[test]
    fn endpoint_reports_supersession_correctly() {
        let endpoint = PeerEndpoint::new(
            "fp".to_string(),
            "127.0.0.1:1".parse().unwrap(),
            PeerSource::Relay,
            [0u8; 32],
        );
        assert!(endpoint.should_be_superseded_by(PeerSource::Lan));
        assert!(endpoint.should_be_superseded_by(PeerSource::Relay));
    }
}

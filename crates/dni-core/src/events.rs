//! UI interface (§6): commands the UI issues, events the core emits.
//!
//! The UI itself is out of scope; these types are the contract. A single
//! input channel carries `Inbound` packets, `Peer` observations, and
//! `Command`s into the Session task (§5, §9); a single output channel (or
//! broadcast) carries `Event`s back out.

use std::net::SocketAddr;

use crate::identity::Fingerprint;
use crate::peer::PeerSource;

/// A command issued by the UI.
#[derive(Debug, Clone)]
pub enum Command {
    /// Send a plaintext message to a fingerprint on a logical stream.
    Send {
        /// Recipient.
        fingerprint: Fingerprint,
        /// Logical channel.
        stream_id: u16,
        /// Payload.
        plaintext: Vec<u8>,
    },
    /// Request the current known peer list.
    ListPeers,
    /// Forget a contact and its endpoint.
    DeletePeer(Fingerprint),
    /// Add a peer without waiting for discovery.
    AddPeerManual {
        /// The peer's claimed fingerprint.
        fingerprint: Fingerprint,
        /// Where to reach it.
        address: SocketAddr,
        /// Its claimed static public key (still subject to TOFU pinning
        /// on first handshake).
        static_pub: [u8; 32],
    },
}

/// Result of a `Command::Send` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// No session exists yet; the message was durably enqueued and a
    /// handshake was initiated (or one was already in flight).
    Queued,
    /// An established session existed; the message was encrypted and
    /// handed to the transport immediately.
    Sent,
}

/// An event emitted by the core to the UI.
#[derive(Debug, Clone)]
pub enum Event {
    /// A new peer endpoint was observed for the first time.
    PeerDiscovered {
        /// Who was discovered.
        fingerprint: Fingerprint,
        /// Its display name, if known.
        name: Option<String>,
        /// Which backend produced the observation.
        source: PeerSource,
    },
    /// A previously known peer's endpoint expired (mDNS TTL, relay
    /// eviction) with no replacement observation.
    PeerLost(Fingerprint),
    /// A session with this peer reached `Established`.
    SessionEstablished(Fingerprint),
    /// A session with this peer was closed, with a human-readable reason.
    SessionClosed {
        /// Which peer.
        fingerprint: Fingerprint,
        /// Why (idle timeout, AEAD failure, pinning violation, ...).
        reason: String,
    },
    /// A plaintext message was received and decrypted.
    MessageReceived {
        /// Who sent it.
        fingerprint: Fingerprint,
        /// Which logical stream.
        stream_id: u16,
        /// The decrypted payload.
        plaintext: Vec<u8>,
    },
    /// A peer's handshake presented a static key different from the
    /// pinned one. Prominent; the core refuses further sessions with this
    /// fingerprint until the user explicitly re-pins (§9).
    PinningViolation(Fingerprint),
}

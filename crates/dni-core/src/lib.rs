//! # dni-core
//!
//! Core protocol state for the peer-to-peer instant messenger: the packet
//! codec, session state machine and handshake driver, the session manager
//! that ties sessions to a transport, the durable message queue, the
//! contact book (TOFU pinning), local identity, and the UI-facing
//! command/event interface.
//!
//! ## Module Structure
//!
//! - [`packet`]: fixed-header wire codec for the four packet types
//! - [`session`]: per-peer state machine (`Initiating` -> `AwaitingResponse`
//!   -> `Established` -> `Closed`) and the Noise IK handshake/transport
//!   cipher it drives
//! - [`manager`]: the `SessionManager`, which dispatches inbound packets to
//!   sessions, drains the message queue when a peer becomes reachable, and
//!   sweeps idle sessions
//! - [`peer`]: ephemeral endpoint observations from the discovery fabric
//! - [`identity`]: this installation's fingerprint, display name and
//!   static keypair
//! - [`contacts`]: the Trust-On-First-Use pin store
//! - [`queue`]: the durable per-recipient message FIFO
//! - [`events`]: the command/event contract the UI is built on
//! - [`config`]: on-disk configuration
//! - [`persist`]: atomic write-temp-then-rename helper shared by the above
//! - [`error`]: the error taxonomy for the whole crate

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod contacts;
pub mod error;
pub mod events;
pub mod identity;
pub mod manager;
pub mod packet;
pub mod peer;
pub mod persist;
pub mod queue;
pub mod session;

pub use config::Config;
pub use contacts::{Contact, ContactBook, PinResult};
pub use error::Error;
pub use events::{Command, Event, SendOutcome};
pub use identity::{Fingerprint, Identity};
pub use manager::{PacketSink, SessionManager};
pub use packet::{Packet, PacketType, PACKET_HEADER_SIZE};
pub use peer::{PeerEndpoint, PeerSource};
pub use queue::{MessageQueue, QueuedMessage};
pub use session::{ConnectionId, Session, SessionState};

/// Post-encryption ceiling on a single encoded packet (§4.2, §4.3), the same
/// ceiling the transport layer enforces on the wire.
pub const MAX_PACKET_PAYLOAD: usize = dni_transport::transport::MAX_DATAGRAM_SIZE;

//! # dni-transport
//!
//! Network transport layer: a socket abstraction over UDP, used by the
//! Session Manager to send and receive raw packets without depending on a
//! concrete socket type.
//!
//! This crate provides:
//! - [`transport::Transport`]: an async trait any backend implements
//! - [`udp_async::AsyncUdpTransport`]: the tokio-based UDP backend used in
//!   production, with tuned socket buffer sizes (§4.3)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod transport;
pub mod udp_async;

pub use transport::{Transport, TransportError, TransportResult, TransportStats, MAX_DATAGRAM_SIZE};
pub use udp_async::AsyncUdpTransport;

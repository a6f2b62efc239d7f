//! Error types for the dni-im core protocol.

use thiserror::Error;

/// Aggregate core protocol error.
#[derive(Debug, Error)]
pub enum Error {
    /// Packet codec error
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Session-level error
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Message queue error
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Contact book error
    #[error("contact error: {0}")]
    Contact(#[from] ContactError),

    /// Cryptographic error
    #[error("crypto error: {0}")]
    Crypto(#[from] dni_crypto::CryptoError),
}

impl Error {
    /// Whether the error is a normal, expected part of operation (drop and
    /// continue) rather than something that should close a session or
    /// surface to the UI.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Codec(CodecError::MalformedPacket)
                | Error::Session(SessionError::UnknownConnectionId)
        )
    }

    /// Whether the error is session-fatal: the session that produced it
    /// must be closed.
    #[must_use]
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            Error::Crypto(dni_crypto::CryptoError::AeadTagInvalid)
                | Error::Crypto(dni_crypto::CryptoError::CounterExhausted)
                | Error::Contact(ContactError::PinningViolation { .. })
        )
    }
}

/// Packet Codec errors (§4.2).
#[derive(Debug, Error)]
pub enum CodecError {
    /// Buffer shorter than the fixed 7-byte header, or payload truncated.
    #[error("malformed packet")]
    MalformedPacket,

    /// The `type` byte did not match one of the four recognized values.
    #[error("unrecognized packet type: 0x{0:02X}")]
    UnknownPacketType(u8),
}

/// Session Manager errors (§4.5, §7).
#[derive(Debug, Error)]
pub enum SessionError {
    /// Inbound packet referenced a `connection_id` with no matching session
    /// and was not a `HANDSHAKE_INIT`.
    #[error("unknown connection id")]
    UnknownConnectionId,

    /// Operation attempted against a session in the wrong state (e.g. a
    /// `DATA` packet before the handshake finished).
    #[error("session is not established")]
    NotEstablished,

    /// Outbound payload exceeds the 60 KB post-encryption ceiling.
    #[error("message too large")]
    MessageTooLarge,

    /// Destination endpoint could not be reached at the transport layer.
    #[error("endpoint unreachable")]
    EndpointUnreachable,

    /// Handshake response did not arrive within the retry window.
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// Session exceeded the idle timeout and was closed.
    #[error("session idle timeout")]
    IdleTimeout,
}

/// Message Queue errors (§4.6, §7).
#[derive(Debug, Error)]
pub enum QueueError {
    /// Atomic persistence of the queue file failed.
    #[error("queue persistence failed: {0}")]
    PersistFailure(String),

    /// Queue file on disk could not be parsed.
    #[error("queue file corrupt: {0}")]
    Corrupt(String),
}

/// Contact Book errors (§4.7).
#[derive(Debug, Error)]
pub enum ContactError {
    /// A peer's handshake presented a static public key different from the
    /// one previously pinned for this fingerprint.
    #[error("pinning violation for {fingerprint}")]
    PinningViolation {
        /// The fingerprint whose pin was violated.
        fingerprint: String,
    },

    /// Contact book file on disk could not be parsed.
    #[error("contact book corrupt: {0}")]
    Corrupt(String),
}

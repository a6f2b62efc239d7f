//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors.
///
/// Variant names track the error taxonomy of the session layer directly:
/// a `HandshakeDecryptFailed` or `AeadTagInvalid` here is exactly the event
/// the Session Manager closes a session on.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// A handshake message could not be written or read because the
    /// handshake state machine is not in the expected phase.
    #[error("handshake out of order: {0}")]
    HandshakeOutOfOrder(&'static str),

    /// A received handshake message failed to decrypt or was malformed.
    #[error("handshake message decrypt failed")]
    HandshakeDecryptFailed,

    /// Noise handshake setup failed (bad pattern string, bad key material).
    #[error("handshake error: {0}")]
    Handshake(String),

    /// AEAD authentication tag did not verify.
    #[error("AEAD tag invalid")]
    AeadTagInvalid,

    /// The per-direction counter reached `2^64 - 1`; the session must be
    /// closed and re-established rather than reused.
    #[error("AEAD counter exhausted")]
    CounterExhausted,

    /// Invalid key length supplied to a primitive.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// Random number generation failed (OS CSPRNG unavailable).
    #[error("random number generation failed")]
    RandomFailed,
}

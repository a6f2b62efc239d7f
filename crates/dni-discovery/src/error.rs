//! Error types for the Discovery Fabric (§4.4, §7).

use thiserror::Error;

/// Errors produced by the LAN and relay discovery backends.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The mDNS daemon could not be started or the service could not be
    /// registered.
    #[error("mDNS registration failed: {0}")]
    MdnsRegisterFailed(String),

    /// A relay `REGISTER` was sent but no `REGISTER_ACK` arrived, or the
    /// relay socket itself failed. Transient; retried with backoff.
    #[error("relay registration failed: {0}")]
    RelayRegisterFailed(String),

    /// A relay message did not parse as any known opcode, or its fixed
    /// fields were truncated.
    #[error("malformed relay message")]
    MalformedRelayMessage,

    /// Underlying socket I/O failure.
    #[error("discovery I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DiscoveryError {
    /// Whether this failure should be retried with backoff rather than
    /// surfaced as fatal (§7).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DiscoveryError::RelayRegisterFailed(_) | DiscoveryError::MdnsRegisterFailed(_)
        )
    }
}

//! Noise IK handshake for session establishment.
//!
//! Implements the Noise\_IK pattern using the snow library:
//! - Pattern: `IK` (initiator knows the responder's static key in advance)
//! - DH: `25519` (Curve25519)
//! - Cipher: `ChaChaPoly` (ChaCha20-Poly1305)
//! - Hash: `BLAKE2s`
//!
//! ## Message Flow
//!
//! ```text
//! Message 1: Initiator → Responder: e, es, s, ss
//! Message 2: Responder → Initiator: e, ee, se
//! ```
//!
//! Because the initiator already authenticates the responder in message 1
//! (via the `es` mix with the responder's known static key), a passive
//! observer who does not hold the responder's static private key learns
//! nothing about the initiator's identity from a single flight.
//!
//! Transport-phase encryption is deliberately NOT handled by snow's
//! `TransportState`: the session layer needs an externally-tracked 64-bit
//! counter per direction (so it can detect strict-order replay and persist
//! the counter independent of this handshake object), so [`finalize`] hands
//! back raw keys for use with [`crate::aead::SessionCipher`] instead.

use crate::CryptoError;
use snow::{Builder, HandshakeState};
use zeroize::Zeroize;

/// Noise protocol pattern used for session establishment.
const NOISE_PATTERN: &str = "Noise_IK_25519_ChaChaPoly_BLAKE2s";

/// Upper bound on a handshake message: `e`(32) + `s`(32+16) + `ss` tag(16) +
/// payload + generous slack.
const MAX_HANDSHAKE_MSG_SIZE: usize = 256;

/// Role in the Noise handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Sends message 1, already knows the responder's static public key.
    Initiator,
    /// Receives message 1, learns the initiator's static public key from it.
    Responder,
}

/// Phase of a two-message IK handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakePhase {
    /// No messages exchanged yet.
    Initial,
    /// Message 1 has been sent (initiator) or received (responder).
    Message1Complete,
    /// Both messages exchanged; ready to [`NoiseHandshake::finalize`].
    Complete,
}

/// Long-term X25519 identity keypair used as the Noise `s` key.
///
/// This is `long_term_static_keypair` from the Identity data model: created
/// once, persisted, never rotated.
pub struct StaticKeypair {
    private: Vec<u8>,
    public: [u8; 32],
}

impl StaticKeypair {
    /// Generate a new random keypair.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern string fails to parse or key
    /// generation fails.
    pub fn generate() -> Result<Self, CryptoError> {
        let builder = Builder::new(
            NOISE_PATTERN
                .parse()
                .map_err(|e| CryptoError::Handshake(format!("pattern parse: {e:?}")))?,
        );
        let keypair = builder
            .generate_keypair()
            .map_err(|e| CryptoError::Handshake(format!("keypair generation: {e:?}")))?;

        let mut public = [0u8; 32];
        public.copy_from_slice(&keypair.public);

        Ok(Self {
            private: keypair.private,
            public,
        })
    }

    /// Reconstruct a keypair from a previously persisted private key.
    #[must_use]
    pub fn from_private_bytes(private: [u8; 32]) -> Self {
        use x25519_dalek::{PublicKey, StaticSecret};

        let secret = StaticSecret::from(private);
        let public = PublicKey::from(&secret);

        Self {
            private: private.to_vec(),
            public: public.to_bytes(),
        }
    }

    /// The public half of this keypair.
    #[must_use]
    pub fn public_key(&self) -> &[u8; 32] {
        &self.public
    }

    /// The private half of this keypair.
    ///
    /// Handle with care: this is long-term identity key material.
    #[must_use]
    pub fn private_key(&self) -> &[u8] {
        &self.private
    }
}

impl Drop for StaticKeypair {
    fn drop(&mut self) {
        self.private.zeroize();
    }
}

impl Clone for StaticKeypair {
    fn clone(&self) -> Self {
        Self {
            private: self.private.clone(),
            public: self.public,
        }
    }
}

/// Raw symmetric keys produced by [`NoiseHandshake::finalize`], split by
/// direction relative to the local role.
#[derive(Zeroize, zeroize::ZeroizeOnDrop)]
pub struct SplitKeys {
    /// Key used to encrypt packets sent by this side.
    pub send_key: [u8; 32],
    /// Key used to decrypt packets received by this side.
    pub recv_key: [u8; 32],
}

/// An in-progress Noise IK handshake.
pub struct NoiseHandshake {
    state: HandshakeState,
    role: Role,
    phase: HandshakePhase,
}

impl NoiseHandshake {
    /// `init_handshake`: start a handshake as the initiator. The responder's
    /// static public key must already be known (from a discovery
    /// advertisement or the contact book).
    ///
    /// # Errors
    ///
    /// Returns an error if the Noise builder rejects the local or remote
    /// key material.
    pub fn new_initiator(
        local: &StaticKeypair,
        responder_static_pub: &[u8; 32],
    ) -> Result<Self, CryptoError> {
        let builder = Builder::new(
            NOISE_PATTERN
                .parse()
                .map_err(|e| CryptoError::Handshake(format!("pattern parse: {e:?}")))?,
        );
        let state = builder
            .local_private_key(&local.private)
            .map_err(|e| CryptoError::Handshake(format!("local key: {e:?}")))?
            .remote_public_key(responder_static_pub)
            .map_err(|e| CryptoError::Handshake(format!("remote key: {e:?}")))?
            .build_initiator()
            .map_err(|e| CryptoError::Handshake(format!("build initiator: {e:?}")))?;

        Ok(Self {
            state,
            role: Role::Initiator,
            phase: HandshakePhase::Initial,
        })
    }

    /// Start a handshake as the responder. The initiator's static key is not
    /// known yet; it is learned from message 1.
    ///
    /// # Errors
    ///
    /// Returns an error if the Noise builder rejects the local key material.
    pub fn new_responder(local: &StaticKeypair) -> Result<Self, CryptoError> {
        let builder = Builder::new(
            NOISE_PATTERN
                .parse()
                .map_err(|e| CryptoError::Handshake(format!("pattern parse: {e:?}")))?,
        );
        let state = builder
            .local_private_key(&local.private)
            .map_err(|e| CryptoError::Handshake(format!("local key: {e:?}")))?
            .build_responder()
            .map_err(|e| CryptoError::Handshake(format!("build responder: {e:?}")))?;

        Ok(Self {
            state,
            role: Role::Responder,
            phase: HandshakePhase::Initial,
        })
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> HandshakePhase {
        self.phase
    }

    /// `is_complete`.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.phase == HandshakePhase::Complete
    }

    /// `write_handshake_message`: produce the next outbound wire message.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::HandshakeOutOfOrder`] if called when it is not
    /// this side's turn to send.
    pub fn write_handshake_message(&mut self, payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match (self.role, self.phase) {
            (Role::Initiator, HandshakePhase::Initial)
            | (Role::Responder, HandshakePhase::Message1Complete) => {}
            _ => return Err(CryptoError::HandshakeOutOfOrder("not this side's turn to send")),
        }

        let mut message = vec![0u8; MAX_HANDSHAKE_MSG_SIZE];
        let len = self
            .state
            .write_message(payload, &mut message)
            .map_err(|_| CryptoError::HandshakeDecryptFailed)?;
        message.truncate(len);

        self.phase = match (self.role, self.phase) {
            (Role::Initiator, HandshakePhase::Initial) => HandshakePhase::Message1Complete,
            (Role::Responder, HandshakePhase::Message1Complete) => HandshakePhase::Complete,
            _ => unreachable!(),
        };

        Ok(message)
    }

    /// `read_handshake_message`: consume an inbound wire message.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::HandshakeOutOfOrder`] if this side is not
    /// expecting a message, or [`CryptoError::HandshakeDecryptFailed`] on a
    /// tag mismatch or malformed payload.
    pub fn read_handshake_message(&mut self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match (self.role, self.phase) {
            (Role::Responder, HandshakePhase::Initial)
            | (Role::Initiator, HandshakePhase::Message1Complete) => {}
            _ => return Err(CryptoError::HandshakeOutOfOrder("not expecting a message")),
        }

        let mut payload = vec![0u8; MAX_HANDSHAKE_MSG_SIZE];
        let len = self
            .state
            .read_message(message, &mut payload)
            .map_err(|_| CryptoError::HandshakeDecryptFailed)?;
        payload.truncate(len);

        self.phase = match (self.role, self.phase) {
            (Role::Responder, HandshakePhase::Initial) => HandshakePhase::Message1Complete,
            (Role::Initiator, HandshakePhase::Message1Complete) => HandshakePhase::Complete,
            _ => unreachable!(),
        };

        Ok(payload)
    }

    /// The peer's static public key, available once their identity-bearing
    /// message has been processed.
    #[must_use]
    pub fn remote_static(&self) -> Option<[u8; 32]> {
        self.state.get_remote_static().map(|key| {
            let mut arr = [0u8; 32];
            arr.copy_from_slice(key);
            arr
        })
    }

    /// `finalize`: split the handshake into a send/recv key pair and the
    /// peer's static public key. Consumes the handshake.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::HandshakeOutOfOrder`] if the handshake has not
    /// completed.
    pub fn finalize(self) -> Result<(SplitKeys, [u8; 32]), CryptoError> {
        if self.phase != HandshakePhase::Complete {
            return Err(CryptoError::HandshakeOutOfOrder("handshake not complete"));
        }

        let peer_static = self
            .remote_static()
            .ok_or(CryptoError::HandshakeDecryptFailed)?;

        let h = self.state.get_handshake_hash();
        let mut key_i_to_r = [0u8; 32];
        let mut key_r_to_i = [0u8; 32];
        derive_key(h, b"dni-im i2r", &mut key_i_to_r);
        derive_key(h, b"dni-im r2i", &mut key_r_to_i);

        let (send_key, recv_key) = match self.role {
            Role::Initiator => (key_i_to_r, key_r_to_i),
            Role::Responder => (key_r_to_i, key_i_to_r),
        };

        Ok((SplitKeys { send_key, recv_key }, peer_static))
    }
}

/// Derive a key from the handshake hash using keyed BLAKE3, with domain
/// separation between the two directional keys.
fn derive_key(ikm: &[u8], context: &[u8], output: &mut [u8; 32]) {
    crate::hash::hkdf(context, ikm, b"dni-im-noise-split", output);
}

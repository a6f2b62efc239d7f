//! Session state machine (§4.5).
//!
//! A `Session` is the authenticated, encrypted relationship with one peer,
//! keyed by a `connection_id` chosen by whichever side initiated. It owns
//! the per-direction AEAD ciphers and counters once established, and the
//! set of logical streams multiplexed onto it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use dni_crypto::aead::SessionCipher;
use dni_crypto::noise::NoiseHandshake;

use crate::error::SessionError;

/// 32-bit session tag, chosen by the initiator.
pub type ConnectionId = u32;

/// Idle timeout after which an established session is closed (§4.5, §5).
pub const IDLE_TIMEOUT_SECS: u64 = 600;

/// Handshake response timeout before a retry (§5).
pub const HANDSHAKE_TIMEOUT_SECS: u64 = 10;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Outbound session: `HANDSHAKE_INIT` not yet sent.
    Initiating,
    /// Outbound session: `HANDSHAKE_INIT` sent, awaiting `HANDSHAKE_RESP`.
    AwaitingResponse,
    /// Handshake complete; both ciphers keyed.
    Established,
    /// Terminal. No further packets are processed.
    Closed,
}

impl SessionState {
    /// Whether `to` is a legal transition from `self`.
    #[must_use]
    pub fn can_transition(self, to: SessionState) -> bool {
        use SessionState::{AwaitingResponse, Closed, Established, Initiating};
        matches!(
            (self, to),
            (Initiating, AwaitingResponse)
                | (AwaitingResponse, Established)
                | (Established, Established)
                | (Initiating, Closed)
                | (AwaitingResponse, Closed)
                | (Established, Closed)
        )
    }
}

/// A logical conversation channel multiplexed onto one session.
#[derive(Debug)]
pub struct Stream {
    /// Logical channel id.
    pub stream_id: u16,
    /// Owning session's connection id.
    pub session_id: ConnectionId,
    /// Last time a packet was sent or received on this stream.
    pub last_activity: Instant,
}

impl Stream {
    fn new(stream_id: u16, session_id: ConnectionId) -> Self {
        Self {
            stream_id,
            session_id,
            last_activity: Instant::now(),
        }
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

/// An authenticated, encrypted relationship with one peer.
pub struct Session {
    /// Session tag, unique in the local session table.
    pub connection_id: ConnectionId,
    /// The peer's fingerprint, known once the handshake completes (and
    /// immediately for outbound sessions, since the initiator resolves the
    /// recipient before opening one).
    pub peer_fingerprint: Option<String>,
    /// Source address this session is bound to, for inbound
    /// disambiguation (§4.5, connection-id collisions).
    pub source_addr: Option<SocketAddr>,
    state: SessionState,
    handshake: Option<NoiseHandshake>,
    send_cipher: Option<SessionCipher>,
    recv_cipher: Option<SessionCipher>,
    send_counter: u64,
    recv_counter: u64,
    streams: HashMap<u16, Stream>,
    last_activity: Instant,
}

impl Session {
    /// Start a new outbound session in `Initiating` state.
    #[must_use]
    pub fn new_initiating(connection_id: ConnectionId, handshake: NoiseHandshake) -> Self {
        Self {
            connection_id,
            peer_fingerprint: None,
            source_addr: None,
            state: SessionState::Initiating,
            handshake: Some(handshake),
            send_cipher: None,
            recv_cipher: None,
            send_counter: 0,
            recv_counter: 0,
            streams: HashMap::new(),
            last_activity: Instant::now(),
        }
    }

    /// Start a new inbound session, bound to the source address the
    /// `HANDSHAKE_INIT` arrived from.
    #[must_use]
    pub fn new_responding(
        connection_id: ConnectionId,
        source_addr: SocketAddr,
        handshake: NoiseHandshake,
    ) -> Self {
        Self {
            connection_id,
            peer_fingerprint: None,
            source_addr: Some(source_addr),
            state: SessionState::Initiating,
            handshake: Some(handshake),
            send_cipher: None,
            recv_cipher: None,
            send_counter: 0,
            recv_counter: 0,
            streams: HashMap::new(),
            last_activity: Instant::now(),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Transition to a new state, logging and validating legality.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotEstablished` if the transition is not
    /// legal from the current state.
    pub fn transition_to(&mut self, to: SessionState) -> Result<(), SessionError> {
        if !self.state.can_transition(to) {
            tracing::debug!(
                connection_id = self.connection_id,
                from = ?self.state,
                to = ?to,
                "illegal session transition"
            );
            return Err(SessionError::NotEstablished);
        }
        tracing::debug!(connection_id = self.connection_id, from = ?self.state, to = ?to, "session transition");
        self.state = to;
        self.last_activity = Instant::now();
        Ok(())
    }

    /// Borrow the in-progress handshake for a write/read step.
    pub fn handshake_mut(&mut self) -> Option<&mut NoiseHandshake> {
        self.handshake.as_mut()
    }

    /// Finalize the handshake: derive split ciphers and move to
    /// `Established`. Returns the peer's static public key so the caller
    /// can validate TOFU pinning.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotEstablished` if the handshake is missing
    /// (already finalized), incomplete, or the transition to `Established`
    /// is illegal from the current state.
    pub fn finalize_handshake(&mut self, peer_fingerprint: String) -> Result<[u8; 32], SessionError> {
        let handshake = self.handshake.take().ok_or(SessionError::NotEstablished)?;
        let (keys, peer_static) = handshake
            .finalize()
            .map_err(|_| SessionError::NotEstablished)?;
        self.send_cipher = Some(SessionCipher::new(&keys.send_key));
        self.recv_cipher = Some(SessionCipher::new(&keys.recv_key));
        self.peer_fingerprint = Some(peer_fingerprint);
        self.transition_to(SessionState::Established)?;
        Ok(peer_static)
    }

    /// Encrypt `plaintext` under the send cipher at the current send
    /// counter, incrementing it on success.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotEstablished` if the session has no send
    /// cipher yet, or a crypto error (e.g. `CounterExhausted`).
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<(u64, Vec<u8>), crate::error::Error> {
        let cipher = self
            .send_cipher
            .as_ref()
            .ok_or(SessionError::NotEstablished)?;
        let counter = self.send_counter;
        let ciphertext = cipher.encrypt(counter, plaintext)?;
        self.send_counter += 1;
        self.last_activity = Instant::now();
        Ok((counter, ciphertext))
    }

    /// Decrypt `ciphertext` under the recv cipher, enforcing strict replay:
    /// the packet is decrypted at exactly the session's current
    /// `recv_counter`, which is then incremented. There is no sliding
    /// window; a dropped or reordered packet desynchronizes the session
    /// (§4.1).
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotEstablished` if no recv cipher is set, or
    /// `CryptoError::AeadTagInvalid` on tag mismatch.
    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, crate::error::Error> {
        let cipher = self
            .recv_cipher
            .as_ref()
            .ok_or(SessionError::NotEstablished)?;
        let counter = self.recv_counter;
        let plaintext = cipher.decrypt(counter, ciphertext)?;
        self.recv_counter += 1;
        self.last_activity = Instant::now();
        Ok(plaintext)
    }

    /// Fetch or create the stream with the given id.
    pub fn stream_mut(&mut self, stream_id: u16) -> &mut Stream {
        self.streams
            .entry(stream_id)
            .or_insert_with(|| Stream::new(stream_id, self.connection_id))
    }

    /// Touch a stream's activity timestamp.
    pub fn touch_stream(&mut self, stream_id: u16) {
        self.stream_mut(stream_id).touch();
    }

    /// Whether this session has been idle longer than
    /// [`IDLE_TIMEOUT_SECS`].
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.last_activity.elapsed().as_secs() >= IDLE_TIMEOUT_SECS
    }

    /// Snapshot of counters and stream count, for logging and tests.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            connection_id: self.connection_id,
            state: self.state,
            send_counter: self.send_counter,
            recv_counter: self.recv_counter,
            stream_count: self.streams.len(),
        }
    }
}

/// A read-only snapshot of session counters, for logging and tests.
#[derive(Debug, Clone, Copy)]
pub struct SessionStats {
    /// Session tag.
    pub connection_id: ConnectionId,
    /// Current state.
    pub state: SessionState,
    /// Next counter value to be used for an outbound `DATA` packet.
    pub send_counter: u64,
    /// Next counter value expected on an inbound `DATA` packet.
    pub recv_counter: u64,
    /// Number of streams touched so far.
    pub stream_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initiating_can_move_to_awaiting_response() {
        assert!(SessionState::Initiating.can_transition(SessionState::AwaitingResponse));
    }

    #[test]
    fn established_cannot_regress_to_initiating() {
        assert!(!SessionState::Established.can_transition(SessionState::Initiating));
    }

    #[test]
    fn any_state_can_close() {
        assert!(SessionState::Initiating.can_transition(SessionState::Closed));
        assert!(SessionState::AwaitingResponse.can_transition(SessionState::Closed));
        assert!(SessionState::Established.can_transition(SessionState::Closed));
    }

    #[test]
    fn closed_is_terminal() {
        assert!(!SessionState::Closed.can_transition(SessionState::Established));
        assert!(!SessionState::Closed.can_transition(SessionState::Initiating));
    }

    #[test]
    fn full_handshake_and_transport_roundtrip() {
        use dni_crypto::noise::StaticKeypair;

        let alice_static = StaticKeypair::generate().unwrap();
        let bob_static = StaticKeypair::generate().unwrap();

        let alice_hs =
            NoiseHandshake::new_initiator(&alice_static, bob_static.public_key()).unwrap();
        let bob_hs = NoiseHandshake::new_responder(&bob_static).unwrap();

        let mut alice = Session::new_initiating(1, alice_hs);
        let mut bob = Session::new_responding(1, "127.0.0.1:9000".parse().unwrap(), bob_hs);

        let msg1 = alice.handshake_mut().unwrap().write_handshake_message(&[]).unwrap();
        alice.transition_to(SessionState::AwaitingResponse).unwrap();

        bob.handshake_mut().unwrap().read_handshake_message(&msg1).unwrap();
        let msg2 = bob.handshake_mut().unwrap().write_handshake_message(&[]).unwrap();

        alice.handshake_mut().unwrap().read_handshake_message(&msg2).unwrap();

        let alice_peer = alice.finalize_handshake("bobfingerprint01".into()).unwrap();
        let bob_peer = bob.finalize_handshake("alicefingerpr01".into()).unwrap();

        assert_eq!(&alice_peer, bob_static.public_key());
        assert_eq!(&bob_peer, alice_static.public_key());
        assert_eq!(alice.state(), SessionState::Established);
        assert_eq!(bob.state(), SessionState::Established);

        let (counter, ciphertext) = alice.encrypt(b"hello").unwrap();
        assert_eq!(counter, 0);
        let plaintext = bob.decrypt(&ciphertext).unwrap();
        assert_eq!(plaintext, b"hello");
    }

    #[test]
    fn decrypt_rejects_wrong_counter_strict_mode() {
        use dni_crypto::noise::StaticKeypair;

        let alice_static = StaticKeypair::generate().unwrap();
        let bob_static = StaticKeypair::generate().unwrap();
        let alice_hs =
            NoiseHandshake::new_initiator(&alice_static, bob_static.public_key()).unwrap();
        let bob_hs = NoiseHandshake::new_responder(&bob_static).unwrap();

        let mut alice = Session::new_initiating(1, alice_hs);
        let mut bob = Session::new_responding(1, "127.0.0.1:9000".parse().unwrap(), bob_hs);

        let msg1 = alice.handshake_mut().unwrap().write_handshake_message(&[]).unwrap();
        bob.handshake_mut().unwrap().read_handshake_message(&msg1).unwrap();
        let msg2 = bob.handshake_mut().unwrap().write_handshake_message(&[]).unwrap();
        alice.handshake_mut().unwrap().read_handshake_message(&msg2).unwrap();
        alice.finalize_handshake("bob".into()).unwrap();
        bob.finalize_handshake("alice".into()).unwrap();

        let (_c0, ct0) = alice.encrypt(b"first").unwrap();
        let (_c1, _ct1) = alice.encrypt(b"second").unwrap();
        let (_c2, ct2) = alice.encrypt(b"third").unwrap();

        bob.decrypt(&ct0).unwrap();
        // ct1 (counter 1) is "lost"; bob's recv_counter is now 1, but ct2
        // was encrypted at counter 2, so decryption must fail.
        assert!(bob.decrypt(&ct2).is_err());
    }

    #[test]
    fn stream_lookup_creates_on_first_use() {
        use dni_crypto::noise::StaticKeypair;
        let alice_static = StaticKeypair::generate().unwrap();
        let bob_pub = StaticKeypair::generate().unwrap();
        let hs = NoiseHandshake::new_initiator(&alice_static, bob_pub.public_key()).unwrap();
        let mut session = Session::new_initiating(1, hs);

        assert_eq!(session.stats().stream_count, 0);
        session.touch_stream(7);
        assert_eq!(session.stats().stream_count, 1);
    }
}

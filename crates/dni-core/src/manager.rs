//! Session Manager (§4.5): the single owner of the session table, contact
//! book, and message queue. Everything else communicates with it by
//! message (§9) — it is the composition root for per-peer state.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use dni_crypto::aead::AEAD_TAG_LEN;
use dni_crypto::noise::{NoiseHandshake, StaticKeypair};
use rand_core::RngCore;

use crate::contacts::{ContactBook, PinResult};
use crate::error::{Error, SessionError};
use crate::events::{Command, Event, SendOutcome};
use crate::identity::{Fingerprint, Identity};
use crate::packet::{Packet, PacketType, PACKET_HEADER_SIZE};
use crate::peer::{PeerEndpoint, PeerSource};
use crate::queue::MessageQueue;
use crate::session::{ConnectionId, Session, SessionState};
use crate::MAX_PACKET_PAYLOAD;

/// Abstraction over "send these bytes to this address", implemented by
/// the UDP transport. Kept as a trait so the Session Manager's state
/// machine can be exercised without a real socket.
pub trait PacketSink: Send + Sync {
    /// Send `bytes` to `addr`. Errors are non-fatal to the manager; the
    /// caller marks the endpoint stale and re-enqueues (§4.5).
    fn send_to(&self, addr: SocketAddr, bytes: &[u8]) -> std::io::Result<()>;
}

/// mDNS advertisements are renewed every 30s (§4.4); an endpoint not
/// refreshed within three cycles is considered gone.
const LAN_PEER_TTL: Duration = Duration::from_secs(90);
/// Relay registrations are considered stale after this long, mirroring
/// `dni_discovery::relay::server::EVICTION_TIMEOUT`.
const RELAY_PEER_TTL: Duration = Duration::from_secs(120);

/// Identifies a session in the local table. Outbound sessions (we are the
/// initiator) are keyed purely by `connection_id`, which we chose and
/// retried on collision. Inbound sessions (we are the responder) are keyed
/// by `(connection_id, source_addr)` because the remote peer's choice of
/// `connection_id` might collide with another peer's (§4.5,
/// connection-id collisions; §8 scenario 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SessionKey {
    Outbound(ConnectionId),
    Inbound(ConnectionId, SocketAddr),
}

/// Owns per-peer state and drives the protocol state machine.
pub struct SessionManager<T: PacketSink> {
    identity: Identity,
    contacts: ContactBook,
    queue: MessageQueue,
    sessions: HashMap<SessionKey, Session>,
    fingerprint_index: HashMap<Fingerprint, SessionKey>,
    endpoints: HashMap<Fingerprint, PeerEndpoint>,
    transport: T,
}

impl<T: PacketSink> SessionManager<T> {
    /// Construct a manager with already-loaded durable state.
    pub fn new(identity: Identity, contacts: ContactBook, queue: MessageQueue, transport: T) -> Self {
        Self {
            identity,
            contacts,
            queue,
            sessions: HashMap::new(),
            fingerprint_index: HashMap::new(),
            endpoints: HashMap::new(),
            transport,
        }
    }

    /// Handle a UI command. Returns any events produced as a side effect
    /// (e.g. a `PinningViolation` cannot arise from a `Command`, but
    /// `Send` against a contact the user has already blocked does).
    pub fn handle_command(&mut self, command: Command) -> Result<(Option<SendOutcome>, Vec<Event>), Error> {
        match command {
            Command::Send {
                fingerprint,
                stream_id,
                plaintext,
            } => {
                let outcome = self.send(&fingerprint, stream_id, plaintext)?;
                Ok((Some(outcome), Vec::new()))
            }
            Command::ListPeers => Ok((None, Vec::new())),
            Command::DeletePeer(fingerprint) => {
                self.endpoints.remove(&fingerprint);
                Ok((None, Vec::new()))
            }
            Command::AddPeerManual {
                fingerprint,
                address,
                static_pub,
            } => {
                let mut events = Vec::new();
                let endpoint = PeerEndpoint::new(fingerprint, address, PeerSource::Manual, static_pub);
                events.extend(self.observe_peer(endpoint));
                Ok((None, events))
            }
        }
    }

    /// Outbound contract (§4.5).
    fn send(
        &mut self,
        recipient_fp: &Fingerprint,
        stream_id: u16,
        plaintext: Vec<u8>,
    ) -> Result<SendOutcome, Error> {
        // The wire packet is header + ciphertext, and encryption always
        // grows the plaintext by exactly one AEAD tag (§4.1). Reject here,
        // before queueing or handshaking, using the same ceiling the
        // transport enforces on the encoded packet (§4.3).
        if plaintext.len() + AEAD_TAG_LEN + PACKET_HEADER_SIZE > MAX_PACKET_PAYLOAD {
            return Err(SessionError::MessageTooLarge.into());
        }

        let Some(endpoint) = self.endpoints.get(recipient_fp).cloned() else {
            self.queue.enqueue(recipient_fp, stream_id, plaintext)?;
            return Ok(SendOutcome::Queued);
        };

        if let Some(key) = self.fingerprint_index.get(recipient_fp).copied() {
            let state = self.sessions.get(&key).map(Session::state);
            match state {
                Some(SessionState::Established) => {
                    let session = self.sessions.get_mut(&key).expect("indexed session exists");
                    let (counter, ciphertext) = session.encrypt(&plaintext)?;
                    let packet = Packet::new(PacketType::Data, session.connection_id, stream_id, ciphertext);
                    self.transmit(endpoint.transport_address, &packet, recipient_fp, counter)?;
                    return Ok(SendOutcome::Sent);
                }
                Some(SessionState::AwaitingResponse) | Some(SessionState::Initiating) => {
                    self.queue.enqueue(recipient_fp, stream_id, plaintext)?;
                    return Ok(SendOutcome::Queued);
                }
                _ => {}
            }
        }

        // No usable session: start a fresh one, authenticating the
        // responder's static key learned from discovery or the contact
        // book (§4.1 IK handshake).
        let connection_id = self.fresh_connection_id();
        let responder_static_pub = self
            .contacts
            .lookup(recipient_fp)
            .map(|c| c.pinned_static_public_key)
            .unwrap_or(endpoint.static_pub);
        let handshake = NoiseHandshake::new_initiator(&self.identity.static_keypair, &responder_static_pub)
            .map_err(dni_crypto::CryptoError::from)?;
        let mut session = Session::new_initiating(connection_id, handshake);
        session.peer_fingerprint = Some(recipient_fp.clone());

        let identity_payload = encode_identity_payload(&self.identity.fingerprint, &self.identity.display_name);
        let msg1 = session
            .handshake_mut()
            .expect("handshake present on fresh session")
            .write_handshake_message(&identity_payload)
            .map_err(dni_crypto::CryptoError::from)?;
        session.transition_to(SessionState::AwaitingResponse)?;

        let packet = Packet::new(PacketType::HandshakeInit, connection_id, 0, msg1);
        self.transport
            .send_to(endpoint.transport_address, &packet.encode())
            .map_err(|_| SessionError::EndpointUnreachable)?;

        self.sessions.insert(SessionKey::Outbound(connection_id), session);
        self.fingerprint_index
            .insert(recipient_fp.clone(), SessionKey::Outbound(connection_id));
        self.queue.enqueue(recipient_fp, stream_id, plaintext)?;
        Ok(SendOutcome::Queued)
    }

    fn transmit(
        &self,
        addr: SocketAddr,
        packet: &Packet,
        recipient_fp: &Fingerprint,
        _counter: u64,
    ) -> Result<(), Error> {
        if self.transport.send_to(addr, &packet.encode()).is_err() {
            tracing::debug!(fingerprint = recipient_fp.as_str(), "transport send failed");
            return Err(SessionError::EndpointUnreachable.into());
        }
        Ok(())
    }

    /// Inbound contract (§4.5). `source` is the UDP datagram's source
    /// address, used both for inbound session disambiguation and to learn
    /// a fresh `PeerEndpoint`.
    pub fn handle_inbound(&mut self, packet: Packet, source: SocketAddr) -> (Vec<Event>, Vec<(SocketAddr, Vec<u8>)>) {
        let mut events = Vec::new();
        let mut outbound = Vec::new();

        match packet.packet_type {
            PacketType::HandshakeInit => {
                self.handle_handshake_init(packet, source, &mut events, &mut outbound);
            }
            PacketType::HandshakeResp => {
                self.handle_handshake_resp(packet, source, &mut events, &mut outbound);
            }
            PacketType::Data => {
                self.handle_data(packet, source, &mut events);
            }
            PacketType::Ack => {
                // Reserved, ignored (§4.5, §9).
            }
        }

        (events, outbound)
    }

    fn handle_handshake_init(
        &mut self,
        packet: Packet,
        source: SocketAddr,
        events: &mut Vec<Event>,
        outbound: &mut Vec<(SocketAddr, Vec<u8>)>,
    ) {
        let key = SessionKey::Inbound(packet.connection_id, source);
        if self.sessions.contains_key(&key) {
            return;
        }

        let handshake = match NoiseHandshake::new_responder(&self.identity.static_keypair) {
            Ok(hs) => hs,
            Err(_) => return,
        };
        let mut session = Session::new_responding(packet.connection_id, source, handshake);

        let decrypted_payload = match session
            .handshake_mut()
            .expect("fresh responder handshake")
            .read_handshake_message(&packet.payload)
        {
            Ok(payload) => payload,
            Err(_) => {
                tracing::debug!("handshake init decrypt failed, dropping (no oracle)");
                return;
            }
        };
        let Some((peer_fingerprint, peer_name)) = decode_identity_payload(&decrypted_payload) else {
            tracing::debug!("handshake init carried no identity assertion, dropping");
            return;
        };

        let resp_msg = match session.handshake_mut().expect("handshake present").write_handshake_message(&[]) {
            Ok(m) => m,
            Err(_) => return,
        };

        let peer_static = session
            .handshake_mut()
            .expect("handshake present")
            .remote_static()
            .expect("remote static known after reading message 1");

        if session.finalize_handshake(peer_fingerprint.clone()).is_err() {
            return;
        }

        match self.contacts.pin(&peer_fingerprint, peer_static, &peer_name) {
            Ok(PinResult::Violation) => {
                events.push(Event::PinningViolation(peer_fingerprint));
                return;
            }
            Ok(_) => {}
            Err(_) => return,
        }

        let resp_packet = Packet::new(PacketType::HandshakeResp, packet.connection_id, 0, resp_msg);
        outbound.push((source, resp_packet.encode()));

        self.sessions.insert(key, session);
        self.fingerprint_index.insert(peer_fingerprint.clone(), key);
        let endpoint = PeerEndpoint::new(peer_fingerprint.clone(), source, PeerSource::Lan, peer_static)
            .with_name(peer_name.clone());
        events.extend(self.observe_peer(endpoint));
        events.push(Event::SessionEstablished(peer_fingerprint.clone()));
        self.drain_queue(&peer_fingerprint, events);
    }

    fn handle_handshake_resp(
        &mut self,
        packet: Packet,
        _source: SocketAddr,
        events: &mut Vec<Event>,
        _outbound: &mut [(SocketAddr, Vec<u8>)],
    ) {
        let key = SessionKey::Outbound(packet.connection_id);
        let Some(session) = self.sessions.get_mut(&key) else {
            return;
        };
        if session.state() != SessionState::AwaitingResponse {
            return;
        }
        if session
            .handshake_mut()
            .expect("awaiting-response session keeps its handshake")
            .read_handshake_message(&packet.payload)
            .is_err()
        {
            tracing::debug!("handshake resp decrypt failed, dropping");
            return;
        }

        let peer_static = session
            .handshake_mut()
            .expect("handshake present")
            .remote_static()
            .expect("remote static known after reading message 2");
        let expected_fp = session.peer_fingerprint.clone().expect("outbound session knows recipient");

        if session.finalize_handshake(expected_fp.clone()).is_err() {
            return;
        }

        match self.contacts.pin(&expected_fp, peer_static, &expected_fp) {
            Ok(PinResult::Violation) => {
                self.sessions.remove(&key);
                self.fingerprint_index.remove(&expected_fp);
                events.push(Event::PinningViolation(expected_fp));
                return;
            }
            Ok(_) => {}
            Err(_) => return,
        }

        events.push(Event::SessionEstablished(expected_fp.clone()));
        self.drain_queue(&expected_fp, events);
    }

    fn handle_data(&mut self, packet: Packet, source: SocketAddr, events: &mut Vec<Event>) {
        let key = self.resolve_data_key(packet.connection_id, source);
        let Some(key) = key else {
            return; // UnknownConnectionId: drop, no effect.
        };

        let Some(session) = self.sessions.get_mut(&key) else {
            return;
        };
        if session.state() != SessionState::Established {
            return;
        }

        match session.decrypt(&packet.payload) {
            Ok(plaintext) => {
                session.touch_stream(packet.stream_id);
                let fingerprint = session.peer_fingerprint.clone().expect("established session has peer");
                events.push(Event::MessageReceived {
                    fingerprint,
                    stream_id: packet.stream_id,
                    plaintext,
                });
            }
            Err(_) => {
                let fingerprint = session.peer_fingerprint.clone();
                self.sessions.remove(&key);
                if let Some(fp) = fingerprint {
                    self.fingerprint_index.remove(&fp);
                    events.push(Event::SessionClosed {
                        fingerprint: fp,
                        reason: "AEAD decrypt failure".to_string(),
                    });
                }
            }
        }
    }

    fn resolve_data_key(&self, connection_id: ConnectionId, source: SocketAddr) -> Option<SessionKey> {
        let inbound = SessionKey::Inbound(connection_id, source);
        if self.sessions.contains_key(&inbound) {
            return Some(inbound);
        }
        let outbound = SessionKey::Outbound(connection_id);
        if self.sessions.contains_key(&outbound) {
            return Some(outbound);
        }
        None
    }

    fn drain_queue(&mut self, fingerprint: &Fingerprint, events: &mut Vec<Event>) {
        while let Some(message) = self.queue.pop_front(fingerprint) {
            let Some(key) = self.fingerprint_index.get(fingerprint).copied() else {
                let _ = self.queue.requeue_at_head(message);
                break;
            };
            let Some(endpoint) = self.endpoints.get(fingerprint).cloned() else {
                let _ = self.queue.requeue_at_head(message);
                break;
            };
            let Some(session) = self.sessions.get_mut(&key) else {
                let _ = self.queue.requeue_at_head(message);
                break;
            };

            match session.encrypt(&message.plaintext) {
                Ok((_counter, ciphertext)) => {
                    let packet = Packet::new(PacketType::Data, session.connection_id, message.stream_id, ciphertext);
                    if self.transport.send_to(endpoint.transport_address, &packet.encode()).is_err() {
                        let _ = self.queue.requeue_at_head(message);
                        break;
                    }
                    let _ = self.queue.commit();
                }
                Err(_) => {
                    let _ = self.queue.requeue_at_head(message);
                    break;
                }
            }
        }
        let _ = events; // drain does not itself emit events beyond MessageReceived elsewhere
    }

    /// Record a peer observation from discovery, applying the merging
    /// policy (§4.4): only accept it if it supersedes any existing one.
    /// Returns `PeerDiscovered` the first time a fingerprint is seen;
    /// repeated or superseded-but-not-new observations produce no event
    /// (§8: repeated advertisements of the same fingerprint produce exactly
    /// one `PeerDiscovered`).
    pub fn observe_peer(&mut self, endpoint: PeerEndpoint) -> Option<Event> {
        match self.endpoints.get(&endpoint.fingerprint) {
            None => {
                let event = Event::PeerDiscovered {
                    fingerprint: endpoint.fingerprint.clone(),
                    name: endpoint.display_name.clone(),
                    source: endpoint.source,
                };
                self.endpoints.insert(endpoint.fingerprint.clone(), endpoint);
                Some(event)
            }
            Some(existing) if existing.should_be_superseded_by(endpoint.source) => {
                self.endpoints.insert(endpoint.fingerprint.clone(), endpoint);
                None
            }
            Some(_) => None,
        }
    }

    /// Drop peer endpoints not refreshed within their source's staleness
    /// window (§4.4), emitting `PeerLost` for each. Manually-added
    /// endpoints never expire this way; they persist until `DeletePeer`.
    pub fn sweep_stale_peers(&mut self) -> Vec<Event> {
        let stale: Vec<Fingerprint> = self
            .endpoints
            .iter()
            .filter(|(_, endpoint)| match endpoint.source {
                PeerSource::Lan => endpoint.last_seen.elapsed() > LAN_PEER_TTL,
                PeerSource::Relay => endpoint.last_seen.elapsed() > RELAY_PEER_TTL,
                PeerSource::Manual => false,
            })
            .map(|(fingerprint, _)| fingerprint.clone())
            .collect();

        let mut events = Vec::with_capacity(stale.len());
        for fingerprint in stale {
            self.endpoints.remove(&fingerprint);
            events.push(Event::PeerLost(fingerprint));
        }
        events
    }

    /// Close any session idle longer than the idle timeout (§4.5, §5).
    pub fn sweep_idle(&mut self) -> Vec<Event> {
        let idle_keys: Vec<SessionKey> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.is_idle())
            .map(|(k, _)| *k)
            .collect();

        let mut events = Vec::new();
        for key in idle_keys {
            if let Some(session) = self.sessions.remove(&key) {
                if let Some(fp) = session.peer_fingerprint {
                    self.fingerprint_index.remove(&fp);
                    events.push(Event::SessionClosed {
                        fingerprint: fp,
                        reason: "idle timeout".to_string(),
                    });
                }
            }
        }
        events
    }

    fn fresh_connection_id(&self) -> ConnectionId {
        loop {
            let candidate = rand_core::OsRng.next_u32();
            if !self.sessions.contains_key(&SessionKey::Outbound(candidate)) {
                return candidate;
            }
        }
    }
}

/// Encode the sender's claimed identity as a Noise handshake payload:
/// `fingerprint(16 ascii) | name_len(1) | name`. Carried inside
/// `HANDSHAKE_INIT` so the responder — who otherwise has no way to learn
/// a claimed fingerprint from an unsolicited UDP packet — can resolve the
/// peer's identity once the handshake payload decrypts successfully. The
/// claim is only as trustworthy as the handshake itself; TOFU pinning is
/// what actually binds it to a static key over time (§4.1, §4.5, §4.7).
fn encode_identity_payload(fingerprint: &str, display_name: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 + 1 + display_name.len());
    let mut fp_bytes = [0u8; 16];
    let src = fingerprint.as_bytes();
    let n = src.len().min(16);
    fp_bytes[..n].copy_from_slice(&src[..n]);
    buf.extend_from_slice(&fp_bytes);
    let name_bytes = display_name.as_bytes();
    buf.push(name_bytes.len().min(255) as u8);
    buf.extend_from_slice(&name_bytes[..name_bytes.len().min(255)]);
    buf
}

/// Inverse of [`encode_identity_payload`].
fn decode_identity_payload(payload: &[u8]) -> Option<(Fingerprint, String)> {
    if payload.len() < 17 {
        return None;
    }
    let fingerprint = String::from_utf8(payload[..16].to_vec()).ok()?;
    let name_len = payload[16] as usize;
    let name = payload.get(17..17 + name_len)?;
    let display_name = String::from_utf8(name.to_vec()).ok()?;
    Some((fingerprint, display_name))
}

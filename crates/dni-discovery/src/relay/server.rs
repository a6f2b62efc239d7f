//! Relay server: a dumb, untrusted UDP forwarder (§4.4).
//!
//! Observes source IP, fingerprints, and payload sizes/timings; cannot read
//! message contents since forwarded payloads remain Noise-encrypted at the
//! peer-to-peer layer.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::protocol::{RelayMessage, RelayPeerInfo};
use crate::error::DiscoveryError;

/// Entries not refreshed within 120 s are evicted (§4.4).
pub const EVICTION_TIMEOUT: Duration = Duration::from_secs(120);
/// How often the eviction sweep runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

struct Registration {
    addr: SocketAddr,
    static_pub: [u8; 32],
    name: String,
    last_seen: Instant,
}

/// The relay server: forwards `RELAY` messages by fingerprint, answers
/// `LIST`, and evicts stale registrations.
pub struct RelayServer {
    bind_addr: SocketAddr,
    socket: Arc<UdpSocket>,
    registrations: Arc<RwLock<HashMap<String, Registration>>>,
}

impl RelayServer {
    /// Bind a relay server to `bind_addr`.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::Io` if the socket cannot be bound.
    pub async fn bind(bind_addr: SocketAddr) -> Result<Self, DiscoveryError> {
        let socket = UdpSocket::bind(bind_addr).await?;
        Ok(Self {
            bind_addr,
            socket: Arc::new(socket),
            registrations: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// The address this server is actually bound to (useful when
    /// `bind_addr` used an ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::Io` if the local address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr, DiscoveryError> {
        Ok(self.socket.local_addr()?)
    }

    /// Number of currently registered fingerprints.
    pub async fn registration_count(&self) -> usize {
        self.registrations.read().await.len()
    }

    /// Run the server loop. Does not return under normal operation.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::Io` only if the socket itself becomes
    /// unusable; individual malformed datagrams are dropped and logged.
    pub async fn run(&self) -> Result<(), DiscoveryError> {
        info!(addr = %self.bind_addr, "relay server listening");
        self.spawn_eviction_sweep();

        let mut buf = vec![0u8; 65536];
        loop {
            let (len, from) = self.socket.recv_from(&mut buf).await?;
            let Ok(msg) = RelayMessage::decode(&buf[..len]) else {
                debug!(%from, "dropping malformed relay datagram");
                continue;
            };
            self.handle_message(msg, from).await;
        }
    }

    async fn handle_message(&self, msg: RelayMessage, from: SocketAddr) {
        match msg {
            RelayMessage::Register {
                fingerprint,
                static_pub,
                display_name,
            } => self.handle_register(fingerprint, static_pub, display_name, from).await,
            RelayMessage::Relay {
                dest_fingerprint,
                payload,
            } => self.handle_relay(dest_fingerprint, payload, from).await,
            RelayMessage::List => self.handle_list(from).await,
            RelayMessage::Deregister { fingerprint } => self.handle_deregister(fingerprint, from).await,
            RelayMessage::RegisterAck { .. } | RelayMessage::ListResp { .. } => {
                // Server-only roles never receive these; ignore.
            }
        }
    }

    /// Remove a registration ahead of its eviction timeout. Only honored
    /// when the request comes from the same address that registered the
    /// fingerprint, so one client cannot evict another's entry.
    async fn handle_deregister(&self, fingerprint: String, from: SocketAddr) {
        let mut registrations = self.registrations.write().await;
        if let std::collections::hash_map::Entry::Occupied(entry) = registrations.entry(fingerprint) {
            if entry.get().addr == from {
                entry.remove();
            }
        }
    }

    async fn handle_register(
        &self,
        fingerprint: String,
        static_pub: [u8; 32],
        display_name: String,
        from: SocketAddr,
    ) {
        {
            let mut registrations = self.registrations.write().await;
            registrations.insert(
                fingerprint.clone(),
                Registration {
                    addr: from,
                    static_pub,
                    name: display_name,
                    last_seen: Instant::now(),
                },
            );
        }
        let ack = RelayMessage::RegisterAck { fingerprint };
        if let Ok(wire) = ack.encode() {
            let _ = self.socket.send_to(&wire, from).await;
        }
    }

    async fn handle_relay(&self, dest_fingerprint: String, payload: Vec<u8>, from: SocketAddr) {
        let src_fingerprint = {
            let mut registrations = self.registrations.write().await;
            let found = registrations
                .iter()
                .find(|(_, reg)| reg.addr == from)
                .map(|(fp, _)| fp.clone());
            let Some(fp) = found else {
                warn!(%from, "relay request from unregistered source");
                return;
            };
            if let Some(reg) = registrations.get_mut(&fp) {
                reg.last_seen = Instant::now();
            }
            fp
        };

        let dest_addr = {
            let registrations = self.registrations.read().await;
            registrations.get(&dest_fingerprint).map(|r| r.addr)
        };
        let Some(dest_addr) = dest_addr else {
            debug!(dest = %dest_fingerprint, "relay destination not registered");
            return;
        };

        // Rewrite the destination field to the sender's fingerprint: the
        // recipient reads it as "who this came from".
        let forward = RelayMessage::Relay {
            dest_fingerprint: src_fingerprint,
            payload,
        };
        if let Ok(wire) = forward.encode() {
            let _ = self.socket.send_to(&wire, dest_addr).await;
        }
    }

    async fn handle_list(&self, from: SocketAddr) {
        let entries: Vec<RelayPeerInfo> = {
            let registrations = self.registrations.read().await;
            registrations
                .iter()
                .map(|(fingerprint, reg)| RelayPeerInfo {
                    fingerprint: fingerprint.clone(),
                    static_pub: reg.static_pub,
                    name: reg.name.clone(),
                })
                .collect()
        };
        let resp = RelayMessage::ListResp { entries };
        if let Ok(wire) = resp.encode() {
            let _ = self.socket.send_to(&wire, from).await;
        }
    }

    fn spawn_eviction_sweep(&self) {
        let registrations = self.registrations.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                let mut guard = registrations.write().await;
                guard.retain(|_, reg| reg.last_seen.elapsed() < EVICTION_TIMEOUT);
            }
        });
    }
}

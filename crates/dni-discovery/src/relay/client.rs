//! Relay client: registers this installation's fingerprint with a relay,
//! re-registers on a timer, and forwards/receives opaque payloads (§4.4).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tokio::time;
use tracing::{debug, warn};

use super::protocol::{RelayMessage, RelayPeerInfo};
use crate::error::DiscoveryError;

/// Clients re-register every 60 s (§4.4).
pub const REGISTER_INTERVAL: Duration = Duration::from_secs(60);

/// Initial relay-registration retry backoff (§7).
const BACKOFF_INITIAL: Duration = Duration::from_secs(1);
/// Ceiling on the relay-registration retry backoff (§7).
const BACKOFF_MAX: Duration = Duration::from_secs(60);

/// Current connection state of a [`RelayClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayClientState {
    /// No successful registration yet.
    Disconnected,
    /// A `REGISTER` was sent; awaiting `REGISTER_ACK`.
    Registering,
    /// Registered and able to forward/receive.
    Connected,
}

/// An inbound message forwarded by the relay.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// A peer-to-peer packet relayed from `src_fingerprint`.
    Relayed {
        /// Who sent it.
        src_fingerprint: String,
        /// The opaque peer-to-peer payload.
        payload: Vec<u8>,
    },
    /// The relay's response to a `LIST` request.
    PeerList(Vec<RelayPeerInfo>),
}

/// A client connection to one relay server.
pub struct RelayClient {
    socket: Arc<UdpSocket>,
    relay_addr: SocketAddr,
    fingerprint: String,
    static_pub: [u8; 32],
    display_name: String,
    state: Mutex<RelayClientState>,
}

impl RelayClient {
    /// Bind a local UDP socket and prepare a client for `relay_addr`. Does
    /// not register yet; call [`RelayClient::run`].
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::Io` if the local socket cannot be bound.
    pub async fn bind(
        relay_addr: SocketAddr,
        fingerprint: String,
        static_pub: [u8; 32],
        display_name: String,
    ) -> Result<Self, DiscoveryError> {
        let local_addr: SocketAddr = if relay_addr.is_ipv6() {
            "[::]:0".parse().unwrap()
        } else {
            "0.0.0.0:0".parse().unwrap()
        };
        let socket = UdpSocket::bind(local_addr).await?;
        socket.connect(relay_addr).await?;
        Ok(Self {
            socket: Arc::new(socket),
            relay_addr,
            fingerprint,
            static_pub,
            display_name,
            state: Mutex::new(RelayClientState::Disconnected),
        })
    }

    /// Current connection state.
    pub async fn state(&self) -> RelayClientState {
        *self.state.lock().await
    }

    /// Send one `REGISTER` and wait for `REGISTER_ACK`, retrying with
    /// exponential backoff (1s, 2s, 4s, ..., capped at 60s) on failure
    /// (§7 `RelayRegisterFailed`).
    ///
    /// # Errors
    ///
    /// Never returns an error itself; it retries indefinitely. Exposed as
    /// `Result` so callers can wrap it in a timeout if desired.
    pub async fn register_with_backoff(&self) -> Result<(), DiscoveryError> {
        let mut backoff = BACKOFF_INITIAL;
        loop {
            match self.register_once().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(error = %e, backoff_secs = backoff.as_secs(), "relay registration failed, retrying");
                    *self.state.lock().await = RelayClientState::Disconnected;
                    time::sleep(backoff).await;
                    backoff = (backoff * 2).min(BACKOFF_MAX);
                }
            }
        }
    }

    async fn register_once(&self) -> Result<(), DiscoveryError> {
        *self.state.lock().await = RelayClientState::Registering;
        let register = RelayMessage::Register {
            fingerprint: self.fingerprint.clone(),
            static_pub: self.static_pub,
            display_name: self.display_name.clone(),
        };
        let wire = register.encode()?;
        self.socket.send(&wire).await?;

        let mut buf = vec![0u8; 1500];
        let deadline = time::sleep(Duration::from_secs(5));
        tokio::pin!(deadline);
        tokio::select! {
            result = self.socket.recv(&mut buf) => {
                let len = result?;
                match RelayMessage::decode(&buf[..len])? {
                    RelayMessage::RegisterAck { fingerprint } if fingerprint == self.fingerprint => {
                        *self.state.lock().await = RelayClientState::Connected;
                        debug!(relay = %self.relay_addr, "registered with relay");
                        Ok(())
                    }
                    _ => Err(DiscoveryError::RelayRegisterFailed("unexpected reply".into())),
                }
            }
            () = &mut deadline => {
                Err(DiscoveryError::RelayRegisterFailed("ack timeout".into()))
            }
        }
    }

    /// Run the re-registration timer forever. Intended to be spawned as a
    /// background task alongside [`RelayClient::recv_loop`].
    pub async fn run_reregistration(&self) {
        loop {
            time::sleep(REGISTER_INTERVAL).await;
            if let Err(e) = self.register_once().await {
                warn!(error = %e, "periodic relay re-registration failed");
            }
        }
    }

    /// Ask the relay to forward `payload` to `dest_fingerprint`.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::Io` if the send fails.
    pub async fn relay_to(
        &self,
        dest_fingerprint: &str,
        payload: &[u8],
    ) -> Result<(), DiscoveryError> {
        let msg = RelayMessage::Relay {
            dest_fingerprint: dest_fingerprint.to_string(),
            payload: payload.to_vec(),
        };
        let wire = msg.encode()?;
        self.socket.send(&wire).await?;
        Ok(())
    }

    /// Tell the relay to drop this client's registration ahead of its
    /// eviction timeout. Fire-and-forget: no acknowledgement exists for
    /// this message, matching the best-effort shutdown policy (§5).
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::Io` if the send fails.
    pub async fn deregister(&self) -> Result<(), DiscoveryError> {
        let msg = RelayMessage::Deregister {
            fingerprint: self.fingerprint.clone(),
        };
        let wire = msg.encode()?;
        self.socket.send(&wire).await?;
        Ok(())
    }

    /// Request the relay's current peer list.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::Io` if the send fails.
    pub async fn request_list(&self) -> Result<(), DiscoveryError> {
        let wire = RelayMessage::List.encode()?;
        self.socket.send(&wire).await?;
        Ok(())
    }

    /// Receive and classify the next inbound relay message. Runs forever;
    /// spawn as a background task and forward [`RelayEvent`]s through
    /// `tx`.
    pub async fn recv_loop(&self, tx: mpsc::UnboundedSender<RelayEvent>) {
        let mut buf = vec![0u8; 65536];
        loop {
            let len = match self.socket.recv(&mut buf).await {
                Ok(len) => len,
                Err(e) => {
                    warn!(error = %e, "relay socket recv error");
                    continue;
                }
            };
            let msg = match RelayMessage::decode(&buf[..len]) {
                Ok(msg) => msg,
                Err(_) => continue,
            };
            let event = match msg {
                // The relay rewrites the destination field to the
                // sender's fingerprint before forwarding, so on the
                // inbound side this field identifies who sent it.
                RelayMessage::Relay {
                    dest_fingerprint,
                    payload,
                } => RelayEvent::Relayed {
                    src_fingerprint: dest_fingerprint,
                    payload,
                },
                RelayMessage::ListResp { entries } => RelayEvent::PeerList(entries),
                _ => continue,
            };
            let _ = tx.send(event);
        }
    }
}

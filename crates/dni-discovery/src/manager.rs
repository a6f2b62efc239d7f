//! Discovery Fabric (§4.4): runs the LAN and relay backends concurrently
//! and merges their output into a single peer-observation stream.
//!
//! A fingerprint seen via LAN suppresses its relay entry for the next 30 s
//! (LAN is cheaper); a manual entry suppresses both, but manual entries are
//! added directly through `dni_core::SessionManager::observe_peer` and
//! never flow through this module.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dni_core::peer::{PeerEndpoint, PeerSource};
use tokio::sync::{mpsc, watch};
use tracing::warn;

use crate::error::DiscoveryError;
use crate::mdns::LanDiscovery;
use crate::relay::{RelayClient, RelayEvent};

/// How long a LAN observation suppresses the same fingerprint's relay
/// entries (§4.4).
pub const LAN_SUPPRESSES_RELAY_FOR: Duration = Duration::from_secs(30);

/// Static configuration for running the fabric.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// This installation's fingerprint, advertised over both backends.
    pub fingerprint: String,
    /// This installation's static public key.
    pub static_pub: [u8; 32],
    /// This installation's display name.
    pub display_name: String,
    /// The local UDP port peers should connect to.
    pub udp_port: u16,
    /// Whether to run the mDNS LAN backend.
    pub use_lan_discovery: bool,
    /// The relay server to register with, if any.
    pub relay_address: Option<SocketAddr>,
}

/// Drives the LAN and relay backends and emits merged `PeerEndpoint`
/// observations.
pub struct DiscoveryFabric {
    config: DiscoveryConfig,
    last_lan_seen: HashMap<String, Instant>,
}

impl DiscoveryFabric {
    /// Construct a fabric for the given configuration. Call [`Self::run`]
    /// to start it.
    #[must_use]
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            config,
            last_lan_seen: HashMap::new(),
        }
    }

    /// Start both backends and forward merged observations to `tx` until
    /// `shutdown` fires or the task is dropped. On shutdown, best-effort
    /// deregisters from the relay before returning (no ack awaited, §5).
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError` if the LAN backend fails to start. Relay
    /// registration failures are retried internally and never surface
    /// here.
    pub async fn run(
        mut self,
        tx: mpsc::UnboundedSender<PeerEndpoint>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), DiscoveryError> {
        let (observations_tx, mut observations_rx) = mpsc::unbounded_channel::<PeerEndpoint>();

        if self.config.use_lan_discovery {
            self.spawn_lan_backend(observations_tx.clone())?;
        }
        let relay_client = match self.config.relay_address {
            Some(relay_addr) => self.start_relay_backend(relay_addr, observations_tx).await,
            None => None,
        };

        loop {
            tokio::select! {
                observation = observations_rx.recv() => {
                    match observation {
                        Some(observation) => {
                            if self.should_forward(&observation) {
                                if observation.source == PeerSource::Lan {
                                    self.last_lan_seen
                                        .insert(observation.fingerprint.clone(), Instant::now());
                                }
                                let _ = tx.send(observation);
                            }
                        }
                        None => break,
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        if let Some(client) = relay_client {
            let _ = client.deregister().await;
        }
        Ok(())
    }

    fn should_forward(&self, observation: &PeerEndpoint) -> bool {
        if observation.source != PeerSource::Relay {
            return true;
        }
        match self.last_lan_seen.get(&observation.fingerprint) {
            Some(seen_at) => seen_at.elapsed() >= LAN_SUPPRESSES_RELAY_FOR,
            None => true,
        }
    }

    fn spawn_lan_backend(
        &self,
        tx: mpsc::UnboundedSender<PeerEndpoint>,
    ) -> Result<(), DiscoveryError> {
        let lan = Arc::new(LanDiscovery::new()?);
        let fingerprint = self.config.fingerprint.clone();
        let static_pub = self.config.static_pub;
        let display_name = self.config.display_name.clone();
        let port = self.config.udp_port;

        let advertiser = lan.clone();
        tokio::spawn(async move {
            if let Err(e) = advertiser
                .advertise(&fingerprint, static_pub, &display_name, port)
                .await
            {
                warn!(error = %e, "mDNS advertisement failed to start");
            }
        });

        let browser = lan;
        let mut rx = browser.browse()?;
        tokio::spawn(async move {
            while let Some(peer) = rx.recv().await {
                let endpoint = PeerEndpoint::new(
                    peer.fingerprint,
                    peer.address,
                    PeerSource::Lan,
                    peer.static_pub,
                )
                .with_name(peer.name);
                if tx.send(endpoint).is_err() {
                    break;
                }
            }
        });
        Ok(())
    }

    /// Bind and register a relay client, then spawn its background tasks
    /// (re-registration timer, recv loop, periodic list poll). Returns the
    /// client so [`Self::run`] can deregister it on shutdown.
    async fn start_relay_backend(
        &self,
        relay_addr: SocketAddr,
        tx: mpsc::UnboundedSender<PeerEndpoint>,
    ) -> Option<Arc<RelayClient>> {
        let fingerprint = self.config.fingerprint.clone();
        let static_pub = self.config.static_pub;
        let display_name = self.config.display_name.clone();

        let client = match RelayClient::bind(relay_addr, fingerprint, static_pub, display_name).await {
            Ok(client) => Arc::new(client),
            Err(e) => {
                warn!(error = %e, "failed to bind relay client socket");
                return None;
            }
        };
        client.register_with_backoff().await.ok();

        let reregister = client.clone();
        tokio::spawn(async move { reregister.run_reregistration().await });

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let recv_client = client.clone();
        tokio::spawn(async move { recv_client.recv_loop(events_tx).await });

        let poller = client.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(30));
            loop {
                ticker.tick().await;
                let _ = poller.request_list().await;
            }
        });

        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                if let RelayEvent::PeerList(entries) = event {
                    for entry in entries {
                        let endpoint = PeerEndpoint::new(
                            entry.fingerprint,
                            relay_addr,
                            PeerSource::Relay,
                            entry.static_pub,
                        )
                        .with_name(entry.name);
                        if tx.send(endpoint).is_err() {
                            return;
                        }
                    }
                }
            }
        });

        Some(client)
    }
}
